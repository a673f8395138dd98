//! Channel registrations and per-channel captions, kept in SQLite.

use std::fmt;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info, warn};

use crate::relay::channel::ChannelRef;

/// A channel an owner has registered with the bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRegistration {
    pub owner_id: i64,
    pub channel_id: String,
    pub channel_title: Option<String>,
    pub registered_at: String,
}

impl ChannelRegistration {
    /// "Title (id)" or just the id.
    pub fn label(&self) -> String {
        match &self.channel_title {
            Some(title) => format!("{} ({})", title, self.channel_id),
            None => self.channel_id.clone(),
        }
    }
}

/// Custom caption appended to posts in one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptionMapping {
    pub owner_id: i64,
    pub channel_id: String,
    pub custom_caption: String,
}

#[derive(Debug)]
pub enum RegistryError {
    /// This owner already registered the channel.
    Duplicate { owner_id: i64, channel_id: String },
    /// Another owner holds the channel; ids are unique across owners.
    ClaimedByOtherOwner { channel_id: String },
    /// Caption set for a channel the owner has not registered.
    NotRegistered { owner_id: i64, channel_id: String },
    Store(rusqlite::Error),
    Poisoned,
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Duplicate { channel_id, .. } => write!(f, "channel {channel_id} is already registered"),
            Self::ClaimedByOtherOwner { channel_id } => {
                write!(f, "channel {channel_id} is registered by another user")
            }
            Self::NotRegistered { channel_id, .. } => write!(f, "channel {channel_id} is not registered"),
            Self::Store(e) => write!(f, "registry database error: {e}"),
            Self::Poisoned => write!(f, "registry connection lock poisoned"),
        }
    }
}

impl std::error::Error for RegistryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for RegistryError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Store(e)
    }
}

/// Registration/mapping manager.
pub struct Registry {
    conn: Mutex<Connection>,
}

impl Registry {
    /// In-memory registry (tests, or running without a data dir).
    pub fn new() -> Result<Self, RegistryError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    pub fn open(path: &Path) -> Result<Self, RegistryError> {
        if let Some(dir) = path.parent()
            && !dir.as_os_str().is_empty()
        {
            std::fs::create_dir_all(dir).ok();
        }
        let registry = Self::with_connection(Connection::open(path)?)?;
        let (channels, captions) = registry.counts();
        info!("Loaded registry from {:?} ({} channels, {} captions)", path, channels, captions);
        Ok(registry)
    }

    fn with_connection(conn: Connection) -> Result<Self, RegistryError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS channels (
                owner_id INTEGER NOT NULL,
                channel_id TEXT NOT NULL UNIQUE,
                channel_title TEXT,
                registered_at TEXT NOT NULL,
                PRIMARY KEY (owner_id, channel_id)
            );

            CREATE TABLE IF NOT EXISTS captions (
                owner_id INTEGER NOT NULL,
                channel_id TEXT NOT NULL,
                custom_caption TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (owner_id, channel_id)
            );

            CREATE INDEX IF NOT EXISTS idx_captions_channel ON captions(channel_id);
            "#,
        )?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, RegistryError> {
        self.conn.lock().map_err(|_| RegistryError::Poisoned)
    }

    fn counts(&self) -> (usize, usize) {
        let Ok(conn) = self.lock() else {
            return (0, 0);
        };
        let channels: i64 = conn
            .query_row("SELECT COUNT(*) FROM channels", [], |row| row.get(0))
            .unwrap_or(0);
        let captions: i64 = conn
            .query_row("SELECT COUNT(*) FROM captions", [], |row| row.get(0))
            .unwrap_or(0);
        (channels as usize, captions as usize)
    }

    pub fn register_channel(
        &self,
        owner_id: i64,
        channel_id: &str,
        channel_title: Option<&str>,
    ) -> Result<ChannelRegistration, RegistryError> {
        let channel_id = &channel_key(channel_id);
        let conn = self.lock()?;

        let holder: Option<i64> = conn
            .query_row(
                "SELECT owner_id FROM channels WHERE channel_id = ?1",
                params![channel_id],
                |row| row.get(0),
            )
            .optional()?;
        match holder {
            Some(existing) if existing == owner_id => {
                return Err(RegistryError::Duplicate { owner_id, channel_id: channel_id.to_string() });
            }
            Some(_) => {
                return Err(RegistryError::ClaimedByOtherOwner { channel_id: channel_id.to_string() });
            }
            None => {}
        }

        let registered_at = now();
        conn.execute(
            "INSERT INTO channels (owner_id, channel_id, channel_title, registered_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![owner_id, channel_id, channel_title, registered_at],
        )?;

        info!("📌 Owner {} registered channel {}", owner_id, channel_id);
        Ok(ChannelRegistration {
            owner_id,
            channel_id: channel_id.to_string(),
            channel_title: channel_title.map(str::to_string),
            registered_at,
        })
    }

    /// Registrations for `owner_id` in insertion order. Empty on read failure.
    pub fn list_channels(&self, owner_id: i64) -> Vec<ChannelRegistration> {
        self.try_list_channels(owner_id).unwrap_or_else(|e| {
            warn!("Failed to list channels for {owner_id}: {e}");
            Vec::new()
        })
    }

    fn try_list_channels(&self, owner_id: i64) -> Result<Vec<ChannelRegistration>, RegistryError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT owner_id, channel_id, channel_title, registered_at
             FROM channels WHERE owner_id = ?1 ORDER BY rowid ASC",
        )?;
        let rows = stmt.query_map(params![owner_id], |row| {
            Ok(ChannelRegistration {
                owner_id: row.get(0)?,
                channel_id: row.get(1)?,
                channel_title: row.get(2)?,
                registered_at: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn is_registered(&self, owner_id: i64, channel_id: &str) -> bool {
        let channel_id = &channel_key(channel_id);
        self.list_channels(owner_id).iter().any(|r| r.channel_id == *channel_id)
    }

    /// Remove a registration and its caption. `Ok(false)` if neither existed.
    pub fn remove_channel(&self, owner_id: i64, channel_id: &str) -> Result<bool, RegistryError> {
        let channel_id = &channel_key(channel_id);
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let captions = tx.execute(
            "DELETE FROM captions WHERE owner_id = ?1 AND channel_id = ?2",
            params![owner_id, channel_id],
        )?;
        let channels = tx.execute(
            "DELETE FROM channels WHERE owner_id = ?1 AND channel_id = ?2",
            params![owner_id, channel_id],
        )?;
        tx.commit()?;

        if channels > 0 {
            info!("🗑️ Owner {} removed channel {}", owner_id, channel_id);
        }
        Ok(channels + captions > 0)
    }

    /// Upsert the caption for a channel the owner has registered.
    pub fn set_caption(&self, owner_id: i64, channel_id: &str, text: &str) -> Result<(), RegistryError> {
        let channel_id = &channel_key(channel_id);
        let conn = self.lock()?;

        let registered: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM channels WHERE owner_id = ?1 AND channel_id = ?2",
                params![owner_id, channel_id],
                |row| row.get(0),
            )
            .optional()?;
        if registered.is_none() {
            return Err(RegistryError::NotRegistered { owner_id, channel_id: channel_id.to_string() });
        }

        conn.execute(
            "INSERT INTO captions (owner_id, channel_id, custom_caption, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(owner_id, channel_id) DO UPDATE SET
                custom_caption = ?3,
                updated_at = ?4",
            params![owner_id, channel_id, text, now()],
        )?;

        info!("✏️ Owner {} set caption for {}", owner_id, channel_id);
        Ok(())
    }

    pub fn caption_for(&self, owner_id: i64, channel_id: &str) -> Option<CaptionMapping> {
        let channel_id = &channel_key(channel_id);
        let conn = self.lock().ok()?;
        conn.query_row(
            "SELECT owner_id, channel_id, custom_caption FROM captions
             WHERE owner_id = ?1 AND channel_id = ?2",
            params![owner_id, channel_id],
            |row| {
                Ok(CaptionMapping {
                    owner_id: row.get(0)?,
                    channel_id: row.get(1)?,
                    custom_caption: row.get(2)?,
                })
            },
        )
        .optional()
        .unwrap_or_else(|e| {
            warn!("Failed to read caption for {channel_id}: {e}");
            None
        })
    }

    /// Caption for a channel, looked up by channel id alone.
    ///
    /// Only mappings backed by a live registration count, so a leftover
    /// caption row never resurfaces.
    pub fn resolve_caption(&self, channel_id: &str) -> Option<String> {
        let channel_id = &channel_key(channel_id);
        let conn = self.lock().ok()?;
        conn.query_row(
            "SELECT c.custom_caption FROM captions c
             JOIN channels r ON r.owner_id = c.owner_id AND r.channel_id = c.channel_id
             WHERE c.channel_id = ?1",
            params![channel_id],
            |row| row.get(0),
        )
        .optional()
        .unwrap_or_else(|e| {
            warn!("Failed to resolve caption for {channel_id}: {e}");
            None
        })
    }

    /// Resolve by numeric id first, then by `@username`.
    pub fn resolve_for_post(&self, chat_id: i64, username: Option<&str>) -> Option<String> {
        ChannelRef::candidates(chat_id, username).into_iter().find_map(|key| {
            let caption = self.resolve_caption(&key);
            if caption.is_some() {
                debug!("Resolved caption for chat {} via {}", chat_id, key);
            }
            caption
        })
    }

    #[cfg(test)]
    fn caption_rows(&self) -> usize {
        let conn = self.lock().unwrap();
        conn.query_row("SELECT COUNT(*) FROM captions", [], |row| row.get::<_, i64>(0))
            .unwrap_or(0) as usize
    }
}

/// Stored form of a channel id: `@username` lower-cased, numeric ids as is.
fn channel_key(channel_id: &str) -> String {
    ChannelRef::parse(channel_id)
        .map(|channel| channel.to_string())
        .unwrap_or_else(|_| channel_id.trim().to_string())
}

fn now() -> String {
    chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}
