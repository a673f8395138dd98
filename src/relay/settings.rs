//! Settings persistence: a flat key/value document, read and written whole.
//!
//! Reads never fail past this module (a broken document reads as empty) and
//! writes report success as a bool. There is no lock around
//! read-modify-write; two admins saving at once can lose one update.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

pub const PREFIX_KEY: &str = "CUSTOM_CAPTION_PREFIX";
pub const SUFFIX_KEY: &str = "CUSTOM_CAPTION_SUFFIX";
pub const ADMIN_KEY: &str = "ADMIN_USER_ID";

/// The whole settings map.
pub type Document = Map<String, Value>;

/// Errors from a settings backend.
#[derive(Debug)]
pub enum StoreError {
    Io { path: PathBuf, source: std::io::Error },
    Json(serde_json::Error),
    Sqlite(rusqlite::Error),
    /// The stored document is valid JSON but not an object.
    NotAnObject,
    Poisoned,
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "settings file '{}': {}", path.display(), source),
            Self::Json(e) => write!(f, "settings document is not valid JSON: {e}"),
            Self::Sqlite(e) => write!(f, "settings database error: {e}"),
            Self::NotAnObject => write!(f, "settings document is not a JSON object"),
            Self::Poisoned => write!(f, "settings connection lock poisoned"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Json(e) => Some(e),
            Self::Sqlite(e) => Some(e),
            Self::NotAnObject | Self::Poisoned => None,
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Sqlite(e)
    }
}

/// Where the settings document lives.
pub trait SettingsBackend: Send + Sync {
    /// Load the document, creating an empty one if none exists yet.
    fn load(&self) -> Result<Document, StoreError>;
    fn save(&self, doc: &Document) -> Result<(), StoreError>;
    fn describe(&self) -> String;
}

/// A single JSON object on disk.
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn io_err(&self, source: std::io::Error) -> StoreError {
        StoreError::Io { path: self.path.clone(), source }
    }

    fn ensure_parent(&self) -> Result<(), StoreError> {
        match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => {
                std::fs::create_dir_all(dir).map_err(|e| self.io_err(e))
            }
            _ => Ok(()),
        }
    }
}

impl SettingsBackend for JsonFileBackend {
    fn load(&self) -> Result<Document, StoreError> {
        self.ensure_parent()?;
        if !self.path.exists() {
            let empty = Document::new();
            self.save(&empty)?;
            info!("Created empty settings file at {:?}", self.path);
            return Ok(empty);
        }

        let content = std::fs::read_to_string(&self.path).map_err(|e| self.io_err(e))?;
        match serde_json::from_str::<Value>(&content)? {
            Value::Object(doc) => Ok(doc),
            _ => Err(StoreError::NotAnObject),
        }
    }

    fn save(&self, doc: &Document) -> Result<(), StoreError> {
        self.ensure_parent()?;
        let body = serde_json::to_string_pretty(doc)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, body).map_err(|e| self.io_err(e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| self.io_err(e))
    }

    fn describe(&self) -> String {
        format!("json file {}", self.path.display())
    }
}

/// The same document kept as one row in SQLite.
pub struct SqliteBackend {
    conn: Mutex<Connection>,
    label: String,
}

impl SqliteBackend {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(dir) = path.parent()
            && !dir.as_os_str().is_empty()
        {
            std::fs::create_dir_all(dir).map_err(|source| StoreError::Io { path: path.to_path_buf(), source })?;
        }
        let conn = Connection::open(path)?;
        Self::with_connection(conn, format!("sqlite {}", path.display()))
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?, "sqlite :memory:".to_string())
    }

    fn with_connection(conn: Connection, label: String) -> Result<Self, StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS settings_document (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                body TEXT NOT NULL
            );
            "#,
        )?;
        Ok(Self { conn: Mutex::new(conn), label })
    }
}

impl SettingsBackend for SqliteBackend {
    fn load(&self) -> Result<Document, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let body: Option<String> = conn
            .query_row("SELECT body FROM settings_document WHERE id = 1", [], |row| row.get(0))
            .optional()?;

        match body {
            Some(body) => match serde_json::from_str::<Value>(&body)? {
                Value::Object(doc) => Ok(doc),
                _ => Err(StoreError::NotAnObject),
            },
            None => {
                conn.execute("INSERT INTO settings_document (id, body) VALUES (1, '{}')", [])?;
                Ok(Document::new())
            }
        }
    }

    fn save(&self, doc: &Document) -> Result<(), StoreError> {
        let body = serde_json::to_string(doc)?;
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        conn.execute(
            "INSERT INTO settings_document (id, body) VALUES (1, ?1)
             ON CONFLICT(id) DO UPDATE SET body = ?1",
            params![body],
        )?;
        Ok(())
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}

/// Key/value view over a [`SettingsBackend`].
pub struct SettingsStore {
    backend: Box<dyn SettingsBackend>,
}

impl SettingsStore {
    pub fn new(backend: impl SettingsBackend + 'static) -> Self {
        Self { backend: Box::new(backend) }
    }

    pub fn describe(&self) -> String {
        self.backend.describe()
    }

    /// The whole document; empty if it cannot be read.
    pub fn snapshot(&self) -> Document {
        self.backend.load().unwrap_or_else(|e| {
            warn!("Failed to load settings from {}: {e}", self.backend.describe());
            Document::new()
        })
    }

    pub fn get_value(&self, key: &str) -> Option<Value> {
        self.snapshot().remove(key)
    }

    /// Stored value for `key`, or `default` if absent or of the wrong shape.
    pub fn get<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        match self.get_value(key) {
            Some(value) => serde_json::from_value(value).unwrap_or_else(|e| {
                warn!("Setting {key} has unexpected shape, using default: {e}");
                default
            }),
            None => default,
        }
    }

    pub fn set<T: Serialize>(&self, key: &str, value: T) -> bool {
        let value = match serde_json::to_value(value) {
            Ok(v) => v,
            Err(e) => {
                warn!("Failed to serialize setting {key}: {e}");
                return false;
            }
        };

        let mut doc = self.snapshot();
        doc.insert(key.to_string(), value);
        self.persist(&doc, key)
    }

    /// Remove `key`. Deleting an absent key succeeds without a write.
    pub fn delete(&self, key: &str) -> bool {
        let mut doc = self.snapshot();
        if doc.remove(key).is_none() {
            return true;
        }
        self.persist(&doc, key)
    }

    fn persist(&self, doc: &Document, key: &str) -> bool {
        match self.backend.save(doc) {
            Ok(()) => {
                debug!("Saved setting {key}");
                true
            }
            Err(e) => {
                warn!("Failed to save setting {key} to {}: {e}", self.backend.describe());
                false
            }
        }
    }
}

/// Prefix and suffix applied to posts in the target channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptionSettings {
    pub prefix: String,
    pub suffix: String,
}

/// Handle to the live caption settings.
///
/// The store is the source of truth; the in-memory copy is only a cache
/// and is dropped on every write. A read that raced with a write never
/// refills the cache.
pub struct CaptionConfig {
    store: Arc<SettingsStore>,
    defaults: CaptionSettings,
    cache: RwLock<Option<CaptionSettings>>,
    /// Bumped by every invalidation.
    generation: AtomicU64,
}

impl CaptionConfig {
    pub fn new(store: Arc<SettingsStore>, defaults: CaptionSettings) -> Self {
        Self { store, defaults, cache: RwLock::new(None), generation: AtomicU64::new(0) }
    }

    pub fn defaults(&self) -> &CaptionSettings {
        &self.defaults
    }

    pub fn current(&self) -> CaptionSettings {
        if let Ok(cache) = self.cache.read()
            && let Some(ref settings) = *cache
        {
            return settings.clone();
        }

        let generation = self.generation.load(Ordering::Acquire);
        let settings = CaptionSettings {
            prefix: self.store.get(PREFIX_KEY, self.defaults.prefix.clone()),
            suffix: self.store.get(SUFFIX_KEY, self.defaults.suffix.clone()),
        };
        if let Ok(mut cache) = self.cache.write()
            && self.generation.load(Ordering::Acquire) == generation
        {
            *cache = Some(settings.clone());
        }
        settings
    }

    pub fn set_prefix(&self, prefix: &str) -> bool {
        let saved = self.store.set(PREFIX_KEY, prefix);
        self.invalidate();
        saved
    }

    pub fn set_suffix(&self, suffix: &str) -> bool {
        let saved = self.store.set(SUFFIX_KEY, suffix);
        self.invalidate();
        saved
    }

    /// Drop stored overrides so the configured defaults apply again.
    pub fn reset(&self) -> bool {
        let prefix = self.store.delete(PREFIX_KEY);
        let suffix = self.store.delete(SUFFIX_KEY);
        self.invalidate();
        prefix && suffix
    }

    pub fn invalidate(&self) {
        let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
        self.generation.fetch_add(1, Ordering::AcqRel);
        *cache = None;
    }
}
