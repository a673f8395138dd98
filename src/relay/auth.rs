//! Who may change the global caption settings.
//!
//! Command handlers only see [`Authorizer`]; which policy sits behind it is
//! a config decision.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::relay::channel::ChannelRef;
use crate::relay::settings::{ADMIN_KEY, SettingsStore};
use crate::relay::telegram::TelegramClient;

#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn authorize(&self, user_id: i64) -> bool;

    /// Short human-readable policy description for `/status`.
    fn describe(&self) -> String;
}

/// The first user to run a privileged command becomes the admin for good.
pub struct FirstWriterAdmin {
    store: Arc<SettingsStore>,
}

impl FirstWriterAdmin {
    pub fn new(store: Arc<SettingsStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Authorizer for FirstWriterAdmin {
    async fn authorize(&self, user_id: i64) -> bool {
        let admin_id: i64 = self.store.get(ADMIN_KEY, 0);
        if admin_id == 0 {
            if !self.store.set(ADMIN_KEY, user_id) {
                error!("Could not persist {} as admin, denying", user_id);
                return false;
            }
            info!("👑 User {} is now the bot admin", user_id);
            return true;
        }
        admin_id == user_id
    }

    fn describe(&self) -> String {
        match self.store.get::<i64>(ADMIN_KEY, 0) {
            0 => "first writer (unclaimed)".to_string(),
            id => format!("first writer (admin {id})"),
        }
    }
}

/// Fixed set of admin user ids.
pub struct AllowList {
    ids: HashSet<i64>,
}

impl AllowList {
    pub fn new(ids: impl IntoIterator<Item = i64>) -> Self {
        Self { ids: ids.into_iter().collect() }
    }
}

#[async_trait]
impl Authorizer for AllowList {
    async fn authorize(&self, user_id: i64) -> bool {
        self.ids.contains(&user_id)
    }

    fn describe(&self) -> String {
        format!("allow list ({} users)", self.ids.len())
    }
}

/// Administrators of the target channel, asked live from Telegram.
pub struct ChannelAdmins {
    telegram: Arc<TelegramClient>,
    channel: ChannelRef,
}

impl ChannelAdmins {
    pub fn new(telegram: Arc<TelegramClient>, channel: ChannelRef) -> Self {
        Self { telegram, channel }
    }
}

#[async_trait]
impl Authorizer for ChannelAdmins {
    async fn authorize(&self, user_id: i64) -> bool {
        match self.telegram.is_chat_admin(&self.channel, user_id).await {
            Ok(is_admin) => is_admin,
            Err(e) => {
                warn!("Denying {} because the admin check failed: {}", user_id, e);
                false
            }
        }
    }

    fn describe(&self) -> String {
        format!("administrators of {}", self.channel)
    }
}
