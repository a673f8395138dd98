//! Everything a handler needs, shared behind one `Arc`.

use std::sync::Arc;

use tracing::info;

use crate::config::{AuthPolicy, Config, SettingsBackendKind};
use crate::relay::auth::{AllowList, Authorizer, ChannelAdmins, FirstWriterAdmin};
use crate::relay::pending::PendingSelections;
use crate::relay::registry::Registry;
use crate::relay::settings::{CaptionConfig, CaptionSettings, JsonFileBackend, SettingsStore, SqliteBackend};
use crate::relay::telegram::TelegramClient;

const PENDING_CAPACITY: usize = 256;

pub struct BotState {
    pub config: Config,
    pub settings: Arc<SettingsStore>,
    pub captions: CaptionConfig,
    pub registry: Registry,
    pub pending: PendingSelections,
    pub auth: Box<dyn Authorizer>,
    pub telegram: Arc<TelegramClient>,
}

impl BotState {
    /// Open the configured stores on disk.
    pub fn open(config: Config, telegram: Arc<TelegramClient>) -> Result<Self, String> {
        let settings = match config.settings_backend {
            SettingsBackendKind::Json => SettingsStore::new(JsonFileBackend::new(config.settings_path())),
            SettingsBackendKind::Sqlite => SettingsStore::new(
                SqliteBackend::open(&config.database_path)
                    .map_err(|e| format!("Failed to open settings database: {e}"))?,
            ),
        };
        let registry = Registry::open(&config.database_path)
            .map_err(|e| format!("Failed to open registry database: {e}"))?;

        info!("Settings stored in {}", settings.describe());
        Ok(Self::assemble(config, settings, registry, telegram))
    }

    /// Same wiring with in-memory stores. Nothing survives the process.
    pub fn ephemeral(config: Config, telegram: Arc<TelegramClient>) -> Result<Self, String> {
        let settings = SettingsStore::new(SqliteBackend::in_memory().map_err(|e| e.to_string())?);
        let registry = Registry::new().map_err(|e| e.to_string())?;
        Ok(Self::assemble(config, settings, registry, telegram))
    }

    fn assemble(
        config: Config,
        settings: SettingsStore,
        registry: Registry,
        telegram: Arc<TelegramClient>,
    ) -> Self {
        let settings = Arc::new(settings);
        let captions = CaptionConfig::new(
            settings.clone(),
            CaptionSettings { prefix: config.caption_prefix.clone(), suffix: config.caption_suffix.clone() },
        );

        let auth: Box<dyn Authorizer> = match config.auth_policy {
            AuthPolicy::FirstWriter => Box::new(FirstWriterAdmin::new(settings.clone())),
            AuthPolicy::AllowList => Box::new(AllowList::new(config.admin_ids.iter().copied())),
            AuthPolicy::ChannelAdmins => Box::new(ChannelAdmins::new(telegram.clone(), config.channel.clone())),
        };
        info!("Authorization: {}", auth.describe());

        let pending = PendingSelections::new(PENDING_CAPACITY, config.pending_ttl);

        Self { config, settings, captions, registry, pending, auth, telegram }
    }
}
