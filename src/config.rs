use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Url;
use serde::Deserialize;
use teloxide::types::{ChatId, ParseMode};

use crate::relay::caption::CAPTION_LIMIT;
use crate::relay::channel::ChannelRef;
use crate::relay::telegram::parse_mode_from_str;

pub const DEFAULT_PREFIX: &str = "📢 ";
pub const DEFAULT_SUFFIX: &str = "\n\n👉 @YourChannelName";

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read the config file.
    ReadFile { path: PathBuf, source: std::io::Error },
    /// Failed to parse JSON.
    ParseJson { path: PathBuf, source: serde_json::Error },
    /// Validation error.
    Validation(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFile { path, source } => {
                write!(f, "failed to read config file '{}': {}", path.display(), source)
            }
            Self::ParseJson { path, source } => {
                write!(f, "failed to parse config file '{}': {}", path.display(), source)
            }
            Self::Validation(msg) => write!(f, "config validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ReadFile { source, .. } => Some(source),
            Self::ParseJson { source, .. } => Some(source),
            Self::Validation(_) => None,
        }
    }
}

/// Channel ids show up in JSON both as numbers and strings.
#[derive(Deserialize, Clone)]
#[serde(untagged)]
enum RawChannel {
    Id(i64),
    Text(String),
}

impl RawChannel {
    fn into_string(self) -> String {
        match self {
            Self::Id(id) => id.to_string(),
            Self::Text(s) => s,
        }
    }
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct ConfigFile {
    telegram_bot_token: Option<String>,
    /// Target channel for prefix/suffix rewriting.
    channel_id: Option<RawChannel>,
    caption_prefix: Option<String>,
    caption_suffix: Option<String>,
    log_level: Option<String>,
    port: Option<u16>,
    /// Public base URL; when set (and not in debug) the bot runs a webhook.
    webhook_url: Option<String>,
    debug: Option<bool>,
    data_dir: Option<String>,
    database_path: Option<String>,
    /// "json" or "sqlite".
    settings_backend: Option<String>,
    /// "first_writer", "allow_list" or "channel_admins".
    auth_policy: Option<String>,
    admin_ids: Option<Vec<i64>>,
    log_chat_id: Option<i64>,
    caption_limit: Option<usize>,
    pending_ttl_secs: Option<u64>,
    edit_parse_mode: Option<String>,
}

impl ConfigFile {
    /// Environment variables win over the file.
    fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("TELEGRAM_BOT_TOKEN") {
            self.telegram_bot_token = Some(v);
        }
        if let Some(v) = lookup("CHANNEL_ID") {
            self.channel_id = Some(RawChannel::Text(v));
        }
        if let Some(v) = lookup("CUSTOM_CAPTION_PREFIX") {
            self.caption_prefix = Some(v);
        }
        if let Some(v) = lookup("CUSTOM_CAPTION_SUFFIX") {
            self.caption_suffix = Some(v);
        }
        if let Some(v) = lookup("LOG_LEVEL") {
            self.log_level = Some(v);
        }
        if let Some(v) = lookup("PORT") {
            self.port = Some(parse_env("PORT", &v)?);
        }
        if let Some(v) = lookup("WEBHOOK_URL") {
            self.webhook_url = Some(v);
        }
        if let Some(v) = lookup("DEBUG") {
            self.debug = Some(v.trim().eq_ignore_ascii_case("true") || v.trim() == "1");
        }
        if let Some(v) = lookup("DATA_DIR") {
            self.data_dir = Some(v);
        }
        if let Some(v) = lookup("DATABASE_PATH") {
            self.database_path = Some(v);
        }
        if let Some(v) = lookup("SETTINGS_BACKEND") {
            self.settings_backend = Some(v);
        }
        if let Some(v) = lookup("AUTH_POLICY") {
            self.auth_policy = Some(v);
        }
        if let Some(v) = lookup("ADMIN_USER_IDS") {
            let ids = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| parse_env::<i64>("ADMIN_USER_IDS", s))
                .collect::<Result<Vec<_>, _>>()?;
            self.admin_ids = Some(ids);
        }
        if let Some(v) = lookup("LOG_CHAT_ID") {
            self.log_chat_id = Some(parse_env("LOG_CHAT_ID", &v)?);
        }
        if let Some(v) = lookup("CAPTION_LIMIT") {
            self.caption_limit = Some(parse_env("CAPTION_LIMIT", &v)?);
        }
        if let Some(v) = lookup("PENDING_TTL_SECS") {
            self.pending_ttl_secs = Some(parse_env("PENDING_TTL_SECS", &v)?);
        }
        if let Some(v) = lookup("EDIT_PARSE_MODE") {
            self.edit_parse_mode = Some(v);
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Validation(format!("{name} has an invalid value '{value}'")))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsBackendKind {
    Json,
    Sqlite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPolicy {
    FirstWriter,
    AllowList,
    ChannelAdmins,
}

/// How updates reach the bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployMode {
    Polling,
    Webhook { url: Url, port: u16 },
}

pub struct Config {
    pub telegram_bot_token: String,
    /// Channel whose posts get the prefix/suffix.
    pub channel: ChannelRef,
    /// Default prefix until an admin stores another one.
    pub caption_prefix: String,
    /// Default suffix until an admin stores another one.
    pub caption_suffix: String,
    pub log_level: String,
    pub port: u16,
    pub webhook_url: Option<Url>,
    pub debug: bool,
    /// Directory for state files (settings, database, logs).
    pub data_dir: PathBuf,
    pub database_path: PathBuf,
    pub settings_backend: SettingsBackendKind,
    pub auth_policy: AuthPolicy,
    pub admin_ids: Vec<i64>,
    pub log_chat_id: Option<ChatId>,
    pub caption_limit: usize,
    /// How long a deferred caption selection stays valid.
    pub pending_ttl: Duration,
    pub edit_parse_mode: Option<ParseMode>,
}

impl Config {
    /// Load from a JSON file, then apply environment overrides.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config_path = path.as_ref().to_path_buf();
        let content = std::fs::read_to_string(&config_path)
            .map_err(|e| ConfigError::ReadFile { path: config_path.clone(), source: e })?;
        let file: ConfigFile = serde_json::from_str(&content)
            .map_err(|e| ConfigError::ParseJson { path: config_path.clone(), source: e })?;
        Self::build(file, |name| std::env::var(name).ok())
    }

    /// Configuration from the environment alone.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::build(ConfigFile::default(), |name| std::env::var(name).ok())
    }

    /// Parse a JSON config without looking at the environment.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = serde_json::from_str(json)
            .map_err(|e| ConfigError::ParseJson { path: PathBuf::from("<inline>"), source: e })?;
        Self::build(file, |_| None)
    }

    fn build<F>(mut file: ConfigFile, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        file.apply_env(lookup)?;

        let telegram_bot_token = file.telegram_bot_token.unwrap_or_default();
        if telegram_bot_token.is_empty() {
            return Err(ConfigError::Validation("TELEGRAM_BOT_TOKEN is required".into()));
        }
        // Telegram tokens are formatted as {bot_id}:{secret} where bot_id is numeric
        let token_parts: Vec<&str> = telegram_bot_token.split(':').collect();
        if token_parts.len() != 2 || token_parts[0].parse::<u64>().is_err() || token_parts[1].is_empty() {
            return Err(ConfigError::Validation(
                "TELEGRAM_BOT_TOKEN appears invalid (expected format: 123456789:ABCdefGHI...)".into(),
            ));
        }

        let raw_channel = file
            .channel_id
            .map(RawChannel::into_string)
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ConfigError::Validation("CHANNEL_ID is required".into()))?;
        let channel = ChannelRef::parse(&raw_channel)
            .map_err(|e| ConfigError::Validation(format!("CHANNEL_ID: {e}")))?;

        let webhook_url = file
            .webhook_url
            .filter(|s| !s.trim().is_empty())
            .map(|s| {
                Url::parse(s.trim_end_matches('/'))
                    .map_err(|e| ConfigError::Validation(format!("WEBHOOK_URL '{s}' is invalid: {e}")))
            })
            .transpose()?;

        let settings_backend = match file.settings_backend.as_deref().map(str::to_lowercase).as_deref() {
            None | Some("json") => SettingsBackendKind::Json,
            Some("sqlite") => SettingsBackendKind::Sqlite,
            Some(other) => {
                return Err(ConfigError::Validation(format!(
                    "settings_backend '{other}' is unknown (expected json or sqlite)"
                )));
            }
        };

        let admin_ids = file.admin_ids.unwrap_or_default();
        let auth_policy = match file.auth_policy.as_deref().map(str::to_lowercase).as_deref() {
            None if admin_ids.is_empty() => AuthPolicy::FirstWriter,
            None => AuthPolicy::AllowList,
            Some("first_writer") => AuthPolicy::FirstWriter,
            Some("allow_list") => AuthPolicy::AllowList,
            Some("channel_admins") => AuthPolicy::ChannelAdmins,
            Some(other) => {
                return Err(ConfigError::Validation(format!(
                    "auth_policy '{other}' is unknown (expected first_writer, allow_list or channel_admins)"
                )));
            }
        };
        if auth_policy == AuthPolicy::AllowList && admin_ids.is_empty() {
            return Err(ConfigError::Validation("auth_policy allow_list needs at least one admin id".into()));
        }

        let caption_limit = file.caption_limit.unwrap_or(CAPTION_LIMIT);
        if caption_limit == 0 {
            return Err(ConfigError::Validation("caption_limit must be positive".into()));
        }

        let edit_parse_mode = match file.edit_parse_mode {
            Some(mode) => parse_mode_from_str(&mode).map_err(ConfigError::Validation)?,
            None => None,
        };

        let data_dir = file.data_dir.map(PathBuf::from).unwrap_or_else(|| PathBuf::from("data"));
        let database_path = file
            .database_path
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("captioner.db"));

        Ok(Self {
            telegram_bot_token,
            channel,
            caption_prefix: file.caption_prefix.unwrap_or_else(|| DEFAULT_PREFIX.to_string()),
            caption_suffix: file.caption_suffix.unwrap_or_else(|| DEFAULT_SUFFIX.to_string()),
            log_level: file.log_level.unwrap_or_else(|| "info".to_string()),
            port: file.port.unwrap_or(8443),
            webhook_url,
            debug: file.debug.unwrap_or(false),
            data_dir,
            database_path,
            settings_backend,
            auth_policy,
            admin_ids,
            log_chat_id: file.log_chat_id.map(ChatId),
            caption_limit,
            pending_ttl: Duration::from_secs(file.pending_ttl_secs.unwrap_or(600)),
            edit_parse_mode,
        })
    }

    pub fn settings_path(&self) -> PathBuf {
        self.data_dir.join("settings.json")
    }

    /// Polling in debug or without a webhook URL, webhook otherwise.
    ///
    /// The webhook path is the bot token, so the public URL is
    /// `<webhook_url>/<token>`.
    pub fn deploy_mode(&self) -> DeployMode {
        match &self.webhook_url {
            Some(base) if !self.debug => {
                let mut url = base.clone();
                let path = format!("{}/{}", base.path().trim_end_matches('/'), self.telegram_bot_token);
                url.set_path(&path);
                DeployMode::Webhook { url, port: self.port }
            }
            _ => DeployMode::Polling,
        }
    }
}
