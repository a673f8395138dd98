use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::update_listeners::webhooks;
use teloxide::utils::command::BotCommands;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use captioner::config::{Config, DeployMode};
use captioner::relay::commands::{Command, handle_callback, handle_command};
use captioner::relay::listener::handle_channel_post;
use captioner::relay::{BotState, TelegramClient};
use captioner::telegram_log::TelegramLogLayer;

const DEFAULT_CONFIG_FILE: &str = "captioner.json";

fn load_config() -> Result<(Config, String), captioner::config::ConfigError> {
    match std::env::args().nth(1) {
        Some(path) => Config::load(&path).map(|c| (c, path)),
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
            Config::load(DEFAULT_CONFIG_FILE).map(|c| (c, DEFAULT_CONFIG_FILE.to_string()))
        }
        None => Config::from_env().map(|c| (c, "environment".to_string())),
    }
}

fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let (config, source) = match load_config() {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(1);
        }
    };

    let bot = Bot::new(&config.telegram_bot_token);

    // Setup logging
    let log_dir = config.data_dir.join("logs");
    std::fs::create_dir_all(&log_dir).ok();
    let log_file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("captioner.log"))
    {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Failed to open log file in {}: {e}", log_dir.display());
            std::process::exit(1);
        }
    };
    let (non_blocking, _guard) = tracing_appender::non_blocking(log_file);

    let registry = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_filter(env_filter(&config.log_level)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(env_filter(&config.log_level)),
        );

    if let Some(log_chat_id) = config.log_chat_id {
        registry.with(TelegramLogLayer::new(bot.clone(), log_chat_id)).init();
    } else {
        registry.init();
    }

    info!("🚀 Starting captioner v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded config from {source}");
    info!("Target channel: {}", config.channel);
    if config.debug {
        info!("Debug mode enabled, using long polling");
    }

    let deploy_mode = config.deploy_mode();
    let telegram = Arc::new(TelegramClient::new(bot.clone()));
    let state = match BotState::open(config, telegram) {
        Ok(state) => Arc::new(state),
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = bot.set_my_commands(Command::bot_commands()).await {
        warn!("Failed to register bot commands: {e}");
    }

    let handler = dptree::entry()
        .branch(Update::filter_message().filter_command::<Command>().endpoint(handle_command))
        .branch(Update::filter_channel_post().endpoint(handle_channel_post))
        .branch(Update::filter_edited_channel_post().endpoint(handle_channel_post))
        .branch(Update::filter_callback_query().endpoint(handle_callback));

    let mut dispatcher = Dispatcher::builder(bot.clone(), handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build();

    match deploy_mode {
        DeployMode::Polling => {
            info!("Listening for updates with long polling");
            dispatcher.dispatch().await;
        }
        DeployMode::Webhook { url, port } => {
            let addr: SocketAddr = ([0, 0, 0, 0], port).into();
            info!("Listening for webhook updates on port {port}");
            let listener = match webhooks::axum(bot, webhooks::Options::new(addr, url)).await {
                Ok(listener) => listener,
                Err(e) => {
                    error!("Failed to set up webhook: {e}");
                    std::process::exit(1);
                }
            };
            dispatcher
                .dispatch_with_listener(listener, LoggingErrorHandler::with_custom_text("Webhook listener error"))
                .await;
        }
    }
}
