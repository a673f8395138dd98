//! Caption relay: the target channel gets a prefix and suffix, registered
//! channels get their owner's caption appended.

pub mod auth;
pub mod caption;
pub mod channel;
pub mod commands;
pub mod listener;
pub mod pending;
pub mod registry;
pub mod selection;
pub mod settings;
pub mod state;
pub mod telegram;


pub use caption::{Mutation, append_caption, compute_new_text};
pub use channel::ChannelRef;
pub use commands::{Command, Reply};
pub use listener::{ChannelPost, Outcome, PostBody, process_post};
pub use registry::{ChannelRegistration, Registry, RegistryError};
pub use settings::{CaptionConfig, CaptionSettings, SettingsStore};
pub use state::BotState;
pub use telegram::TelegramClient;
