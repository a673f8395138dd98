//! Bot commands and the inline-keyboard callbacks they spawn.
//!
//! Handlers build a [`Reply`]; only the endpoints at the bottom talk to
//! Telegram, which keeps everything above them testable offline.

use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::types::{CallbackQuery, InlineKeyboardButton, InlineKeyboardMarkup};
use teloxide::utils::command::BotCommands;
use teloxide::utils::html;
use tracing::{info, warn};

use crate::relay::caption::text_length;
use crate::relay::channel::ChannelRef;
use crate::relay::registry::RegistryError;
use crate::relay::selection::Selection;
use crate::relay::state::BotState;
use crate::relay::telegram::ChatSummary;

#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "Available commands:")]
pub enum Command {
    #[command(description = "start the bot")]
    Start,
    #[command(description = "show this help")]
    Help,
    #[command(description = "show current settings")]
    Status,
    #[command(description = "set the prefix for the main channel")]
    SetPrefix(String),
    #[command(description = "set the suffix for the main channel")]
    SetSuffix(String),
    #[command(description = "restore the default prefix and suffix")]
    ResetCaption,
    #[command(description = "register one of your channels: /register @channel")]
    Register(String),
    #[command(description = "list your registered channels")]
    Channels,
    #[command(description = "unregister a channel: /removechannel @channel")]
    RemoveChannel(String),
    #[command(description = "set the caption appended to your channel posts")]
    SetCaption(String),
}

/// Text (HTML) plus an optional inline keyboard.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub text: String,
    pub keyboard: Option<InlineKeyboardMarkup>,
}

impl Reply {
    fn text(text: impl Into<String>) -> Self {
        Self { text: text.into(), keyboard: None }
    }
}

const NOT_AUTHORIZED: &str = "❌ You are not authorized to change bot settings.";
const NOT_SAVED: &str = "⚠️ The change could not be saved. Please try again later.";
const GENERIC_FAILURE: &str = "⚠️ Something went wrong. Please try again later.";

/// Command arguments may spell newlines as `\n`.
pub fn unescape_newlines(arg: &str) -> String {
    arg.replace("\\n", "\n")
}

/// Show a prefix/suffix so that whitespace and newlines stay visible.
fn shown(value: &str) -> String {
    html::code_inline(&value.replace('\n', "\\n"))
}

pub fn start() -> Reply {
    Reply::text(
        "👋 Welcome to the auto caption bot!\n\n\
         I add a prefix and suffix to every post in the main channel, and your own \
         caption to posts in channels you register.\n\n\
         Add me to your channel as an admin with permission to edit messages, then \
         type /help to see all commands.",
    )
}

pub fn help(state: &BotState) -> Reply {
    let current = state.captions.current();
    Reply::text(format!(
        "📝 <b>Auto Caption Bot</b>\n\n\
         <b>Main channel</b>\n\
         /setprefix &lt;text&gt; - set the prefix\n\
         /setsuffix &lt;text&gt; - set the suffix (use \\n for a new line)\n\
         /resetcaption - restore the defaults\n\
         /status - show current settings\n\n\
         <b>Your channels</b>\n\
         /register @channel - register a channel you administer\n\
         /channels - list your channels\n\
         /setcaption &lt;text&gt; - caption appended to your posts\n\
         /removechannel @channel - unregister a channel\n\n\
         <b>Current settings</b>\n\
         Prefix: {}\n\
         Suffix: {}\n\
         Target channel: {}",
        shown(&current.prefix),
        shown(&current.suffix),
        html::code_inline(&state.config.channel.to_string()),
    ))
}

pub fn status(state: &BotState, user_id: i64) -> Reply {
    let current = state.captions.current();
    let channels = state.registry.list_channels(user_id).len();
    Reply::text(format!(
        "📊 <b>Current bot settings</b>\n\n\
         Prefix: {}\n\
         Suffix: {}\n\
         Target channel: {}\n\
         Debug mode: {}\n\
         Authorization: {}\n\
         Your channels: {}\n\
         Bot version: {}",
        shown(&current.prefix),
        shown(&current.suffix),
        html::code_inline(&state.config.channel.to_string()),
        if state.config.debug { "enabled" } else { "disabled" },
        html::escape(&state.auth.describe()),
        channels,
        env!("CARGO_PKG_VERSION"),
    ))
}

#[derive(Clone, Copy)]
enum Decoration {
    Prefix,
    Suffix,
}

async fn set_decoration(state: &BotState, user_id: i64, arg: &str, which: Decoration) -> Reply {
    if !state.auth.authorize(user_id).await {
        warn!("User {} denied changing the {}", user_id, which.name());
        return Reply::text(NOT_AUTHORIZED);
    }
    if arg.trim().is_empty() {
        return Reply::text(match which {
            Decoration::Prefix => "Please provide a prefix text.\nExample: <code>/setprefix 📢 </code>",
            Decoration::Suffix => "Please provide a suffix text.\nExample: <code>/setsuffix \\n\\n👉 @MyChannel</code>",
        });
    }

    let value = unescape_newlines(arg);
    let saved = match which {
        Decoration::Prefix => state.captions.set_prefix(&value),
        Decoration::Suffix => state.captions.set_suffix(&value),
    };
    if !saved {
        return Reply::text(NOT_SAVED);
    }

    info!("User {} set the {}", user_id, which.name());
    Reply::text(format!("✅ {} updated to: {}", which.title(), shown(&value)))
}

impl Decoration {
    fn name(self) -> &'static str {
        match self {
            Self::Prefix => "prefix",
            Self::Suffix => "suffix",
        }
    }

    fn title(self) -> &'static str {
        match self {
            Self::Prefix => "Prefix",
            Self::Suffix => "Suffix",
        }
    }
}

pub async fn set_prefix(state: &BotState, user_id: i64, arg: &str) -> Reply {
    set_decoration(state, user_id, arg, Decoration::Prefix).await
}

pub async fn set_suffix(state: &BotState, user_id: i64, arg: &str) -> Reply {
    set_decoration(state, user_id, arg, Decoration::Suffix).await
}

pub async fn reset_caption(state: &BotState, user_id: i64) -> Reply {
    if !state.auth.authorize(user_id).await {
        return Reply::text(NOT_AUTHORIZED);
    }
    if !state.captions.reset() {
        return Reply::text(NOT_SAVED);
    }
    let defaults = state.captions.defaults();
    Reply::text(format!(
        "✅ Restored defaults.\nPrefix: {}\nSuffix: {}",
        shown(&defaults.prefix),
        shown(&defaults.suffix)
    ))
}

/// Parse a channel argument, or explain what went wrong.
fn channel_arg(arg: &str, usage: &str) -> Result<ChannelRef, Reply> {
    if arg.trim().is_empty() {
        return Err(Reply::text(format!("Please name a channel.\nExample: <code>{usage}</code>")));
    }
    ChannelRef::parse(arg).map_err(|e| Reply::text(format!("❌ {}", html::escape(&e))))
}

/// Record a channel the transport has already confirmed.
pub fn register_resolved(state: &BotState, user_id: i64, chat: &ChatSummary) -> Reply {
    let channel_id = chat.id.to_string();
    match state.registry.register_channel(user_id, &channel_id, chat.title.as_deref()) {
        Ok(reg) => Reply::text(format!(
            "✅ Registered {}.\nNow send /setcaption &lt;text&gt; to choose its caption.",
            html::escape(&reg.label())
        )),
        Err(RegistryError::Duplicate { .. }) => {
            Reply::text("ℹ️ You have already registered this channel. See /channels.")
        }
        Err(RegistryError::ClaimedByOtherOwner { .. }) => {
            Reply::text("❌ This channel is already registered by another user.")
        }
        Err(e) => {
            warn!("Failed to register {} for {}: {}", channel_id, user_id, e);
            Reply::text(GENERIC_FAILURE)
        }
    }
}

pub async fn register(state: &BotState, user_id: i64, arg: &str) -> Reply {
    let channel = match channel_arg(arg, "/register @mychannel") {
        Ok(c) => c,
        Err(reply) => return reply,
    };

    let chat = match state.telegram.lookup_chat(&channel).await {
        Ok(chat) => chat,
        Err(_) => {
            return Reply::text(format!(
                "❌ I can't access {}. Add me to the channel as an administrator first.",
                html::escape(&channel.to_string())
            ));
        }
    };

    let resolved = ChannelRef::Id(chat.id);
    match state.telegram.is_chat_admin(&resolved, user_id).await {
        Ok(true) => register_resolved(state, user_id, &chat),
        Ok(false) => Reply::text("❌ Only administrators of that channel can register it."),
        Err(_) => Reply::text(GENERIC_FAILURE),
    }
}

pub fn channels(state: &BotState, user_id: i64) -> Reply {
    let registrations = state.registry.list_channels(user_id);
    if registrations.is_empty() {
        return Reply::text("You have no registered channels. Use /register @channel to add one.");
    }

    let mut text = String::from("📋 <b>Your channels</b>\n");
    for (i, reg) in registrations.iter().enumerate() {
        let caption = state
            .registry
            .caption_for(user_id, &reg.channel_id)
            .map(|m| shown(&m.custom_caption))
            .unwrap_or_else(|| "<i>no caption</i>".to_string());
        text.push_str(&format!("\n{}. {}\n   Caption: {}", i + 1, html::escape(&reg.label()), caption));
    }
    Reply::text(text)
}

/// Remove by stored key. Separate from the lookup so it can run offline.
pub fn remove_channel_key(state: &BotState, user_id: i64, channel_id: &str) -> Result<bool, Reply> {
    state.registry.remove_channel(user_id, channel_id).map_err(|e| {
        warn!("Failed to remove {} for {}: {}", channel_id, user_id, e);
        Reply::text(GENERIC_FAILURE)
    })
}

pub async fn remove_channel(state: &BotState, user_id: i64, arg: &str) -> Reply {
    let channel = match channel_arg(arg, "/removechannel @mychannel") {
        Ok(c) => c,
        Err(reply) => return reply,
    };

    let mut removed = match remove_channel_key(state, user_id, &channel.to_string()) {
        Ok(removed) => removed,
        Err(reply) => return reply,
    };

    // Registrations are stored under the numeric id, so a username needs a lookup.
    if !removed && matches!(channel, ChannelRef::Username(_)) {
        if let Ok(chat) = state.telegram.lookup_chat(&channel).await {
            removed = match remove_channel_key(state, user_id, &chat.id.to_string()) {
                Ok(removed) => removed,
                Err(reply) => return reply,
            };
        }
    }

    if removed {
        Reply::text(format!("✅ Removed {} and its caption.", html::escape(&channel.to_string())))
    } else {
        Reply::text(format!(
            "ℹ️ {} is not one of your channels. See /channels.",
            html::escape(&channel.to_string())
        ))
    }
}

pub fn set_caption(state: &BotState, user_id: i64, arg: &str) -> Reply {
    if arg.trim().is_empty() {
        return Reply::text("Please provide the caption text.\nExample: <code>/setcaption Subscribe!</code>");
    }

    let caption = unescape_newlines(arg);
    let length = text_length(&caption);
    if length > state.config.caption_limit {
        return Reply::text(format!(
            "❌ That caption is {} characters; captions can be at most {}.",
            length, state.config.caption_limit
        ));
    }

    let registrations = state.registry.list_channels(user_id);
    match registrations.as_slice() {
        [] => Reply::text("You have no registered channels. Use /register @channel first."),
        [only] => save_caption(state, user_id, &only.channel_id, &caption).unwrap_or_else(|e| e),
        many => {
            state.pending.purge_expired();
            let buttons = many
                .iter()
                .map(|reg| {
                    let selection = Selection::for_caption(&reg.channel_id, &caption, || {
                        state.pending.stash(user_id, &reg.channel_id, &caption)
                    });
                    vec![InlineKeyboardButton::callback(reg.label(), selection.encode())]
                })
                .collect::<Vec<_>>();
            Reply {
                text: "Which channel should use this caption?".to_string(),
                keyboard: Some(InlineKeyboardMarkup::new(buttons)),
            }
        }
    }
}

fn save_caption(state: &BotState, user_id: i64, channel_id: &str, caption: &str) -> Result<Reply, Reply> {
    match state.registry.set_caption(user_id, channel_id, caption) {
        Ok(()) => Ok(Reply::text(format!(
            "✅ Caption for {} set to: {}",
            html::escape(channel_id),
            shown(caption)
        ))),
        Err(RegistryError::NotRegistered { .. }) => {
            Err(Reply::text("❌ That channel is not registered to you. See /channels."))
        }
        Err(e) => {
            warn!("Failed to set caption for {}: {}", channel_id, e);
            Err(Reply::text(NOT_SAVED))
        }
    }
}

/// Apply a keyboard selection. `Err` carries the message for a failed pick.
pub fn apply_selection(state: &BotState, user_id: i64, data: &str) -> Result<Reply, Reply> {
    let Some(selection) = Selection::decode(data) else {
        return Err(Reply::text("❌ Unknown selection."));
    };

    let caption = match &selection {
        Selection::Inline { caption, .. } => caption.clone(),
        Selection::Deferred { channel_id, token } => match state.pending.take(user_id, channel_id, *token) {
            Some(caption) => caption,
            None => {
                return Err(Reply::text(
                    "⌛ That selection expired or was replaced by a newer one. Send /setcaption again.",
                ));
            }
        },
    };

    save_caption(state, user_id, selection.channel_id(), &caption)
}

pub async fn dispatch(state: &BotState, user_id: i64, cmd: Command) -> Reply {
    match cmd {
        Command::Start => start(),
        Command::Help => help(state),
        Command::Status => status(state, user_id),
        Command::SetPrefix(arg) => set_prefix(state, user_id, &arg).await,
        Command::SetSuffix(arg) => set_suffix(state, user_id, &arg).await,
        Command::ResetCaption => reset_caption(state, user_id).await,
        Command::Register(arg) => register(state, user_id, &arg).await,
        Command::Channels => channels(state, user_id),
        Command::RemoveChannel(arg) => remove_channel(state, user_id, &arg).await,
        Command::SetCaption(arg) => set_caption(state, user_id, &arg),
    }
}

pub async fn handle_command(msg: Message, cmd: Command, state: Arc<BotState>) -> ResponseResult<()> {
    let Some(user) = msg.from.as_ref() else {
        return Ok(());
    };
    let user_id = user.id.0 as i64;
    let username = user.username.as_deref().unwrap_or(&user.first_name);
    info!("💬 {:?} from {} ({})", cmd, username, user_id);

    let reply = dispatch(&state, user_id, cmd).await;
    if let Err(e) = state.telegram.send_reply(msg.chat.id, &reply.text, reply.keyboard).await {
        warn!("Could not answer {}: {}", user_id, e);
    }
    Ok(())
}

pub async fn handle_callback(query: CallbackQuery, state: Arc<BotState>) -> ResponseResult<()> {
    let Some(data) = query.data.clone() else {
        state.telegram.answer_callback(&query, None).await;
        return Ok(());
    };
    let user_id = query.from.id.0 as i64;
    info!("🔘 Selection {:?} from {}", data, user_id);

    let (toast, reply) = match apply_selection(&state, user_id, &data) {
        Ok(reply) => ("✅ Saved", reply),
        Err(reply) => ("Not saved", reply),
    };
    state.telegram.answer_callback(&query, Some(toast)).await;

    let chat_id = query
        .message
        .as_ref()
        .map(|m| m.chat().id)
        .unwrap_or(ChatId(user_id));
    if let Err(e) = state.telegram.send_reply(chat_id, &reply.text, None).await {
        warn!("Could not confirm selection to {}: {}", user_id, e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::relay::telegram::TelegramClient;
    use teloxide::types::InlineKeyboardButtonKind;

    const ADMIN: i64 = 1;
    const OWNER: i64 = 42;

    fn state() -> BotState {
        let config = Config::from_json_str(
            r#"{
                "telegram_bot_token": "123456789:ABCdefGHIjklMNOpqrsTUVwxyz",
                "channel_id": "@mainchannel",
                "caption_prefix": "P ",
                "caption_suffix": " S",
                "auth_policy": "allow_list",
                "admin_ids": [1]
            }"#,
        )
        .unwrap();
        let telegram = Arc::new(TelegramClient::new(Bot::new("123456789:ABCdefGHIjklMNOpqrsTUVwxyz")));
        BotState::ephemeral(config, telegram).unwrap()
    }

    fn chat(id: i64, title: &str) -> ChatSummary {
        ChatSummary { id, title: Some(title.to_string()), username: None }
    }

    fn button_data(reply: &Reply, row: usize) -> String {
        let keyboard = reply.keyboard.as_ref().expect("keyboard");
        match &keyboard.inline_keyboard[row][0].kind {
            InlineKeyboardButtonKind::CallbackData(data) => data.clone(),
            other => panic!("unexpected button {other:?}"),
        }
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("/status", "captioner").unwrap(), Command::Status);
        assert_eq!(
            Command::parse("/setcaption Subscribe now", "captioner").unwrap(),
            Command::SetCaption("Subscribe now".to_string())
        );
        assert_eq!(
            Command::parse("/register @news", "captioner").unwrap(),
            Command::Register("@news".to_string())
        );
        assert!(Command::parse("/unknown", "captioner").is_err());
    }

    #[test]
    fn test_unescape_newlines() {
        assert_eq!(unescape_newlines("\\n\\n👉 @Chan"), "\n\n👉 @Chan");
        assert_eq!(unescape_newlines("plain"), "plain");
    }

    #[tokio::test]
    async fn test_set_prefix_requires_authorization() {
        let state = state();
        let reply = set_prefix(&state, 2, "X ").await;
        assert_eq!(reply.text, NOT_AUTHORIZED);
        assert_eq!(state.captions.current().prefix, "P ");

        let reply = set_prefix(&state, ADMIN, "X ").await;
        assert!(reply.text.starts_with("✅"), "{}", reply.text);
        assert_eq!(state.captions.current().prefix, "X ");
    }

    #[tokio::test]
    async fn test_set_suffix_unescapes_and_persists() {
        let state = state();
        set_suffix(&state, ADMIN, "\\n\\nfollow us").await;
        assert_eq!(state.captions.current().suffix, "\n\nfollow us");
        assert_eq!(
            state.settings.get::<String>(crate::relay::settings::SUFFIX_KEY, String::new()),
            "\n\nfollow us"
        );
    }

    #[tokio::test]
    async fn test_empty_argument_shows_usage() {
        let state = state();
        let reply = set_prefix(&state, ADMIN, "  ").await;
        assert!(reply.text.contains("/setprefix"));
        assert_eq!(state.captions.current().prefix, "P ");
    }

    #[tokio::test]
    async fn test_reset_caption_restores_defaults() {
        let state = state();
        set_prefix(&state, ADMIN, "X ").await;
        set_suffix(&state, ADMIN, " Y").await;

        assert_eq!(reset_caption(&state, 2).await.text, NOT_AUTHORIZED);
        assert_eq!(state.captions.current().prefix, "X ");

        let reply = reset_caption(&state, ADMIN).await;
        assert!(reply.text.starts_with("✅"));
        let current = state.captions.current();
        assert_eq!((current.prefix.as_str(), current.suffix.as_str()), ("P ", " S"));
    }

    #[test]
    fn test_status_escapes_html() {
        let state = state();
        state.captions.set_prefix("<b>");
        let reply = status(&state, OWNER);
        assert!(reply.text.contains("&lt;b&gt;"));
        assert!(reply.text.contains(env!("CARGO_PKG_VERSION")));
        assert!(reply.text.contains("allow list"));
    }

    #[test]
    fn test_register_and_duplicates() {
        let state = state();
        let reply = register_resolved(&state, OWNER, &chat(-1001, "News"));
        assert!(reply.text.contains("Registered News"), "{}", reply.text);

        let reply = register_resolved(&state, OWNER, &chat(-1001, "News"));
        assert!(reply.text.contains("already registered this channel"));

        let reply = register_resolved(&state, 7, &chat(-1001, "News"));
        assert!(reply.text.contains("another user"));
        assert_eq!(state.registry.list_channels(OWNER).len(), 1);
        assert!(state.registry.list_channels(7).is_empty());
    }

    #[tokio::test]
    async fn test_register_rejects_bad_identifier() {
        let state = state();
        let reply = register(&state, OWNER, "not a channel!").await;
        assert!(reply.text.starts_with("❌"));
        let reply = register(&state, OWNER, "").await;
        assert!(reply.text.contains("/register @mychannel"));
    }

    #[test]
    fn test_set_caption_single_channel() {
        let state = state();
        assert!(set_caption(&state, OWNER, "Subscribe!").text.contains("/register"));

        register_resolved(&state, OWNER, &chat(-1001, "News"));
        let reply = set_caption(&state, OWNER, "Subscribe!");
        assert!(reply.keyboard.is_none());
        assert_eq!(state.registry.resolve_caption("-1001").as_deref(), Some("Subscribe!"));
    }

    #[test]
    fn test_set_caption_too_long() {
        let state = state();
        register_resolved(&state, OWNER, &chat(-1001, "News"));
        let reply = set_caption(&state, OWNER, &"x".repeat(1025));
        assert!(reply.text.contains("at most 1024"));
        assert_eq!(state.registry.resolve_caption("-1001"), None);
    }

    #[test]
    fn test_set_caption_many_channels_offers_keyboard() {
        let state = state();
        register_resolved(&state, OWNER, &chat(-1001, "News"));
        register_resolved(&state, OWNER, &chat(-1002, "Sport"));

        let reply = set_caption(&state, OWNER, "Subscribe!");
        assert_eq!(reply.keyboard.as_ref().expect("keyboard").inline_keyboard.len(), 2);
        assert!(state.pending.is_empty());

        let data = button_data(&reply, 1);
        assert_eq!(data, "ci|-1002|Subscribe!");
        let reply = apply_selection(&state, OWNER, &data).unwrap();
        assert!(reply.text.starts_with("✅"));
        assert_eq!(state.registry.resolve_caption("-1002").as_deref(), Some("Subscribe!"));
        assert_eq!(state.registry.resolve_caption("-1001"), None);
    }

    #[test]
    fn test_long_caption_goes_through_pending() {
        let state = state();
        register_resolved(&state, OWNER, &chat(-1001, "News"));
        register_resolved(&state, OWNER, &chat(-1002, "Sport"));

        let caption = "a caption far too long to fit into the sixty four byte callback data";
        let reply = set_caption(&state, OWNER, caption);
        assert_eq!(state.pending.len(), 2);

        let data = button_data(&reply, 0);
        assert!(data.starts_with("cp|-1001|"), "{data}");
        assert!(apply_selection(&state, OWNER, &data).is_ok());
        assert_eq!(state.registry.resolve_caption("-1001").as_deref(), Some(caption));

        // Consumed on first use.
        let reply = apply_selection(&state, OWNER, &data).unwrap_err();
        assert!(reply.text.contains("expired"));
    }

    #[test]
    fn test_older_keyboard_cannot_claim_newer_caption() {
        let state = state();
        register_resolved(&state, OWNER, &chat(-1001, "News"));
        register_resolved(&state, OWNER, &chat(-1002, "Sport"));

        let first = "the first caption, long enough that it has to wait in the pending cache";
        let second = "the second caption, also long enough that it has to wait in the pending cache";
        let old_keyboard = set_caption(&state, OWNER, first);
        let new_keyboard = set_caption(&state, OWNER, second);

        let reply = apply_selection(&state, OWNER, &button_data(&old_keyboard, 0)).unwrap_err();
        assert!(reply.text.contains("replaced"));
        assert_eq!(state.registry.resolve_caption("-1001"), None);

        apply_selection(&state, OWNER, &button_data(&new_keyboard, 0)).unwrap();
        assert_eq!(state.registry.resolve_caption("-1001").as_deref(), Some(second));
    }

    #[test]
    fn test_selection_for_foreign_channel_is_refused() {
        let state = state();
        register_resolved(&state, OWNER, &chat(-1001, "News"));
        let data = Selection::for_caption("-1001", "mine now", || 0).encode();
        let reply = apply_selection(&state, 7, &data).unwrap_err();
        assert!(reply.text.contains("not registered to you"));
        assert!(apply_selection(&state, OWNER, "garbage").is_err());
    }

    #[tokio::test]
    async fn test_channels_and_remove() {
        let state = state();
        assert!(channels(&state, OWNER).text.contains("no registered channels"));

        register_resolved(&state, OWNER, &chat(-1001, "News"));
        set_caption(&state, OWNER, "Subscribe!");
        let listing = channels(&state, OWNER).text;
        assert!(listing.contains("News"));
        assert!(listing.contains("Subscribe!"));

        let reply = remove_channel(&state, OWNER, "-1001").await;
        assert!(reply.text.starts_with("✅"), "{}", reply.text);
        assert!(state.registry.list_channels(OWNER).is_empty());
        assert_eq!(state.registry.resolve_caption("-1001"), None);
    }

    #[tokio::test]
    async fn test_dispatch_routes_commands() {
        let state = state();
        assert!(dispatch(&state, OWNER, Command::Start).await.text.contains("Welcome"));
        assert!(dispatch(&state, OWNER, Command::Help).await.text.contains("/setcaption"));
    }
}
