//! Telegram client using teloxide.

use teloxide::prelude::*;
use teloxide::types::{CallbackQuery, InlineKeyboardMarkup, MessageId, ParseMode};
use teloxide::{ApiError, RequestError};
use tracing::{debug, info, warn};

use crate::relay::channel::ChannelRef;

/// What the bot learns about a channel when it looks it up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatSummary {
    pub id: i64,
    pub title: Option<String>,
    pub username: Option<String>,
}

/// Thin wrapper over the Bot API calls the relay makes.
pub struct TelegramClient {
    bot: Bot,
}

impl TelegramClient {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    pub fn bot(&self) -> &Bot {
        &self.bot
    }

    /// Replace the text of a text post.
    pub async fn edit_text(
        &self,
        chat_id: i64,
        message_id: i32,
        text: &str,
        parse_mode: Option<ParseMode>,
    ) -> Result<(), String> {
        let mut request = self.bot.edit_message_text(ChatId(chat_id), MessageId(message_id), text);
        if let Some(mode) = parse_mode {
            request = request.parse_mode(mode);
        }

        match request.await {
            Ok(_) => {
                info!("✏️ Edited text of msg {} in chat {}", message_id, chat_id);
                Ok(())
            }
            Err(e) => not_modified_is_ok(e, "edit text"),
        }
    }

    /// Replace the caption of a media post.
    pub async fn edit_caption(
        &self,
        chat_id: i64,
        message_id: i32,
        caption: &str,
        parse_mode: Option<ParseMode>,
    ) -> Result<(), String> {
        let mut request = self
            .bot
            .edit_message_caption(ChatId(chat_id), MessageId(message_id))
            .caption(caption);
        if let Some(mode) = parse_mode {
            request = request.parse_mode(mode);
        }

        match request.await {
            Ok(_) => {
                info!("✏️ Edited caption of msg {} in chat {}", message_id, chat_id);
                Ok(())
            }
            Err(e) => not_modified_is_ok(e, "edit caption"),
        }
    }

    /// Send an HTML reply.
    pub async fn send_reply(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: Option<InlineKeyboardMarkup>,
    ) -> Result<(), String> {
        let mut request = self.bot.send_message(chat_id, text).parse_mode(ParseMode::Html);
        if let Some(markup) = keyboard {
            request = request.reply_markup(markup);
        }

        request.await.map(|_| ()).map_err(|e| {
            let msg = format!("Failed to send reply: {e}");
            warn!("{}", msg);
            msg
        })
    }

    /// Dismiss the spinner on an inline button, optionally with a toast.
    pub async fn answer_callback(&self, query: &CallbackQuery, text: Option<&str>) {
        let mut request = self.bot.answer_callback_query(query.id.clone());
        if let Some(text) = text {
            request = request.text(text);
        }
        if let Err(e) = request.await {
            warn!("Failed to answer callback query: {e}");
        }
    }

    /// Look a channel up to learn its numeric id and title.
    pub async fn lookup_chat(&self, channel: &ChannelRef) -> Result<ChatSummary, String> {
        info!("🔎 Looking up chat {}", channel);
        let chat = self.bot.get_chat(channel.clone()).await.map_err(|e| {
            let msg = format!("Failed to look up {channel}: {e}");
            warn!("{}", msg);
            msg
        })?;

        Ok(ChatSummary {
            id: chat.id.0,
            title: chat.title().map(str::to_string),
            username: chat.username().map(str::to_string),
        })
    }

    /// User ids of a chat's administrators (owner included).
    pub async fn chat_admin_ids(&self, channel: &ChannelRef) -> Result<Vec<i64>, String> {
        let admins = self
            .bot
            .get_chat_administrators(channel.clone())
            .await
            .map_err(|e| {
                let msg = format!("Failed to get admins of {channel}: {e}");
                warn!("{}", msg);
                msg
            })?;

        Ok(admins.iter().map(|m| m.user.id.0 as i64).collect())
    }

    pub async fn is_chat_admin(&self, channel: &ChannelRef, user_id: i64) -> Result<bool, String> {
        Ok(self.chat_admin_ids(channel).await?.contains(&user_id))
    }
}

/// Editing a post to identical content is a no-op, not a failure.
fn not_modified_is_ok(e: RequestError, action: &str) -> Result<(), String> {
    if matches!(e, RequestError::Api(ApiError::MessageNotModified)) {
        debug!("{action}: message not modified");
        return Ok(());
    }
    let msg = format!("Failed to {action}: {e}");
    warn!("{}", msg);
    Err(msg)
}

/// Parse the `edit_parse_mode` config value.
pub fn parse_mode_from_str(value: &str) -> Result<Option<ParseMode>, String> {
    match value.trim().to_lowercase().as_str() {
        "" | "none" | "plain" => Ok(None),
        "html" => Ok(Some(ParseMode::Html)),
        "markdownv2" | "markdown" => Ok(Some(ParseMode::MarkdownV2)),
        other => Err(format!("unknown parse mode '{other}' (expected html, markdownv2 or none)")),
    }
}
