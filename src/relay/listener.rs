//! Channel posts in, caption edits out.

use std::sync::Arc;

use teloxide::prelude::*;
use tracing::{debug, info, warn};

use crate::relay::caption::{Mutation, TEXT_LIMIT, append_caption, compute_new_text};
use crate::relay::channel::ChannelRef;
use crate::relay::settings::CaptionSettings;
use crate::relay::state::BotState;

/// The editable part of a post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostBody {
    Text(String),
    /// Media post; empty when it was sent without a caption.
    Caption(String),
}

/// The fields of a channel post the relay cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelPost {
    pub chat_id: i64,
    pub username: Option<String>,
    pub title: Option<String>,
    pub message_id: i32,
    pub body: Option<PostBody>,
}

impl ChannelPost {
    pub fn from_message(msg: &Message) -> Self {
        let body = if let Some(text) = msg.text() {
            Some(PostBody::Text(text.to_string()))
        } else if can_carry_caption(msg) {
            Some(PostBody::Caption(msg.caption().unwrap_or("").to_string()))
        } else {
            None
        };

        Self {
            chat_id: msg.chat.id.0,
            username: msg.chat.username().map(str::to_string),
            title: msg.chat.title().map(str::to_string),
            message_id: msg.id.0,
            body,
        }
    }

    fn display_name(&self) -> String {
        match (&self.title, &self.username) {
            (Some(title), _) => title.clone(),
            (None, Some(username)) => format!("@{username}"),
            (None, None) => self.chat_id.to_string(),
        }
    }
}

fn can_carry_caption(msg: &Message) -> bool {
    msg.caption().is_some()
        || msg.photo().is_some()
        || msg.video().is_some()
        || msg.document().is_some()
        || msg.audio().is_some()
        || msg.animation().is_some()
        || msg.voice().is_some()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditKind {
    Text,
    Caption,
}

/// Which rule produced an edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewriteSource {
    /// Prefix/suffix on the configured channel.
    TargetChannel,
    /// Custom caption of a registered channel.
    RegisteredChannel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Edit { kind: EditKind, source: RewriteSource, text: String },
    /// Left alone: no content, already decorated or too long.
    Skipped(Mutation),
    /// Not a channel the bot manages.
    Unmanaged,
}

/// Decide what to do with a post. No I/O.
pub fn plan_edit(
    post: &ChannelPost,
    target: &ChannelRef,
    captions: &CaptionSettings,
    mapped_caption: Option<&str>,
    caption_limit: usize,
) -> Outcome {
    let (kind, original, limit) = match &post.body {
        Some(PostBody::Text(text)) => (EditKind::Text, Some(text.as_str()), TEXT_LIMIT),
        Some(PostBody::Caption(caption)) => (EditKind::Caption, Some(caption.as_str()), caption_limit),
        None => (EditKind::Caption, None, caption_limit),
    };

    let (source, mutation) = if target.matches(post.chat_id, post.username.as_deref()) {
        (
            RewriteSource::TargetChannel,
            compute_new_text(original, &captions.prefix, &captions.suffix, Some(limit)),
        )
    } else if let Some(custom) = mapped_caption {
        (RewriteSource::RegisteredChannel, append_caption(original, custom, Some(limit)))
    } else {
        return Outcome::Unmanaged;
    };

    match mutation {
        Mutation::Rewrite(text) => Outcome::Edit { kind, source, text },
        other => Outcome::Skipped(other),
    }
}

/// Handle one channel post end to end. Transport failures are logged and dropped.
pub async fn process_post(state: &BotState, post: &ChannelPost) -> Outcome {
    let is_target = state.config.channel.matches(post.chat_id, post.username.as_deref());
    let mapped = if is_target {
        None
    } else {
        state.registry.resolve_for_post(post.chat_id, post.username.as_deref())
    };

    let outcome = plan_edit(
        post,
        &state.config.channel,
        &state.captions.current(),
        mapped.as_deref(),
        state.config.caption_limit,
    );

    match &outcome {
        Outcome::Edit { kind, source, text } => {
            info!("📝 Rewriting post {} in {} ({:?})", post.message_id, post.display_name(), source);
            let parse_mode = state.config.edit_parse_mode;
            let result = match kind {
                EditKind::Text => {
                    state.telegram.edit_text(post.chat_id, post.message_id, text, parse_mode).await
                }
                EditKind::Caption => {
                    state.telegram.edit_caption(post.chat_id, post.message_id, text, parse_mode).await
                }
            };
            if let Err(e) = result {
                warn!("Dropping post {} in {}: {}", post.message_id, post.display_name(), e);
            }
        }
        Outcome::Skipped(Mutation::TooLong { length, limit }) => {
            warn!(
                "Post {} in {} would be {} chars (limit {}), leaving it alone",
                post.message_id,
                post.display_name(),
                length,
                limit
            );
        }
        Outcome::Skipped(reason) => {
            debug!("Post {} in {} skipped: {:?}", post.message_id, post.display_name(), reason);
        }
        Outcome::Unmanaged => {
            debug!("Ignoring post from unmanaged chat {}", post.chat_id);
        }
    }

    outcome
}

/// Dispatcher endpoint for `channel_post` and `edited_channel_post`.
pub async fn handle_channel_post(msg: Message, state: Arc<BotState>) -> ResponseResult<()> {
    let post = ChannelPost::from_message(&msg);
    process_post(&state, &post).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::caption::CAPTION_LIMIT;

    fn captions() -> CaptionSettings {
        CaptionSettings { prefix: "📢 ".to_string(), suffix: "\n\n👉 @Chan".to_string() }
    }

    fn post(chat_id: i64, username: Option<&str>, body: Option<PostBody>) -> ChannelPost {
        ChannelPost {
            chat_id,
            username: username.map(str::to_string),
            title: None,
            message_id: 7,
            body,
        }
    }

    #[test]
    fn test_target_text_post_is_wrapped() {
        let target = ChannelRef::Id(-100);
        let p = post(-100, None, Some(PostBody::Text("hello".to_string())));
        assert_eq!(
            plan_edit(&p, &target, &captions(), None, CAPTION_LIMIT),
            Outcome::Edit {
                kind: EditKind::Text,
                source: RewriteSource::TargetChannel,
                text: "📢 hello\n\n👉 @Chan".to_string(),
            }
        );
    }

    #[test]
    fn test_target_matched_by_username() {
        let target = ChannelRef::Username("chan".to_string());
        let p = post(-100, Some("Chan"), Some(PostBody::Caption(String::new())));
        assert_eq!(
            plan_edit(&p, &target, &captions(), None, CAPTION_LIMIT),
            Outcome::Edit {
                kind: EditKind::Caption,
                source: RewriteSource::TargetChannel,
                text: "📢 \n\n👉 @Chan".to_string(),
            }
        );
    }

    #[test]
    fn test_post_without_body_is_skipped() {
        let target = ChannelRef::Id(-100);
        let p = post(-100, None, None);
        assert_eq!(
            plan_edit(&p, &target, &captions(), None, CAPTION_LIMIT),
            Outcome::Skipped(Mutation::NoContent)
        );
    }

    #[test]
    fn test_edited_post_does_not_loop() {
        let target = ChannelRef::Id(-100);
        let p = post(-100, None, Some(PostBody::Text("📢 hello\n\n👉 @Chan".to_string())));
        assert_eq!(
            plan_edit(&p, &target, &captions(), None, CAPTION_LIMIT),
            Outcome::Skipped(Mutation::AlreadyApplied)
        );
    }

    #[test]
    fn test_text_posts_use_text_limit() {
        let target = ChannelRef::Id(-100);
        let p = post(-100, None, Some(PostBody::Text("t".repeat(2000))));
        assert!(matches!(
            plan_edit(&p, &target, &captions(), None, CAPTION_LIMIT),
            Outcome::Edit { kind: EditKind::Text, .. }
        ));
    }

    #[test]
    fn test_long_caption_is_not_truncated() {
        let target = ChannelRef::Id(-100);
        let p = post(-100, None, Some(PostBody::Caption("c".repeat(1020))));
        assert!(matches!(
            plan_edit(&p, &target, &captions(), None, CAPTION_LIMIT),
            Outcome::Skipped(Mutation::TooLong { limit: CAPTION_LIMIT, .. })
        ));
    }

    #[test]
    fn test_registered_channel_gets_appended_caption() {
        let target = ChannelRef::Id(-100);
        let p = post(-200, Some("news"), Some(PostBody::Caption("Breaking".to_string())));
        assert_eq!(
            plan_edit(&p, &target, &captions(), Some("Subscribe!"), CAPTION_LIMIT),
            Outcome::Edit {
                kind: EditKind::Caption,
                source: RewriteSource::RegisteredChannel,
                text: "Breaking\n\nSubscribe!".to_string(),
            }
        );
    }

    #[test]
    fn test_unknown_channel_is_unmanaged() {
        let target = ChannelRef::Id(-100);
        let p = post(-300, None, Some(PostBody::Text("hi".to_string())));
        assert_eq!(plan_edit(&p, &target, &captions(), None, CAPTION_LIMIT), Outcome::Unmanaged);
    }
}
