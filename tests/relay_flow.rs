//! Integration tests for the caption relay through the public API.
//!
//! The `live` module talks to the real Bot API and needs:
//! 1. TEST_BOT_TOKEN for a bot that is an admin of the test channel
//! 2. TEST_CHANNEL_ID, the channel's numeric id or @username
//!
//! Run with: cargo test --features integ_test --test relay_flow

use captioner::relay::channel::ChannelRef;
use captioner::relay::registry::{Registry, RegistryError};
use captioner::relay::settings::{CaptionConfig, CaptionSettings, JsonFileBackend, SettingsStore};
use captioner::relay::{Mutation, append_caption, compute_new_text};
use std::sync::Arc;

fn defaults() -> CaptionSettings {
    CaptionSettings { prefix: "📢 ".to_string(), suffix: "\n\n👉 @YourChannelName".to_string() }
}

#[test]
fn test_settings_file_is_shared_between_stores() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("settings.json");

    let store = Arc::new(SettingsStore::new(JsonFileBackend::new(&path)));
    let captions = CaptionConfig::new(store, defaults());
    assert_eq!(captions.current(), defaults());
    assert!(captions.set_prefix(">> "));

    let reopened = CaptionConfig::new(Arc::new(SettingsStore::new(JsonFileBackend::new(&path))), defaults());
    assert_eq!(reopened.current().prefix, ">> ");
    assert_eq!(reopened.current().suffix, defaults().suffix);

    let raw = std::fs::read_to_string(&path).unwrap();
    let doc: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(doc["CUSTOM_CAPTION_PREFIX"], ">> ");
}

#[test]
fn test_registry_database_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("captioner.db");

    {
        let registry = Registry::open(&db).unwrap();
        registry.register_channel(42, "@news", Some("News")).unwrap();
        registry.set_caption(42, "@news", "Subscribe!").unwrap();
    }

    let registry = Registry::open(&db).unwrap();
    assert!(registry.is_registered(42, "@news"));
    assert_eq!(registry.resolve_for_post(-1009, Some("news")).as_deref(), Some("Subscribe!"));
    assert!(matches!(
        registry.register_channel(7, "@news", None),
        Err(RegistryError::ClaimedByOtherOwner { .. })
    ));
}

#[test]
fn test_caption_rules_from_the_outside() {
    let default = defaults();
    let wrapped = compute_new_text(Some("Hello"), &default.prefix, &default.suffix, None);
    assert_eq!(wrapped, Mutation::Rewrite("📢 Hello\n\n👉 @YourChannelName".to_string()));

    let again = compute_new_text(wrapped.into_text().as_deref(), &default.prefix, &default.suffix, None);
    assert_eq!(again, Mutation::AlreadyApplied);

    assert_eq!(append_caption(Some(""), "Subscribe!", None), Mutation::Rewrite("Subscribe!".to_string()));
}

#[test]
fn test_channel_references() {
    assert_eq!(ChannelRef::parse("https://t.me/News").unwrap(), ChannelRef::Username("news".to_string()));
    assert!(ChannelRef::parse("@x").is_err());
}

#[cfg(feature = "integ_test")]
mod live {
    use captioner::relay::TelegramClient;
    use captioner::relay::channel::ChannelRef;
    use teloxide::Bot;

    fn client_and_channel() -> Option<(TelegramClient, ChannelRef)> {
        let token = std::env::var("TEST_BOT_TOKEN").ok()?;
        let channel = std::env::var("TEST_CHANNEL_ID").ok()?;
        Some((TelegramClient::new(Bot::new(token)), ChannelRef::parse(&channel).ok()?))
    }

    #[tokio::test]
    async fn test_lookup_test_channel() {
        let Some((client, channel)) = client_and_channel() else {
            eprintln!("Skipping test: TEST_BOT_TOKEN / TEST_CHANNEL_ID not set");
            return;
        };

        let chat = client.lookup_chat(&channel).await.expect("lookup");
        assert!(chat.id < 0, "channel ids are negative, got {}", chat.id);
        assert!(channel.matches(chat.id, chat.username.as_deref()));
    }

    #[tokio::test]
    async fn test_bot_sees_channel_admins() {
        let Some((client, channel)) = client_and_channel() else {
            eprintln!("Skipping test: TEST_BOT_TOKEN / TEST_CHANNEL_ID not set");
            return;
        };

        let admins = client.chat_admin_ids(&channel).await.expect("admins");
        assert!(!admins.is_empty());
    }
}
