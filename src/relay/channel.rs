//! Channel identifiers: numeric chat ids or public `@username` handles.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use teloxide::types::{ChatId, Recipient};

static USERNAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^@?([A-Za-z][A-Za-z0-9_]{3,31})$").unwrap());

/// A channel as users and the config name it.
///
/// Usernames are stored lower-cased without the leading `@`; `Display`
/// puts it back, so the string form is what lands in the database.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChannelRef {
    Id(i64),
    Username(String),
}

impl ChannelRef {
    /// Parse `-1001234567890`, `@name`, `name` or a `t.me/name` link.
    pub fn parse(input: &str) -> Result<Self, String> {
        let input = input.trim();
        if input.is_empty() {
            return Err("channel identifier is empty".to_string());
        }

        if let Ok(id) = input.parse::<i64>() {
            return Ok(Self::Id(id));
        }

        let handle = input
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_start_matches("t.me/")
            .trim_end_matches('/');

        match USERNAME.captures(handle) {
            Some(caps) => Ok(Self::Username(caps[1].to_lowercase())),
            None => Err(format!("'{input}' is not a chat id or @username")),
        }
    }

    /// Does an inbound post from `chat_id` / `username` belong to this channel?
    pub fn matches(&self, chat_id: i64, username: Option<&str>) -> bool {
        match self {
            Self::Id(id) => *id == chat_id,
            Self::Username(name) => username
                .map(|u| u.trim_start_matches('@').eq_ignore_ascii_case(name))
                .unwrap_or(false),
        }
    }

    /// Storage keys an inbound post can be known under, most specific first.
    pub fn candidates(chat_id: i64, username: Option<&str>) -> Vec<String> {
        let mut keys = vec![chat_id.to_string()];
        if let Some(name) = username {
            keys.push(format!("@{}", name.trim_start_matches('@').to_lowercase()));
        }
        keys
    }
}

impl fmt::Display for ChannelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Username(name) => write!(f, "@{name}"),
        }
    }
}

impl From<ChannelRef> for Recipient {
    fn from(channel: ChannelRef) -> Self {
        match channel {
            ChannelRef::Id(id) => Recipient::Id(ChatId(id)),
            ChannelRef::Username(name) => Recipient::ChannelUsername(format!("@{name}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_numeric_id() {
        assert_eq!(ChannelRef::parse("-1001234567890").unwrap(), ChannelRef::Id(-1001234567890));
    }

    #[test]
    fn test_parse_username_forms() {
        let expected = ChannelRef::Username("newsroom".to_string());
        assert_eq!(ChannelRef::parse("@NewsRoom").unwrap(), expected);
        assert_eq!(ChannelRef::parse("newsroom").unwrap(), expected);
        assert_eq!(ChannelRef::parse("https://t.me/newsroom").unwrap(), expected);
        assert_eq!(ChannelRef::parse("  @newsroom ").unwrap(), expected);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(ChannelRef::parse("").is_err());
        assert!(ChannelRef::parse("@ab").is_err());
        assert!(ChannelRef::parse("@has space").is_err());
        assert!(ChannelRef::parse("@9starts_with_digit").is_err());
    }

    #[test]
    fn test_display_round_trips() {
        assert_eq!(ChannelRef::Id(-100).to_string(), "-100");
        assert_eq!(ChannelRef::Username("news".to_string()).to_string(), "@news");
        assert_eq!(ChannelRef::parse("@News").unwrap().to_string(), "@news");
    }

    #[test]
    fn test_matches() {
        let by_id = ChannelRef::Id(-42);
        assert!(by_id.matches(-42, None));
        assert!(!by_id.matches(-43, Some("whatever")));

        let by_name = ChannelRef::Username("news".to_string());
        assert!(by_name.matches(-1, Some("News")));
        assert!(by_name.matches(-1, Some("@news")));
        assert!(!by_name.matches(-1, None));
        assert!(!by_name.matches(-1, Some("newsroom")));
    }

    #[test]
    fn test_candidates() {
        assert_eq!(ChannelRef::candidates(-5, None), vec!["-5".to_string()]);
        assert_eq!(
            ChannelRef::candidates(-5, Some("News")),
            vec!["-5".to_string(), "@news".to_string()]
        );
    }
}
