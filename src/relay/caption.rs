//! Caption mutation: decides whether a channel post gets rewritten and to what.
//!
//! Everything here is plain string concatenation. No escaping is done, so
//! whatever markup the original text carried reaches the edit call as-is.
//!
//! The prefix check is what stops the bot from feeding on itself: editing a
//! post fires an `edited_channel_post` update, and that update must come
//! back as [`Mutation::AlreadyApplied`].

/// Platform ceiling for media captions.
pub const CAPTION_LIMIT: usize = 1024;

/// Platform ceiling for plain text messages.
pub const TEXT_LIMIT: usize = 4096;

/// Separator between a post and an appended channel caption.
pub const APPEND_SEPARATOR: &str = "\n\n";

/// Outcome of a rewrite decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Edit the post to this text.
    Rewrite(String),
    /// The post has neither text nor a caption slot.
    NoContent,
    /// The decoration is already there (or there is nothing to add).
    AlreadyApplied,
    /// The rewritten text would exceed the ceiling; nothing is edited.
    TooLong { length: usize, limit: usize },
}

impl Mutation {
    /// The new text, or `None` when the post must be left alone.
    pub fn into_text(self) -> Option<String> {
        match self {
            Self::Rewrite(text) => Some(text),
            _ => None,
        }
    }

    pub fn is_rewrite(&self) -> bool {
        matches!(self, Self::Rewrite(_))
    }
}

/// Wrap `original` in `prefix` and `suffix`.
///
/// `Some("")` is a captionable post without a caption and still gets the
/// decoration. With an empty prefix the guard falls back to the suffix,
/// and with both empty there is nothing to do.
pub fn compute_new_text(
    original: Option<&str>,
    prefix: &str,
    suffix: &str,
    limit: Option<usize>,
) -> Mutation {
    let Some(original) = original else {
        return Mutation::NoContent;
    };

    let already_applied = if !prefix.is_empty() {
        original.starts_with(prefix)
    } else if !suffix.is_empty() {
        original.ends_with(suffix)
    } else {
        true
    };
    if already_applied {
        return Mutation::AlreadyApplied;
    }

    let mut text = String::with_capacity(prefix.len() + original.len() + suffix.len());
    text.push_str(prefix);
    text.push_str(original);
    text.push_str(suffix);
    check_limit(text, limit)
}

/// Append a channel's custom caption below the post, separated by a blank line.
pub fn append_caption(original: Option<&str>, custom: &str, limit: Option<usize>) -> Mutation {
    let Some(original) = original else {
        return Mutation::NoContent;
    };
    if custom.is_empty() || original.ends_with(custom) {
        return Mutation::AlreadyApplied;
    }

    let text = if original.is_empty() {
        custom.to_string()
    } else {
        format!("{original}{APPEND_SEPARATOR}{custom}")
    };
    check_limit(text, limit)
}

/// Length as the platform counts it (characters, not bytes).
pub fn text_length(text: &str) -> usize {
    text.chars().count()
}

fn check_limit(text: String, limit: Option<usize>) -> Mutation {
    match limit {
        Some(limit) => {
            let length = text_length(&text);
            if length > limit {
                Mutation::TooLong { length, limit }
            } else {
                Mutation::Rewrite(text)
            }
        }
        None => Mutation::Rewrite(text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PREFIX: &str = "📢 ";
    const SUFFIX: &str = "\n\n👉 @Chan";

    #[test]
    fn test_wraps_unprefixed_text() {
        for original in ["hello", "multi\nline", "<b>bold</b> & *stars*", "👋"] {
            let result = compute_new_text(Some(original), PREFIX, SUFFIX, None);
            assert_eq!(result, Mutation::Rewrite(format!("{PREFIX}{original}{SUFFIX}")));
        }
    }

    #[test]
    fn test_no_content() {
        assert_eq!(compute_new_text(None, PREFIX, SUFFIX, Some(CAPTION_LIMIT)), Mutation::NoContent);
        assert_eq!(compute_new_text(None, PREFIX, SUFFIX, None).into_text(), None);
    }

    #[test]
    fn test_empty_original_still_decorated() {
        let result = compute_new_text(Some(""), PREFIX, SUFFIX, Some(CAPTION_LIMIT));
        assert_eq!(result.into_text().as_deref(), Some("📢 \n\n👉 @Chan"));
    }

    #[test]
    fn test_already_prefixed_is_skipped() {
        let result = compute_new_text(Some("📢 already done"), PREFIX, SUFFIX, None);
        assert_eq!(result, Mutation::AlreadyApplied);
    }

    #[test]
    fn test_second_application_is_noop() {
        let cases = [
            ("", "📢 ", "\n\n👉 @Chan"),
            ("news", "[A] ", ""),
            ("news", "", " — via @chan"),
            ("news", "", ""),
            ("[A] nested", "[A] ", "!"),
        ];
        for (original, prefix, suffix) in cases {
            let first = compute_new_text(Some(original), prefix, suffix, None).into_text();
            let second = compute_new_text(first.as_deref(), prefix, suffix, None);
            assert!(!second.is_rewrite(), "double application for {original:?}/{prefix:?}/{suffix:?}");
        }
    }

    #[test]
    fn test_empty_prefix_guards_on_suffix() {
        let result = compute_new_text(Some("post"), "", "\n#tag", None);
        assert_eq!(result, Mutation::Rewrite("post\n#tag".to_string()));
        assert_eq!(compute_new_text(Some("post\n#tag"), "", "\n#tag", None), Mutation::AlreadyApplied);
    }

    #[test]
    fn test_length_ceiling_blocks_edit() {
        let original = "x".repeat(1020);
        let result = compute_new_text(Some(&original), PREFIX, SUFFIX, Some(CAPTION_LIMIT));
        let expected_len = text_length(PREFIX) + 1020 + text_length(SUFFIX);
        assert_eq!(result, Mutation::TooLong { length: expected_len, limit: CAPTION_LIMIT });
        assert_eq!(result.into_text(), None);
    }

    #[test]
    fn test_length_ceiling_counts_chars_not_bytes() {
        // 1000 four-byte emoji: 4000 bytes but only 1000 characters.
        let original = "😀".repeat(1000);
        let result = compute_new_text(Some(&original), "> ", "", Some(CAPTION_LIMIT));
        assert!(result.is_rewrite());
    }

    #[test]
    fn test_exactly_at_limit_is_allowed() {
        let original = "y".repeat(CAPTION_LIMIT - 2);
        let result = compute_new_text(Some(&original), "[", "]", Some(CAPTION_LIMIT));
        assert_eq!(result.into_text().map(|t| text_length(&t)), Some(CAPTION_LIMIT));
    }

    #[test]
    fn test_append_caption() {
        assert_eq!(
            append_caption(Some("Breaking"), "Subscribe!", Some(CAPTION_LIMIT)),
            Mutation::Rewrite("Breaking\n\nSubscribe!".to_string())
        );
        assert_eq!(
            append_caption(Some(""), "Subscribe!", None),
            Mutation::Rewrite("Subscribe!".to_string())
        );
        assert_eq!(append_caption(None, "Subscribe!", None), Mutation::NoContent);
        assert_eq!(append_caption(Some("x"), "", None), Mutation::AlreadyApplied);
    }

    #[test]
    fn test_append_caption_is_idempotent() {
        let first = append_caption(Some("Breaking"), "Subscribe!", None).into_text();
        assert_eq!(append_caption(first.as_deref(), "Subscribe!", None), Mutation::AlreadyApplied);
    }

    #[test]
    fn test_append_caption_respects_limit() {
        let original = "z".repeat(1020);
        let result = append_caption(Some(&original), "Subscribe!", Some(CAPTION_LIMIT));
        assert!(matches!(result, Mutation::TooLong { limit: CAPTION_LIMIT, .. }));
    }
}
