//! Callback data for the "which channel gets this caption?" keyboard.
//!
//! Telegram caps callback data at 64 bytes. Short captions travel inside the
//! button (`ci|<channel>|<caption>`); longer ones stay in
//! [`PendingSelections`](crate::relay::pending::PendingSelections) and the
//! button names the channel and the stash token (`cp|<channel>|<token>`).

/// Maximum callback data size accepted by the Bot API.
pub const CALLBACK_DATA_LIMIT: usize = 64;

const INLINE_TAG: &str = "ci";
const DEFERRED_TAG: &str = "cp";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Inline { channel_id: String, caption: String },
    Deferred { channel_id: String, token: u64 },
}

impl Selection {
    /// Inline if the payload fits. Otherwise `defer` parks the caption and
    /// returns the token the button will carry.
    pub fn for_caption(channel_id: &str, caption: &str, defer: impl FnOnce() -> u64) -> Self {
        let inline = Self::Inline { channel_id: channel_id.to_string(), caption: caption.to_string() };
        if inline.encode().len() <= CALLBACK_DATA_LIMIT {
            inline
        } else {
            Self::Deferred { channel_id: channel_id.to_string(), token: defer() }
        }
    }

    pub fn channel_id(&self) -> &str {
        match self {
            Self::Inline { channel_id, .. } | Self::Deferred { channel_id, .. } => channel_id,
        }
    }

    pub fn is_deferred(&self) -> bool {
        matches!(self, Self::Deferred { .. })
    }

    pub fn encode(&self) -> String {
        match self {
            Self::Inline { channel_id, caption } => format!("{INLINE_TAG}|{channel_id}|{caption}"),
            Self::Deferred { channel_id, token } => format!("{DEFERRED_TAG}|{channel_id}|{token}"),
        }
    }

    /// Channel ids never contain `|`; captions may.
    pub fn decode(data: &str) -> Option<Self> {
        let mut parts = data.splitn(3, '|');
        let tag = parts.next()?;
        let channel_id = parts.next().filter(|c| !c.is_empty())?.to_string();
        match tag {
            INLINE_TAG => Some(Self::Inline { channel_id, caption: parts.next()?.to_string() }),
            DEFERRED_TAG => Some(Self::Deferred { channel_id, token: parts.next()?.parse().ok()? }),
            _ => None,
        }
    }
}
