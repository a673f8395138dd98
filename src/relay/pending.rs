//! Captions waiting for the user to pick a channel.
//!
//! Used when a caption is too long to ride along in the inline keyboard's
//! callback data. Entries are bounded in number, expire after one
//! interactive session and are gone after a restart.

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use lru::LruCache;
use tracing::debug;

const DEFAULT_CAPACITY: usize = 256;

struct PendingCaption {
    caption: String,
    token: u64,
    stashed_at: Instant,
}

pub struct PendingSelections {
    entries: Mutex<LruCache<(i64, String), PendingCaption>>,
    ttl: Duration,
    next_token: AtomicU64,
}

impl PendingSelections {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let cap = NonZeroUsize::new(capacity)
            .or(NonZeroUsize::new(DEFAULT_CAPACITY))
            .unwrap_or(NonZeroUsize::MIN);
        Self { entries: Mutex::new(LruCache::new(cap)), ttl, next_token: AtomicU64::new(1) }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Park `caption` until `user_id` picks `channel_id`.
    ///
    /// Replaces any earlier one; the returned token identifies this stash so a
    /// button from an older keyboard cannot claim the newer caption.
    pub fn stash(&self, user_id: i64, channel_id: &str, caption: &str) -> u64 {
        self.stash_at(user_id, channel_id, caption, Instant::now())
    }

    fn stash_at(&self, user_id: i64, channel_id: &str, caption: &str, now: Instant) -> u64 {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.put(
            (user_id, channel_id.to_string()),
            PendingCaption { caption: caption.to_string(), token, stashed_at: now },
        );
        token
    }

    /// Consume the pending caption stashed under `token`.
    ///
    /// Expired entries are dropped and yield `None`. A stale token yields
    /// `None` and leaves the newer entry in place.
    pub fn take(&self, user_id: i64, channel_id: &str, token: u64) -> Option<String> {
        self.take_at(user_id, channel_id, token, Instant::now())
    }

    fn take_at(&self, user_id: i64, channel_id: &str, token: u64, now: Instant) -> Option<String> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let key = (user_id, channel_id.to_string());
        if entries.peek(&key)?.token != token {
            debug!("Pending caption for user {} / {} was superseded", user_id, channel_id);
            return None;
        }
        let entry = entries.pop(&key)?;
        if now.duration_since(entry.stashed_at) > self.ttl {
            debug!("Pending caption for user {} / {} expired", user_id, channel_id);
            return None;
        }
        Some(entry.caption)
    }

    /// Drop every expired entry, returning how many went.
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Instant::now())
    }

    fn purge_expired_at(&self, now: Instant) -> usize {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let expired: Vec<(i64, String)> = entries
            .iter()
            .filter(|(_, entry)| now.duration_since(entry.stashed_at) > self.ttl)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            entries.pop(key);
        }
        expired.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
