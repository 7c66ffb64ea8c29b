//! Cache entry type

use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::ticks;

/// A single row of the blob cache: a key, an optional type discriminator,
/// the (already serialized and possibly encrypted) payload, and the two
/// timestamps every backend persists.
///
/// `type_tag` lets two unrelated callers share the bare string `key`
/// without colliding. `CacheEntry` is the thing both `MemoryBackend`
/// and `SqliteBackend` store, keyed by `(type_tag, key)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub key: String,
    pub type_tag: Option<String>,
    pub payload: Bytes,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Construct an entry that never expires.
    pub fn new(key: impl Into<String>, type_tag: Option<String>, payload: impl Into<Bytes>) -> Self {
        let now = Utc::now();
        Self {
            key: key.into(),
            type_tag,
            payload: payload.into(),
            created_at: now,
            expires_at: ticks::never(),
        }
    }

    /// Construct an entry expiring at `expires_at`.
    pub fn with_expiry(
        key: impl Into<String>,
        type_tag: Option<String>,
        payload: impl Into<Bytes>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            key: key.into(),
            type_tag,
            payload: payload.into(),
            created_at: Utc::now(),
            expires_at,
        }
    }

    /// Whether this entry is expired as of `now`. `expires_at` equal to
    /// the never-sentinel is always in the future relative to any `now`
    /// chrono can represent, so this needs no special case.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn entry_without_expiry_never_expires() {
        let entry = CacheEntry::new("k", None, Bytes::from_static(b"v"));
        assert!(!entry.is_expired(Utc::now() + Duration::days(365 * 200)));
    }

    #[test]
    fn entry_with_past_expiry_is_expired() {
        let entry = CacheEntry::with_expiry(
            "k",
            Some("Widget".to_string()),
            Bytes::from_static(b"v"),
            Utc::now() - Duration::seconds(1),
        );
        assert!(entry.is_expired(Utc::now()));
    }

    #[test]
    fn entry_with_future_expiry_is_not_expired() {
        let entry = CacheEntry::with_expiry(
            "k",
            None,
            Bytes::from_static(b"v"),
            Utc::now() + Duration::seconds(60),
        );
        assert!(!entry.is_expired(Utc::now()));
    }
}
