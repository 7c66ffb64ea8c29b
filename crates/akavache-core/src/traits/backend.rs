//! Storage backend trait

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{CacheEntry, CacheError};

/// Core trait implemented by every blob storage backend (`MemoryBackend`,
/// `SqliteBackend`). Operations deal in already-serialized-and-encrypted
/// bytes, leaving serialization and encryption to the layers above.
#[async_trait]
pub trait CacheBackend: Send + Sync + 'static {
    /// Insert or overwrite `entry.key`. `expires_at` defaults to the
    /// never-expires sentinel when not set by the caller.
    async fn insert(&self, entry: CacheEntry) -> Result<(), CacheError>;

    /// Insert many entries as a single atomic unit: all succeed or the
    /// backend's visible state is unchanged.
    async fn insert_bulk(&self, entries: Vec<CacheEntry>) -> Result<(), CacheError>;

    /// Fetch `key`, scoped to `type_tag` when given. Returns `None` for a
    /// missing or expired key; callers distinguish "missing" from
    /// "errored" by checking the error variant.
    async fn get(&self, key: &str, type_tag: Option<&str>) -> Result<Option<CacheEntry>, CacheError>;

    /// Fetch several keys at once, scoped to `type_tag`. Result order
    /// matches `keys`; missing entries are `None`.
    async fn get_bulk(
        &self,
        keys: &[String],
        type_tag: Option<&str>,
    ) -> Result<Vec<Option<CacheEntry>>, CacheError>;

    /// List every live (non-expired) key, optionally scoped to `type_tag`.
    /// Enumeration failures surface as [`CacheError::Enumeration`] rather
    /// than a generic I/O error.
    async fn get_all_keys(&self, type_tag: Option<&str>) -> Result<Vec<String>, CacheError>;

    /// Same as [`CacheBackend::get_all_keys`] but never fails: backend
    /// errors are logged and downgraded to an empty list.
    async fn get_all_keys_safe(&self, type_tag: Option<&str>) -> Vec<String> {
        match self.get_all_keys(type_tag).await {
            Ok(keys) => keys,
            Err(err) => {
                tracing::warn!(error = %err, "get_all_keys failed; returning empty list");
                Vec::new()
            }
        }
    }

    /// Creation timestamp of `key`, or `None` if absent.
    async fn get_created_at(
        &self,
        key: &str,
        type_tag: Option<&str>,
    ) -> Result<Option<DateTime<Utc>>, CacheError>;

    /// Remove `key` if present. Idempotent: a missing key is not an error.
    async fn invalidate(&self, key: &str, type_tag: Option<&str>) -> Result<(), CacheError>;

    /// Remove every key in `keys`, scoped to `type_tag`, as one unit.
    async fn invalidate_bulk(&self, keys: &[String], type_tag: Option<&str>) -> Result<(), CacheError>;

    /// Remove every entry, optionally scoped to `type_tag`.
    async fn invalidate_all(&self, type_tag: Option<&str>) -> Result<(), CacheError>;

    /// Remove expired entries and compact storage where the backend
    /// supports it (a no-op reclaim step for backends without one).
    async fn vacuum(&self) -> Result<(), CacheError>;

    /// Durability barrier. A no-op for backends where every write is
    /// already durable by the time its future resolves.
    async fn flush(&self, type_tag: Option<&str>) -> Result<(), CacheError>;
}
