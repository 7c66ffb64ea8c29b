//! In-memory cache backend using DashMap

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use akavache_core::{CacheBackend, CacheEntry, CacheError};

/// Configuration for the memory backend.
#[derive(Debug, Clone, Default)]
pub struct MemoryConfig {
    /// Initial capacity hint for the underlying map.
    pub initial_capacity: usize,
}

impl MemoryConfig {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            initial_capacity: capacity,
        }
    }
}

/// In-memory [`CacheBackend`]. Cloning creates a new handle to the same
/// underlying store (the map lives behind an `Arc`).
///
/// Keyed by the bare `key` alone, matching the SQLite backend's single
/// `PRIMARY KEY(Key)` schema for bit-compatible semantics across
/// backends: `type_tag` is carried on the stored [`CacheEntry`] purely
/// as a filter for the `*(type?)` family of operations, not as part of
/// the row's identity: a second `insert` under a different `type_tag`
/// for the same key still overwrites the first.
///
/// Expiration is lazy: entries are checked against `now` on read, and
/// [`CacheBackend::vacuum`] actively sweeps every expired entry out.
#[derive(Clone)]
pub struct MemoryBackend {
    data: Arc<DashMap<String, CacheEntry>>,
}

impl MemoryBackend {
    pub fn new(config: MemoryConfig) -> Self {
        Self {
            data: Arc::new(DashMap::with_capacity(config.initial_capacity)),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(MemoryConfig::default())
    }

    fn matches_type(entry: &CacheEntry, type_tag: Option<&str>) -> bool {
        match type_tag {
            Some(tag) => entry.type_tag.as_deref() == Some(tag),
            None => true,
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn insert(&self, entry: CacheEntry) -> Result<(), CacheError> {
        self.data.insert(entry.key.clone(), entry);
        Ok(())
    }

    async fn insert_bulk(&self, entries: Vec<CacheEntry>) -> Result<(), CacheError> {
        // DashMap has no cross-key transaction; a pure in-memory map never
        // partially fails, so "all succeed or all roll back" holds trivially.
        for entry in entries {
            self.insert(entry).await?;
        }
        Ok(())
    }

    async fn get(&self, key: &str, type_tag: Option<&str>) -> Result<Option<CacheEntry>, CacheError> {
        let now = Utc::now();
        match self.data.get(key) {
            Some(entry) if !Self::matches_type(&entry, type_tag) => Ok(None),
            Some(entry) if entry.is_expired(now) => {
                drop(entry);
                self.data.remove(key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.clone())),
            None => Ok(None),
        }
    }

    async fn get_bulk(
        &self,
        keys: &[String],
        type_tag: Option<&str>,
    ) -> Result<Vec<Option<CacheEntry>>, CacheError> {
        let mut results = Vec::with_capacity(keys.len());
        for key in keys {
            results.push(self.get(key, type_tag).await?);
        }
        Ok(results)
    }

    async fn get_all_keys(&self, type_tag: Option<&str>) -> Result<Vec<String>, CacheError> {
        let now = Utc::now();
        Ok(self
            .data
            .iter()
            .filter(|entry| Self::matches_type(entry.value(), type_tag) && !entry.value().is_expired(now))
            .map(|entry| entry.key().clone())
            .collect())
    }

    async fn get_created_at(
        &self,
        key: &str,
        type_tag: Option<&str>,
    ) -> Result<Option<DateTime<Utc>>, CacheError> {
        Ok(self
            .data
            .get(key)
            .filter(|entry| Self::matches_type(entry, type_tag))
            .map(|entry| entry.created_at))
    }

    async fn invalidate(&self, key: &str, type_tag: Option<&str>) -> Result<(), CacheError> {
        self.data.remove_if(key, |_, entry| Self::matches_type(entry, type_tag));
        Ok(())
    }

    async fn invalidate_bulk(&self, keys: &[String], type_tag: Option<&str>) -> Result<(), CacheError> {
        for key in keys {
            self.data.remove_if(key, |_, entry| Self::matches_type(entry, type_tag));
        }
        Ok(())
    }

    async fn invalidate_all(&self, type_tag: Option<&str>) -> Result<(), CacheError> {
        match type_tag {
            Some(tag) => {
                self.data.retain(|_, entry| entry.type_tag.as_deref() != Some(tag));
            }
            None => self.data.clear(),
        }
        Ok(())
    }

    async fn vacuum(&self) -> Result<(), CacheError> {
        let now = Utc::now();
        self.data.retain(|_, entry| !entry.is_expired(now));
        Ok(())
    }

    async fn flush(&self, _type_tag: Option<&str>) -> Result<(), CacheError> {
        // Every write above is already visible in `data` by the time its
        // future resolves; there is nothing to durably flush.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use chrono::Duration as ChronoDuration;

    fn entry(key: &str, type_tag: Option<&str>, payload: &[u8]) -> CacheEntry {
        CacheEntry::new(key, type_tag.map(str::to_string), Bytes::copy_from_slice(payload))
    }

    #[tokio::test]
    async fn insert_and_get_roundtrip() {
        let backend = MemoryBackend::with_defaults();
        backend.insert(entry("k", None, b"v1")).await.unwrap();

        let got = backend.get("k", None).await.unwrap().unwrap();
        assert_eq!(got.payload, Bytes::from_static(b"v1"));
    }

    #[tokio::test]
    async fn get_scoped_to_wrong_type_misses() {
        let backend = MemoryBackend::with_defaults();
        backend.insert(entry("k", Some("A"), b"a")).await.unwrap();

        assert!(backend.get("k", Some("B")).await.unwrap().is_none());
        assert!(backend.get("k", Some("A")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn second_insert_under_different_type_overwrites() {
        let backend = MemoryBackend::with_defaults();
        backend.insert(entry("k", Some("A"), b"a")).await.unwrap();
        backend.insert(entry("k", Some("B"), b"b")).await.unwrap();

        let got = backend.get("k", Some("B")).await.unwrap().unwrap();
        assert_eq!(got.payload, Bytes::from_static(b"b"));
        assert!(backend.get("k", Some("A")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_entry_reads_as_missing() {
        let backend = MemoryBackend::with_defaults();
        let mut e = entry("k", None, b"v");
        e.expires_at = Utc::now() - ChronoDuration::seconds(1);
        backend.insert(e).await.unwrap();

        assert!(backend.get("k", None).await.unwrap().is_none());
        assert!(backend.get_all_keys(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn invalidate_is_idempotent() {
        let backend = MemoryBackend::with_defaults();
        backend.invalidate("missing", None).await.unwrap();
    }

    #[tokio::test]
    async fn per_key_fifo_last_write_wins() {
        let backend = MemoryBackend::with_defaults();
        backend.insert(entry("k", None, b"a")).await.unwrap();
        backend.insert(entry("k", None, b"b")).await.unwrap();

        let got = backend.get("k", None).await.unwrap().unwrap();
        assert_eq!(got.payload, Bytes::from_static(b"b"));
    }

    #[tokio::test]
    async fn vacuum_removes_only_expired() {
        let backend = MemoryBackend::with_defaults();
        let mut expired = entry("expired", None, b"x");
        expired.expires_at = Utc::now() - ChronoDuration::seconds(1);
        backend.insert(expired).await.unwrap();
        backend.insert(entry("live", None, b"y")).await.unwrap();

        backend.vacuum().await.unwrap();

        let keys = backend.get_all_keys(None).await.unwrap();
        assert_eq!(keys, vec!["live".to_string()]);
    }

    #[tokio::test]
    async fn invalidate_under_wrong_type_tag_is_a_no_op() {
        let backend = MemoryBackend::with_defaults();
        backend.insert(entry("k", Some("A"), b"a")).await.unwrap();

        backend.invalidate("k", Some("B")).await.unwrap();

        assert!(backend.get("k", Some("A")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn invalidate_bulk_under_wrong_type_tag_is_a_no_op() {
        let backend = MemoryBackend::with_defaults();
        backend.insert(entry("k", Some("A"), b"a")).await.unwrap();

        backend.invalidate_bulk(&["k".to_string()], Some("B")).await.unwrap();

        assert!(backend.get("k", Some("A")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn invalidate_all_scoped_to_type() {
        let backend = MemoryBackend::with_defaults();
        backend.insert(entry("k1", Some("A"), b"a")).await.unwrap();
        backend.insert(entry("k2", Some("B"), b"b")).await.unwrap();

        backend.invalidate_all(Some("A")).await.unwrap();

        assert!(backend.get("k1", Some("A")).await.unwrap().is_none());
        assert!(backend.get("k2", Some("B")).await.unwrap().is_some());
    }
}
