//! [`BlobCache`]: encryption applied immediately around a
//! [`CacheBackend`], plus the blob-level slice of the request cache
//! (composite key with an empty type tag).

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};

use akavache_core::{CacheBackend, CacheEntry, CacheError, EncryptionProvider, NoopEncryptionProvider, Result};

use crate::request_cache::RequestCache;

/// Lifecycle of a [`BlobCache`]. `Opening` is observable only during
/// construction; callers only ever see `Ready`, `Draining`, or `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreState {
    Opening,
    Ready,
    Draining,
    Closed,
}

impl StoreState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => StoreState::Opening,
            1 => StoreState::Ready,
            2 => StoreState::Draining,
            _ => StoreState::Closed,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            StoreState::Opening => 0,
            StoreState::Ready => 1,
            StoreState::Draining => 2,
            StoreState::Closed => 3,
        }
    }
}

/// The persistent (or in-memory) blob store: a [`CacheBackend`] plus
/// transparent at-rest encryption and the blob-level request-coalescing
/// table. Every typed [`crate::object_cache::ObjectCache`] is built on
/// top of one of these.
pub struct BlobCache<B> {
    backend: Arc<B>,
    encryption: Arc<dyn EncryptionProvider>,
    request_cache: RequestCache<Bytes>,
    state: AtomicU8,
}

impl<B: CacheBackend> BlobCache<B> {
    pub fn new(backend: B) -> Self {
        Self::with_encryption(backend, Arc::new(NoopEncryptionProvider))
    }

    pub fn with_encryption(backend: B, encryption: Arc<dyn EncryptionProvider>) -> Self {
        Self {
            backend: Arc::new(backend),
            encryption,
            request_cache: RequestCache::default(),
            state: AtomicU8::new(StoreState::Ready.as_u8()),
        }
    }

    pub fn state(&self) -> StoreState {
        StoreState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn ensure_open(&self) -> Result<()> {
        match self.state() {
            StoreState::Closed => Err(CacheError::Disposed),
            _ => Ok(()),
        }
    }

    /// Backend handle, for callers (the typed facade) that need to
    /// reach primitives `BlobCache` doesn't expose directly.
    pub(crate) fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub(crate) fn request_cache(&self) -> &RequestCache<Bytes> {
        &self.request_cache
    }

    pub async fn insert(
        &self,
        key: &str,
        type_tag: Option<&str>,
        payload: Bytes,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        self.ensure_open()?;
        if key.is_empty() {
            return Err(CacheError::Argument("key must not be empty".into()));
        }
        let ciphertext = self.encryption.encrypt(&payload)?;
        let mut entry = CacheEntry::new(key, type_tag.map(str::to_string), Bytes::from(ciphertext));
        if let Some(at) = expires_at {
            entry.expires_at = at;
        }
        self.backend.insert(entry).await
    }

    pub async fn insert_bulk(
        &self,
        items: Vec<(String, Option<String>, Bytes, Option<DateTime<Utc>>)>,
    ) -> Result<()> {
        self.ensure_open()?;
        let mut entries = Vec::with_capacity(items.len());
        for (key, type_tag, payload, expires_at) in items {
            if key.is_empty() {
                return Err(CacheError::Argument("key must not be empty".into()));
            }
            let ciphertext = self.encryption.encrypt(&payload)?;
            let mut entry = CacheEntry::new(key, type_tag, Bytes::from(ciphertext));
            if let Some(at) = expires_at {
                entry.expires_at = at;
            }
            entries.push(entry);
        }
        self.backend.insert_bulk(entries).await
    }

    pub async fn get(&self, key: &str, type_tag: Option<&str>) -> Result<Bytes> {
        self.ensure_open()?;
        match self.backend.get(key, type_tag).await? {
            Some(entry) => Ok(Bytes::from(self.encryption.decrypt(&entry.payload)?)),
            None => Err(CacheError::NotFound(key.to_string())),
        }
    }

    pub async fn get_bulk(&self, keys: &[String], type_tag: Option<&str>) -> Result<Vec<(String, Bytes)>> {
        self.ensure_open()?;
        let entries = self.backend.get_bulk(keys, type_tag).await?;
        let mut out = Vec::new();
        for (key, entry) in keys.iter().zip(entries.into_iter()) {
            if let Some(entry) = entry {
                out.push((key.clone(), Bytes::from(self.encryption.decrypt(&entry.payload)?)));
            }
        }
        Ok(out)
    }

    pub async fn get_all_keys(&self, type_tag: Option<&str>) -> Result<Vec<String>> {
        self.ensure_open()?;
        self.backend.get_all_keys(type_tag).await
    }

    pub async fn get_all_keys_safe(&self, type_tag: Option<&str>) -> Vec<String> {
        if self.ensure_open().is_err() {
            return Vec::new();
        }
        self.backend.get_all_keys_safe(type_tag).await
    }

    pub async fn get_created_at(&self, key: &str, type_tag: Option<&str>) -> Result<Option<DateTime<Utc>>> {
        self.ensure_open()?;
        self.backend.get_created_at(key, type_tag).await
    }

    /// Removes the entry and, atomically with respect to any caller
    /// observing the change, the request cache's record of it. Without
    /// this, a concurrent caller could still observe the stale value
    /// replayed from the request cache after invalidation completes.
    pub async fn invalidate(&self, key: &str, type_tag: Option<&str>) -> Result<()> {
        self.ensure_open()?;
        let result = self.backend.invalidate(key, type_tag).await;
        self.request_cache.remove_requests_for_key(key);
        result
    }

    pub async fn invalidate_bulk(&self, keys: &[String], type_tag: Option<&str>) -> Result<()> {
        self.ensure_open()?;
        let result = self.backend.invalidate_bulk(keys, type_tag).await;
        for key in keys {
            self.request_cache.remove_requests_for_key(key);
        }
        result
    }

    pub async fn invalidate_all(&self, type_tag: Option<&str>) -> Result<()> {
        self.ensure_open()?;
        let result = self.backend.invalidate_all(type_tag).await;
        self.request_cache.remove_requests_for_type(type_tag);
        result
    }

    pub async fn vacuum(&self) -> Result<()> {
        self.ensure_open()?;
        self.backend.vacuum().await
    }

    pub async fn flush(&self, type_tag: Option<&str>) -> Result<()> {
        self.ensure_open()?;
        self.backend.flush(type_tag).await
    }

    /// Coalesced fetch of raw bytes: concurrent callers for the same
    /// `(type_tag, key)` share one execution of `fetch`, and the
    /// winner's result is inserted before being returned.
    pub async fn get_or_fetch<F, Fut>(
        &self,
        key: &str,
        type_tag: Option<&str>,
        expires_at: Option<DateTime<Utc>>,
        fetch: F,
    ) -> Result<Bytes>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Result<Bytes>> + Send + 'static,
    {
        self.ensure_open()?;
        match self.get(key, type_tag).await {
            Ok(bytes) => return Ok(bytes),
            Err(CacheError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }

        let key_owned = key.to_string();
        let type_owned = type_tag.map(str::to_string);
        let backend = self.backend.clone();
        let encryption = self.encryption.clone();

        self.request_cache
            .get_or_create_request(type_tag, key, move || async move {
                let payload = fetch().await?;
                let ciphertext = encryption.encrypt(&payload)?;
                let entry = CacheEntry::with_expiry(
                    key_owned,
                    type_owned,
                    Bytes::from(ciphertext),
                    expires_at.unwrap_or_else(akavache_core::never),
                );
                backend.insert(entry).await?;
                Ok(payload)
            })
            .await
    }

    /// Idempotent. Marks the store closed and drains pending writes by
    /// flushing the backend first; subsequent operations fail with
    /// [`CacheError::Disposed`].
    pub async fn dispose(&self) -> Result<()> {
        if self.state() == StoreState::Closed {
            return Ok(());
        }
        self.state.store(StoreState::Draining.as_u8(), Ordering::Release);
        tracing::debug!("draining store before dispose");
        let result = self.backend.flush(None).await;
        self.state.store(StoreState::Closed.as_u8(), Ordering::Release);
        result
    }
}
