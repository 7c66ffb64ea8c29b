//! Typed object facade: serialize → encrypt → store, and the reverse
//! on read, layered on [`BlobCache`] plus its shared request cache for
//! the `*OrFetch*` family.

use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{de::DeserializeOwned, Serialize};

use akavache_core::{CacheBackend, CacheError, Result, Serializer};

use crate::blob_cache::BlobCache;

/// Type tag stored alongside every object-layer entry: the fully
/// qualified Rust type name (there is no reflection in Rust, so
/// `std::any::type_name` is the closest analogue, stable within one
/// build, which is all the type-scoped enumeration/invalidation
/// contract needs).
fn type_tag<T: 'static>() -> String {
    std::any::type_name::<T>().to_string()
}

/// Typed facade over a [`BlobCache`]: insert/get/fetch/invalidate for
/// serializable values, plus the stream-returning
/// [`ObjectCache::get_and_fetch_latest`].
pub struct ObjectCache<B, S> {
    blob: Arc<BlobCache<B>>,
    serializer: Arc<S>,
}

impl<B, S> Clone for ObjectCache<B, S> {
    fn clone(&self) -> Self {
        Self {
            blob: self.blob.clone(),
            serializer: self.serializer.clone(),
        }
    }
}

impl<B: CacheBackend, S: Serializer> ObjectCache<B, S> {
    pub fn new(blob: BlobCache<B>, serializer: S) -> Self {
        Self::from_arc(Arc::new(blob), serializer)
    }

    pub fn from_arc(blob: Arc<BlobCache<B>>, serializer: S) -> Self {
        Self {
            blob,
            serializer: Arc::new(serializer),
        }
    }

    pub fn blob_cache(&self) -> &Arc<BlobCache<B>> {
        &self.blob
    }

    fn deserialize<T: DeserializeOwned>(&self, bytes: &Bytes) -> Result<T> {
        let mut value: T = self.serializer.deserialize(bytes)?;
        self.normalize(&mut value);
        Ok(value)
    }

    /// Hook point for the configured [`ForcedDateTimeKind`] policy.
    /// `Serializer::deserialize` already applies it internally (the
    /// wire-format-specific visitor is where the per-field rewrite
    /// happens); this is a no-op pass kept as the documented extension
    /// seam for a serializer whose format can't do the rewrite inline.
    fn normalize<T>(&self, _value: &mut T) {}

    pub async fn insert_object<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<()>
    where
        T: 'static,
    {
        let tag = type_tag::<T>();
        let bytes = self.serializer.serialize(value)?;
        self.blob.insert(key, Some(&tag), Bytes::from(bytes), expires_at).await
    }

    pub async fn insert_objects<T: Serialize + 'static>(
        &self,
        items: Vec<(String, T, Option<DateTime<Utc>>)>,
    ) -> Result<()> {
        let tag = type_tag::<T>();
        let mut encoded = Vec::with_capacity(items.len());
        for (key, value, expires_at) in &items {
            let bytes = self.serializer.serialize(value)?;
            encoded.push((key.clone(), Some(tag.clone()), Bytes::from(bytes), *expires_at));
        }
        self.blob.insert_bulk(encoded).await
    }

    pub async fn get_object<T: DeserializeOwned + 'static>(&self, key: &str) -> Result<T> {
        let tag = type_tag::<T>();
        let bytes = self.blob.get(key, Some(&tag)).await?;
        self.deserialize(&bytes)
    }

    pub async fn get_objects<T: DeserializeOwned + 'static>(&self, keys: &[String]) -> Result<Vec<(String, T)>> {
        let tag = type_tag::<T>();
        let pairs = self.blob.get_bulk(keys, Some(&tag)).await?;
        pairs
            .into_iter()
            .map(|(key, bytes)| Ok((key, self.deserialize(&bytes)?)))
            .collect()
    }

    pub async fn get_all_objects<T: DeserializeOwned + 'static>(&self) -> Result<Vec<T>> {
        let tag = type_tag::<T>();
        let keys = self.blob.get_all_keys(Some(&tag)).await?;
        let pairs = self.blob.get_bulk(&keys, Some(&tag)).await?;
        pairs.into_iter().map(|(_, bytes)| self.deserialize(&bytes)).collect()
    }

    /// On `KeyNotFound`, evaluates `factory` and inserts the result, but
    /// unlike [`ObjectCache::get_or_fetch_object`], does not register in
    /// the request cache: concurrent callers each run `factory`
    /// independently. A deliberate split between a coalesced and a
    /// non-coalesced "get or create".
    pub async fn get_or_create_object<T, F, Fut>(
        &self,
        key: &str,
        factory: F,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned + 'static,
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        match self.get_object::<T>(key).await {
            Ok(value) => Ok(value),
            Err(CacheError::NotFound(_)) => {
                let value = factory().await?;
                self.insert_object(key, &value, expires_at).await?;
                Ok(value)
            }
            Err(e) => Err(e),
        }
    }

    /// Routed through the shared request cache so concurrent callers
    /// for the same key share one execution of `fetch`.
    pub async fn get_or_fetch_object<T, F, Fut>(
        &self,
        key: &str,
        fetch: F,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Result<T>> + Send + 'static,
    {
        let tag = type_tag::<T>();
        let serializer = self.serializer.clone();
        let bytes = self
            .blob
            .get_or_fetch(key, Some(&tag), expires_at, move || async move {
                let value = fetch().await?;
                let encoded = serializer.serialize(&value)?;
                Ok(Bytes::from(encoded))
            })
            .await?;
        self.deserialize(&bytes)
    }

    /// Produces a lazy sequence of up to two values: the cached value
    /// (if present), then the freshly fetched value (if
    /// `fetch_predicate` (default always-true) allows it). Errors
    /// from the fetch stage are yielded after the cached value, following
    /// a `{Start → EmitCached? → EvaluatePredicate → Fetch → EmitFetched →
    /// Complete}` progression.
    pub fn get_and_fetch_latest<T, F, Fut, P>(
        &self,
        key: impl Into<String>,
        fetch: F,
        fetch_predicate: Option<P>,
        expires_at: Option<DateTime<Utc>>,
    ) -> impl Stream<Item = Result<T>> + Send + 'static
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Result<T>> + Send + 'static,
        P: Fn(DateTime<Utc>) -> bool + Send + 'static,
    {
        let key = key.into();
        let tag = type_tag::<T>();
        let blob = self.blob.clone();
        let serializer = self.serializer.clone();

        async_stream::stream! {
            let present = match blob.get(&key, Some(&tag)).await {
                Ok(bytes) => match serializer.deserialize::<T>(&bytes) {
                    Ok(value) => {
                        yield Ok(value);
                        true
                    }
                    Err(e) => {
                        yield Err(e);
                        true
                    }
                },
                Err(CacheError::NotFound(_)) => false,
                Err(e) => {
                    yield Err(e);
                    false
                }
            };

            let created_at = if present {
                blob.get_created_at(&key, Some(&tag)).await.ok().flatten()
            } else {
                None
            };

            let should_fetch = match (&fetch_predicate, created_at) {
                (Some(pred), Some(at)) => pred(at),
                (Some(_), None) => true,
                (None, _) => true,
            };

            if should_fetch {
                match fetch().await {
                    Ok(value) => {
                        if let Ok(encoded) = serializer.serialize(&value) {
                            let _ = blob.insert(&key, Some(&tag), Bytes::from(encoded), expires_at).await;
                        }
                        yield Ok(value);
                    }
                    Err(e) => yield Err(e),
                }
            }
        }
    }

    pub async fn invalidate_object<T: 'static>(&self, key: &str) -> Result<()> {
        let tag = type_tag::<T>();
        self.blob.invalidate(key, Some(&tag)).await
    }

    pub async fn invalidate_objects<T: 'static>(&self, keys: &[String]) -> Result<()> {
        let tag = type_tag::<T>();
        self.blob.invalidate_bulk(keys, Some(&tag)).await
    }

    pub async fn invalidate_all_objects<T: 'static>(&self) -> Result<()> {
        let tag = type_tag::<T>();
        self.blob.invalidate_all(Some(&tag)).await
    }
}
