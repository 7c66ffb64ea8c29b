//! In-memory request coalescing layer
//!
//! Generalizes a `DashMap<String, broadcast::Sender<...>>` coalescer to a
//! composite `(type_tag, cache_key)` key, with an LRU bound on completed
//! entries and suffix-based eviction for invalidation.

use std::sync::Arc;

use akavache_core::{CacheError, Result};
use lru::LruCache;
use parking_lot::Mutex;
use tokio::sync::broadcast;

/// Entries are joined on a NUL byte rather than `:`: composing keys
/// with a colon would let two different `(type_tag, key)` pairs (e.g.
/// `("a:b", "c")` and `("a", "b:c")`) both format to `"a:b:c"`. A byte
/// no valid type tag or key contains can't collide like that.
fn composite(type_tag: Option<&str>, cache_key: &str) -> String {
    format!("{}\u{0}{}", type_tag.unwrap_or(""), cache_key)
}

/// Minimum number of completed (non-evicted-on-error) entries the LRU
/// retains, per the request-cache contract.
const MIN_LRU_CAPACITY: usize = 20;

type Sink<T> = broadcast::Sender<Result<T>>;

/// Coalesces concurrent callers of `get_or_create_request` for the same
/// composite key into a single in-flight execution, and replays the
/// completed result to late subscribers via an LRU-bounded history.
///
/// `T` must be `Clone` because a `broadcast` channel clones the value to
/// every subscriber, and the LRU replay path clones it again for joiners
/// that show up after completion.
pub struct RequestCache<T: Clone + Send + Sync + 'static> {
    inflight: Arc<dashmap::DashMap<String, Sink<T>>>,
    completed: Arc<Mutex<LruCache<String, Result<T>>>>,
}

impl<T: Clone + Send + Sync + 'static> Default for RequestCache<T> {
    fn default() -> Self {
        Self::new(MIN_LRU_CAPACITY)
    }
}

impl<T: Clone + Send + Sync + 'static> RequestCache<T> {
    pub fn new(lru_capacity: usize) -> Self {
        let capacity = lru_capacity.max(MIN_LRU_CAPACITY);
        Self {
            inflight: Arc::new(dashmap::DashMap::new()),
            completed: Arc::new(Mutex::new(LruCache::new(
                std::num::NonZeroUsize::new(capacity).expect("capacity is non-zero"),
            ))),
        }
    }

    /// If an entry exists for `(type_tag, cache_key)`, in flight or
    /// completed, return its shared result. Otherwise run `factory` as
    /// the leader, broadcasting its result to anyone who joins before it
    /// finishes and caching it for anyone who arrives after.
    ///
    /// The leader's `factory` runs on its own spawned task rather than
    /// inline in the caller's future: if this call is itself raced
    /// against a timeout (or otherwise dropped) and loses, dropping this
    /// future must not cancel work every other subscriber is waiting on.
    pub async fn get_or_create_request<F, Fut>(
        &self,
        type_tag: Option<&str>,
        cache_key: &str,
        factory: F,
    ) -> Result<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Result<T>> + Send + 'static,
    {
        let key = composite(type_tag, cache_key);

        if let Some(cached) = self.completed.lock().get(&key).cloned() {
            return cached;
        }

        let action = match self.inflight.entry(key.clone()) {
            dashmap::mapref::entry::Entry::Occupied(o) => Ok(o.get().subscribe()),
            dashmap::mapref::entry::Entry::Vacant(v) => {
                let (tx, _rx) = broadcast::channel(1);
                v.insert(tx.clone());
                Err(tx)
            }
        };

        match action {
            Ok(mut rx) => match rx.recv().await {
                Ok(result) => result,
                Err(_) => Err(CacheError::Internal(
                    "in-flight request leader dropped without a result".into(),
                )),
            },
            Err(tx) => {
                let inflight = self.inflight.clone();
                let completed = self.completed.clone();
                let key_for_task = key.clone();
                let handle = tokio::spawn(async move {
                    let result = factory().await;

                    inflight.remove(&key_for_task);
                    completed.lock().put(key_for_task, result.clone());

                    if tx.receiver_count() > 0 {
                        let _ = tx.send(result.clone());
                    }

                    result
                });

                handle.await.map_err(|_| {
                    CacheError::Internal("in-flight request leader task panicked".into())
                })?
            }
        }
    }

    /// Evict every composite entry (in-flight or completed) whose
    /// cache-key portion matches `cache_key`, regardless of type tag.
    /// Called atomically alongside backend invalidation, so a concurrent
    /// caller can never observe a stale value replayed after the
    /// invalidation completes.
    pub fn remove_requests_for_key(&self, cache_key: &str) {
        let suffix = format!("\u{0}{cache_key}");
        self.inflight.retain(|k, _| !k.ends_with(&suffix));
        self.completed.lock().pop(&composite(None, cache_key));

        let mut completed = self.completed.lock();
        let stale: Vec<String> = completed
            .iter()
            .map(|(k, _)| k.clone())
            .filter(|k| k.ends_with(&suffix) || k == cache_key)
            .collect();
        for key in stale {
            completed.pop(&key);
        }
    }

    /// Evict every composite entry scoped to `type_tag`, regardless of
    /// cache key. Used by `invalidate_all`.
    pub fn remove_requests_for_type(&self, type_tag: Option<&str>) {
        let prefix = format!("{}\u{0}", type_tag.unwrap_or(""));
        self.inflight.retain(|k, _| !k.starts_with(&prefix));

        let mut completed = self.completed.lock();
        let stale: Vec<String> = completed
            .iter()
            .map(|(k, _)| k.clone())
            .filter(|k| k.starts_with(&prefix))
            .collect();
        for key in stale {
            completed.pop(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn joins_in_flight_leader() {
        let cache: RequestCache<u32> = RequestCache::default();
        let counter = Arc::new(AtomicU32::new(0));

        let c1 = counter.clone();
        let a = cache.get_or_create_request(None, "k", move || async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            Ok(c1.fetch_add(1, Ordering::SeqCst))
        });
        let b = cache.get_or_create_request(None, "k", move || async move {
            Ok(counter.fetch_add(1, Ordering::SeqCst))
        });

        let (r1, r2) = tokio::join!(a, b);
        assert_eq!(r1.unwrap(), r2.unwrap());
    }

    #[tokio::test]
    async fn replays_completed_result_to_late_joiner() {
        let cache: RequestCache<u32> = RequestCache::default();
        let calls = Arc::new(AtomicU32::new(0));

        let c = calls.clone();
        let first = cache
            .get_or_create_request(None, "k", move || async move {
                Ok(c.fetch_add(1, Ordering::SeqCst))
            })
            .await
            .unwrap();

        let c = calls.clone();
        let second = cache
            .get_or_create_request(None, "k", move || async move {
                Ok(c.fetch_add(1, Ordering::SeqCst))
            })
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalidation_defeats_replay() {
        let cache: RequestCache<u32> = RequestCache::default();
        let calls = Arc::new(AtomicU32::new(0));

        let c = calls.clone();
        let r1 = cache
            .get_or_create_request(None, "x", move || async move { Ok(c.fetch_add(1, Ordering::SeqCst)) })
            .await
            .unwrap();
        assert_eq!(r1, 0);

        cache.remove_requests_for_key("x");

        let c = calls.clone();
        let r2 = cache
            .get_or_create_request(None, "x", move || async move { Ok(c.fetch_add(1, Ordering::SeqCst)) })
            .await
            .unwrap();
        assert_eq!(r2, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn type_tags_do_not_collide() {
        let cache: RequestCache<&'static str> = RequestCache::default();

        let a = cache
            .get_or_create_request(Some("A"), "k", || async { Ok("from-a") })
            .await
            .unwrap();
        let b = cache
            .get_or_create_request(Some("B"), "k", || async { Ok("from-b") })
            .await
            .unwrap();

        assert_eq!(a, "from-a");
        assert_eq!(b, "from-b");
    }

    #[tokio::test]
    async fn remove_requests_for_key_evicts_every_type() {
        let cache: RequestCache<u32> = RequestCache::default();
        let calls = Arc::new(AtomicU32::new(0));

        for tag in [Some("A"), Some("B")] {
            let c = calls.clone();
            cache
                .get_or_create_request(tag, "k", move || async move { Ok(c.fetch_add(1, Ordering::SeqCst)) })
                .await
                .unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        cache.remove_requests_for_key("k");

        for tag in [Some("A"), Some("B")] {
            let c = calls.clone();
            cache
                .get_or_create_request(tag, "k", move || async move { Ok(c.fetch_add(1, Ordering::SeqCst)) })
                .await
                .unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }
}
