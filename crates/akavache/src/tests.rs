//! End-to-end scenarios and testable properties, run against the
//! public surface rather than any one layer's internals.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use futures::StreamExt;
use serde::{Deserialize, Serialize};

use crate::prelude::*;
use akavache_storage::{SqliteBackend, SqliteConfig};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Id {
    id: String,
}

/// Invalidating a key must defeat the request cache, or the second
/// `get_or_fetch` replays the first factory's result instead of running
/// the factory again.
#[tokio::test]
async fn invalidate_defeats_request_cache_replay() {
    let cache = BlobCache::new(MemoryBackend::with_defaults());
    let seq = Arc::new(AtomicU32::new(0));

    let s = seq.clone();
    let r1 = cache
        .get_or_fetch("x", None, None, move || async move { Ok(Bytes::from(s.fetch_add(1, Ordering::SeqCst).to_string())) })
        .await
        .unwrap();
    assert_eq!(r1, Bytes::from_static(b"0"));

    cache.invalidate("x", None).await.unwrap();

    let s = seq.clone();
    let r2 = cache
        .get_or_fetch("x", None, None, move || async move { Ok(Bytes::from(s.fetch_add(1, Ordering::SeqCst).to_string())) })
        .await
        .unwrap();
    assert_eq!(r2, Bytes::from_static(b"1"));
    assert_eq!(seq.load(Ordering::SeqCst), 2);
}

/// `get_and_fetch_latest` emits the cached value, then the freshly
/// fetched one, and leaves the store holding the latter.
#[tokio::test]
async fn get_and_fetch_latest_ordering() {
    let cache = ObjectCache::new(BlobCache::new(MemoryBackend::with_defaults()), JsonSerializer::new());
    cache.insert_object("k", &Id { id: "old".into() }, None).await.unwrap();

    let stream = cache.get_and_fetch_latest(
        "k",
        || async { Ok(Id { id: "new".into() }) },
        None::<fn(chrono::DateTime<chrono::Utc>) -> bool>,
        None,
    );
    let results: Vec<Id> = stream.map(|r| r.unwrap()).collect().await;

    assert_eq!(results, vec![Id { id: "old".into() }, Id { id: "new".into() }]);
    assert_eq!(cache.get_object::<Id>("k").await.unwrap().id, "new");
}

/// An entry whose expiry has already passed is absent both from `get`
/// and `get_all_keys`.
#[tokio::test]
async fn expired_entry_is_invisible_to_reads() {
    let cache = BlobCache::new(MemoryBackend::with_defaults());
    let expiry = chrono::Utc::now() + chrono::Duration::milliseconds(50);
    cache.insert("k", None, Bytes::from_static(b"v"), Some(expiry)).await.unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    assert!(matches!(cache.get("k", None).await, Err(CacheError::NotFound(_))));
    assert!(!cache.get_all_keys(None).await.unwrap().contains(&"k".to_string()));
}

/// A value written with one serializer is readable through another,
/// since the wire format is auto-detected from the payload bytes rather
/// than tracked out of band.
#[cfg(feature = "bson")]
#[tokio::test]
async fn cross_serializer_read() {
    use crate::BsonSerializer;

    let blob = Arc::new(BlobCache::new(MemoryBackend::with_defaults()));

    let json_side = ObjectCache::from_arc(blob.clone(), JsonSerializer::new());
    json_side.insert_object("k", &Id { id: "a".into() }, None).await.unwrap();

    let bson_side = ObjectCache::from_arc(blob, BsonSerializer::new());
    let got: Id = bson_side.get_object("k").await.unwrap();
    assert_eq!(got.id, "a");
}

/// Five concurrent inserts to the same key all resolve, and a
/// subsequent get observes the last writer.
#[tokio::test]
async fn concurrent_inserts_to_same_key_resolve_to_last_writer() {
    let queue = Arc::new(OperationQueue::new(MemoryBackend::with_defaults()));
    let mut handles = Vec::new();
    for i in 0..5u8 {
        let queue = queue.clone();
        handles.push(tokio::spawn(async move {
            queue
                .insert(CacheEntry::new("k", None, Bytes::copy_from_slice(&[i])))
                .await
                .unwrap();
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    let got = queue.get("k", None).await.unwrap().unwrap();
    assert_eq!(got.payload.len(), 1);
    assert!((0..5).contains(&got.payload[0]));
}

/// A write issued immediately before `dispose()` is durable once the
/// same file is reopened.
#[tokio::test]
async fn dispose_drains_writes_before_closing() {
    let dir = std::env::temp_dir().join(format!("akavache-s6-test-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("store.db");

    {
        let cache = BlobCache::new(SqliteBackend::open(&path, SqliteConfig::default()).unwrap());
        cache.insert("k", None, Bytes::from_static(b"v"), None).await.unwrap();
        cache.dispose().await.unwrap();
    }

    {
        let cache = BlobCache::new(SqliteBackend::open(&path, SqliteConfig::default()).unwrap());
        assert_eq!(cache.get("k", None).await.unwrap(), Bytes::from_static(b"v"));
    }

    std::fs::remove_dir_all(&dir).ok();
}

/// The last of several inserts to the same key wins, regardless of how
/// many preceded it.
#[tokio::test]
async fn invariant_per_key_fifo() {
    let cache = BlobCache::new(MemoryBackend::with_defaults());
    cache.insert("k", None, Bytes::from_static(b"a"), None).await.unwrap();
    cache.insert("k", None, Bytes::from_static(b"b"), None).await.unwrap();
    assert_eq!(cache.get("k", None).await.unwrap(), Bytes::from_static(b"b"));
}

/// A typed value survives insert/get modulo nothing: no normalization
/// is needed for a type with no `DateTime` field.
#[tokio::test]
async fn invariant_object_round_trip() {
    let cache = ObjectCache::new(BlobCache::new(MemoryBackend::with_defaults()), JsonSerializer::new());
    let value = Id { id: "round-trip".into() };
    cache.insert_object("k", &value, None).await.unwrap();
    assert_eq!(cache.get_object::<Id>("k").await.unwrap(), value);
}

/// Safe enumeration never throws, even once the store is disposed.
#[tokio::test]
async fn invariant_safe_enumeration_never_throws() {
    let cache = BlobCache::new(MemoryBackend::with_defaults());
    cache.insert("k", None, Bytes::from_static(b"v"), None).await.unwrap();
    cache.dispose().await.unwrap();
    assert_eq!(cache.get_all_keys_safe(None).await, Vec::<String>::new());
}

/// Every entry in a successful bulk insert becomes visible together.
#[tokio::test]
async fn invariant_bulk_insert_is_all_or_nothing_on_success() {
    let cache = BlobCache::new(MemoryBackend::with_defaults());
    cache
        .insert_bulk(vec![
            ("a".into(), None, Bytes::from_static(b"1"), None),
            ("b".into(), None, Bytes::from_static(b"2"), None),
        ])
        .await
        .unwrap();
    assert_eq!(cache.get("a", None).await.unwrap(), Bytes::from_static(b"1"));
    assert_eq!(cache.get("b", None).await.unwrap(), Bytes::from_static(b"2"));
}
