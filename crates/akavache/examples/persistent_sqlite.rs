//! SQLite-backed store via the operation queue: inserts from a burst
//! of tasks land in batched SQL while each caller still gets its own
//! result.

use akavache::prelude::*;
use std::sync::Arc;

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let dir = std::env::temp_dir().join("akavache-example-persistent");
    std::fs::create_dir_all(&dir)?;
    let backend = SqliteBackend::open(dir.join("store.db"), Default::default())?;
    let cache = Arc::new(BlobCache::new(OperationQueue::new(backend)));

    let mut handles = Vec::new();
    for i in 0..8u8 {
        let cache = cache.clone();
        handles.push(tokio::spawn(async move {
            cache
                .insert("counter", None, bytes::Bytes::copy_from_slice(&[i]), None)
                .await
                .unwrap();
        }));
    }
    for h in handles {
        h.await?;
    }

    let latest = cache.get("counter", None).await?;
    println!("last writer won: {:?}", latest.as_ref());

    cache.dispose().await?;
    Ok(())
}
