//! `get_and_fetch_latest`: show the cached value immediately, then the
//! freshly fetched one once it's in.

use akavache::prelude::*;
use futures::StreamExt;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct ExchangeRate {
    usd_per_eur: f64,
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let cache = ObjectCache::new(BlobCache::new(MemoryBackend::with_defaults()), JsonSerializer::new());
    cache
        .insert_object("eur", &ExchangeRate { usd_per_eur: 1.08 }, None)
        .await?;

    let mut stream = Box::pin(cache.get_and_fetch_latest(
        "eur",
        || async {
            // stand-in for a network call to a rates provider
            Ok(ExchangeRate { usd_per_eur: 1.09 })
        },
        None::<fn(chrono::DateTime<chrono::Utc>) -> bool>,
        None,
    ));

    while let Some(rate) = stream.next().await {
        println!("rate: {:?}", rate?);
    }

    Ok(())
}
