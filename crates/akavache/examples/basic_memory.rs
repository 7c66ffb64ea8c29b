//! Minimal in-memory object cache: no SQLite, no encryption.

use akavache::prelude::*;

#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct Profile {
    name: String,
    logins: u32,
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let cache = ObjectCache::new(BlobCache::new(MemoryBackend::with_defaults()), JsonSerializer::new());

    cache
        .insert_object("profile:ada", &Profile { name: "Ada".into(), logins: 1 }, None)
        .await?;

    let profile: Profile = cache.get_object("profile:ada").await?;
    println!("{} has logged in {} time(s)", profile.name, profile.logins);

    cache.invalidate_object::<Profile>("profile:ada").await?;
    match cache.get_object::<Profile>("profile:ada").await {
        Err(CacheError::NotFound(key)) => println!("{key} correctly evicted"),
        other => println!("unexpected: {other:?}"),
    }

    Ok(())
}
