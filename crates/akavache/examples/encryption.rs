//! Transparent at-rest encryption via `XChaChaEncryptionProvider`: the
//! backend only ever sees ciphertext.

use akavache::{BlobCache, MemoryBackend, XChaChaEncryptionProvider};
use std::sync::Arc;

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let key = [7u8; 32];
    let backend = MemoryBackend::with_defaults();
    let cache = BlobCache::with_encryption(backend, Arc::new(XChaChaEncryptionProvider::from_key_bytes(&key)));

    cache.insert("secret", None, bytes::Bytes::from_static(b"swordfish"), None).await?;
    let plaintext = cache.get("secret", None).await?;
    println!("decrypted: {}", String::from_utf8_lossy(&plaintext));

    Ok(())
}
