//! akavache: an async persistent blob cache with per-entry expiration,
//! transparent at-rest encryption, and request coalescing.
//!
//! Three layers, each usable on its own or layered through the others:
//!
//! - [`BlobCache`]: a [`CacheBackend`] plus encryption and blob-level
//!   request coalescing.
//! - [`ObjectCache`]: typed insert/get/fetch over a `BlobCache`,
//!   including the stream-returning `get_and_fetch_latest`.
//! - [`AkavacheBuilder`]: wires up the four named root caches
//!   (`user_account`, `local_machine`, `secure`, `in_memory`) a full
//!   deployment uses.
//!
//! SQLite-backed stores go through [`OperationQueue`], which absorbs
//! bursty per-key calls into batched backend round trips without
//! breaking per-key ordering.
//!
//! [`with_timeout`] races any cache call against a deadline without the
//! cache itself threading one through every method.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use akavache::prelude::*;
//!
//! #[derive(serde::Serialize, serde::Deserialize)]
//! struct Profile { name: String }
//!
//! #[tokio::main]
//! async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
//!     let akavache = AkavacheBuilder::new("my-app").sqlite_defaults(false).build()?;
//!
//!     akavache.in_memory.insert_object("me", &Profile { name: "ada".into() }, None).await?;
//!     let me: Profile = akavache.in_memory.get_object("me").await?;
//!     println!("{}", me.name);
//!
//!     Ok(())
//! }
//! ```

mod blob_cache;
mod builder;
mod fs;
mod object_cache;
mod queue;
mod request_cache;
mod scheduler;
mod timeout;

pub use blob_cache::{BlobCache, StoreState};
pub use builder::{Akavache, AkavacheBuilder, RootBackend};
pub use fs::{FilesystemProvider, StdFilesystemProvider};
pub use object_cache::ObjectCache;
pub use queue::OperationQueue;
pub use scheduler::{TaskScheduler, TokioScheduler};
pub use timeout::with_timeout;

pub use akavache_core::{
    CacheBackend, CacheEntry, CacheError, EncryptionProvider, ForcedDateTimeKind, JsonSerializer,
    NoopEncryptionProvider, Result, Serializer,
};

#[cfg(feature = "bson")]
pub use akavache_core::BsonSerializer;
#[cfg(feature = "encryption")]
pub use akavache_core::XChaChaEncryptionProvider;

pub use akavache_storage::MemoryBackend;
#[cfg(feature = "sqlite")]
pub use akavache_storage::{SqliteBackend, SqliteConfig};

/// Convenience re-exports: `use akavache::prelude::*;`.
pub mod prelude {
    pub use crate::{
        with_timeout, Akavache, AkavacheBuilder, BlobCache, CacheBackend, CacheEntry, CacheError,
        EncryptionProvider, ForcedDateTimeKind, JsonSerializer, MemoryBackend, NoopEncryptionProvider,
        ObjectCache, OperationQueue, Result, Serializer, StoreState,
    };

    #[cfg(feature = "sqlite")]
    pub use crate::SqliteBackend;
}

#[cfg(test)]
mod tests;
