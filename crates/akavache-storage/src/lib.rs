//! akavache-storage: concrete storage backends for akavache
//!
//! `MemoryBackend` is an in-process `DashMap`-backed store; `SqliteBackend`
//! is the persistent, bit-compatible store described by the on-disk
//! schema, built on `rusqlite` + `r2d2`.

#[cfg(feature = "memory")]
pub mod memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "memory")]
pub use memory::{MemoryBackend, MemoryConfig};

#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteBackend, SqliteConfig};
