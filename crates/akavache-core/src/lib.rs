//! akavache-core: core traits and types for the akavache blob cache
//!
//! This crate provides the foundational types and traits shared by every
//! storage backend and by the façade crate: the [`CacheBackend`] storage
//! contract, the pluggable [`Serializer`] and [`EncryptionProvider`]
//! traits, the [`CacheEntry`] row type, and tick-based `DateTime`
//! conversion for on-disk compatibility with the original Akavache
//! SQLite layout.

pub mod error;
mod ticks;
mod traits;
mod types;

pub use error::{CacheError, Codec, Result};
pub use ticks::{from_ticks, never, to_ticks, NEVER_TICKS};
pub use traits::*;
pub use types::*;
