//! Error types for blob cache operations

use thiserror::Error;

/// Codec attempted during a (de)serialization failure, carried on
/// [`CacheError::Serialization`] so callers can tell which format was probed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    Json,
    Bson,
}

impl std::fmt::Display for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Codec::Json => write!(f, "json"),
            Codec::Bson => write!(f, "bson"),
        }
    }
}

/// Main error type for all cache operations
#[derive(Error, Debug, Clone)]
pub enum CacheError {
    /// Store has been disposed; all operations fail fast.
    #[error("store is disposed")]
    Disposed,

    /// Key absent or expired.
    #[error("key not found: {0}")]
    NotFound(String),

    /// Encode/decode failure. Carries the codec attempted and the raw byte
    /// length so callers can distinguish truncated payloads from malformed ones.
    #[error("serialization error ({codec}, {len} bytes): {source}")]
    Serialization {
        codec: Codec,
        len: usize,
        source: String,
    },

    /// Encrypt/decrypt failure.
    #[error("crypto error: {0}")]
    Crypto(String),

    /// Backend I/O (file or SQL) failure. Retriable by the caller.
    #[error("io error: {0}")]
    Io(String),

    /// Key-listing failure, exposed safely via `*_safe` variants.
    #[error("enumeration error: {0}")]
    Enumeration(String),

    /// User-supplied factory failure in `get_or_fetch` / `get_and_fetch_latest`.
    #[error("fetch error: {0}")]
    Fetch(String),

    /// Null/empty key or null data.
    #[error("argument error: {0}")]
    Argument(String),

    /// Internal invariant violation (coalescer bookkeeping, etc).
    #[error("internal error: {0}")]
    Internal(String),

    /// A caller-supplied timeout elapsed before the operation finished.
    /// The underlying work is not aborted; it keeps running to
    /// completion for any other subscriber still awaiting it.
    #[error("operation timed out")]
    Timeout,
}

/// Result type alias for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;
