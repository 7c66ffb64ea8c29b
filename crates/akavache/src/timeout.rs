//! Timeout racing, kept separate from the core async API.
//!
//! Every cache operation is a plain `Future`; a caller who wants a
//! deadline races it against [`tokio::time::timeout`] via this helper
//! instead of the cache threading a deadline through every call.
//! Losing the race drops the caller's view of the work, not the work
//! itself: any in-flight [`crate::request_cache::RequestCache`] leader
//! runs on its own spawned task, so other subscribers are unaffected.

use std::future::Future;
use std::time::Duration;

use akavache_core::{CacheError, Result};

/// Runs `future` to completion unless `duration` elapses first, in
/// which case this returns [`CacheError::Timeout`] while the future
/// itself (if it holds a handle to spawned work, as `get_or_fetch` and
/// `get_or_create_request` do) keeps running.
pub async fn with_timeout<F, T>(duration: Duration, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(CacheError::Timeout),
    }
}
