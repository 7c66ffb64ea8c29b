//! Metrics trait for cache observability

use std::time::Duration;

/// Cache operation for latency tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheOperation {
    Get,
    Insert,
    Invalidate,
    Vacuum,
    Flush,
    Serialize,
    Deserialize,
    Encrypt,
    Decrypt,
}

impl CacheOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheOperation::Get => "get",
            CacheOperation::Insert => "insert",
            CacheOperation::Invalidate => "invalidate",
            CacheOperation::Vacuum => "vacuum",
            CacheOperation::Flush => "flush",
            CacheOperation::Serialize => "serialize",
            CacheOperation::Deserialize => "deserialize",
            CacheOperation::Encrypt => "encrypt",
            CacheOperation::Decrypt => "decrypt",
        }
    }
}

/// Reason an entry left the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EvictionReason {
    /// Expiry reached
    Expired,
    /// Explicitly invalidated
    Invalidated,
    /// Replaced by a newer insert for the same key
    Replaced,
    /// Evicted from the in-memory request cache's LRU bound
    RequestCacheLru,
}

impl EvictionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvictionReason::Expired => "expired",
            EvictionReason::Invalidated => "invalidated",
            EvictionReason::Replaced => "replaced",
            EvictionReason::RequestCacheLru => "request_cache_lru",
        }
    }
}

/// Trait for cache metrics/observability. Implement this to integrate
/// with an external metrics system.
pub trait CacheMetrics: Send + Sync + 'static {
    /// Record a cache hit (entry found and live).
    fn record_hit(&self, key: &str);

    /// Record a cache miss (entry absent or expired).
    fn record_miss(&self, key: &str);

    /// Record operation latency.
    fn record_latency(&self, operation: CacheOperation, duration: Duration);

    /// Record an eviction.
    fn record_eviction(&self, reason: EvictionReason);
}

/// No-op metrics implementation (default). Zero overhead when metrics
/// are not needed.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl CacheMetrics for NoopMetrics {
    #[inline]
    fn record_hit(&self, _key: &str) {}

    #[inline]
    fn record_miss(&self, _key: &str) {}

    #[inline]
    fn record_latency(&self, _operation: CacheOperation, _duration: Duration) {}

    #[inline]
    fn record_eviction(&self, _reason: EvictionReason) {}
}

/// Adapter over the `metrics` crate facade. Enable with the `metrics`
/// feature to emit counters/histograms to whatever recorder the host
/// process has installed.
#[cfg(feature = "metrics")]
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsCrateAdapter;

#[cfg(feature = "metrics")]
impl CacheMetrics for MetricsCrateAdapter {
    fn record_hit(&self, _key: &str) {
        metrics::counter!("akavache_hits_total").increment(1);
    }

    fn record_miss(&self, _key: &str) {
        metrics::counter!("akavache_misses_total").increment(1);
    }

    fn record_latency(&self, operation: CacheOperation, duration: Duration) {
        metrics::histogram!("akavache_operation_duration_seconds", "operation" => operation.as_str())
            .record(duration.as_secs_f64());
    }

    fn record_eviction(&self, reason: EvictionReason) {
        metrics::counter!("akavache_evictions_total", "reason" => reason.as_str()).increment(1);
    }
}
