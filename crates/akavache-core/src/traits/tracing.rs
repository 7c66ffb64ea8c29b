//! `CacheMetrics` adapter that logs via `tracing`

use std::time::Duration;

use tracing::{debug, trace};

use crate::{CacheMetrics, CacheOperation, EvictionReason};

/// Metrics adapter that emits `tracing` events instead of counters,
/// useful during development or when the host process aggregates
/// structured logs rather than running a metrics recorder.
#[derive(Debug, Clone, Default)]
pub struct TracingMetrics {
    service_name: Option<String>,
}

impl TracingMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
    }
}

impl CacheMetrics for TracingMetrics {
    fn record_hit(&self, key: &str) {
        debug!(
            target: "akavache",
            event = "hit",
            key = %key,
            service = ?self.service_name,
            "cache hit"
        );
    }

    fn record_miss(&self, key: &str) {
        debug!(
            target: "akavache",
            event = "miss",
            key = %key,
            service = ?self.service_name,
            "cache miss"
        );
    }

    fn record_latency(&self, operation: CacheOperation, duration: Duration) {
        trace!(
            target: "akavache",
            event = "latency",
            operation = ?operation,
            duration_ms = duration.as_millis(),
            service = ?self.service_name,
            "cache operation latency"
        );
    }

    fn record_eviction(&self, reason: EvictionReason) {
        debug!(
            target: "akavache",
            event = "eviction",
            reason = ?reason,
            service = ?self.service_name,
            "cache eviction"
        );
    }
}
