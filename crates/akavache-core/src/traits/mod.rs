//! Core traits for cache operations

mod backend;
mod encryption;
mod metrics;
mod serializer;
mod tracing;

pub use backend::CacheBackend;
pub use encryption::{EncryptionProvider, NoopEncryptionProvider};
pub use metrics::{CacheMetrics, CacheOperation, EvictionReason, NoopMetrics};
pub use serializer::{detect_format, ForcedDateTimeKind, Format, JsonSerializer, Serializer, ValueEnvelope};
pub use tracing::TracingMetrics;

#[cfg(feature = "bson")]
pub use serializer::BsonSerializer;

#[cfg(feature = "encryption")]
pub use encryption::XChaChaEncryptionProvider;

#[cfg(feature = "metrics")]
pub use metrics::MetricsCrateAdapter;
