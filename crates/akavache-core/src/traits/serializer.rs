//! Pluggable serialization trait

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::Codec;
use crate::CacheError;

/// How `DateTime` fields embedded in serialized values should be
/// normalized on the way out of the store. Akavache's original callers
/// could request this per-cache; we carry the same knob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ForcedDateTimeKind {
    /// Rewrite every decoded `DateTime` to UTC.
    Utc,
    /// Rewrite every decoded `DateTime` to the local timezone offset
    /// recorded at encode time.
    Local,
    /// Strip timezone information entirely (naive wall-clock time).
    Unspecified,
    /// Leave whatever the serializer produced untouched.
    #[default]
    None,
}

/// Every value is wrapped in this envelope before being handed to the
/// codec, so that bare scalars (`i32`, `String`, ...) round-trip through
/// formats (like BSON) that require a document at the top level, and so
/// that a mixed-type cache can still branch on a stable field name.
#[derive(Debug, Serialize, Deserialize)]
pub struct ValueEnvelope<T> {
    #[serde(rename = "Value")]
    pub value: T,
}

/// The wire format a payload is encoded in. Detected from a type-tag byte
/// prefixed by [`Serializer::serialize`] so `deserialize` can pick the
/// right codec without the caller tracking it out of band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Bson,
}

const JSON_PREFIX: u8 = b'{';
const BSON_PREFIX: u8 = 0x00;

/// Probe the first byte of an encoded payload to determine which codec
/// produced it. JSON documents always open with `{`; BSON documents open
/// with a 4-byte little-endian length whose low byte is rarely `{` in
/// practice, but to keep detection unambiguous we additionally prefix
/// every BSON payload with a one-byte tag when encoding (see
/// [`BsonSerializer::serialize`]).
pub fn detect_format(bytes: &[u8]) -> Option<Format> {
    match bytes.first() {
        Some(&JSON_PREFIX) => Some(Format::Json),
        Some(&BSON_PREFIX) => Some(Format::Bson),
        _ => None,
    }
}

/// Trait for pluggable serialization formats.
///
/// Implement this trait to add custom serialization formats. Built-in
/// implementations: JSON (default) and BSON (`bson` feature).
pub trait Serializer: Send + Sync + Clone + 'static {
    /// Name of the serializer (for debugging/metrics).
    fn name(&self) -> &str;

    /// How decoded `DateTime` fields are normalized.
    fn forced_date_time_kind(&self) -> ForcedDateTimeKind {
        ForcedDateTimeKind::None
    }

    /// Serialize a value, wrapped in a [`ValueEnvelope`].
    fn serialize<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, CacheError>;

    /// Deserialize bytes produced by [`Serializer::serialize`]. Tries the
    /// envelope form first, falls back to a bare payload, and finally
    /// detects and dispatches to whichever codec actually produced
    /// `bytes` if that differs from this serializer's own format, so
    /// values written under a different serializer configuration still
    /// decode.
    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CacheError>;
}

/// JSON serializer (default). Human-readable, widely compatible, good
/// for debugging.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer {
    forced_date_time_kind: ForcedDateTimeKind,
}

impl JsonSerializer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_forced_date_time_kind(kind: ForcedDateTimeKind) -> Self {
        Self {
            forced_date_time_kind: kind,
        }
    }
}

impl Serializer for JsonSerializer {
    fn name(&self) -> &str {
        "json"
    }

    fn forced_date_time_kind(&self) -> ForcedDateTimeKind {
        self.forced_date_time_kind
    }

    fn serialize<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, CacheError> {
        let envelope = ValueEnvelope { value };
        serde_json::to_vec(&envelope).map_err(|e| CacheError::Serialization {
            codec: Codec::Json,
            len: 0,
            source: e.to_string(),
        })
    }

    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CacheError> {
        if let Ok(envelope) = serde_json::from_slice::<ValueEnvelope<T>>(bytes) {
            return Ok(envelope.value);
        }
        if let Ok(value) = serde_json::from_slice(bytes) {
            return Ok(value);
        }
        #[cfg(feature = "bson")]
        if detect_format(bytes) == Some(Format::Bson) {
            return BsonSerializer::default().deserialize(bytes);
        }
        serde_json::from_slice(bytes).map_err(|e| CacheError::Serialization {
            codec: Codec::Json,
            len: bytes.len(),
            source: e.to_string(),
        })
    }
}

/// BSON serializer (optional). Enable with the `bson` feature. Every
/// payload is prefixed with a one-byte `0x00` tag ahead of the BSON
/// document bytes so [`detect_format`] can tell it apart from JSON.
#[cfg(feature = "bson")]
#[derive(Debug, Clone, Copy, Default)]
pub struct BsonSerializer {
    forced_date_time_kind: ForcedDateTimeKind,
}

#[cfg(feature = "bson")]
impl BsonSerializer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_forced_date_time_kind(kind: ForcedDateTimeKind) -> Self {
        Self {
            forced_date_time_kind: kind,
        }
    }
}

#[cfg(feature = "bson")]
impl Serializer for BsonSerializer {
    fn name(&self) -> &str {
        "bson"
    }

    fn forced_date_time_kind(&self) -> ForcedDateTimeKind {
        self.forced_date_time_kind
    }

    fn serialize<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, CacheError> {
        let envelope = ValueEnvelope { value };
        let doc = bson::to_document(&envelope).map_err(|e| CacheError::Serialization {
            codec: Codec::Bson,
            len: 0,
            source: e.to_string(),
        })?;
        let mut out = vec![BSON_PREFIX];
        doc.to_writer(&mut out).map_err(|e| CacheError::Serialization {
            codec: Codec::Bson,
            len: 0,
            source: e.to_string(),
        })?;
        Ok(out)
    }

    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CacheError> {
        if detect_format(bytes) == Some(Format::Json) {
            return JsonSerializer::default().deserialize(bytes);
        }
        let body = bytes.strip_prefix(&[BSON_PREFIX]).unwrap_or(bytes);
        let doc = bson::Document::from_reader(body).map_err(|e| CacheError::Serialization {
            codec: Codec::Bson,
            len: bytes.len(),
            source: e.to_string(),
        })?;
        if let Ok(envelope) = bson::from_document::<ValueEnvelope<T>>(doc.clone()) {
            return Ok(envelope.value);
        }
        bson::from_document(doc).map_err(|e| CacheError::Serialization {
            codec: Codec::Bson,
            len: bytes.len(),
            source: e.to_string(),
        })
    }
}
