//! # Payloads
//!
//! A payload is any serde type tagged with a stable [`PayloadType`].
//! The JSON codec is the default; a payload may declare its own codec.

use crate::error::SerializationError;
use applet_types::{PayloadType, CONTENT_TYPE_JSON};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Converts one payload type to and from bytes.
pub trait PayloadCodec<T>: Send + Sync {
    fn content_type(&self) -> &'static str;
    fn encode(&self, value: &T) -> Result<Vec<u8>, SerializationError>;
    fn decode(&self, bytes: &[u8]) -> Result<T, SerializationError>;
}

/// UTF-8 JSON codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl<T: Serialize + DeserializeOwned> PayloadCodec<T> for JsonCodec {
    fn content_type(&self) -> &'static str {
        CONTENT_TYPE_JSON
    }

    fn encode(&self, value: &T) -> Result<Vec<u8>, SerializationError> {
        Ok(serde_json::to_vec(value)?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<T, SerializationError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// A serializable message body.
///
/// ```rust,ignore
/// #[derive(Serialize, Deserialize)]
/// struct CalcRequest { lhs: f64, rhs: f64, op: u8 }
///
/// impl Payload for CalcRequest {
///     const PAYLOAD_TYPE: PayloadType = PayloadType::from_u128(0x6a1f...);
/// }
/// ```
pub trait Payload: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Stable schema tag. Must be unique across registered payloads.
    const PAYLOAD_TYPE: PayloadType;

    /// Codec used for this payload. Override to replace JSON.
    fn codec() -> &'static dyn PayloadCodec<Self> {
        &JsonCodec
    }
}

/// Emitted on the reserved heartbeat intent by idle channels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heartbeat {
    /// Increases by one per heartbeat of a channel instance
    pub sequence: u64,
    pub applet: String,
    pub instance: Uuid,
}

impl Payload for Heartbeat {
    const PAYLOAD_TYPE: PayloadType = PayloadType::HEARTBEAT;
}
