//! Error types for the applet bus.

use crate::delivery::DeliveryArgs;
use crate::handlers::BoxError;
use applet_types::{ContractViolationError, PayloadType};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Errors raised while packing or unpacking payloads.
#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("Payload types must not be identical. See types {first} and {second} (payload type {payload_type})")]
    DuplicatePayloadType {
        payload_type: PayloadType,
        first: &'static str,
        second: &'static str,
    },

    #[error("Payload type {payload_type} claimed by {type_name} is reserved")]
    ReservedPayloadType {
        payload_type: PayloadType,
        type_name: &'static str,
    },

    #[error("{type_name} is not a registered payload (payload type {payload_type})")]
    Unregistered {
        payload_type: PayloadType,
        type_name: &'static str,
    },

    #[error("Unknown payload type: {0}")]
    UnknownPayloadType(PayloadType),

    #[error("Payload type mismatch: expected {expected}, found {found}")]
    PayloadTypeMismatch {
        expected: PayloadType,
        found: PayloadType,
    },

    #[error("Text payload is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Corrupt blob reference: expected 32 bytes, found {0}")]
    CorruptBlobReference(usize),

    #[error("Blob reference points to another blob reference")]
    NestedBlobReference,

    #[error("Payload of {size} bytes reaches the {limit} byte body limit and no blob store is configured")]
    BlobStoreUnavailable { size: usize, limit: usize },

    #[error("Blob store error: {0}")]
    BlobStore(#[from] BlobStoreError),
}

/// Errors from a persisted blob store.
#[derive(Debug, Clone, Error)]
pub enum BlobStoreError {
    #[error("Blob not found: {0}")]
    NotFound(Uuid),

    #[error("No blob store is configured")]
    Unconfigured,

    #[error("Blob store backend error: {0}")]
    Backend(String),
}

/// Errors from a transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Transport is closed")]
    Closed,

    #[error("Transport backend error: {0}")]
    Backend(String),
}

/// Errors raised by channel operations.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("The channel of applet {applet} has been disposed")]
    Disposed { applet: String },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("A listener is already attached to the channel of applet {applet}")]
    ListenerAttached { applet: String },

    #[error(transparent)]
    ContractViolation(#[from] ContractViolationError),

    #[error(transparent)]
    Serialization(#[from] SerializationError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Event handler failed: {0}")]
    Handler(BoxError),
}

/// Errors raised by fan-in aggregation.
#[derive(Debug, Error)]
pub enum FanInError {
    /// A responder answered with an error reply.
    #[error("Bad fan-out request: {}", .0.body_as_text().unwrap_or("<binary error reply>"))]
    BadFanOutRequest(Box<DeliveryArgs>),

    #[error("No reply completed the fan-in policy within {ttl:?}")]
    Timeout { ttl: Duration },

    #[error(transparent)]
    Channel(#[from] ChannelError),
}

impl FanInError {
    /// The error reply that aborted aggregation, if any.
    pub fn error_reply(&self) -> Option<&DeliveryArgs> {
        match self {
            Self::BadFanOutRequest(reply) => Some(reply),
            _ => None,
        }
    }
}

/// Invalid bus configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Invalid configuration parameter: {0}")]
    InvalidParameters(String),
}
