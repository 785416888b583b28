//! # Message Envelope
//!
//! `DtoPackage` is the minimal wire pair produced by a serializer.
//! `DispatchArgs` is the envelope a channel hands to the transport.
//!
//! ## Lifecycle
//!
//! 1. The caller (or a channel helper) builds `DispatchArgs` from a package.
//! 2. The channel stamps `sender` and `sender_instance` before publishing.
//! 3. Receivers drop envelopes whose `expires_at` has passed.

use crate::correlation::CorrelationId;
use crate::entities::PayloadType;
use crate::identity::{AppletId, MessageIntentId};
use bytes::Bytes;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Content type of payloads encoded by the JSON codec.
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Content type of raw byte passthrough.
pub const CONTENT_TYPE_BYTES: &str = "application/octet-stream";

/// Content type of text passthrough.
pub const CONTENT_TYPE_TEXT: &str = "text/plain; charset=utf-8";

/// Content type of a blob store pointer.
pub const CONTENT_TYPE_BLOB_REF: &str = "application/vnd.applets.blob-ref";

/// Milliseconds since the Unix epoch.
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// Pointer to a payload parked in a blob store.
///
/// Encoded as 32 bytes: the blob id, then the original payload type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlobReference {
    pub blob_id: Uuid,
    pub payload_type: PayloadType,
}

impl BlobReference {
    pub const ENCODED_LEN: usize = 32;

    pub fn encode(&self) -> Bytes {
        let mut buf = Vec::with_capacity(Self::ENCODED_LEN);
        buf.extend_from_slice(self.blob_id.as_bytes());
        buf.extend_from_slice(self.payload_type.as_uuid().as_bytes());
        Bytes::from(buf)
    }

    /// `None` unless `content` is exactly [`Self::ENCODED_LEN`] bytes.
    pub fn decode(content: &[u8]) -> Option<Self> {
        if content.len() != Self::ENCODED_LEN {
            return None;
        }
        let (blob_id, payload_type) = content.split_at(16);
        Some(Self {
            blob_id: Uuid::from_bytes(blob_id.try_into().ok()?),
            payload_type: PayloadType::from_uuid(Uuid::from_bytes(payload_type.try_into().ok()?)),
        })
    }
}

/// Payload type tag plus serialized content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DtoPackage {
    pub payload_type: PayloadType,
    pub content: Bytes,
}

impl DtoPackage {
    pub fn new(payload_type: PayloadType, content: impl Into<Bytes>) -> Self {
        Self {
            payload_type,
            content: content.into(),
        }
    }

    /// Payload type of the content, looking through a blob reference.
    pub fn logical_payload_type(&self) -> PayloadType {
        logical_payload_type(self.payload_type, &self.content)
    }
}

fn logical_payload_type(payload_type: PayloadType, content: &[u8]) -> PayloadType {
    if payload_type != PayloadType::INDIRECTION {
        return payload_type;
    }
    BlobReference::decode(content).map_or(payload_type, |r| r.payload_type)
}

/// Outbound envelope.
#[derive(Debug, Clone)]
pub struct DispatchArgs {
    // =========================================================================
    // ROUTING
    // =========================================================================
    /// Intent the message is sent on.
    pub intent: MessageIntentId,

    /// Set only for fan-out requests and their replies.
    pub correlation_id: Option<CorrelationId>,

    /// Stamped by the sending channel.
    pub sender: Option<AppletId>,

    /// Runtime instance of the sending channel. Used to drop self-echo.
    pub sender_instance: Option<Uuid>,

    /// When set, only this applet processes the message.
    pub destination: Option<AppletId>,

    // =========================================================================
    // TIMING
    // =========================================================================
    /// Creation time, unix millis.
    pub created_at: u64,

    /// Receivers discard the message after this instant, unix millis.
    pub expires_at: Option<u64>,

    // =========================================================================
    // PAYLOAD
    // =========================================================================
    pub payload_type: PayloadType,
    pub content_type: String,
    pub body: Bytes,
}

impl DispatchArgs {
    pub fn new(
        intent: MessageIntentId,
        package: DtoPackage,
        content_type: impl Into<String>,
    ) -> Self {
        Self {
            intent,
            correlation_id: None,
            sender: None,
            sender_instance: None,
            destination: None,
            created_at: unix_millis(),
            expires_at: None,
            payload_type: package.payload_type,
            content_type: content_type.into(),
            body: package.content,
        }
    }

    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: CorrelationId) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    #[must_use]
    pub fn with_destination(mut self, destination: AppletId) -> Self {
        self.destination = Some(destination);
        self
    }

    /// Expire `ttl` after creation.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        let ttl = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        self.expires_at = Some(self.created_at.saturating_add(ttl));
        self
    }

    /// Record the sending applet and runtime instance.
    pub fn stamp(&mut self, sender: AppletId, sender_instance: Uuid) {
        self.sender = Some(sender);
        self.sender_instance = Some(sender_instance);
    }

    /// Repackage the payload, keeping routing and timing.
    pub fn package(&self) -> DtoPackage {
        DtoPackage {
            payload_type: self.payload_type,
            content: self.body.clone(),
        }
    }

    /// Payload type the contract is checked against. Overflowed payloads
    /// report their original type, not the indirection tag.
    pub fn logical_payload_type(&self) -> PayloadType {
        logical_payload_type(self.payload_type, &self.body)
    }

    pub fn is_expired_at(&self, now_millis: u64) -> bool {
        self.expires_at.is_some_and(|expires| now_millis >= expires)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(unix_millis())
    }
}
