//! # Inbound Envelope
//!
//! [`DeliveryArgs`] is a received [`DispatchArgs`] as seen by one channel.
//! The payload is unpacked on first access and memoized, so handlers that
//! never read the body never pay for it.

use crate::channel::ChannelCore;
use crate::error::{ChannelError, SerializationError};
use crate::payload::Payload;
use crate::serializer::{Dto, DtoSerializer};
use applet_types::{
    AppletId, CorrelationId, DispatchArgs, MessageIntentId, PayloadType, ReservedIntent,
};
use bytes::Bytes;
use std::fmt;
use std::sync::{Arc, Weak};
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

/// A message delivered to an applet channel.
///
/// Cloning is cheap; clones share the envelope and the unpacked payload.
#[derive(Clone)]
pub struct DeliveryArgs {
    envelope: Arc<DispatchArgs>,
    payload_type: PayloadType,
    receiver: AppletId,
    serializer: Arc<DtoSerializer>,
    channel: Weak<ChannelCore>,
    dto: Arc<OnceCell<Dto>>,
}

impl DeliveryArgs {
    pub(crate) fn new(
        envelope: Arc<DispatchArgs>,
        receiver: AppletId,
        serializer: Arc<DtoSerializer>,
        channel: Weak<ChannelCore>,
    ) -> Self {
        Self {
            payload_type: envelope.logical_payload_type(),
            envelope,
            receiver,
            serializer,
            channel,
            dto: Arc::new(OnceCell::new()),
        }
    }

    pub fn envelope(&self) -> &DispatchArgs {
        &self.envelope
    }

    pub fn intent(&self) -> &MessageIntentId {
        &self.envelope.intent
    }

    /// Payload type of the body. Blob references report the type they point to.
    pub fn payload_type(&self) -> PayloadType {
        self.payload_type
    }

    pub fn correlation_id(&self) -> Option<CorrelationId> {
        self.envelope.correlation_id
    }

    pub fn sender(&self) -> Option<&AppletId> {
        self.envelope.sender.as_ref()
    }

    pub fn destination(&self) -> Option<&AppletId> {
        self.envelope.destination.as_ref()
    }

    /// The applet this copy was delivered to.
    pub fn receiver(&self) -> &AppletId {
        &self.receiver
    }

    pub fn content_type(&self) -> &str {
        &self.envelope.content_type
    }

    /// Raw body as it came off the transport.
    pub fn body(&self) -> &Bytes {
        &self.envelope.body
    }

    /// Inline text body, without touching the blob store.
    pub fn body_as_text(&self) -> Option<&str> {
        if self.envelope.payload_type != PayloadType::TEXT {
            return None;
        }
        std::str::from_utf8(&self.envelope.body).ok()
    }

    pub fn reserved_intent(&self) -> Option<ReservedIntent> {
        ReservedIntent::from_id(&self.envelope.intent)
    }

    /// True for replies sent on the reserved error intent.
    pub fn is_error(&self) -> bool {
        self.reserved_intent() == Some(ReservedIntent::Error)
    }

    /// Unpacked payload, resolved from the blob store if needed.
    pub async fn dto(&self) -> Result<&Dto, SerializationError> {
        self.dto
            .get_or_try_init(|| async {
                self.serializer.unpack(&self.envelope.package()).await
            })
            .await
    }

    pub async fn payload<T: Payload>(&self) -> Result<T, SerializationError> {
        self.dto().await?.decode()
    }

    /// Text body, resolved from the blob store if needed.
    pub async fn text(&self) -> Result<String, SerializationError> {
        let dto = self.dto().await?;
        dto.as_text()
            .map(str::to_owned)
            .ok_or(SerializationError::PayloadTypeMismatch {
                expected: PayloadType::TEXT,
                found: dto.payload_type(),
            })
    }

    /// Answer this message.
    ///
    /// The reply carries this message's correlation id and expiry and is
    /// addressed to its sender.
    pub async fn reply_with<T: Payload>(
        &self,
        intent: MessageIntentId,
        payload: &T,
        cancel: &CancellationToken,
    ) -> Result<(), ChannelError> {
        let package = self.serializer.pack(payload).await?;
        let content_type = self.serializer.content_type(package.payload_type);
        self.reply(DispatchArgs::new(intent, package, content_type), cancel)
            .await
    }

    /// Answer with an error reply. A fan-in aggregating this conversation
    /// fails with the message.
    pub async fn reply_with_error(
        &self,
        message: &str,
        cancel: &CancellationToken,
    ) -> Result<(), ChannelError> {
        self.reply_with_notice(ReservedIntent::Error, message, cancel)
            .await
    }

    pub async fn reply_with_warning(
        &self,
        message: &str,
        cancel: &CancellationToken,
    ) -> Result<(), ChannelError> {
        self.reply_with_notice(ReservedIntent::Warning, message, cancel)
            .await
    }

    async fn reply_with_notice(
        &self,
        intent: ReservedIntent,
        message: &str,
        cancel: &CancellationToken,
    ) -> Result<(), ChannelError> {
        let package = self.serializer.pack_text(message).await?;
        let content_type = self.serializer.content_type(package.payload_type);
        self.reply(
            DispatchArgs::new(intent.id(), package, content_type),
            cancel,
        )
        .await
    }

    async fn reply(
        &self,
        mut args: DispatchArgs,
        cancel: &CancellationToken,
    ) -> Result<(), ChannelError> {
        let channel = self.channel.upgrade().ok_or_else(|| ChannelError::Disposed {
            applet: self.receiver.to_string(),
        })?;

        args.correlation_id = self.envelope.correlation_id;
        args.destination = self.envelope.sender.clone();
        args.expires_at = self.envelope.expires_at;
        channel.send(args, cancel).await
    }
}

impl fmt::Debug for DeliveryArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeliveryArgs")
            .field("intent", &self.envelope.intent)
            .field("payload_type", &self.payload_type)
            .field("correlation_id", &self.envelope.correlation_id)
            .field("sender", &self.envelope.sender)
            .field("receiver", &self.receiver)
            .field("body_len", &self.envelope.body.len())
            .finish()
    }
}
