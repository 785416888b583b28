//! # Fan-Out / Fan-In
//!
//! Reduces the reply stream of a fan-out request to one value.
//!
//! An error reply aborts aggregation at once with
//! [`FanInError::BadFanOutRequest`]. Otherwise each reply is offered to the
//! policy until it reports a result or its timeout elapses.

use crate::channel::AppletChannel;
use crate::delivery::DeliveryArgs;
use crate::error::FanInError;
use crate::payload::Payload;
use applet_types::MessageIntentId;
use async_trait::async_trait;
use std::time::Duration;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Decides when a set of replies is complete. Single use.
#[async_trait]
pub trait FanInPolicy<T>: Send {
    /// Conversation TTL of the request.
    fn timeout(&self) -> Duration;

    /// Offer a reply. Returns true if it was taken into the result.
    async fn try_complete_with(&mut self, reply: &DeliveryArgs) -> bool;

    fn has_result(&self) -> bool;

    fn result(&self) -> Option<&T>;

    fn take_result(&mut self) -> Option<T>;
}

/// Takes the first reply that decodes as `T` and ignores the rest.
#[derive(Debug)]
pub struct FirstInWins<T> {
    timeout: Duration,
    result: Option<T>,
}

impl<T> FirstInWins<T> {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            result: None,
        }
    }
}

#[async_trait]
impl<T: Payload> FanInPolicy<T> for FirstInWins<T> {
    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn try_complete_with(&mut self, reply: &DeliveryArgs) -> bool {
        if self.result.is_some() || reply.payload_type() != T::PAYLOAD_TYPE {
            return false;
        }
        match reply.payload::<T>().await {
            Ok(value) => {
                self.result = Some(value);
                true
            }
            Err(err) => {
                debug!(error = %err, "Reply ignored, payload does not decode");
                false
            }
        }
    }

    fn has_result(&self) -> bool {
        self.result.is_some()
    }

    fn result(&self) -> Option<&T> {
        self.result.as_ref()
    }

    fn take_result(&mut self) -> Option<T> {
        self.result.take()
    }
}

/// A request payload that knows its intent and reply type.
#[async_trait]
pub trait FanOutRequest: Payload {
    type Response: Payload;

    fn intent(&self) -> MessageIntentId;

    /// Aggregate with first-in-wins and the channel's default timeout.
    async fn aggregate(
        &self,
        channel: &AppletChannel,
        cancel: &CancellationToken,
    ) -> Result<Self::Response, FanInError> {
        aggregate_responses(self, channel, None, cancel).await
    }
}

/// Publish `request` and reduce its replies with `policy`.
///
/// Without a policy, [`FirstInWins`] with the channel's default fan-in
/// timeout is used.
pub async fn aggregate_responses<R: FanOutRequest>(
    request: &R,
    channel: &AppletChannel,
    policy: Option<Box<dyn FanInPolicy<R::Response>>>,
    cancel: &CancellationToken,
) -> Result<R::Response, FanInError> {
    let mut policy: Box<dyn FanInPolicy<R::Response>> = match policy {
        Some(policy) => policy,
        None => Box::new(FirstInWins::<R::Response>::new(
            channel.config().default_fan_in_timeout,
        )),
    };
    let ttl = policy.timeout();

    let mut replies = channel
        .get_responses(request.intent(), request, ttl, cancel)
        .await?;
    let correlation_id = replies.correlation_id();

    while let Some(reply) = replies.next().await {
        let reply = reply?;
        if reply.is_error() {
            warn!(
                correlation_id = %correlation_id,
                sender = ?reply.sender(),
                reason = reply.body_as_text().unwrap_or_default(),
                "Fan-out request rejected"
            );
            return Err(FanInError::BadFanOutRequest(Box::new(reply)));
        }
        policy.try_complete_with(&reply).await;
        if policy.has_result() {
            break;
        }
    }
    drop(replies);

    policy.take_result().ok_or_else(|| {
        debug!(correlation_id = %correlation_id, ttl_ms = ttl.as_millis(), "Fan-in timed out");
        FanInError::Timeout { ttl }
    })
}
