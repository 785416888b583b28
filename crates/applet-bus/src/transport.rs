//! # Transport
//!
//! The broadcast medium a channel publishes to and subscribes from.
//!
//! A transport only moves envelopes. Contract checks, self-echo filtering
//! and expiry are the channel's job.

use crate::error::TransportError;
use applet_types::DispatchArgs;
use async_trait::async_trait;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio_stream::{Stream, StreamExt};

/// Predicate applied by a subscription before yielding an envelope.
pub type EnvelopeFilter = Arc<dyn Fn(&DispatchArgs) -> bool + Send + Sync>;

/// Multicast medium shared by every channel of an application.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Publish an envelope to every subscriber.
    ///
    /// Returns the number of subscriptions that observed it.
    async fn publish(&self, envelope: Arc<DispatchArgs>) -> Result<usize, TransportError>;

    /// Observe published envelopes matching `filter`.
    ///
    /// Dropping the returned subscription unsubscribes.
    fn subscribe(&self, filter: EnvelopeFilter) -> Result<Subscription, TransportError>;
}

/// Handle to a live subscription.
///
/// The stream ends when the transport closes.
pub struct Subscription {
    stream: Pin<Box<dyn Stream<Item = Arc<DispatchArgs>> + Send>>,
}

impl Subscription {
    pub fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = Arc<DispatchArgs>> + Send + 'static,
    {
        Self {
            stream: Box::pin(stream),
        }
    }

    /// Receive the next matching envelope. `None` once the transport closed.
    pub async fn recv(&mut self) -> Option<Arc<DispatchArgs>> {
        self.stream.next().await
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

impl Stream for Subscription {
    type Item = Arc<DispatchArgs>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.stream.as_mut().poll_next(cx)
    }
}
