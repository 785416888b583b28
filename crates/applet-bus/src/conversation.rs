//! # Reply Stream
//!
//! The consumer side of a fan-out request. The request is published on the
//! first poll, after the correlation sink is already registered, so a reply
//! can never outrun its listener.
//!
//! The stream ends when the conversation TTL elapses, when the channel is
//! disposed, or when it is dropped. It yields an error once if cancelled or
//! if the transport failed underneath it. Replies still queued when the TTL
//! elapses are discarded.

use crate::channel::ChannelCore;
use crate::delivery::DeliveryArgs;
use crate::error::{ChannelError, TransportError};
use applet_types::CorrelationId;
use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Weak;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Sleep;
use tokio_stream::Stream;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub struct ResponseStream {
    core: Weak<ChannelCore>,
    correlation_id: CorrelationId,

    /// The request, until it has been published.
    publish: Option<BoxFuture<'static, Result<(), ChannelError>>>,

    replies: mpsc::UnboundedReceiver<DeliveryArgs>,
    deadline: Pin<Box<Sleep>>,
    cancelled: Pin<Box<dyn Future<Output = ()> + Send>>,
    finished: bool,
}

impl ResponseStream {
    pub(crate) fn new(
        core: Weak<ChannelCore>,
        correlation_id: CorrelationId,
        publish: BoxFuture<'static, Result<(), ChannelError>>,
        replies: mpsc::UnboundedReceiver<DeliveryArgs>,
        ttl: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            core,
            correlation_id,
            publish: Some(publish),
            replies,
            deadline: Box::pin(tokio::time::sleep(ttl)),
            cancelled: Box::pin(async move { cancel.cancelled().await }),
            finished: false,
        }
    }

    pub fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Remove the correlation registration. Idempotent.
    fn finish(&mut self) {
        if std::mem::replace(&mut self.finished, true) {
            return;
        }
        self.publish = None;
        self.replies.close();
        if let Some(core) = self.core.upgrade() {
            core.end_conversation(&self.correlation_id);
        }
    }

    fn transport_failed(&self) -> bool {
        self.core
            .upgrade()
            .is_some_and(|core| core.transport_failed())
    }
}

impl Stream for ResponseStream {
    type Item = Result<DeliveryArgs, ChannelError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        if this.finished {
            return Poll::Ready(None);
        }

        if this.cancelled.as_mut().poll(cx).is_ready() {
            this.finish();
            return Poll::Ready(Some(Err(ChannelError::Cancelled)));
        }

        if this.publish.is_some() {
            if let Some(core) = this.core.upgrade() {
                if core.is_disposed() || core.transport_failed() {
                    let failed = core.transport_failed();
                    this.finish();
                    return Poll::Ready(failed.then_some(Err(TransportError::Closed.into())));
                }
            }
        }

        if let Some(publish) = this.publish.as_mut() {
            match publish.as_mut().poll(cx) {
                Poll::Ready(Ok(())) => this.publish = None,
                Poll::Ready(Err(err)) => {
                    this.finish();
                    return Poll::Ready(Some(Err(err)));
                }
                Poll::Pending => {
                    if this.deadline.as_mut().poll(cx).is_ready() {
                        this.finish();
                        return Poll::Ready(None);
                    }
                    return Poll::Pending;
                }
            }
        }

        if this.deadline.as_mut().poll(cx).is_ready() {
            debug!(correlation_id = %this.correlation_id, "Conversation TTL elapsed");
            this.finish();
            return Poll::Ready(None);
        }

        match this.replies.poll_recv(cx) {
            Poll::Ready(Some(reply)) => Poll::Ready(Some(Ok(reply))),
            Poll::Ready(None) => {
                let failed = this.transport_failed();
                this.finish();
                Poll::Ready(failed.then_some(Err(TransportError::Closed.into())))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for ResponseStream {
    fn drop(&mut self) {
        self.finish();
    }
}

impl fmt::Debug for ResponseStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseStream")
            .field("correlation_id", &self.correlation_id)
            .field("published", &self.publish.is_none())
            .field("finished", &self.finished)
            .finish()
    }
}
