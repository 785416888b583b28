//! # In-Memory Transport
//!
//! Reference transport: one process-wide multicast stream built on
//! `tokio::sync::broadcast`. Every subscription sees every envelope in
//! publish order. Nothing is persisted.

use crate::channel::AppletChannel;
use crate::config::BusConfig;
use crate::error::{ChannelError, ConfigError, TransportError};
use crate::serializer::DtoSerializer;
use crate::transport::{EnvelopeFilter, Subscription, Transport};
use applet_types::{AppContract, AppletId, DispatchArgs};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

/// Broadcast-backed transport.
pub struct InMemoryTransport {
    /// `None` once shut down.
    sender: RwLock<Option<broadcast::Sender<Arc<DispatchArgs>>>>,

    /// Total envelopes published.
    published: AtomicU64,

    capacity: usize,
}

impl InMemoryTransport {
    /// Multicast medium buffering up to `capacity` envelopes per
    /// subscriber. A zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        if capacity == 0 {
            warn!("In-memory transport capacity raised from 0 to 1");
        }
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: RwLock::new(Some(sender)),
            published: AtomicU64::new(0),
            capacity,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender
            .read()
            .as_ref()
            .map_or(0, broadcast::Sender::receiver_count)
    }

    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_closed(&self) -> bool {
        self.sender.read().is_none()
    }

    /// Close the medium. Every subscription ends, later publishes fail.
    pub fn shutdown(&self) {
        if self.sender.write().take().is_some() {
            info!("In-memory transport shut down");
        }
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn publish(&self, envelope: Arc<DispatchArgs>) -> Result<usize, TransportError> {
        let sender = self.sender.read().clone().ok_or(TransportError::Closed)?;
        self.published.fetch_add(1, Ordering::Relaxed);

        match sender.send(envelope) {
            Ok(receivers) => Ok(receivers),
            Err(err) => {
                debug!(intent = %err.0.intent, "Envelope dropped (no subscribers)");
                Ok(0)
            }
        }
    }

    fn subscribe(&self, filter: EnvelopeFilter) -> Result<Subscription, TransportError> {
        let receiver = self
            .sender
            .read()
            .as_ref()
            .ok_or(TransportError::Closed)?
            .subscribe();

        let stream = BroadcastStream::new(receiver).filter_map(move |next| match next {
            Ok(envelope) => filter(&envelope).then_some(envelope),
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                warn!(skipped, "Subscription lagged, envelopes skipped");
                None
            }
        });
        Ok(Subscription::new(stream))
    }
}

/// Factory for channels sharing one in-memory transport.
pub struct InMemoryMessageBroker {
    transport: Arc<InMemoryTransport>,
    contract: Arc<dyn AppContract>,
    serializer: Arc<DtoSerializer>,
    config: BusConfig,
}

impl InMemoryMessageBroker {
    pub fn new(
        contract: Arc<dyn AppContract>,
        serializer: Arc<DtoSerializer>,
        config: BusConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            transport: Arc::new(InMemoryTransport::new(config.channel_capacity)),
            contract,
            serializer,
            config,
        })
    }

    /// Open a channel for `applet`. Must run inside a Tokio runtime.
    pub fn create_channel(&self, applet: &AppletId) -> Result<AppletChannel, ChannelError> {
        AppletChannel::new(
            applet,
            Arc::clone(&self.contract),
            Arc::clone(&self.serializer),
            self.transport.clone(),
            self.config.clone(),
        )
    }

    pub fn transport(&self) -> &Arc<InMemoryTransport> {
        &self.transport
    }

    pub fn contract(&self) -> &Arc<dyn AppContract> {
        &self.contract
    }

    pub fn serializer(&self) -> &Arc<DtoSerializer> {
        &self.serializer
    }

    pub fn config(&self) -> &BusConfig {
        &self.config
    }
}
