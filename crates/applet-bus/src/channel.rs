//! # Applet Channel
//!
//! The per-applet endpoint. Every outbound message is checked against the
//! contract before it reaches the transport, and every inbound message is
//! checked again before it reaches a handler or a reply stream.
//!
//! ## Inbound Routing
//!
//! One dispatcher task per channel drains the transport subscription:
//!
//! ```text
//! transport ──► self-echo? ──► expired? ──► addressed elsewhere?
//!                                                 │
//!                     ┌───────────────────────────┴───────────────┐
//!                     ▼                                           ▼
//!           correlation pending?                      subscription granted?
//!           reply stream sink                         event buffer ──► listener
//! ```
//!
//! Handlers run one at a time on the listener task.
//!
//! ## Lifecycle
//!
//! `dispose()` is idempotent. It stops the dispatcher and heartbeat tasks,
//! completes every open reply stream and detaches from the transport.
//! Every later operation fails with [`ChannelError::Disposed`].

use crate::config::BusConfig;
use crate::conversation::ResponseStream;
use crate::delivery::DeliveryArgs;
use crate::error::{ChannelError, TransportError};
use crate::handlers::{Dispatched, HandlerResult, HandlerTable};
use crate::payload::{Heartbeat, Payload};
use crate::serializer::DtoSerializer;
use crate::transport::{EnvelopeFilter, Subscription, Transport};
use applet_types::{
    unix_millis, AppContract, Applet, AppletId, ContractViolationError, CorrelationId,
    DispatchArgs, EventKey, MessageIntentId, PayloadType, Permission, ReservedIntent,
};
use dashmap::DashMap;
use futures::FutureExt;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

/// Counters for one channel instance.
#[derive(Debug, Default)]
pub struct ChannelStats {
    /// Envelopes handed to the transport
    pub published: AtomicU64,
    /// Inbound envelopes that passed the echo, expiry and address filters
    pub received: AtomicU64,
    /// Replies handed to a reply stream
    pub replies_routed: AtomicU64,
    /// Events buffered for the listener
    pub events_queued: AtomicU64,
    /// Inbound envelopes discarded (expired, not permitted, buffer full)
    pub dropped: AtomicU64,
    /// Heartbeats emitted
    pub heartbeats: AtomicU64,
    /// Handler invocations that returned an error
    pub handler_failures: AtomicU64,
}

/// Publication options for [`AppletChannel::emit_event`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmitOptions {
    /// Receivers drop the event once this has elapsed since publication.
    pub ttl: Option<Duration>,
    /// Publish after this delay instead of immediately.
    pub delay: Option<Duration>,
}

impl EmitOptions {
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// Shared state behind an [`AppletChannel`] and its background tasks.
pub struct ChannelCore {
    // =========================================================================
    // IDENTITY
    // =========================================================================
    applet: Applet,

    /// Distinguishes this runtime instance from other instances of the applet.
    instance_id: Uuid,

    // =========================================================================
    // COLLABORATORS
    // =========================================================================
    contract: Arc<dyn AppContract>,
    serializer: Arc<DtoSerializer>,
    transport: Arc<dyn Transport>,
    config: BusConfig,

    // =========================================================================
    // MUTABLE STATE
    // =========================================================================
    /// Open conversations by correlation id.
    pending: DashMap<CorrelationId, mpsc::UnboundedSender<DeliveryArgs>>,

    /// Event buffer. Taken by the listener while it runs.
    events: Mutex<Option<mpsc::Receiver<DeliveryArgs>>>,

    last_outbound: Mutex<Instant>,
    heartbeat_sequence: AtomicU64,
    disposed: AtomicBool,
    transport_failed: AtomicBool,
    shutdown: CancellationToken,

    stats: ChannelStats,
}

impl ChannelCore {
    fn applet_id(&self) -> &AppletId {
        self.applet.id()
    }

    fn ensure_open(&self) -> Result<(), ChannelError> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(ChannelError::Disposed {
                applet: self.applet.name().to_string(),
            });
        }
        Ok(())
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    pub(crate) fn transport_failed(&self) -> bool {
        self.transport_failed.load(Ordering::Acquire)
    }

    pub(crate) fn end_conversation(&self, correlation_id: &CorrelationId) {
        if self.pending.remove(correlation_id).is_some() {
            trace!(correlation_id = %correlation_id, "Conversation closed");
        }
    }

    // =========================================================================
    // CONTRACT CHECKS
    // =========================================================================

    fn may_emit(&self, intent: &MessageIntentId, payload_type: PayloadType) -> bool {
        ReservedIntent::from_id(intent).is_some()
            || self
                .contract
                .is_valid_event(self.applet_id(), intent, payload_type)
    }

    /// Outbound check for caller-built envelopes: reserved intents, granted
    /// broadcasts and granted requests pass.
    fn ensure_sendable(&self, args: &DispatchArgs) -> Result<(), ContractViolationError> {
        let payload_type = args.logical_payload_type();
        if self.may_emit(&args.intent, payload_type)
            || self
                .contract
                .is_valid_request(self.applet_id(), &args.intent, payload_type)
        {
            return Ok(());
        }
        // A correlated envelope without a destination opens a conversation.
        let permission = if args.correlation_id.is_some() && args.destination.is_none() {
            Permission::Request
        } else {
            Permission::Event
        };
        Err(self.violation(permission, &args.intent, payload_type))
    }

    fn violation(
        &self,
        permission: Permission,
        intent: &MessageIntentId,
        payload_type: PayloadType,
    ) -> ContractViolationError {
        ContractViolationError::Forbidden {
            permission,
            applet: self.applet.name().to_string(),
            intent: self.intent_label(intent),
            payload_type: self.payload_label(payload_type),
        }
    }

    fn intent_label(&self, intent: &MessageIntentId) -> String {
        self.contract
            .get_intent(intent)
            .map_or_else(|_| intent.to_string(), |i| i.name().to_string())
    }

    fn payload_label(&self, payload_type: PayloadType) -> String {
        self.serializer
            .type_name(payload_type)
            .map_or_else(|| payload_type.to_string(), str::to_string)
    }

    fn validate_handlers(&self, table: &HandlerTable) -> Result<(), ContractViolationError> {
        let applet = self.applet_id();
        if !self.contract.is_event_listener(applet) {
            return Err(ContractViolationError::NotAListener {
                applet: self.applet.name().to_string(),
            });
        }
        if self.contract.is_permissive() {
            return Ok(());
        }

        let required = self.contract.get_event_keys(applet);
        if let Some(extra) = table.keys().find(|key| !required.contains(key)) {
            return Err(ContractViolationError::RedundantHandler {
                applet: self.applet.name().to_string(),
                intent: self.intent_label(&extra.intent),
                payload_type: self.payload_label(extra.payload_type),
            });
        }
        if table.is_catch_all() {
            return Ok(());
        }

        let mut missing: Vec<String> = required
            .iter()
            .filter(|key| !table.contains(key))
            .map(|key| {
                format!(
                    "{} ({})",
                    self.intent_label(&key.intent),
                    self.payload_label(key.payload_type)
                )
            })
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        missing.sort();
        Err(ContractViolationError::MissingHandlers {
            applet: self.applet.name().to_string(),
            missing: missing.join(", "),
        })
    }

    // =========================================================================
    // OUTBOUND
    // =========================================================================

    fn touch(&self) {
        *self.last_outbound.lock() = Instant::now();
    }

    fn last_outbound(&self) -> Instant {
        *self.last_outbound.lock()
    }

    /// Stamp and publish. Contract checks happen before this.
    async fn publish(&self, mut args: DispatchArgs) -> Result<(), ChannelError> {
        self.ensure_open()?;
        args.stamp(self.applet_id().clone(), self.instance_id);
        let envelope = Arc::new(args);

        let receivers = match self.transport.publish(Arc::clone(&envelope)).await {
            Ok(receivers) => receivers,
            Err(err) => {
                if err == TransportError::Closed {
                    self.transport_failed.store(true, Ordering::Release);
                }
                return Err(err.into());
            }
        };
        self.touch();
        self.stats.published.fetch_add(1, Ordering::Relaxed);

        debug!(
            applet = %self.applet,
            intent = %envelope.intent,
            payload_type = %envelope.payload_type,
            correlation_id = ?envelope.correlation_id,
            receivers,
            "Message published"
        );
        Ok(())
    }

    /// Check and publish a caller-built envelope.
    pub(crate) async fn send(
        &self,
        args: DispatchArgs,
        cancel: &CancellationToken,
    ) -> Result<(), ChannelError> {
        self.ensure_open()?;
        self.ensure_sendable(&args)?;
        cancellable(cancel, self.publish(args)).await
    }

    async fn emit_heartbeat(&self) -> Result<(), ChannelError> {
        let heartbeat = Heartbeat {
            sequence: self.heartbeat_sequence.fetch_add(1, Ordering::Relaxed) + 1,
            applet: self.applet.name().to_string(),
            instance: self.instance_id,
        };
        let package = self.serializer.pack(&heartbeat).await?;
        let content_type = self.serializer.content_type(package.payload_type);
        let args = DispatchArgs::new(ReservedIntent::Heartbeat.id(), package, content_type)
            .with_ttl(self.config.heartbeat_interval);

        self.publish(args).await?;
        self.stats.heartbeats.fetch_add(1, Ordering::Relaxed);
        trace!(applet = %self.applet, sequence = heartbeat.sequence, "Heartbeat emitted");
        Ok(())
    }

    // =========================================================================
    // INBOUND
    // =========================================================================

    fn route(self: &Arc<Self>, envelope: Arc<DispatchArgs>, events: &mpsc::Sender<DeliveryArgs>) {
        if envelope.sender_instance == Some(self.instance_id) {
            return;
        }
        if envelope.is_expired() {
            trace!(intent = %envelope.intent, "Expired envelope dropped");
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        }
        if envelope
            .destination
            .as_ref()
            .is_some_and(|destination| destination != self.applet_id())
        {
            return;
        }
        self.stats.received.fetch_add(1, Ordering::Relaxed);

        let args = DeliveryArgs::new(
            envelope,
            self.applet_id().clone(),
            Arc::clone(&self.serializer),
            Arc::downgrade(self),
        );

        let sink = args
            .correlation_id()
            .and_then(|id| self.pending.get(&id).map(|entry| entry.value().clone()));
        if let Some(sink) = sink {
            self.route_reply(&sink, args);
            return;
        }
        if let (Some(correlation_id), Some(_)) = (args.correlation_id(), args.destination()) {
            debug!(
                applet = %self.applet,
                correlation_id = %correlation_id,
                age_ms = ?correlation_id.age_at(unix_millis()),
                "Reply outside any open conversation"
            );
        }
        self.route_event(events, args);
    }

    fn route_reply(&self, sink: &mpsc::UnboundedSender<DeliveryArgs>, args: DeliveryArgs) {
        let accepted = args.reserved_intent().is_some_and(ReservedIntent::is_notice)
            || self
                .contract
                .is_valid_response(self.applet_id(), args.intent(), args.payload_type());
        if !accepted {
            warn!(
                applet = %self.applet,
                intent = %args.intent(),
                payload_type = %args.payload_type(),
                "Reply not permitted by contract, dropped"
            );
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        }

        if sink.send(args).is_ok() {
            self.stats.replies_routed.fetch_add(1, Ordering::Relaxed);
        } else {
            trace!(applet = %self.applet, "Reply for a finished conversation");
        }
    }

    fn route_event(&self, events: &mpsc::Sender<DeliveryArgs>, args: DeliveryArgs) {
        if args.reserved_intent() == Some(ReservedIntent::Heartbeat) {
            return;
        }
        if !self
            .contract
            .is_valid_subscription(self.applet_id(), args.intent(), args.payload_type())
        {
            trace!(
                applet = %self.applet,
                intent = %args.intent(),
                "Not subscribed, envelope ignored"
            );
            return;
        }

        match events.try_send(args) {
            Ok(()) => {
                self.stats.events_queued.fetch_add(1, Ordering::Relaxed);
            }
            Err(mpsc::error::TrySendError::Full(args)) => {
                warn!(
                    applet = %self.applet,
                    intent = %args.intent(),
                    capacity = self.config.event_buffer_capacity,
                    "Event buffer full, event dropped"
                );
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }

    fn on_transport_closed(&self) {
        if self.disposed.load(Ordering::Acquire) {
            return;
        }
        self.transport_failed.store(true, Ordering::Release);
        let pending = self.pending.len();
        self.pending.clear();
        warn!(applet = %self.applet, pending, "Transport closed, channel detached");
    }

    async fn run_listener(
        &self,
        table: HandlerTable,
        cancel: &CancellationToken,
    ) -> Result<(), ChannelError> {
        let receiver = self
            .events
            .lock()
            .take()
            .ok_or_else(|| ChannelError::ListenerAttached {
                applet: self.applet.name().to_string(),
            })?;
        let mut guard = ListenerGuard {
            core: self,
            receiver: Some(receiver),
        };
        let Some(receiver) = guard.receiver.as_mut() else {
            return Ok(());
        };

        info!(applet = %self.applet, routes = table.len(), "Listening for events");

        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(ChannelError::Cancelled),
                () = self.shutdown.cancelled() => return Ok(()),
                next = receiver.recv() => next,
            };
            let Some(args) = next else {
                return if self.transport_failed() {
                    Err(TransportError::Closed.into())
                } else {
                    Ok(())
                };
            };

            let key = EventKey::new(args.intent().clone(), args.payload_type());
            match table.dispatch(args, cancel).await {
                Ok(Dispatched::Handled) => {}
                Ok(Dispatched::Expired) => {
                    self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                }
                Ok(Dispatched::Unrouted) => {
                    debug!(applet = %self.applet, key = %key, "No handler for event");
                }
                Err(ChannelError::Cancelled) => return Err(ChannelError::Cancelled),
                Err(err) => {
                    self.stats.handler_failures.fetch_add(1, Ordering::Relaxed);
                    error!(applet = %self.applet, key = %key, error = %err, "Event handler failed");
                }
            }
        }
    }

    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shutdown.cancel();
        let pending = self.pending.len();
        self.pending.clear();
        info!(
            applet = %self.applet,
            instance = %self.instance_id,
            pending,
            "Channel disposed"
        );
    }
}

impl Drop for ChannelCore {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Hands the event buffer back when a listener stops.
struct ListenerGuard<'a> {
    core: &'a ChannelCore,
    receiver: Option<mpsc::Receiver<DeliveryArgs>>,
}

impl Drop for ListenerGuard<'_> {
    fn drop(&mut self) {
        *self.core.events.lock() = self.receiver.take();
    }
}

async fn cancellable<T, F>(cancel: &CancellationToken, future: F) -> Result<T, ChannelError>
where
    F: Future<Output = Result<T, ChannelError>>,
{
    if cancel.is_cancelled() {
        return Err(ChannelError::Cancelled);
    }
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(ChannelError::Cancelled),
        result = future => result,
    }
}

async fn dispatch_loop(
    core: Weak<ChannelCore>,
    mut subscription: Subscription,
    events: mpsc::Sender<DeliveryArgs>,
    shutdown: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            next = subscription.recv() => next,
        };
        let Some(core) = core.upgrade() else {
            break;
        };
        match next {
            Some(envelope) => core.route(envelope, &events),
            None => {
                core.on_transport_closed();
                break;
            }
        }
    }
    trace!("Dispatcher stopped");
}

async fn heartbeat_loop(core: Weak<ChannelCore>, interval: Duration, shutdown: CancellationToken) {
    loop {
        let Some(due) = core.upgrade().map(|core| core.last_outbound() + interval) else {
            break;
        };
        tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            () = tokio::time::sleep_until(due) => {}
        }

        let Some(core) = core.upgrade() else {
            break;
        };
        // Outbound traffic since the timer was armed pushes the deadline back.
        if core.last_outbound().elapsed() < interval {
            continue;
        }
        if let Err(err) = core.emit_heartbeat().await {
            warn!(applet = %core.applet, error = %err, "Heartbeat failed");
            if matches!(
                err,
                ChannelError::Disposed { .. } | ChannelError::Transport(TransportError::Closed)
            ) {
                break;
            }
        }
    }
    trace!("Heartbeat stopped");
}

/// Contract-enforcing endpoint of one applet.
///
/// Cheap to clone; clones share one runtime instance.
#[derive(Clone)]
pub struct AppletChannel {
    core: Arc<ChannelCore>,
}

impl AppletChannel {
    /// Attach a new channel instance for `applet` to `transport`.
    ///
    /// Fails when the contract does not know the applet. Spawns the
    /// dispatcher and heartbeat tasks, so it must run inside a Tokio runtime.
    pub fn new(
        applet: &AppletId,
        contract: Arc<dyn AppContract>,
        serializer: Arc<DtoSerializer>,
        transport: Arc<dyn Transport>,
        config: BusConfig,
    ) -> Result<Self, ChannelError> {
        config
            .validate()
            .map_err(|err| ChannelError::InvalidArgument(err.to_string()))?;
        let applet = contract.get_applet(applet)?;
        let instance_id = Uuid::new_v4();

        let filter: EnvelopeFilter =
            Arc::new(move |envelope: &DispatchArgs| envelope.sender_instance != Some(instance_id));
        let subscription = transport.subscribe(filter)?;
        let (events_tx, events_rx) = mpsc::channel(config.event_buffer_capacity);

        let core = Arc::new(ChannelCore {
            applet,
            instance_id,
            contract,
            serializer,
            transport,
            config,
            pending: DashMap::new(),
            events: Mutex::new(Some(events_rx)),
            last_outbound: Mutex::new(Instant::now()),
            heartbeat_sequence: AtomicU64::new(0),
            disposed: AtomicBool::new(false),
            transport_failed: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
            stats: ChannelStats::default(),
        });

        tokio::spawn(dispatch_loop(
            Arc::downgrade(&core),
            subscription,
            events_tx,
            core.shutdown.clone(),
        ));
        if core.config.heartbeat_enabled() {
            tokio::spawn(heartbeat_loop(
                Arc::downgrade(&core),
                core.config.heartbeat_interval,
                core.shutdown.clone(),
            ));
        }

        info!(
            applet = %core.applet,
            instance = %core.instance_id,
            heartbeat_ms = core.config.heartbeat_interval.as_millis(),
            "Channel opened"
        );
        Ok(Self { core })
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    pub fn applet(&self) -> &Applet {
        &self.core.applet
    }

    pub fn instance_id(&self) -> Uuid {
        self.core.instance_id
    }

    pub fn contract(&self) -> &Arc<dyn AppContract> {
        &self.core.contract
    }

    pub fn serializer(&self) -> &Arc<DtoSerializer> {
        &self.core.serializer
    }

    pub fn config(&self) -> &BusConfig {
        &self.core.config
    }

    pub fn stats(&self) -> &ChannelStats {
        &self.core.stats
    }

    pub fn is_disposed(&self) -> bool {
        self.core.is_disposed()
    }

    /// Number of open reply streams.
    pub fn pending_requests(&self) -> usize {
        self.core.pending.len()
    }

    // =========================================================================
    // OUTBOUND
    // =========================================================================

    /// Serialize `payload` into an envelope ready for [`Self::send`].
    pub async fn create_dispatch_args<T: Payload>(
        &self,
        intent: MessageIntentId,
        payload: &T,
    ) -> Result<DispatchArgs, ChannelError> {
        self.core.ensure_open()?;
        let serializer = &self.core.serializer;
        let package = serializer.pack(payload).await?;
        let content_type = serializer.content_type(package.payload_type);
        Ok(DispatchArgs::new(intent, package, content_type))
    }

    /// Publish a caller-built envelope.
    ///
    /// Fails with a contract violation unless the applet may broadcast or
    /// request the envelope's intent and payload type. Reserved intents are
    /// always permitted.
    pub async fn send(
        &self,
        args: DispatchArgs,
        cancel: &CancellationToken,
    ) -> Result<(), ChannelError> {
        self.core.send(args, cancel).await
    }

    pub async fn send_info(
        &self,
        message: &str,
        cancel: &CancellationToken,
    ) -> Result<(), ChannelError> {
        self.send_notice(ReservedIntent::Info, message, cancel).await
    }

    pub async fn send_warning(
        &self,
        message: &str,
        cancel: &CancellationToken,
    ) -> Result<(), ChannelError> {
        self.send_notice(ReservedIntent::Warning, message, cancel)
            .await
    }

    pub async fn send_error(
        &self,
        message: &str,
        cancel: &CancellationToken,
    ) -> Result<(), ChannelError> {
        self.send_notice(ReservedIntent::Error, message, cancel)
            .await
    }

    async fn send_notice(
        &self,
        intent: ReservedIntent,
        message: &str,
        cancel: &CancellationToken,
    ) -> Result<(), ChannelError> {
        self.core.ensure_open()?;
        let serializer = &self.core.serializer;
        let package = serializer.pack_text(message).await?;
        let content_type = serializer.content_type(package.payload_type);
        self.core
            .send(DispatchArgs::new(intent.id(), package, content_type), cancel)
            .await
    }

    /// Broadcast `payload` on `intent`.
    ///
    /// With a delay, publication happens on a background task; it is
    /// abandoned if `cancel` fires or the channel is disposed first. The TTL
    /// counts from the actual publication.
    pub async fn emit_event<T: Payload>(
        &self,
        intent: MessageIntentId,
        payload: &T,
        options: EmitOptions,
        cancel: &CancellationToken,
    ) -> Result<(), ChannelError> {
        let core = &self.core;
        core.ensure_open()?;
        if !core.may_emit(&intent, T::PAYLOAD_TYPE) {
            return Err(core
                .violation(Permission::Event, &intent, T::PAYLOAD_TYPE)
                .into());
        }

        let package = cancellable(cancel, async {
            core.serializer
                .pack(payload)
                .await
                .map_err(ChannelError::from)
        })
        .await?;
        let content_type = core.serializer.content_type(package.payload_type);
        let mut args = DispatchArgs::new(intent, package, content_type);

        let Some(delay) = options.delay.filter(|delay| !delay.is_zero()) else {
            if let Some(ttl) = options.ttl {
                args = args.with_ttl(ttl);
            }
            return cancellable(cancel, core.publish(args)).await;
        };

        let weak = Arc::downgrade(core);
        let shutdown = core.shutdown.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return,
                () = shutdown.cancelled() => return,
                () = tokio::time::sleep(delay) => {}
            }
            let Some(core) = weak.upgrade() else {
                return;
            };
            args.created_at = unix_millis();
            if let Some(ttl) = options.ttl {
                args = args.with_ttl(ttl);
            }
            if let Err(err) = core.publish(args).await {
                warn!(applet = %core.applet, error = %err, "Delayed event not published");
            }
        });
        Ok(())
    }

    /// Issue a fan-out request and stream the correlated replies.
    ///
    /// The request is published when the stream is first polled. The stream
    /// ends after `conversation_ttl`, and receivers drop the request once it
    /// has elapsed.
    pub async fn get_responses<T: Payload>(
        &self,
        intent: MessageIntentId,
        payload: &T,
        conversation_ttl: Duration,
        cancel: &CancellationToken,
    ) -> Result<ResponseStream, ChannelError> {
        let core = &self.core;
        core.ensure_open()?;
        if conversation_ttl.is_zero() {
            return Err(ChannelError::InvalidArgument(
                "conversation TTL must be positive".to_string(),
            ));
        }
        if !core
            .contract
            .is_valid_request(core.applet_id(), &intent, T::PAYLOAD_TYPE)
        {
            return Err(core
                .violation(Permission::Request, &intent, T::PAYLOAD_TYPE)
                .into());
        }

        let package = cancellable(cancel, async {
            core.serializer
                .pack(payload)
                .await
                .map_err(ChannelError::from)
        })
        .await?;
        let content_type = core.serializer.content_type(package.payload_type);
        let correlation_id = CorrelationId::new();
        let args = DispatchArgs::new(intent, package, content_type)
            .with_correlation_id(correlation_id)
            .with_ttl(conversation_ttl);

        let (replies_tx, replies_rx) = mpsc::unbounded_channel();
        core.pending.insert(correlation_id, replies_tx);
        debug!(
            applet = %core.applet,
            correlation_id = %correlation_id,
            ttl_ms = conversation_ttl.as_millis(),
            "Conversation registered"
        );

        let publisher = Arc::clone(core);
        let publish = async move { publisher.publish(args).await }.boxed();
        Ok(ResponseStream::new(
            Arc::downgrade(core),
            correlation_id,
            publish,
            replies_rx,
            conversation_ttl,
            cancel.clone(),
        ))
    }

    // =========================================================================
    // INBOUND
    // =========================================================================

    /// Dispatch events through `table` until cancelled or disposed.
    ///
    /// Unless the contract is permissive, the table must handle exactly the
    /// `(intent, payload type)` pairs the contract subscribes this applet
    /// to. Only a [`HandlerTable::catch_all`] table stands in for pairs it
    /// does not route; a builder fallback catches stray keys at runtime but
    /// does not waive the check.
    pub async fn listen(
        &self,
        table: HandlerTable,
        cancel: &CancellationToken,
    ) -> Result<(), ChannelError> {
        self.core.ensure_open()?;
        self.core.validate_handlers(&table)?;
        self.core.run_listener(table, cancel).await
    }

    /// Dispatch every permitted event to one handler.
    pub async fn listen_all<F, Fut>(
        &self,
        handler: F,
        cancel: &CancellationToken,
    ) -> Result<(), ChannelError>
    where
        F: Fn(DeliveryArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.listen(HandlerTable::catch_all(handler), cancel).await
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    /// Detach from the transport. Idempotent.
    pub fn dispose(&self) {
        self.core.dispose();
    }
}

impl std::fmt::Debug for AppletChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppletChannel")
            .field("applet", &self.core.applet)
            .field("instance_id", &self.core.instance_id)
            .field("disposed", &self.is_disposed())
            .field("pending", &self.core.pending.len())
            .finish()
    }
}
