//! # Handler Table
//!
//! Explicit `(intent, payload type) -> handler` routing, built once before
//! a channel starts listening. The channel checks the table against the
//! contract when `listen` is called.
//!
//! [`HandlerTable::dispatch`] runs a single delivery through the table, for
//! callers that drain a backlog themselves.

use crate::delivery::DeliveryArgs;
use crate::error::ChannelError;
use crate::payload::Payload;
use applet_types::{EventKey, MessageIntentId, PayloadType};
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Error type handlers may fail with.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub type HandlerResult = Result<(), BoxError>;

/// Type-erased async handler.
pub type DeliveryHandler =
    Arc<dyn Fn(DeliveryArgs) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// What [`HandlerTable::dispatch`] did with a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    Handled,
    /// No route and no fallback.
    Unrouted,
    /// The envelope outlived its TTL; no handler ran.
    Expired,
}

/// Immutable routing table handed to `AppletChannel::listen`.
#[derive(Clone, Default)]
pub struct HandlerTable {
    routes: HashMap<EventKey, DeliveryHandler>,
    fallback: Option<DeliveryHandler>,
    catch_all: bool,
}

impl HandlerTable {
    pub fn builder() -> HandlerTableBuilder {
        HandlerTableBuilder::default()
    }

    /// A table that sends every event to one handler.
    pub fn catch_all<F, Fut>(handler: F) -> Self
    where
        F: Fn(DeliveryArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let mut table = Self::builder().fallback(handler).build();
        table.catch_all = true;
        table
    }

    /// True only for tables made by [`HandlerTable::catch_all`]. Such a
    /// table stands in for every event key of a contract.
    pub fn is_catch_all(&self) -> bool {
        self.catch_all
    }

    pub fn keys(&self) -> impl Iterator<Item = &EventKey> {
        self.routes.keys()
    }

    pub fn contains(&self, key: &EventKey) -> bool {
        self.routes.contains_key(key)
    }

    pub fn has_fallback(&self) -> bool {
        self.fallback.is_some()
    }

    /// Exact route first, then the fallback.
    pub fn handler_for(&self, key: &EventKey) -> Option<&DeliveryHandler> {
        self.routes.get(key).or(self.fallback.as_ref())
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Run one delivery through the table.
    ///
    /// A failing handler surfaces as [`ChannelError::Handler`]; `cancel`
    /// abandons the handler with [`ChannelError::Cancelled`].
    pub async fn dispatch(
        &self,
        args: DeliveryArgs,
        cancel: &CancellationToken,
    ) -> Result<Dispatched, ChannelError> {
        if args.envelope().is_expired() {
            return Ok(Dispatched::Expired);
        }
        let key = EventKey::new(args.intent().clone(), args.payload_type());
        let Some(handler) = self.handler_for(&key) else {
            return Ok(Dispatched::Unrouted);
        };
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(ChannelError::Cancelled),
            result = handler(args) => result
                .map(|()| Dispatched::Handled)
                .map_err(ChannelError::Handler),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl fmt::Debug for HandlerTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerTable")
            .field("routes", &self.routes.keys().collect::<Vec<_>>())
            .field("fallback", &self.fallback.is_some())
            .field("catch_all", &self.catch_all)
            .finish()
    }
}

#[derive(Default)]
pub struct HandlerTableBuilder {
    routes: HashMap<EventKey, DeliveryHandler>,
    fallback: Option<DeliveryHandler>,
}

impl HandlerTableBuilder {
    /// Route one `(intent, payload type)` pair. A later route for the same
    /// pair replaces the earlier one.
    #[must_use]
    pub fn route<F, Fut>(
        mut self,
        intent: MessageIntentId,
        payload_type: PayloadType,
        handler: F,
    ) -> Self
    where
        F: Fn(DeliveryArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.routes
            .insert(EventKey::new(intent, payload_type), erase(handler));
        self
    }

    /// Route a registered payload, decoded before the handler runs.
    #[must_use]
    pub fn route_payload<T, F, Fut>(self, intent: MessageIntentId, handler: F) -> Self
    where
        T: Payload,
        F: Fn(DeliveryArgs, T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let handler = Arc::new(handler);
        self.route(intent, T::PAYLOAD_TYPE, move |args: DeliveryArgs| {
            let handler = Arc::clone(&handler);
            async move {
                let payload = args.payload::<T>().await?;
                handler(args, payload).await
            }
        })
    }

    /// Handler for events without an exact route.
    #[must_use]
    pub fn fallback<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(DeliveryArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.fallback = Some(erase(handler));
        self
    }

    pub fn build(self) -> HandlerTable {
        HandlerTable {
            routes: self.routes,
            fallback: self.fallback,
            catch_all: false,
        }
    }
}

fn erase<F, Fut>(handler: F) -> DeliveryHandler
where
    F: Fn(DeliveryArgs) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(move |args| Box::pin(handler(args)))
}
