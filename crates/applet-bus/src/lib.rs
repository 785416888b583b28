//! # Applet Bus
//!
//! Contract-validated messaging between applets.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  emit / send / get_responses   ┌──────────────┐
//! │  Applet A    │ ──────┐                        │  Applet B    │
//! │  (channel)   │       │                        │  (channel)   │
//! └──────────────┘       ▼                        └──────────────┘
//!        ▲        ┌──────────────┐  every envelope       ▲
//!        │        │  Transport   │ ──────────────────────┘
//!        └─────── │  (multicast) │   filtered per channel
//!         replies └──────────────┘
//! ```
//!
//! - **Channel:** one per applet instance; checks every message against the
//!   shared [`AppContract`](applet_types::AppContract)
//! - **Serializer:** payload registry with blob store overflow
//! - **Fan-in:** reduces correlated replies to one value
//! - **Transport:** the multicast medium; [`InMemoryTransport`] is the
//!   reference implementation
//!
//! ## Example
//!
//! ```ignore
//! let broker = InMemoryMessageBroker::new(contract, serializer, BusConfig::from_env())?;
//! let client = broker.create_channel(&client_id)?;
//! let reply = request.aggregate(&client, &CancellationToken::new()).await?;
//! ```

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::module_name_repetitions)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod blob_store;
pub mod channel;
pub mod config;
pub mod conversation;
pub mod delivery;
pub mod error;
pub mod fan_in;
pub mod handlers;
pub mod memory;
pub mod payload;
pub mod serializer;
pub mod transport;

use std::time::Duration;

pub use blob_store::{BlobStore, InMemoryBlobStore};
pub use channel::{AppletChannel, ChannelStats, EmitOptions};
pub use config::BusConfig;
pub use conversation::ResponseStream;
pub use delivery::DeliveryArgs;
pub use error::{
    BlobStoreError, ChannelError, ConfigError, FanInError, SerializationError, TransportError,
};
pub use fan_in::{aggregate_responses, FanInPolicy, FanOutRequest, FirstInWins};
pub use handlers::{
    BoxError, DeliveryHandler, Dispatched, HandlerResult, HandlerTable, HandlerTableBuilder,
};
pub use memory::{InMemoryMessageBroker, InMemoryTransport};
pub use payload::{Heartbeat, JsonCodec, Payload, PayloadCodec};
pub use serializer::{Dto, DtoSerializer, DtoSerializerBuilder, TypedDto};
pub use transport::{EnvelopeFilter, Subscription, Transport};

/// Broadcast buffer of the in-memory transport.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Events a channel buffers while no listener drains them.
pub const DEFAULT_EVENT_BUFFER_CAPACITY: usize = 256;

/// Idle time before a channel emits a heartbeat.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

/// Conversation TTL of the default fan-in policy.
pub const DEFAULT_FAN_IN_TIMEOUT: Duration = Duration::from_secs(5);

/// Serialized bodies of at least this size overflow to the blob store.
pub const DEFAULT_MAX_MESSAGE_BODY_BYTES: usize = 256 * 1024;
