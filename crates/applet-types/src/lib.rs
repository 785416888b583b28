//! # Applet Types
//!
//! Value types shared by every applet channel.
//!
//! ## Contents
//!
//! - **Identity:** `AppletId` and `MessageIntentId`, kind-separated identifiers
//! - **Contract:** the builder, the validated table and the permissive contract
//! - **Envelope:** `DispatchArgs`, `DtoPackage`, `PayloadType`, `CorrelationId`
//!
//! ## Contract Lifecycle
//!
//! ```text
//! add_message_intent / add_applet
//!          │
//!          ▼
//! enable_subscription / enable_broadcast / enable_response_stream
//!          │
//!          ▼
//!      build() ──► AppContractTable (immutable, shared as Arc<dyn AppContract>)
//! ```

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod contract;
pub mod correlation;
pub mod entities;
pub mod envelope;
pub mod errors;
pub mod identity;

pub use contract::{
    AppContract, AppContractBuilder, AppContractTable, BroadcastKey, EventKey, NullContract,
    ResponseStreamKey, SubscriptionKey,
};
pub use correlation::CorrelationId;
pub use entities::{Applet, MessageIntent, PayloadType, ReservedIntent};
pub use envelope::{
    unix_millis, BlobReference, DispatchArgs, DtoPackage, CONTENT_TYPE_BLOB_REF, CONTENT_TYPE_BYTES,
    CONTENT_TYPE_JSON, CONTENT_TYPE_TEXT,
};
pub use errors::{ContractBuilderError, ContractViolationError, IdentityError, Permission};
pub use identity::{
    AppletId, AppletKind, CaseInsensitiveComparer, Comparer, DefaultComparer, EntityId, IdKind,
    IdValue, IntentKind, MessageIntentId,
};
