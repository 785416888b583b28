//! # Application Contract
//!
//! The contract is the permission table of an application: which applet may
//! send or receive which intent with which payload type.
//!
//! ## Components
//!
//! - `AppContractBuilder`: collects declarations and validates completeness.
//! - `AppContractTable`: the immutable result of a successful build.
//! - `NullContract`: answers every question with "yes"; disables enforcement.
//!
//! Every query is read-only. A built contract is shared as
//! `Arc<dyn AppContract>` and read concurrently without locking.

mod builder;
mod keys;
mod null;
mod table;

pub use builder::AppContractBuilder;
pub use keys::{BroadcastKey, EventKey, ResponseStreamKey, SubscriptionKey};
pub use null::NullContract;
pub use table::AppContractTable;

use crate::entities::{Applet, MessageIntent, PayloadType};
use crate::errors::ContractViolationError;
use crate::identity::{AppletId, MessageIntentId};
use std::collections::HashSet;
use std::fmt;

/// Read-only query surface of a contract.
pub trait AppContract: Send + Sync + fmt::Debug {
    /// May `applet` issue a fan-out request of this intent and type?
    fn is_valid_request(
        &self,
        applet: &AppletId,
        intent: &MessageIntentId,
        payload_type: PayloadType,
    ) -> bool;

    /// May `applet` accept a correlated reply of this intent and type?
    fn is_valid_response(
        &self,
        applet: &AppletId,
        intent: &MessageIntentId,
        payload_type: PayloadType,
    ) -> bool;

    /// May `applet` receive broadcasts of this intent and type?
    fn is_valid_subscription(
        &self,
        applet: &AppletId,
        intent: &MessageIntentId,
        payload_type: PayloadType,
    ) -> bool;

    /// May `applet` broadcast this intent and type?
    fn is_valid_event(
        &self,
        applet: &AppletId,
        intent: &MessageIntentId,
        payload_type: PayloadType,
    ) -> bool;

    /// Does `applet` hold at least one subscription?
    fn is_event_listener(&self, applet: &AppletId) -> bool;

    fn get_intent(&self, id: &MessageIntentId) -> Result<MessageIntent, ContractViolationError>;

    fn get_applet(&self, id: &AppletId) -> Result<Applet, ContractViolationError>;

    /// The (intent, type) pairs `applet` must handle when it listens.
    fn get_event_keys(&self, applet: &AppletId) -> HashSet<EventKey>;

    /// True for contracts that waive enforcement.
    fn is_permissive(&self) -> bool {
        false
    }
}
