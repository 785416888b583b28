use super::{AppContract, EventKey};
use crate::entities::{Applet, MessageIntent, PayloadType, ReservedIntent};
use crate::errors::ContractViolationError;
use crate::identity::{AppletId, MessageIntentId};
use std::collections::HashSet;

/// Permissive contract: every predicate holds, lookups never fail.
///
/// Use it when contract enforcement is intentionally disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullContract;

impl AppContract for NullContract {
    fn is_valid_request(&self, _: &AppletId, _: &MessageIntentId, _: PayloadType) -> bool {
        true
    }

    fn is_valid_response(&self, _: &AppletId, _: &MessageIntentId, _: PayloadType) -> bool {
        true
    }

    fn is_valid_subscription(&self, _: &AppletId, _: &MessageIntentId, _: PayloadType) -> bool {
        true
    }

    fn is_valid_event(&self, _: &AppletId, _: &MessageIntentId, _: PayloadType) -> bool {
        true
    }

    fn is_event_listener(&self, _: &AppletId) -> bool {
        true
    }

    fn get_intent(&self, id: &MessageIntentId) -> Result<MessageIntent, ContractViolationError> {
        if let Some(reserved) = ReservedIntent::from_id(id) {
            return Ok(reserved.intent());
        }
        Ok(MessageIntent::unchecked(id.clone()))
    }

    fn get_applet(&self, id: &AppletId) -> Result<Applet, ContractViolationError> {
        Ok(Applet::unchecked(id.clone()))
    }

    fn get_event_keys(&self, _: &AppletId) -> HashSet<EventKey> {
        HashSet::new()
    }

    fn is_permissive(&self) -> bool {
        true
    }
}
