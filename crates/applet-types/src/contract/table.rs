use super::keys::{BroadcastKey, EventKey, ResponseStreamKey, SubscriptionKey};
use super::AppContract;
use crate::entities::{Applet, MessageIntent, PayloadType, ReservedIntent};
use crate::errors::ContractViolationError;
use crate::identity::{AppletId, MessageIntentId};
use std::collections::{HashMap, HashSet};

/// Immutable, validated contract.
///
/// Produced only by [`AppContractBuilder::build`](super::AppContractBuilder::build).
#[derive(Debug, Clone)]
pub struct AppContractTable {
    intents: HashMap<MessageIntentId, MessageIntent>,
    applets: HashMap<AppletId, Applet>,
    subscriptions: HashSet<SubscriptionKey>,
    broadcasts: HashSet<BroadcastKey>,
    response_streams: HashSet<ResponseStreamKey>,

    // Derived indexes
    request_keys: HashSet<BroadcastKey>,
    reply_keys: HashSet<SubscriptionKey>,
    listeners: HashSet<AppletId>,
}

impl AppContractTable {
    pub(super) fn new(
        intents: HashMap<MessageIntentId, MessageIntent>,
        applets: HashMap<AppletId, Applet>,
        subscriptions: HashSet<SubscriptionKey>,
        broadcasts: HashSet<BroadcastKey>,
        response_streams: HashSet<ResponseStreamKey>,
    ) -> Self {
        let request_keys = response_streams
            .iter()
            .map(ResponseStreamKey::request_key)
            .collect();
        let reply_keys = response_streams
            .iter()
            .map(ResponseStreamKey::reply_key)
            .collect();
        let listeners = subscriptions
            .iter()
            .map(|key| key.applet.clone())
            .collect();

        Self {
            intents,
            applets,
            subscriptions,
            broadcasts,
            response_streams,
            request_keys,
            reply_keys,
            listeners,
        }
    }

    pub fn intents(&self) -> impl Iterator<Item = &MessageIntent> {
        self.intents.values()
    }

    pub fn applets(&self) -> impl Iterator<Item = &Applet> {
        self.applets.values()
    }

    pub fn response_streams(&self) -> impl Iterator<Item = &ResponseStreamKey> {
        self.response_streams.iter()
    }

    /// Applets subscribed to (`intent`, `payload_type`).
    pub fn subscribers<'a>(
        &'a self,
        intent: &'a MessageIntentId,
        payload_type: PayloadType,
    ) -> impl Iterator<Item = &'a AppletId> + 'a {
        self.subscriptions
            .iter()
            .filter(move |key| &key.intent == intent && key.payload_type == payload_type)
            .map(|key| &key.applet)
    }
}

fn broadcast_key(applet: &AppletId, intent: &MessageIntentId, payload_type: PayloadType) -> BroadcastKey {
    BroadcastKey {
        applet: applet.clone(),
        intent: intent.clone(),
        payload_type,
    }
}

fn subscription_key(
    applet: &AppletId,
    intent: &MessageIntentId,
    payload_type: PayloadType,
) -> SubscriptionKey {
    SubscriptionKey {
        applet: applet.clone(),
        intent: intent.clone(),
        payload_type,
    }
}

impl AppContract for AppContractTable {
    fn is_valid_request(
        &self,
        applet: &AppletId,
        intent: &MessageIntentId,
        payload_type: PayloadType,
    ) -> bool {
        self.request_keys
            .contains(&broadcast_key(applet, intent, payload_type))
    }

    fn is_valid_response(
        &self,
        applet: &AppletId,
        intent: &MessageIntentId,
        payload_type: PayloadType,
    ) -> bool {
        self.reply_keys
            .contains(&subscription_key(applet, intent, payload_type))
    }

    fn is_valid_subscription(
        &self,
        applet: &AppletId,
        intent: &MessageIntentId,
        payload_type: PayloadType,
    ) -> bool {
        self.subscriptions
            .contains(&subscription_key(applet, intent, payload_type))
    }

    fn is_valid_event(
        &self,
        applet: &AppletId,
        intent: &MessageIntentId,
        payload_type: PayloadType,
    ) -> bool {
        self.broadcasts
            .contains(&broadcast_key(applet, intent, payload_type))
    }

    fn is_event_listener(&self, applet: &AppletId) -> bool {
        self.listeners.contains(applet)
    }

    // Reserved intents are known to every contract.
    fn get_intent(&self, id: &MessageIntentId) -> Result<MessageIntent, ContractViolationError> {
        if let Some(intent) = self.intents.get(id) {
            return Ok(intent.clone());
        }
        ReservedIntent::from_id(id)
            .map(ReservedIntent::intent)
            .ok_or_else(|| ContractViolationError::UnknownIntent(id.to_string()))
    }

    fn get_applet(&self, id: &AppletId) -> Result<Applet, ContractViolationError> {
        self.applets
            .get(id)
            .cloned()
            .ok_or_else(|| ContractViolationError::UnknownApplet(id.to_string()))
    }

    fn get_event_keys(&self, applet: &AppletId) -> HashSet<EventKey> {
        self.subscriptions
            .iter()
            .filter(|key| &key.applet == applet)
            .map(EventKey::from)
            .collect()
    }
}
