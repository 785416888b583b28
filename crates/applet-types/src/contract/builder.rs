use super::keys::{BroadcastKey, ResponseStreamKey, SubscriptionKey};
use super::table::AppContractTable;
use crate::entities::{Applet, MessageIntent, PayloadType};
use crate::errors::ContractBuilderError;
use crate::identity::{AppletId, MessageIntentId};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Collects contract declarations and validates them into an
/// [`AppContractTable`].
///
/// Every registration references applets and intents by id, and fails
/// immediately when the id has not been added yet.
///
/// ```rust,ignore
/// let mut builder = AppContractBuilder::new();
/// builder
///     .add_message_intent(greeting.clone(), Some("Greeting"))?
///     .add_applet(sender.clone(), None)?
///     .add_applet(receiver.clone(), None)?
///     .enable_broadcast(&sender, &greeting, PayloadType::TEXT)?
///     .enable_subscription(&receiver, &greeting, PayloadType::TEXT)?;
/// let contract = builder.build()?;
/// ```
#[derive(Debug, Default)]
pub struct AppContractBuilder {
    intents: HashMap<MessageIntentId, MessageIntent>,
    applets: HashMap<AppletId, Applet>,
    subscriptions: HashSet<SubscriptionKey>,
    broadcasts: HashSet<BroadcastKey>,
    response_streams: HashSet<ResponseStreamKey>,
}

impl AppContractBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_message_intent(
        &mut self,
        id: MessageIntentId,
        name: Option<&str>,
    ) -> Result<&mut Self, ContractBuilderError> {
        if self.intents.contains_key(&id) {
            return Err(ContractBuilderError::DuplicateIntent(id.to_string()));
        }
        let intent = MessageIntent::new(id.clone(), name)?;
        self.intents.insert(id, intent);
        Ok(self)
    }

    pub fn add_applet(
        &mut self,
        id: AppletId,
        name: Option<&str>,
    ) -> Result<&mut Self, ContractBuilderError> {
        if self.applets.contains_key(&id) {
            return Err(ContractBuilderError::DuplicateApplet(id.to_string()));
        }
        let applet = Applet::new(id.clone(), name)?;
        self.applets.insert(id, applet);
        Ok(self)
    }

    /// Allow `applet` to receive broadcasts of (`intent`, `payload_type`).
    pub fn enable_subscription(
        &mut self,
        applet: &AppletId,
        intent: &MessageIntentId,
        payload_type: PayloadType,
    ) -> Result<&mut Self, ContractBuilderError> {
        self.ensure_applet(applet)?;
        self.ensure_intent(intent)?;
        self.subscriptions.insert(SubscriptionKey {
            applet: applet.clone(),
            intent: intent.clone(),
            payload_type,
        });
        Ok(self)
    }

    /// Allow `applet` to broadcast (`intent`, `payload_type`).
    pub fn enable_broadcast(
        &mut self,
        applet: &AppletId,
        intent: &MessageIntentId,
        payload_type: PayloadType,
    ) -> Result<&mut Self, ContractBuilderError> {
        self.ensure_applet(applet)?;
        self.ensure_intent(intent)?;
        self.broadcasts.insert(BroadcastKey {
            applet: applet.clone(),
            intent: intent.clone(),
            payload_type,
        });
        Ok(self)
    }

    /// Allow `applet` to issue a fan-out request and accept one reply shape.
    pub fn enable_response_stream(
        &mut self,
        applet: &AppletId,
        request_intent: &MessageIntentId,
        request_type: PayloadType,
        response_intent: &MessageIntentId,
        response_type: PayloadType,
    ) -> Result<&mut Self, ContractBuilderError> {
        self.enable_response_streams(
            applet,
            request_intent,
            request_type,
            [(response_intent.clone(), response_type)],
        )
    }

    /// Allow `applet` to issue a fan-out request and accept several reply
    /// shapes.
    ///
    /// Nothing is registered unless every reply intent is known.
    pub fn enable_response_streams<I>(
        &mut self,
        applet: &AppletId,
        request_intent: &MessageIntentId,
        request_type: PayloadType,
        responses: I,
    ) -> Result<&mut Self, ContractBuilderError>
    where
        I: IntoIterator<Item = (MessageIntentId, PayloadType)>,
    {
        self.ensure_applet(applet)?;
        self.ensure_intent(request_intent)?;

        let responses: Vec<_> = responses.into_iter().collect();
        for (response_intent, _) in &responses {
            self.ensure_intent(response_intent)?;
        }

        for (response_intent, response_type) in responses {
            self.response_streams.insert(ResponseStreamKey {
                applet: applet.clone(),
                request_intent: request_intent.clone(),
                request_type,
                response_intent,
                response_type,
            });
        }
        Ok(self)
    }

    /// Validate completeness and freeze the contract.
    ///
    /// Every intent needs a sender path (a broadcast or a request) and a
    /// receiver path (a subscription or a response).
    pub fn build(self) -> Result<AppContractTable, ContractBuilderError> {
        if self.intents.is_empty() {
            return Err(ContractBuilderError::NoIntents);
        }
        if self.applets.is_empty() {
            return Err(ContractBuilderError::NoApplets);
        }

        let mut intents: Vec<&MessageIntent> = self.intents.values().collect();
        intents.sort_by(|a, b| a.name().cmp(b.name()));

        for intent in intents {
            let id = intent.id();
            let sendable = self.broadcasts.iter().any(|key| &key.intent == id)
                || self
                    .response_streams
                    .iter()
                    .any(|key| &key.request_intent == id);
            if !sendable {
                return Err(ContractBuilderError::NotSendable {
                    intent: intent.name().to_string(),
                });
            }

            let receivable = self.subscriptions.iter().any(|key| &key.intent == id)
                || self
                    .response_streams
                    .iter()
                    .any(|key| &key.response_intent == id);
            if !receivable {
                return Err(ContractBuilderError::NotReceivable {
                    intent: intent.name().to_string(),
                });
            }
        }

        debug!(
            intents = self.intents.len(),
            applets = self.applets.len(),
            subscriptions = self.subscriptions.len(),
            broadcasts = self.broadcasts.len(),
            response_streams = self.response_streams.len(),
            "Contract validated"
        );

        Ok(AppContractTable::new(
            self.intents,
            self.applets,
            self.subscriptions,
            self.broadcasts,
            self.response_streams,
        ))
    }

    fn ensure_applet(&self, id: &AppletId) -> Result<(), ContractBuilderError> {
        if self.applets.contains_key(id) {
            Ok(())
        } else {
            Err(ContractBuilderError::UnknownApplet(id.to_string()))
        }
    }

    fn ensure_intent(&self, id: &MessageIntentId) -> Result<(), ContractBuilderError> {
        if self.intents.contains_key(id) {
            Ok(())
        } else {
            Err(ContractBuilderError::UnknownIntent(id.to_string()))
        }
    }
}
