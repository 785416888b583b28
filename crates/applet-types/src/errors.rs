//! # Error Types
//!
//! Errors raised while building identifiers and contracts, and while
//! checking runtime traffic against a contract.

use thiserror::Error;

/// Errors raised by the identity model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    /// An identifier was asked to wrap another identifier.
    #[error("{outer} cannot wrap a {inner}; pass the underlying value instead")]
    NestedIdentifier {
        outer: &'static str,
        inner: &'static str,
    },

    /// Applet and intent names must contain a non-whitespace character.
    #[error("{entity} name must not be blank (id: {id})")]
    BlankName { entity: &'static str, id: String },
}

/// Errors raised while assembling a contract.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContractBuilderError {
    #[error("Applet {0} is not registered. Use the add_applet method to register it first")]
    UnknownApplet(String),

    #[error("Message intent {0} is not registered. Use the add_message_intent method to register it first")]
    UnknownIntent(String),

    #[error("Applet {0} is already registered")]
    DuplicateApplet(String),

    #[error("Message intent {0} is already registered")]
    DuplicateIntent(String),

    #[error("The contract has no message intents. Use the add_message_intent method to register at least one")]
    NoIntents,

    #[error("The contract has no applets. Use the add_applet method to register at least one")]
    NoApplets,

    /// Nobody may send this intent.
    #[error("Message intent '{intent}' has no sender. Use enable_broadcast or enable_response_stream to grant an applet permission to send it")]
    NotSendable { intent: String },

    /// Nobody may receive this intent.
    #[error("Message intent '{intent}' has no receiver. Use enable_subscription or enable_response_stream to grant an applet permission to receive it")]
    NotReceivable { intent: String },

    #[error(transparent)]
    Identity(#[from] IdentityError),
}

/// Kind of traffic checked against the contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    Request,
    Response,
    Subscription,
    Event,
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Request => "request",
            Self::Response => "response",
            Self::Subscription => "subscription",
            Self::Event => "event",
        };
        f.write_str(name)
    }
}

/// Runtime traffic outside the declared contract.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContractViolationError {
    #[error("Unknown applet: {0}")]
    UnknownApplet(String),

    #[error("Unknown message intent: {0}")]
    UnknownIntent(String),

    #[error("The {permission} is not permitted. Applet: {applet}. Intent: {intent}. Payload type: {payload_type}")]
    Forbidden {
        permission: Permission,
        applet: String,
        intent: String,
        payload_type: String,
    },

    #[error("Applet {applet} has no subscriptions and cannot listen for events")]
    NotAListener { applet: String },

    #[error("Missing event handlers. Applet: {applet}. Missing: {missing}")]
    MissingHandlers { applet: String, missing: String },

    #[error("Redundant event handler. Applet: {applet}. Intent: {intent}. Payload type: {payload_type}")]
    RedundantHandler {
        applet: String,
        intent: String,
        payload_type: String,
    },
}
