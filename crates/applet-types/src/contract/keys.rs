//! Contract keys. All of them compare by value.

use crate::entities::PayloadType;
use crate::identity::{AppletId, MessageIntentId};
use std::fmt;

/// `applet` may receive broadcasts of (`intent`, `payload_type`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionKey {
    pub applet: AppletId,
    pub intent: MessageIntentId,
    pub payload_type: PayloadType,
}

/// `applet` may emit (`intent`, `payload_type`) as a broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BroadcastKey {
    pub applet: AppletId,
    pub intent: MessageIntentId,
    pub payload_type: PayloadType,
}

/// `applet` may request (`request_intent`, `request_type`) and accept
/// replies of (`response_intent`, `response_type`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResponseStreamKey {
    pub applet: AppletId,
    pub request_intent: MessageIntentId,
    pub request_type: PayloadType,
    pub response_intent: MessageIntentId,
    pub response_type: PayloadType,
}

impl ResponseStreamKey {
    /// The request side, viewed as a broadcast.
    pub fn request_key(&self) -> BroadcastKey {
        BroadcastKey {
            applet: self.applet.clone(),
            intent: self.request_intent.clone(),
            payload_type: self.request_type,
        }
    }

    /// The reply side, viewed as an acceptable inbound key.
    pub fn reply_key(&self) -> SubscriptionKey {
        SubscriptionKey {
            applet: self.applet.clone(),
            intent: self.response_intent.clone(),
            payload_type: self.response_type,
        }
    }
}

/// Key of an event handler: (intent, payload type).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventKey {
    pub intent: MessageIntentId,
    pub payload_type: PayloadType,
}

impl EventKey {
    pub fn new(intent: MessageIntentId, payload_type: PayloadType) -> Self {
        Self {
            intent,
            payload_type,
        }
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.intent, self.payload_type)
    }
}

impl From<&SubscriptionKey> for EventKey {
    fn from(key: &SubscriptionKey) -> Self {
        Self::new(key.intent.clone(), key.payload_type)
    }
}
