//! # Core Entities
//!
//! Applets, message intents, payload type tags and the reserved intents
//! every applet may use regardless of its contract.

use crate::errors::IdentityError;
use crate::identity::{AppletId, MessageIntentId};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Name for an entity whose id renders blank.
const UNNAMED: &str = "(unnamed)";

/// Id display form, or [`UNNAMED`] when that is blank. Never fails.
fn fallback_name(id: &dyn fmt::Display) -> String {
    let name = id.to_string();
    match name.trim() {
        "" => UNNAMED.to_string(),
        trimmed => trimmed.to_string(),
    }
}

fn normalize_name(
    entity: &'static str,
    name: Option<&str>,
    id: &dyn fmt::Display,
) -> Result<String, IdentityError> {
    let name = match name {
        Some(name) => name.trim().to_string(),
        None => id.to_string().trim().to_string(),
    };
    if name.is_empty() {
        return Err(IdentityError::BlankName {
            entity,
            id: id.to_string(),
        });
    }
    Ok(name)
}

/// An addressable component of the application.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Applet {
    id: AppletId,
    name: String,
}

impl Applet {
    /// Create an applet. A missing name defaults to the id's display form.
    pub fn new(id: AppletId, name: Option<&str>) -> Result<Self, IdentityError> {
        let name = normalize_name("Applet", name, &id)?;
        Ok(Self { id, name })
    }

    /// Applet named after its id, for contracts that accept any id.
    pub(crate) fn unchecked(id: AppletId) -> Self {
        let name = fallback_name(&id);
        Self { id, name }
    }

    pub fn id(&self) -> &AppletId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Applet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// A named semantic topic or operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageIntent {
    id: MessageIntentId,
    name: String,
}

impl MessageIntent {
    /// Create an intent. A missing name defaults to the id's display form.
    pub fn new(id: MessageIntentId, name: Option<&str>) -> Result<Self, IdentityError> {
        let name = normalize_name("MessageIntent", name, &id)?;
        Ok(Self { id, name })
    }

    pub(crate) fn unchecked(id: MessageIntentId) -> Self {
        let name = fallback_name(&id);
        Self { id, name }
    }

    pub fn id(&self) -> &MessageIntentId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for MessageIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Stable schema tag of a payload shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PayloadType(Uuid);

impl PayloadType {
    /// Pointer to a payload parked in the blob store.
    pub const INDIRECTION: Self = Self(Uuid::from_u128(0xa4ed_fc93_9dad_4576_b146_dba0_aecc_983c));

    /// Raw bytes, no registry involved.
    pub const BYTES: Self = Self(Uuid::from_u128(0x5c3b_1f0e_7d2a_4e6b_9a41_0c8e_d2f7_1b35));

    /// UTF-8 text, no registry involved.
    pub const TEXT: Self = Self(Uuid::from_u128(0x8e2f_64a1_03c9_4b7d_a5e2_6f19_c07b_d448));

    /// Heartbeat payload emitted by idle channels.
    pub const HEARTBEAT: Self = Self(Uuid::from_u128(0x1d7c_9b52_e84f_4a30_8b6d_35f0_a2c1_e967));

    /// Types that user payloads may not claim.
    pub const RESERVED: [Self; 4] = [Self::INDIRECTION, Self::BYTES, Self::TEXT, Self::HEARTBEAT];

    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub const fn from_u128(value: u128) -> Self {
        Self(Uuid::from_u128(value))
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    pub fn is_reserved(&self) -> bool {
        Self::RESERVED.contains(self)
    }
}

impl fmt::Display for PayloadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for PayloadType {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Standard, uncontracted intents. Any applet may send them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReservedIntent {
    Info,
    Heartbeat,
    Warning,
    Error,
}

impl ReservedIntent {
    pub const ALL: [Self; 4] = [Self::Info, Self::Heartbeat, Self::Warning, Self::Error];

    pub const fn uuid(self) -> Uuid {
        match self {
            Self::Info => Uuid::from_u128(0x1000_0000_0000_0000_0000_0000_0000_0000),
            Self::Heartbeat => Uuid::from_u128(0x1100_0000_0000_0000_0000_0000_0000_0000),
            Self::Warning => Uuid::from_u128(0x2000_0000_0000_0000_0000_0000_0000_0000),
            Self::Error => Uuid::from_u128(0x3000_0000_0000_0000_0000_0000_0000_0000),
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Info => "Info",
            Self::Heartbeat => "Heartbeat",
            Self::Warning => "Warning",
            Self::Error => "Error",
        }
    }

    pub fn id(self) -> MessageIntentId {
        MessageIntentId::from_uuid(self.uuid())
    }

    pub fn intent(self) -> MessageIntent {
        MessageIntent {
            id: self.id(),
            name: self.name().to_string(),
        }
    }

    /// Reserved intent carried by `id`, if any.
    pub fn from_id(id: &MessageIntentId) -> Option<Self> {
        let uuid = id.downcast_ref::<Uuid>()?;
        Self::ALL.into_iter().find(|reserved| reserved.uuid() == *uuid)
    }

    /// Whether a correlated reply on this intent is always accepted.
    pub fn is_notice(self) -> bool {
        !matches!(self, Self::Heartbeat)
    }
}

impl fmt::Display for ReservedIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
