//! # DTO Serializer
//!
//! Converts typed payloads to [`DtoPackage`]s and back.
//!
//! ## Overflow
//!
//! A serialized body of `max_message_body_bytes` or more is uploaded to the
//! blob store. The package then carries [`PayloadType::INDIRECTION`] and a
//! 32 byte reference: the blob id followed by the original payload type.
//!
//! ## Passthrough
//!
//! Raw bytes and UTF-8 text bypass the registry under the reserved
//! [`PayloadType::BYTES`] and [`PayloadType::TEXT`] tags.

use crate::blob_store::BlobStore;
use crate::error::{BlobStoreError, SerializationError};
use crate::payload::{Heartbeat, Payload};
use crate::DEFAULT_MAX_MESSAGE_BODY_BYTES;
use applet_types::{
    BlobReference, DtoPackage, PayloadType, CONTENT_TYPE_BLOB_REF, CONTENT_TYPE_BYTES, CONTENT_TYPE_JSON,
    CONTENT_TYPE_TEXT,
};
use bytes::Bytes;
use std::any::{type_name, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct PayloadDescriptor {
    payload_type: PayloadType,
    type_name: &'static str,
    type_id: TypeId,
    content_type: &'static str,
    builtin: bool,
}

impl PayloadDescriptor {
    fn of<T: Payload>(builtin: bool) -> Self {
        Self {
            payload_type: T::PAYLOAD_TYPE,
            type_name: type_name::<T>(),
            type_id: TypeId::of::<T>(),
            content_type: T::codec().content_type(),
            builtin,
        }
    }
}

/// Collects payload registrations for a [`DtoSerializer`].
pub struct DtoSerializerBuilder {
    descriptors: Vec<PayloadDescriptor>,
    blob_store: Option<Arc<dyn BlobStore>>,
    max_message_body_bytes: usize,
}

impl Default for DtoSerializerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DtoSerializerBuilder {
    pub fn new() -> Self {
        Self {
            descriptors: vec![PayloadDescriptor::of::<Heartbeat>(true)],
            blob_store: None,
            max_message_body_bytes: DEFAULT_MAX_MESSAGE_BODY_BYTES,
        }
    }

    #[must_use]
    pub fn register<T: Payload>(mut self) -> Self {
        self.descriptors.push(PayloadDescriptor::of::<T>(false));
        self
    }

    #[must_use]
    pub fn with_blob_store(mut self, store: Arc<dyn BlobStore>) -> Self {
        self.blob_store = Some(store);
        self
    }

    #[must_use]
    pub fn with_max_message_body_bytes(mut self, limit: usize) -> Self {
        self.max_message_body_bytes = limit;
        self
    }

    /// Build the registry.
    ///
    /// Fails when two types share a payload type, or when a type claims a
    /// reserved payload type. Registering the same type twice is harmless.
    pub fn build(self) -> Result<DtoSerializer, SerializationError> {
        let mut by_type: HashMap<PayloadType, PayloadDescriptor> = HashMap::new();

        for descriptor in self.descriptors {
            if !descriptor.builtin && descriptor.payload_type.is_reserved() {
                return Err(SerializationError::ReservedPayloadType {
                    payload_type: descriptor.payload_type,
                    type_name: descriptor.type_name,
                });
            }
            match by_type.get(&descriptor.payload_type) {
                Some(existing) if existing.type_id == descriptor.type_id => {}
                Some(existing) => {
                    return Err(SerializationError::DuplicatePayloadType {
                        payload_type: descriptor.payload_type,
                        first: existing.type_name,
                        second: descriptor.type_name,
                    });
                }
                None => {
                    by_type.insert(descriptor.payload_type, descriptor);
                }
            }
        }

        debug!(
            payloads = by_type.len(),
            max_message_body_bytes = self.max_message_body_bytes,
            blob_store = self.blob_store.is_some(),
            "Payload registry built"
        );

        Ok(DtoSerializer {
            by_type,
            blob_store: self.blob_store,
            max_message_body_bytes: self.max_message_body_bytes,
        })
    }
}

/// Bidirectional map between payload types and Rust types, plus the
/// overflow policy.
pub struct DtoSerializer {
    by_type: HashMap<PayloadType, PayloadDescriptor>,
    blob_store: Option<Arc<dyn BlobStore>>,
    max_message_body_bytes: usize,
}

impl fmt::Debug for DtoSerializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DtoSerializer")
            .field("payloads", &self.by_type.len())
            .field("blob_store", &self.blob_store.is_some())
            .field("max_message_body_bytes", &self.max_message_body_bytes)
            .finish()
    }
}

impl DtoSerializer {
    pub fn builder() -> DtoSerializerBuilder {
        DtoSerializerBuilder::new()
    }

    pub fn is_registered(&self, payload_type: PayloadType) -> bool {
        self.by_type.contains_key(&payload_type)
    }

    /// Rust type name registered for `payload_type`.
    pub fn type_name(&self, payload_type: PayloadType) -> Option<&'static str> {
        self.by_type.get(&payload_type).map(|d| d.type_name)
    }

    pub fn max_message_body_bytes(&self) -> usize {
        self.max_message_body_bytes
    }

    /// Content type of a package carrying `payload_type`.
    pub fn content_type(&self, payload_type: PayloadType) -> &'static str {
        if payload_type == PayloadType::INDIRECTION {
            CONTENT_TYPE_BLOB_REF
        } else if payload_type == PayloadType::BYTES {
            CONTENT_TYPE_BYTES
        } else if payload_type == PayloadType::TEXT {
            CONTENT_TYPE_TEXT
        } else {
            self.by_type
                .get(&payload_type)
                .map_or(CONTENT_TYPE_JSON, |d| d.content_type)
        }
    }

    pub async fn pack<T: Payload>(&self, payload: &T) -> Result<DtoPackage, SerializationError> {
        self.ensure_registered::<T>()?;
        let content = T::codec().encode(payload)?;
        self.seal(T::PAYLOAD_TYPE, Bytes::from(content)).await
    }

    pub async fn pack_bytes(&self, content: Bytes) -> Result<DtoPackage, SerializationError> {
        self.seal(PayloadType::BYTES, content).await
    }

    pub async fn pack_text(&self, text: &str) -> Result<DtoPackage, SerializationError> {
        self.seal(PayloadType::TEXT, Bytes::copy_from_slice(text.as_bytes()))
            .await
    }

    pub async fn unpack(&self, package: &DtoPackage) -> Result<Dto, SerializationError> {
        if package.payload_type != PayloadType::INDIRECTION {
            return self.open(package.payload_type, package.content.clone());
        }

        let BlobReference {
            blob_id,
            payload_type: original,
        } = BlobReference::decode(&package.content).ok_or(
            SerializationError::CorruptBlobReference(package.content.len()),
        )?;
        if original == PayloadType::INDIRECTION {
            return Err(SerializationError::NestedBlobReference);
        }
        let store = self
            .blob_store
            .as_ref()
            .ok_or(BlobStoreError::Unconfigured)?;
        let content = store.download(blob_id).await?;
        debug!(
            blob_id = %blob_id,
            payload_type = %original,
            size = content.len(),
            "Payload resolved from blob store"
        );
        self.open(original, content)
    }

    /// Unpack and decode as `T` in one step.
    pub async fn unpack_as<T: Payload>(
        &self,
        package: &DtoPackage,
    ) -> Result<T, SerializationError> {
        self.unpack(package).await?.decode()
    }

    fn ensure_registered<T: Payload>(&self) -> Result<(), SerializationError> {
        match self.by_type.get(&T::PAYLOAD_TYPE) {
            Some(descriptor) if descriptor.type_id == TypeId::of::<T>() => Ok(()),
            _ => Err(SerializationError::Unregistered {
                payload_type: T::PAYLOAD_TYPE,
                type_name: type_name::<T>(),
            }),
        }
    }

    async fn seal(
        &self,
        payload_type: PayloadType,
        content: Bytes,
    ) -> Result<DtoPackage, SerializationError> {
        let size = content.len();
        if size < self.max_message_body_bytes {
            return Ok(DtoPackage::new(payload_type, content));
        }

        let store = self
            .blob_store
            .as_ref()
            .ok_or(SerializationError::BlobStoreUnavailable {
                size,
                limit: self.max_message_body_bytes,
            })?;
        let blob_id = Uuid::new_v4();
        store.upload(blob_id, content).await?;

        debug!(
            blob_id = %blob_id,
            payload_type = %payload_type,
            size,
            "Payload overflowed to blob store"
        );

        let reference = BlobReference {
            blob_id,
            payload_type,
        };
        Ok(DtoPackage::new(PayloadType::INDIRECTION, reference.encode()))
    }

    fn open(&self, payload_type: PayloadType, content: Bytes) -> Result<Dto, SerializationError> {
        if payload_type == PayloadType::BYTES {
            return Ok(Dto::Bytes(content));
        }
        if payload_type == PayloadType::TEXT {
            return Ok(Dto::Text(String::from_utf8(content.to_vec())?));
        }
        let descriptor = self
            .by_type
            .get(&payload_type)
            .ok_or(SerializationError::UnknownPayloadType(payload_type))?;
        Ok(Dto::Payload(TypedDto {
            payload_type,
            type_name: descriptor.type_name,
            content,
        }))
    }
}

/// An unpacked payload, tagged by where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dto {
    /// A registered payload, decoded on demand with [`TypedDto::decode`].
    Payload(TypedDto),
    Bytes(Bytes),
    Text(String),
}

impl Dto {
    pub fn payload_type(&self) -> PayloadType {
        match self {
            Self::Payload(typed) => typed.payload_type,
            Self::Bytes(_) => PayloadType::BYTES,
            Self::Text(_) => PayloadType::TEXT,
        }
    }

    pub fn decode<T: Payload>(&self) -> Result<T, SerializationError> {
        match self {
            Self::Payload(typed) => typed.decode(),
            other => Err(SerializationError::PayloadTypeMismatch {
                expected: T::PAYLOAD_TYPE,
                found: other.payload_type(),
            }),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Self::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }
}

/// Body of a registered payload, not yet decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypedDto {
    payload_type: PayloadType,
    type_name: &'static str,
    content: Bytes,
}

impl TypedDto {
    pub fn payload_type(&self) -> PayloadType {
        self.payload_type
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn content(&self) -> &Bytes {
        &self.content
    }

    pub fn is<T: Payload>(&self) -> bool {
        self.payload_type == T::PAYLOAD_TYPE
    }

    pub fn decode<T: Payload>(&self) -> Result<T, SerializationError> {
        if !self.is::<T>() {
            return Err(SerializationError::PayloadTypeMismatch {
                expected: T::PAYLOAD_TYPE,
                found: self.payload_type,
            });
        }
        T::codec().decode(&self.content)
    }
}
