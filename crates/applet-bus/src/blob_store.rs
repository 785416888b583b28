//! # Persisted Blob Store
//!
//! Oversized payloads are parked here and replaced on the wire by a
//! fixed-size reference.

use crate::error::BlobStoreError;
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;
use uuid::Uuid;

/// External storage for payloads that exceed the body limit.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn upload(&self, blob_id: Uuid, content: Bytes) -> Result<(), BlobStoreError>;

    async fn download(&self, blob_id: Uuid) -> Result<Bytes, BlobStoreError>;
}

/// Blob store kept in process memory.
#[derive(Debug, Default)]
pub struct InMemoryBlobStore {
    blobs: DashMap<Uuid, Bytes>,
    uploads: AtomicU64,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    /// Total uploads accepted.
    pub fn uploads(&self) -> u64 {
        self.uploads.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn upload(&self, blob_id: Uuid, content: Bytes) -> Result<(), BlobStoreError> {
        debug!(blob_id = %blob_id, size = content.len(), "Blob uploaded");
        self.blobs.insert(blob_id, content);
        self.uploads.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn download(&self, blob_id: Uuid) -> Result<Bytes, BlobStoreError> {
        self.blobs
            .get(&blob_id)
            .map(|entry| entry.value().clone())
            .ok_or(BlobStoreError::NotFound(blob_id))
    }
}
