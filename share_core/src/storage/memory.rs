use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream;
use parking_lot::RwLock;
use std::{collections::HashMap, sync::Arc};

use super::{BlobStore, BlobStream};
use crate::error::{AppError, Result};

#[derive(Debug, Clone)]
struct StoredBlob {
    data: Bytes,
    content_type: String,
}

/// In-process blob store. Clones share the same contents.
#[derive(Debug, Clone, Default)]
pub struct MemoryBlobStore {
    blobs: Arc<RwLock<HashMap<String, StoredBlob>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }

    pub fn keys(&self) -> Vec<String> {
        self.blobs.read().keys().cloned().collect()
    }

    pub fn content_type(&self, key: &str) -> Option<String> {
        self.blobs.read().get(key).map(|b| b.content_type.clone())
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> Result<()> {
        let mut blobs = self.blobs.write();
        if blobs.contains_key(key) {
            return Err(AppError::Storage(format!("Blob already exists: {}", key)));
        }
        blobs.insert(
            key.to_string(),
            StoredBlob {
                data,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<BlobStream> {
        let data = self
            .blobs
            .read()
            .get(key)
            .map(|b| b.data.clone())
            .ok_or_else(|| AppError::NotFound(format!("Blob not found: {}", key)))?;

        Ok(Box::pin(stream::once(async move { Ok(data) })))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.blobs.write().remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.blobs.read().contains_key(key))
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}
