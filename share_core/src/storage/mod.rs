//! Key-addressable blob storage for file content.

pub mod fs;
pub mod memory;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;

use crate::error::Result;

pub use fs::FsBlobStore;
pub use memory::MemoryBlobStore;

/// Content of a blob, delivered in chunks.
pub type BlobStream = BoxStream<'static, std::io::Result<Bytes>>;

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stores `data` under `key`. Keys are never reused, so an existing key is
    /// an error rather than an overwrite.
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> Result<()>;

    /// Opens the blob for reading. Missing keys yield `AppError::NotFound`.
    async fn get(&self, key: &str) -> Result<BlobStream>;

    /// Removes the blob. A key that is already absent is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    async fn exists(&self, key: &str) -> Result<bool>;

    /// Cheap liveness check used by the health endpoint.
    async fn health_check(&self) -> Result<()>;
}

/// Collects a blob stream into memory. Used by tests and small callers.
pub async fn read_to_end(mut stream: BlobStream) -> std::io::Result<Vec<u8>> {
    use futures_util::StreamExt;

    let mut buf = Vec::new();
    while let Some(chunk) = stream.next().await {
        buf.extend_from_slice(&chunk?);
    }
    Ok(buf)
}
