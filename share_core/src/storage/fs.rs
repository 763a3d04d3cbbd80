use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tokio::{fs as async_fs, io::AsyncWriteExt};
use tokio_util::io::ReaderStream;
use tracing::{debug, error, warn};

use super::{BlobStore, BlobStream};
use crate::error::{AppError, Result};

/// Blob store backed by a flat local directory, one file per key.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn initialize(&self) -> Result<()> {
        if !self.root.exists() {
            async_fs::create_dir_all(&self.root).await?;
        }
        Ok(())
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty()
            || key.contains('/')
            || key.contains('\\')
            || key.contains('\0')
            || key.starts_with('.')
        {
            return Err(AppError::Storage(format!("Invalid storage key: {:?}", key)));
        }
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, key: &str, data: Bytes, _content_type: &str) -> Result<()> {
        let path = self.path_for(key)?;

        let mut file = async_fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to create blob {}: {}", key, e)))?;

        let written = async {
            file.write_all(&data).await?;
            file.sync_all().await
        }
        .await;

        if let Err(e) = written {
            error!("Failed to write blob {}: {}", key, e);
            drop(file);
            if let Err(cleanup) = async_fs::remove_file(&path).await {
                warn!("Failed to remove partial blob {}: {}", key, cleanup);
            }
            return Err(AppError::Storage(format!("Failed to write blob {}: {}", key, e)));
        }

        debug!(key, bytes = data.len(), "blob stored");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<BlobStream> {
        let path = self.path_for(key)?;

        let file = async_fs::File::open(&path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => AppError::NotFound(format!("Blob not found: {}", key)),
            _ => AppError::Storage(format!("Failed to open blob {}: {}", key, e)),
        })?;

        Ok(ReaderStream::new(file).boxed())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;

        match async_fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(key, "blob already absent");
                Ok(())
            }
            Err(e) => Err(AppError::Storage(format!("Failed to delete blob {}: {}", key, e))),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let path = self.path_for(key)?;
        Ok(async_fs::try_exists(&path).await?)
    }

    async fn health_check(&self) -> Result<()> {
        let metadata = async_fs::metadata(&self.root)
            .await
            .map_err(|e| AppError::Storage(format!("Blob root unavailable: {}", e)))?;

        if !metadata.is_dir() {
            return Err(AppError::Storage(format!(
                "Blob root is not a directory: {}",
                self.root.display()
            )));
        }
        Ok(())
    }
}
