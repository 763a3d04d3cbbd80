use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::{collections::HashMap, sync::Arc};
use uuid::Uuid;

use crate::error::{AppError, Result};
use super::models::File;
use super::repository::FileRepositoryTrait;

#[derive(Default)]
struct Inner {
    next_seq: u64,
    files: HashMap<Uuid, (u64, File)>,
}

/// In-process metadata repository. Every operation runs under one lock, so
/// the conditional increment is atomic exactly like the SQL statement.
#[derive(Clone, Default)]
pub struct MemoryFileRepository {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryFileRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl FileRepositoryTrait for MemoryFileRepository {
    async fn insert(&self, file: &File) -> Result<File> {
        let mut inner = self.inner.lock();

        if inner.files.contains_key(&file.id) {
            return Err(AppError::Conflict(format!("Duplicate file id {}", file.id)));
        }
        if inner.files.values().any(|(_, f)| {
            f.storage_key == file.storage_key || f.download_token == file.download_token
        }) {
            return Err(AppError::Conflict("Duplicate storage key or download token".to_string()));
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.files.insert(file.id, (seq, file.clone()));
        Ok(file.clone())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<File>> {
        Ok(self.inner.lock().files.get(&id).map(|(_, f)| f.clone()))
    }

    async fn get_by_id_for_owner(&self, id: Uuid, owner_id: &str) -> Result<Option<File>> {
        Ok(self
            .inner
            .lock()
            .files
            .get(&id)
            .filter(|(_, f)| f.is_owned_by(owner_id))
            .map(|(_, f)| f.clone()))
    }

    async fn get_by_token(&self, token: &str) -> Result<Option<File>> {
        Ok(self
            .inner
            .lock()
            .files
            .values()
            .find(|(_, f)| f.download_token == token)
            .map(|(_, f)| f.clone()))
    }

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<File>> {
        let inner = self.inner.lock();
        let mut owned: Vec<&(u64, File)> = inner
            .files
            .values()
            .filter(|(_, f)| f.is_owned_by(owner_id))
            .collect();
        owned.sort_by(|(seq_a, a), (seq_b, b)| {
            b.created_at.cmp(&a.created_at).then(seq_b.cmp(seq_a))
        });
        Ok(owned.into_iter().map(|(_, f)| f.clone()).collect())
    }

    async fn increment_download_count(&self, id: Uuid, now: DateTime<Utc>) -> Result<Option<File>> {
        let mut inner = self.inner.lock();

        match inner.files.get_mut(&id) {
            Some((_, file)) if !file.is_expired(now) && !file.is_exhausted() => {
                file.download_count += 1;
                file.updated_at = now;
                Ok(Some(file.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        Ok(self.inner.lock().files.remove(&id).is_some())
    }

    async fn list_expired(&self, now: DateTime<Utc>, limit: u32) -> Result<Vec<File>> {
        let inner = self.inner.lock();
        let mut expired: Vec<File> = inner
            .files
            .values()
            .filter(|(_, f)| f.is_expired(now))
            .map(|(_, f)| f.clone())
            .collect();
        expired.sort_by_key(|f| f.expires_at);
        expired.truncate(limit as usize);
        Ok(expired)
    }

    async fn list_exhausted(&self, now: DateTime<Utc>, limit: u32) -> Result<Vec<File>> {
        let inner = self.inner.lock();
        let mut exhausted: Vec<File> = inner
            .files
            .values()
            .filter(|(_, f)| !f.is_expired(now) && f.is_exhausted())
            .map(|(_, f)| f.clone())
            .collect();
        exhausted.sort_by_key(|f| f.updated_at);
        exhausted.truncate(limit as usize);
        Ok(exhausted)
    }
}
