use chrono::{DateTime, SubsecRound, Utc};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::error::{AppError, Result};
use crate::storage::{BlobStore, BlobStream};
use super::keys::{derive_storage_key, generate_download_token};
use super::models::{File, FileUpload};
use super::repository::FileRepositoryTrait;
use super::validation::{FileValidationConfig, FileValidator};

#[derive(Debug, Clone, Default)]
pub struct FileManagerConfig {
    pub validation: FileValidationConfig,
}

/// Owns the pairing of a metadata record with its blob.
///
/// Blob is written before the record and deleted before the record, so the
/// only inconsistency a crash can leave behind is a record whose blob is
/// missing, which reclamation still finds and finishes. A failed insert
/// after a successful blob write is compensated by deleting the blob before
/// the error is returned.
#[derive(Clone)]
pub struct FileManager {
    repository: Arc<dyn FileRepositoryTrait>,
    blobs: Arc<dyn BlobStore>,
    clock: Arc<dyn Clock>,
    validator: FileValidator,
}

impl FileManager {
    pub fn new(
        config: FileManagerConfig,
        repository: Arc<dyn FileRepositoryTrait>,
        blobs: Arc<dyn BlobStore>,
    ) -> Self {
        Self {
            repository,
            blobs,
            clock: Arc::new(SystemClock),
            validator: FileValidator::new(config.validation),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn repository(&self) -> &Arc<dyn FileRepositoryTrait> {
        &self.repository
    }

    pub fn blobs(&self) -> &Arc<dyn BlobStore> {
        &self.blobs
    }

    pub fn max_upload_size(&self) -> u64 {
        self.validator.max_file_size()
    }

    pub async fn create(&self, mut upload: FileUpload) -> Result<File> {
        let now = self.clock.now();
        // Stored timestamps carry microsecond precision.
        upload.expires_at = upload.expires_at.trunc_subsecs(6);
        self.validator.validate_upload(&upload, now)?;

        match self.try_create(&upload, now).await {
            Err(AppError::Conflict(msg)) => {
                warn!("Identifier collision on create ({}), retrying with fresh identifiers", msg);
                self.try_create(&upload, now).await
            }
            result => result,
        }
    }

    async fn try_create(&self, upload: &FileUpload, now: DateTime<Utc>) -> Result<File> {
        let id = Uuid::new_v4();
        let created_at = now.trunc_subsecs(6);

        let file = File {
            id,
            owner_id: upload.owner_id.clone(),
            original_name: upload.original_name.clone(),
            storage_key: derive_storage_key(id, &upload.original_name),
            mime_type: upload.mime_type.clone(),
            size_bytes: upload.size_bytes,
            expires_at: upload.expires_at,
            download_token: generate_download_token(),
            download_count: 0,
            max_downloads: upload.max_downloads,
            created_at,
            updated_at: created_at,
        };

        self.blobs
            .put(&file.storage_key, upload.content.clone(), &file.mime_type)
            .await
            .map_err(|e| match e {
                AppError::Storage(_) => e,
                other => AppError::Storage(other.to_string()),
            })?;

        match self.repository.insert(&file).await {
            Ok(stored) => {
                info!(
                    file_id = %stored.id,
                    size_bytes = stored.size_bytes,
                    expires_at = %stored.expires_at,
                    max_downloads = ?stored.max_downloads,
                    "file created"
                );
                Ok(stored)
            }
            Err(e) => {
                self.discard_orphan_blob(&file.storage_key).await;
                Err(e)
            }
        }
    }

    async fn discard_orphan_blob(&self, storage_key: &str) {
        match self.blobs.delete(storage_key).await {
            Ok(()) => debug!(storage_key, "removed blob after failed metadata insert"),
            Err(e) => error!(
                storage_key,
                "failed to remove blob after failed metadata insert, blob is orphaned: {}", e
            ),
        }
    }

    /// Pure lookup. Expiry and limits are the caller's policy.
    pub async fn get_by_token(&self, token: &str) -> Result<File> {
        self.repository
            .get_by_token(token)
            .await?
            .ok_or_else(|| AppError::NotFound("File not found".to_string()))
    }

    /// Scoped to `owner_id` when given; another owner's file is reported as
    /// missing.
    pub async fn get_by_id(&self, id: Uuid, owner_id: Option<&str>) -> Result<File> {
        let file = match owner_id {
            Some(owner) => self.repository.get_by_id_for_owner(id, owner).await?,
            None => self.repository.get_by_id(id).await?,
        };
        file.ok_or_else(|| AppError::NotFound("File not found".to_string()))
    }

    pub async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<File>> {
        self.repository.list_by_owner(owner_id).await
    }

    /// Consumes one download. The bound check and the increment are a single
    /// conditional update; the follow-up read only classifies a refusal.
    pub async fn register_download(&self, file: &File) -> Result<File> {
        let now = self.clock.now();

        if let Some(updated) = self.repository.increment_download_count(file.id, now).await? {
            debug!(
                file_id = %updated.id,
                download_count = updated.download_count,
                "download registered"
            );
            return Ok(updated);
        }

        match self.repository.get_by_id(file.id).await? {
            None => Err(AppError::NotFound("File not found".to_string())),
            Some(current) if current.is_expired(now) => {
                Err(AppError::Gone("File has expired".to_string()))
            }
            Some(_) => Err(AppError::LimitExceeded),
        }
    }

    pub async fn open_content(&self, file: &File) -> Result<BlobStream> {
        self.blobs.get(&file.storage_key).await
    }

    /// Blob first, then record. Both steps tolerate absence, so repeated and
    /// concurrent calls all succeed.
    pub async fn delete(&self, file: &File) -> Result<()> {
        self.blobs.delete(&file.storage_key).await.map_err(|e| {
            error!(file_id = %file.id, storage_key = %file.storage_key, "failed to delete blob: {}", e);
            e
        })?;

        if self.repository.delete(file.id).await? {
            info!(file_id = %file.id, "file deleted");
        } else {
            debug!(file_id = %file.id, "file record already absent");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::files::memory::MemoryFileRepository;
    use crate::storage::{read_to_end, MemoryBlobStore};
    use async_trait::async_trait;
    use bytes::Bytes;
    use chrono::Duration;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    struct Setup {
        manager: FileManager,
        repo: MemoryFileRepository,
        blobs: MemoryBlobStore,
        clock: ManualClock,
    }

    fn create_test_setup() -> Setup {
        let repo = MemoryFileRepository::new();
        let blobs = MemoryBlobStore::new();
        let clock = ManualClock::default();
        let manager = FileManager::new(
            FileManagerConfig::default(),
            Arc::new(repo.clone()),
            Arc::new(blobs.clone()),
        )
        .with_clock(Arc::new(clock.clone()));

        Setup { manager, repo, blobs, clock }
    }

    fn upload(clock: &ManualClock, max_downloads: Option<u64>) -> FileUpload {
        let content = Bytes::from_static(b"Hello, World!");
        FileUpload {
            size_bytes: content.len() as u64,
            content,
            original_name: "hello.txt".to_string(),
            mime_type: "text/plain".to_string(),
            expires_at: clock.now() + Duration::hours(1),
            owner_id: Some("alice".to_string()),
            max_downloads,
        }
    }

    #[tokio::test]
    async fn test_create_and_lookup() {
        let s = create_test_setup();

        let file = s.manager.create(upload(&s.clock, Some(2))).await.unwrap();
        assert_eq!(file.download_count, 0);
        assert_eq!(file.size_bytes, 13);
        assert!(file.storage_key.starts_with(&file.id.to_string()));
        assert!(s.blobs.exists(&file.storage_key).await.unwrap());
        assert_eq!(s.blobs.content_type(&file.storage_key).as_deref(), Some("text/plain"));

        assert_eq!(s.manager.get_by_token(&file.download_token).await.unwrap(), file);
        assert_eq!(s.manager.get_by_id(file.id, None).await.unwrap(), file);
        assert_eq!(s.manager.get_by_id(file.id, Some("alice")).await.unwrap(), file);
        assert!(matches!(
            s.manager.get_by_id(file.id, Some("bob")).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            s.manager.get_by_token("nope").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_create_rejects_past_expiry_without_side_effects() {
        let s = create_test_setup();
        let mut bad = upload(&s.clock, None);
        bad.expires_at = s.clock.now();

        assert!(matches!(s.manager.create(bad).await, Err(AppError::Validation(_))));
        assert!(s.repo.is_empty());
        assert!(s.blobs.is_empty());
    }

    #[tokio::test]
    async fn test_create_rejects_size_mismatch() {
        let s = create_test_setup();
        let mut bad = upload(&s.clock, None);
        bad.size_bytes += 1;

        assert!(matches!(s.manager.create(bad).await, Err(AppError::Validation(_))));
        assert!(s.blobs.is_empty());
    }

    #[tokio::test]
    async fn test_tokens_and_keys_are_unique() {
        let s = create_test_setup();
        let mut tokens = std::collections::HashSet::new();
        let mut keys = std::collections::HashSet::new();

        for _ in 0..50 {
            let file = s.manager.create(upload(&s.clock, None)).await.unwrap();
            assert!(tokens.insert(file.download_token));
            assert!(keys.insert(file.storage_key));
        }
    }

    #[tokio::test]
    async fn test_register_download_until_limit() {
        let s = create_test_setup();
        let file = s.manager.create(upload(&s.clock, Some(2))).await.unwrap();

        let first = s.manager.register_download(&file).await.unwrap();
        assert_eq!(first.download_count, 1);
        let second = s.manager.register_download(&first).await.unwrap();
        assert_eq!(second.download_count, 2);

        assert!(matches!(
            s.manager.register_download(&second).await,
            Err(AppError::LimitExceeded)
        ));
        assert_eq!(s.manager.get_by_id(file.id, None).await.unwrap().download_count, 2);
    }

    #[tokio::test]
    async fn test_register_download_on_expired_file_is_gone() {
        let s = create_test_setup();
        let file = s.manager.create(upload(&s.clock, None)).await.unwrap();

        s.clock.advance(Duration::hours(2));

        assert!(matches!(
            s.manager.register_download(&file).await,
            Err(AppError::Gone(_))
        ));
    }

    #[tokio::test]
    async fn test_register_download_on_deleted_file_is_not_found() {
        let s = create_test_setup();
        let file = s.manager.create(upload(&s.clock, None)).await.unwrap();
        s.manager.delete(&file).await.unwrap();

        assert!(matches!(
            s.manager.register_download(&file).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_unbounded_downloads_keep_counting() {
        let s = create_test_setup();
        let mut file = s.manager.create(upload(&s.clock, None)).await.unwrap();

        for expected in 1..=10 {
            file = s.manager.register_download(&file).await.unwrap();
            assert_eq!(file.download_count, expected);
        }
    }

    #[tokio::test]
    async fn test_open_content_streams_bytes() {
        let s = create_test_setup();
        let file = s.manager.create(upload(&s.clock, None)).await.unwrap();

        let data = read_to_end(s.manager.open_content(&file).await.unwrap()).await.unwrap();
        assert_eq!(data, b"Hello, World!");
    }

    #[tokio::test]
    async fn test_delete_removes_both_and_is_idempotent() {
        let s = create_test_setup();
        let file = s.manager.create(upload(&s.clock, None)).await.unwrap();

        s.manager.delete(&file).await.unwrap();
        assert!(!s.blobs.exists(&file.storage_key).await.unwrap());
        assert!(matches!(
            s.manager.get_by_id(file.id, None).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            s.manager.get_by_token(&file.download_token).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            s.manager.open_content(&file).await,
            Err(AppError::NotFound(_))
        ));

        s.manager.delete(&file).await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_deletes_both_succeed() {
        let s = create_test_setup();
        let file = s.manager.create(upload(&s.clock, None)).await.unwrap();

        let (a, b) = tokio::join!(s.manager.delete(&file), s.manager.delete(&file));
        assert!(a.is_ok());
        assert!(b.is_ok());
        assert!(s.repo.is_empty());
        assert!(s.blobs.is_empty());
    }

    #[tokio::test]
    async fn test_list_by_owner_newest_first() {
        let s = create_test_setup();
        let first = s.manager.create(upload(&s.clock, None)).await.unwrap();
        s.clock.advance(Duration::seconds(5));
        let second = s.manager.create(upload(&s.clock, None)).await.unwrap();

        let mut anonymous = upload(&s.clock, None);
        anonymous.owner_id = None;
        s.manager.create(anonymous).await.unwrap();

        let listed: Vec<Uuid> = s
            .manager
            .list_by_owner("alice")
            .await
            .unwrap()
            .into_iter()
            .map(|f| f.id)
            .collect();
        assert_eq!(listed, vec![second.id, first.id]);
    }

    /// Delegates to a memory repository but fails the next inserts with the
    /// queued errors.
    struct FailingInsertRepository {
        inner: MemoryFileRepository,
        failures: Mutex<VecDeque<AppError>>,
    }

    #[async_trait]
    impl FileRepositoryTrait for FailingInsertRepository {
        async fn insert(&self, file: &File) -> Result<File> {
            let failure = self.failures.lock().pop_front();
            match failure {
                Some(err) => Err(err),
                None => self.inner.insert(file).await,
            }
        }
        async fn get_by_id(&self, id: Uuid) -> Result<Option<File>> {
            self.inner.get_by_id(id).await
        }
        async fn get_by_id_for_owner(&self, id: Uuid, owner_id: &str) -> Result<Option<File>> {
            self.inner.get_by_id_for_owner(id, owner_id).await
        }
        async fn get_by_token(&self, token: &str) -> Result<Option<File>> {
            self.inner.get_by_token(token).await
        }
        async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<File>> {
            self.inner.list_by_owner(owner_id).await
        }
        async fn increment_download_count(&self, id: Uuid, now: DateTime<Utc>) -> Result<Option<File>> {
            self.inner.increment_download_count(id, now).await
        }
        async fn delete(&self, id: Uuid) -> Result<bool> {
            self.inner.delete(id).await
        }
        async fn list_expired(&self, now: DateTime<Utc>, limit: u32) -> Result<Vec<File>> {
            self.inner.list_expired(now, limit).await
        }
        async fn list_exhausted(&self, now: DateTime<Utc>, limit: u32) -> Result<Vec<File>> {
            self.inner.list_exhausted(now, limit).await
        }
    }

    fn failing_setup(failures: Vec<AppError>) -> (FileManager, MemoryFileRepository, MemoryBlobStore, ManualClock) {
        let inner = MemoryFileRepository::new();
        let blobs = MemoryBlobStore::new();
        let clock = ManualClock::default();
        let repo = FailingInsertRepository {
            inner: inner.clone(),
            failures: Mutex::new(failures.into()),
        };
        let manager = FileManager::new(FileManagerConfig::default(), Arc::new(repo), Arc::new(blobs.clone()))
            .with_clock(Arc::new(clock.clone()));
        (manager, inner, blobs, clock)
    }

    #[tokio::test]
    async fn test_failed_insert_removes_blob() {
        let (manager, repo, blobs, clock) =
            failing_setup(vec![AppError::Database("disk full".to_string())]);

        let result = manager.create(upload(&clock, None)).await;
        assert!(matches!(result, Err(AppError::Database(_))));
        assert!(blobs.is_empty());
        assert!(repo.is_empty());
    }

    #[tokio::test]
    async fn test_conflict_is_retried_once() {
        let (manager, repo, blobs, clock) =
            failing_setup(vec![AppError::Conflict("token".to_string())]);

        let file = manager.create(upload(&clock, None)).await.unwrap();
        assert_eq!(repo.len(), 1);
        assert_eq!(blobs.keys(), vec![file.storage_key]);
    }

    #[tokio::test]
    async fn test_second_conflict_is_surfaced() {
        let (manager, repo, blobs, clock) = failing_setup(vec![
            AppError::Conflict("token".to_string()),
            AppError::Conflict("token".to_string()),
        ]);

        let result = manager.create(upload(&clock, None)).await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
        assert!(repo.is_empty());
        assert!(blobs.is_empty());
    }

    /// Refuses every write; reads and deletes behave as on an empty store.
    struct ReadOnlyBlobStore;

    #[async_trait]
    impl BlobStore for ReadOnlyBlobStore {
        async fn put(&self, _key: &str, _data: Bytes, _content_type: &str) -> Result<()> {
            Err(AppError::IoError(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only file system",
            )))
        }
        async fn get(&self, key: &str) -> Result<BlobStream> {
            Err(AppError::NotFound(format!("Blob not found: {}", key)))
        }
        async fn delete(&self, _key: &str) -> Result<()> {
            Ok(())
        }
        async fn exists(&self, _key: &str) -> Result<bool> {
            Ok(false)
        }
        async fn health_check(&self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_blob_write_failure_is_storage_error() {
        let repo = MemoryFileRepository::new();
        let clock = ManualClock::default();
        let manager = FileManager::new(
            FileManagerConfig::default(),
            Arc::new(repo.clone()),
            Arc::new(ReadOnlyBlobStore),
        )
        .with_clock(Arc::new(clock.clone()));

        let result = manager.create(upload(&clock, Some(1))).await;
        assert!(matches!(result, Err(AppError::Storage(_))));
        assert!(repo.is_empty());
    }

    #[tokio::test]
    async fn test_far_future_expiry_is_rejected() {
        let s = create_test_setup();
        let mut far = upload(&s.clock, None);
        far.expires_at = s.clock.now() + Duration::days(365 * 9000);

        let result = s.manager.create(far).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
        assert!(s.repo.is_empty());
        assert!(s.blobs.is_empty());
    }
}
