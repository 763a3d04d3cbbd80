#![allow(dead_code)]

use bytes::Bytes;
use chrono::Duration;
use share_core::{
    get_database_pool, run_migrations, AppState, Clock, DatabaseManager, FileManager,
    FileManagerConfig, FileRepository, FileUpload, FsBlobStore, JwtService, ManualClock,
};
use std::{path::PathBuf, sync::Arc};
use tempfile::TempDir;

pub const TEST_SECRET: &str = "integration-test-secret-that-is-long-enough";

/// A manager backed by a real SQLite file and a real blob directory. The
/// temporary directory lives as long as the fixture.
pub struct TestEnv {
    pub manager: FileManager,
    pub pool: sqlx::SqlitePool,
    pub blob_root: PathBuf,
    pub clock: ManualClock,
    _dir: TempDir,
}

pub async fn setup_env() -> TestEnv {
    let dir = TempDir::new().unwrap();
    let database_url = format!("sqlite:{}", dir.path().join("files.db").display());
    let blob_root = dir.path().join("blobs");

    let pool = get_database_pool(&database_url, 8).await.unwrap();
    run_migrations(pool.clone()).await.unwrap();

    let blobs = FsBlobStore::new(&blob_root);
    blobs.initialize().await.unwrap();

    let clock = ManualClock::default();
    let manager = FileManager::new(
        FileManagerConfig::default(),
        Arc::new(FileRepository::new(pool.clone())),
        Arc::new(blobs),
    )
    .with_clock(Arc::new(clock.clone()));

    TestEnv {
        manager,
        pool,
        blob_root,
        clock,
        _dir: dir,
    }
}

impl TestEnv {
    pub fn upload(&self, name: &str, content: &'static [u8], max_downloads: Option<u64>) -> FileUpload {
        FileUpload {
            content: Bytes::from_static(content),
            original_name: name.to_string(),
            mime_type: "text/plain".to_string(),
            size_bytes: content.len() as u64,
            expires_at: self.clock.now() + Duration::hours(1),
            owner_id: Some("owner-1".to_string()),
            max_downloads,
        }
    }

    pub fn blob_exists(&self, storage_key: &str) -> bool {
        self.blob_root.join(storage_key).exists()
    }

    pub fn blob_count(&self) -> usize {
        std::fs::read_dir(&self.blob_root).unwrap().count()
    }

    pub async fn row_count(&self) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM files")
            .fetch_one(&self.pool)
            .await
            .unwrap()
    }

    pub fn app_state(&self) -> (AppState, JwtService) {
        let jwt = JwtService::new(TEST_SECRET).unwrap();
        let state = AppState::new(self.manager.clone())
            .with_database(DatabaseManager::new(self.pool.clone()))
            .with_auth(jwt.clone())
            .with_download_base_url("http://files.test");
        (state, jwt)
    }
}
