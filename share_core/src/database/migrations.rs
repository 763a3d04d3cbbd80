use sqlx::{SqlitePool, Row};
use tracing::{info, error};
use crate::error::{AppError, Result};

pub struct MigrationManager {
    pool: SqlitePool,
}

impl MigrationManager {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn run_migrations(&self) -> Result<()> {
        info!("Starting database migrations");

        self.create_migrations_table().await?;

        let current_version = self.get_current_version().await?;
        info!("Current migration version: {}", current_version);

        let migrations = self.get_migrations();
        let mut applied_count = 0;

        for migration in migrations {
            if migration.version > current_version {
                info!("Applying migration {}: {}", migration.version, migration.name);
                self.apply_migration(&migration).await?;
                applied_count += 1;
            }
        }

        if applied_count > 0 {
            info!("Applied {} migrations successfully", applied_count);
        } else {
            info!("No new migrations to apply");
        }

        Ok(())
    }

    async fn create_migrations_table(&self) -> Result<()> {
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                checksum TEXT NOT NULL
            )
        "#)
        .execute(&self.pool)
        .await
        .map_err(AppError::from)?;

        Ok(())
    }

    async fn get_current_version(&self) -> Result<i64> {
        let result = sqlx::query("SELECT MAX(version) as version FROM _migrations")
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::from)?;

        match result {
            Some(row) => Ok(row.try_get("version").unwrap_or(0)),
            None => Ok(0),
        }
    }

    async fn apply_migration(&self, migration: &Migration) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(AppError::from)?;

        for statement in &migration.sql_statements {
            sqlx::query(statement)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    error!("Failed to execute migration statement: {}", e);
                    AppError::from(e)
                })?;
        }

        sqlx::query(r#"
            INSERT INTO _migrations (version, name, checksum)
            VALUES (?, ?, ?)
        "#)
        .bind(migration.version)
        .bind(&migration.name)
        .bind(&migration.checksum)
        .execute(&mut *tx)
        .await
        .map_err(AppError::from)?;

        tx.commit().await.map_err(AppError::from)?;
        Ok(())
    }

    fn get_migrations(&self) -> Vec<Migration> {
        vec![
            Migration {
                version: 1,
                name: "create_files_table".to_string(),
                checksum: "files_v1".to_string(),
                sql_statements: vec![
                    r#"
                    CREATE TABLE files (
                        id TEXT PRIMARY KEY,
                        owner_id TEXT,
                        original_name TEXT NOT NULL,
                        storage_key TEXT NOT NULL UNIQUE,
                        mime_type TEXT NOT NULL,
                        size_bytes INTEGER NOT NULL CHECK (size_bytes >= 0),
                        expires_at TEXT NOT NULL,
                        download_token TEXT NOT NULL UNIQUE,
                        download_count INTEGER NOT NULL DEFAULT 0 CHECK (download_count >= 0),
                        max_downloads INTEGER CHECK (max_downloads IS NULL OR max_downloads >= 0),
                        created_at TEXT NOT NULL,
                        updated_at TEXT NOT NULL
                    )
                    "#.to_string(),
                    r#"
                    CREATE INDEX idx_files_expires_at ON files(expires_at)
                    "#.to_string(),
                    r#"
                    CREATE INDEX idx_files_owner_id ON files(owner_id)
                    "#.to_string(),
                    r#"
                    CREATE INDEX idx_files_created_at ON files(created_at)
                    "#.to_string(),
                ],
            },
        ]
    }
}

#[derive(Debug, Clone)]
struct Migration {
    version: i64,
    name: String,
    checksum: String,
    sql_statements: Vec<String>,
}

pub async fn run_migrations(pool: SqlitePool) -> Result<()> {
    let migration_manager = MigrationManager::new(pool);
    migration_manager.run_migrations().await
}
