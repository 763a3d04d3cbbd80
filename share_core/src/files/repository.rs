use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use tracing::warn;
use uuid::Uuid;

use crate::error::{AppError, Result};
use super::models::File;

const FILE_COLUMNS: &str = "id, owner_id, original_name, storage_key, mime_type, size_bytes, \
    expires_at, download_token, download_count, max_downloads, created_at, updated_at";

/// Durable store of `File` records.
///
/// `storage_key` and `download_token` are unique; inserting a duplicate yields
/// `AppError::Conflict`. The download counter is only ever changed through
/// `increment_download_count`, which performs the bound check and the
/// increment as one statement.
#[async_trait]
pub trait FileRepositoryTrait: Send + Sync {
    async fn insert(&self, file: &File) -> Result<File>;
    async fn get_by_id(&self, id: Uuid) -> Result<Option<File>>;
    async fn get_by_id_for_owner(&self, id: Uuid, owner_id: &str) -> Result<Option<File>>;
    async fn get_by_token(&self, token: &str) -> Result<Option<File>>;
    /// Newest first.
    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<File>>;
    /// Adds one download if the file is unexpired at `now` and below its
    /// bound. Returns the updated record, or `None` when no row qualified.
    async fn increment_download_count(&self, id: Uuid, now: DateTime<Utc>) -> Result<Option<File>>;
    /// Returns whether a row was removed.
    async fn delete(&self, id: Uuid) -> Result<bool>;
    /// Records with `expires_at <= now`.
    async fn list_expired(&self, now: DateTime<Utc>, limit: u32) -> Result<Vec<File>>;
    /// Unexpired records whose bounded counter reached its limit.
    async fn list_exhausted(&self, now: DateTime<Utc>, limit: u32) -> Result<Vec<File>>;
}

/// Fixed-width UTC text so that string comparison in SQL is chronological.
pub(crate) fn encode_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AppError::Database(format!("Invalid datetime {:?}: {}", raw, e)))
}

fn file_from_row(row: &SqliteRow) -> Result<File> {
    let id: String = row.try_get("id")?;

    Ok(File {
        id: Uuid::parse_str(&id)
            .map_err(|e| AppError::Database(format!("Invalid UUID {:?}: {}", id, e)))?,
        owner_id: row.try_get("owner_id")?,
        original_name: row.try_get("original_name")?,
        storage_key: row.try_get("storage_key")?,
        mime_type: row.try_get("mime_type")?,
        size_bytes: row.try_get::<i64, _>("size_bytes")? as u64,
        expires_at: decode_timestamp(&row.try_get::<String, _>("expires_at")?)?,
        download_token: row.try_get("download_token")?,
        download_count: row.try_get::<i64, _>("download_count")? as u64,
        max_downloads: row.try_get::<Option<i64>, _>("max_downloads")?.map(|m| m as u64),
        created_at: decode_timestamp(&row.try_get::<String, _>("created_at")?)?,
        updated_at: decode_timestamp(&row.try_get::<String, _>("updated_at")?)?,
    })
}

fn to_i64(value: u64, field: &str) -> Result<i64> {
    i64::try_from(value).map_err(|_| AppError::Validation(format!("{} out of range: {}", field, value)))
}

#[derive(Clone)]
pub struct FileRepository {
    pool: SqlitePool,
}

impl FileRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn fetch_many(&self, sql: &str, now: Option<DateTime<Utc>>, limit: u32) -> Result<Vec<File>> {
        let mut query = sqlx::query(sql);
        if let Some(now) = now {
            query = query.bind(encode_timestamp(now));
        }
        let rows = query.bind(limit as i64).fetch_all(&self.pool).await?;

        // Reclamation scans must not stall on one bad row.
        let mut files = Vec::with_capacity(rows.len());
        for row in &rows {
            match file_from_row(row) {
                Ok(file) => files.push(file),
                Err(e) => warn!("Skipping unreadable file record: {}", e),
            }
        }
        Ok(files)
    }
}

#[async_trait]
impl FileRepositoryTrait for FileRepository {
    async fn insert(&self, file: &File) -> Result<File> {
        sqlx::query(
            r#"
            INSERT INTO files (id, owner_id, original_name, storage_key, mime_type, size_bytes,
                               expires_at, download_token, download_count, max_downloads,
                               created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(file.id.to_string())
        .bind(file.owner_id.as_deref())
        .bind(&file.original_name)
        .bind(&file.storage_key)
        .bind(&file.mime_type)
        .bind(to_i64(file.size_bytes, "size_bytes")?)
        .bind(encode_timestamp(file.expires_at))
        .bind(&file.download_token)
        .bind(to_i64(file.download_count, "download_count")?)
        .bind(file.max_downloads.map(|m| to_i64(m, "max_downloads")).transpose()?)
        .bind(encode_timestamp(file.created_at))
        .bind(encode_timestamp(file.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(file.clone())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<File>> {
        let row = sqlx::query(&format!("SELECT {} FROM files WHERE id = ?1", FILE_COLUMNS))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(file_from_row).transpose()
    }

    async fn get_by_id_for_owner(&self, id: Uuid, owner_id: &str) -> Result<Option<File>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM files WHERE id = ?1 AND owner_id = ?2",
            FILE_COLUMNS
        ))
        .bind(id.to_string())
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(file_from_row).transpose()
    }

    async fn get_by_token(&self, token: &str) -> Result<Option<File>> {
        let row = sqlx::query(&format!("SELECT {} FROM files WHERE download_token = ?1", FILE_COLUMNS))
            .bind(token)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(file_from_row).transpose()
    }

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<File>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM files WHERE owner_id = ?1 ORDER BY created_at DESC, rowid DESC",
            FILE_COLUMNS
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(file_from_row).collect()
    }

    async fn increment_download_count(&self, id: Uuid, now: DateTime<Utc>) -> Result<Option<File>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE files
            SET download_count = download_count + 1, updated_at = ?2
            WHERE id = ?1
              AND expires_at > ?2
              AND (max_downloads IS NULL OR download_count < max_downloads)
            RETURNING {}
            "#,
            FILE_COLUMNS
        ))
        .bind(id.to_string())
        .bind(encode_timestamp(now))
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(file_from_row).transpose()
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let rows_affected = sqlx::query("DELETE FROM files WHERE id = ?1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?
            .rows_affected();

        Ok(rows_affected > 0)
    }

    async fn list_expired(&self, now: DateTime<Utc>, limit: u32) -> Result<Vec<File>> {
        let sql = format!(
            "SELECT {} FROM files WHERE expires_at <= ?1 ORDER BY expires_at ASC LIMIT ?2",
            FILE_COLUMNS
        );
        self.fetch_many(&sql, Some(now), limit).await
    }

    async fn list_exhausted(&self, now: DateTime<Utc>, limit: u32) -> Result<Vec<File>> {
        let sql = format!(
            r#"
            SELECT {} FROM files
            WHERE expires_at > ?1
              AND max_downloads IS NOT NULL
              AND download_count >= max_downloads
            ORDER BY updated_at ASC
            LIMIT ?2
            "#,
            FILE_COLUMNS
        );
        self.fetch_many(&sql, Some(now), limit).await
    }
}
