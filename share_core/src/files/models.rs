use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A shared file: the metadata record that owns exactly one blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct File {
    pub id: Uuid,
    pub owner_id: Option<String>,
    pub original_name: String,
    pub storage_key: String,
    pub mime_type: String,
    pub size_bytes: u64,
    pub expires_at: DateTime<Utc>,
    pub download_token: String,
    pub download_count: u64,
    pub max_downloads: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl File {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self.max_downloads, Some(max) if self.download_count >= max)
    }

    /// `None` when downloads are unbounded.
    pub fn remaining_downloads(&self) -> Option<u64> {
        self.max_downloads
            .map(|max| max.saturating_sub(self.download_count))
    }

    pub fn is_owned_by(&self, owner_id: &str) -> bool {
        self.owner_id.as_deref() == Some(owner_id)
    }
}

/// Input to `FileManager::create`.
#[derive(Debug, Clone)]
pub struct FileUpload {
    pub content: Bytes,
    pub original_name: String,
    pub mime_type: String,
    pub size_bytes: u64,
    pub expires_at: DateTime<Utc>,
    pub owner_id: Option<String>,
    pub max_downloads: Option<u64>,
}

/// What token holders get to see about a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadataView {
    pub name: String,
    pub size: u64,
    pub mime_type: String,
    pub expires_at: DateTime<Utc>,
    pub download_count: u64,
    pub remaining_downloads: Option<u64>,
    pub max_downloads: Option<u64>,
}

impl From<&File> for FileMetadataView {
    fn from(file: &File) -> Self {
        Self {
            name: file.original_name.clone(),
            size: file.size_bytes,
            mime_type: file.mime_type.clone(),
            expires_at: file.expires_at,
            download_count: file.download_count,
            remaining_downloads: file.remaining_downloads(),
            max_downloads: file.max_downloads,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample(max_downloads: Option<u64>, download_count: u64) -> File {
        let now = Utc::now();
        File {
            id: Uuid::new_v4(),
            owner_id: Some("user-1".to_string()),
            original_name: "notes.txt".to_string(),
            storage_key: "k".to_string(),
            mime_type: "text/plain".to_string(),
            size_bytes: 5,
            expires_at: now + Duration::hours(1),
            download_token: "t".to_string(),
            download_count,
            max_downloads,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_remaining_downloads() {
        assert_eq!(sample(None, 10).remaining_downloads(), None);
        assert_eq!(sample(Some(3), 1).remaining_downloads(), Some(2));
        assert_eq!(sample(Some(3), 3).remaining_downloads(), Some(0));
        assert_eq!(sample(Some(0), 0).remaining_downloads(), Some(0));
    }

    #[test]
    fn test_expiry_and_exhaustion() {
        let file = sample(Some(2), 1);
        assert!(!file.is_expired(file.created_at));
        assert!(file.is_expired(file.expires_at));
        assert!(!file.is_exhausted());

        let exhausted = sample(Some(2), 2);
        assert!(exhausted.is_exhausted());

        let unbounded = sample(None, 1_000);
        assert!(!unbounded.is_exhausted());
    }

    #[test]
    fn test_metadata_view_serializes_camel_case() {
        let file = sample(Some(5), 2);
        let json = serde_json::to_value(FileMetadataView::from(&file)).unwrap();

        assert_eq!(json["name"], "notes.txt");
        assert_eq!(json["mimeType"], "text/plain");
        assert_eq!(json["downloadCount"], 2);
        assert_eq!(json["remainingDownloads"], 3);
        assert_eq!(json["maxDownloads"], 5);
    }
}
