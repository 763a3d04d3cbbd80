use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use super::models::FileUpload;
use crate::error::AppError;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("File too large: {size} bytes (max: {max_size} bytes)")]
    FileTooLarge { size: u64, max_size: u64 },

    #[error("Declared size {declared} does not match content length {actual}")]
    SizeMismatch { declared: u64, actual: u64 },

    #[error("Filename is required")]
    MissingFilename,

    #[error("Filename too long: {length} characters (max: {max_length})")]
    FilenameTooLong { length: usize, max_length: usize },

    #[error("Invalid filename: {filename}")]
    InvalidFilename { filename: String },

    #[error("Invalid mime type: {mime_type}")]
    InvalidMimeType { mime_type: String },

    #[error("Expiry time must be in the future")]
    ExpiryNotInFuture,

    #[error("Expiry time must not be later than {max}")]
    ExpiryTooFar { max: DateTime<Utc> },
}

/// 9999-12-31T23:59:59Z. Later instants no longer encode as fixed-width
/// timestamps.
const LATEST_STORABLE_EXPIRY_SECS: i64 = 253_402_300_799;

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::Validation(err.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct FileValidationConfig {
    pub max_file_size: u64,
    pub max_filename_length: usize,
    /// Longest allowed distance between upload time and expiry.
    pub max_lifetime: Duration,
}

impl Default for FileValidationConfig {
    fn default() -> Self {
        Self {
            max_file_size: 50 * 1024 * 1024,
            max_filename_length: 255,
            max_lifetime: Duration::days(3650),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FileValidator {
    config: FileValidationConfig,
}

impl FileValidator {
    pub fn new(config: FileValidationConfig) -> Self {
        Self { config }
    }

    pub fn with_default_config() -> Self {
        Self::new(FileValidationConfig::default())
    }

    pub fn max_file_size(&self) -> u64 {
        self.config.max_file_size
    }

    /// Checks every precondition of `FileManager::create` against `now`.
    pub fn validate_upload(&self, upload: &FileUpload, now: DateTime<Utc>) -> Result<(), ValidationError> {
        let actual = upload.content.len() as u64;
        if upload.size_bytes != actual {
            return Err(ValidationError::SizeMismatch {
                declared: upload.size_bytes,
                actual,
            });
        }

        if actual > self.config.max_file_size {
            return Err(ValidationError::FileTooLarge {
                size: actual,
                max_size: self.config.max_file_size,
            });
        }

        self.validate_filename(&upload.original_name)?;
        self.validate_mime_type(&upload.mime_type)?;

        if upload.expires_at <= now {
            return Err(ValidationError::ExpiryNotInFuture);
        }

        let horizon = [
            now.checked_add_signed(self.config.max_lifetime),
            DateTime::from_timestamp(LATEST_STORABLE_EXPIRY_SECS, 0),
        ]
        .into_iter()
        .flatten()
        .min();
        if let Some(max) = horizon {
            if upload.expires_at > max {
                return Err(ValidationError::ExpiryTooFar { max });
            }
        }

        Ok(())
    }

    fn validate_filename(&self, filename: &str) -> Result<(), ValidationError> {
        if filename.trim().is_empty() {
            return Err(ValidationError::MissingFilename);
        }

        let length = filename.chars().count();
        if length > self.config.max_filename_length {
            return Err(ValidationError::FilenameTooLong {
                length,
                max_length: self.config.max_filename_length,
            });
        }

        if filename.chars().any(|c| c == '\0' || c.is_control()) {
            return Err(ValidationError::InvalidFilename {
                filename: filename.escape_debug().to_string(),
            });
        }

        Ok(())
    }

    fn validate_mime_type(&self, mime_type: &str) -> Result<(), ValidationError> {
        match mime_type.parse::<mime::Mime>() {
            Ok(_) => Ok(()),
            Err(_) => Err(ValidationError::InvalidMimeType {
                mime_type: mime_type.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use chrono::Duration;

    fn upload(name: &str, mime_type: &str, content: &'static [u8]) -> FileUpload {
        FileUpload {
            content: Bytes::from_static(content),
            original_name: name.to_string(),
            mime_type: mime_type.to_string(),
            size_bytes: content.len() as u64,
            expires_at: Utc::now() + Duration::hours(1),
            owner_id: None,
            max_downloads: None,
        }
    }

    #[test]
    fn test_valid_upload() {
        let validator = FileValidator::with_default_config();
        assert!(validator.validate_upload(&upload("a.txt", "text/plain", b"hi"), Utc::now()).is_ok());
        assert!(validator
            .validate_upload(&upload("report final.pdf", "application/pdf", b"%PDF"), Utc::now())
            .is_ok());
    }

    #[test]
    fn test_validate_filename() {
        let validator = FileValidator::with_default_config();

        assert!(validator.validate_filename("test.txt").is_ok());
        assert_eq!(validator.validate_filename("  "), Err(ValidationError::MissingFilename));
        assert!(validator.validate_filename("test\0file.txt").is_err());

        let long_name = "a".repeat(300);
        assert!(matches!(
            validator.validate_filename(&long_name),
            Err(ValidationError::FilenameTooLong { length: 300, .. })
        ));
    }

    #[test]
    fn test_validate_mime_type() {
        let validator = FileValidator::with_default_config();

        assert!(validator.validate_mime_type("image/png").is_ok());
        assert!(validator.validate_mime_type("application/octet-stream").is_ok());
        assert!(validator.validate_mime_type("").is_err());
        assert!(validator.validate_mime_type("not a mime").is_err());
    }

    #[test]
    fn test_size_must_match_content() {
        let validator = FileValidator::with_default_config();
        let mut bad = upload("a.txt", "text/plain", b"hello");
        bad.size_bytes = 4;

        assert_eq!(
            validator.validate_upload(&bad, Utc::now()),
            Err(ValidationError::SizeMismatch { declared: 4, actual: 5 })
        );
    }

    #[test]
    fn test_size_cap() {
        let validator = FileValidator::new(FileValidationConfig {
            max_file_size: 4,
            ..Default::default()
        });

        assert!(matches!(
            validator.validate_upload(&upload("a.txt", "text/plain", b"hello"), Utc::now()),
            Err(ValidationError::FileTooLarge { size: 5, max_size: 4 })
        ));
    }

    #[test]
    fn test_expiry_must_be_strictly_in_future() {
        let validator = FileValidator::with_default_config();
        let now = Utc::now();
        let mut file = upload("a.txt", "text/plain", b"hi");

        file.expires_at = now;
        assert_eq!(validator.validate_upload(&file, now), Err(ValidationError::ExpiryNotInFuture));

        file.expires_at = now - Duration::seconds(1);
        assert_eq!(validator.validate_upload(&file, now), Err(ValidationError::ExpiryNotInFuture));
    }

    #[test]
    fn test_expiry_horizon() {
        let now = Utc::now();
        let validator = FileValidator::new(FileValidationConfig {
            max_lifetime: Duration::days(7),
            ..Default::default()
        });
        let mut file = upload("a.txt", "text/plain", b"hi");

        file.expires_at = now + Duration::days(7);
        assert!(validator.validate_upload(&file, now).is_ok());

        file.expires_at = now + Duration::days(7) + Duration::seconds(1);
        assert_eq!(
            validator.validate_upload(&file, now),
            Err(ValidationError::ExpiryTooFar { max: now + Duration::days(7) })
        );
    }

    #[test]
    fn test_expiry_capped_at_year_9999() {
        let now = Utc::now();
        let validator = FileValidator::new(FileValidationConfig {
            max_lifetime: Duration::days(10_000_000),
            ..Default::default()
        });
        let mut file = upload("a.txt", "text/plain", b"hi");

        file.expires_at = now + Duration::days(365 * 9000);
        assert!(matches!(
            validator.validate_upload(&file, now),
            Err(ValidationError::ExpiryTooFar { .. })
        ));
    }

    #[test]
    fn test_validation_error_maps_to_app_validation() {
        let err: AppError = ValidationError::MissingFilename.into();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
