use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::files::{FileManagerConfig, FileValidationConfig};
use crate::jobs::ReclamationConfig;

pub const DEFAULT_JWT_SECRET: &str = "change-me-change-me-change-me-32b";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
    pub reclamation: ReclamationSettings,
    pub public: PublicConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub root_dir: PathBuf,
    pub max_upload_mb: u64,
    pub max_lifetime_days: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub require_auth_for_upload: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReclamationSettings {
    pub enabled: bool,
    pub interval_seconds: u64,
    pub batch_size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicConfig {
    /// Prefix for the download and view links handed back to uploaders.
    pub download_base_url: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            storage: StorageConfig::default(),
            auth: AuthConfig::default(),
            reclamation: ReclamationSettings::default(),
            public: PublicConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:./data/files.db".to_string(),
            max_connections: 10,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("./data/blobs"),
            max_upload_mb: 50,
            max_lifetime_days: 3650,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: DEFAULT_JWT_SECRET.to_string(),
            require_auth_for_upload: false,
        }
    }
}

impl Default for ReclamationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_seconds: 60,
            batch_size: 200,
        }
    }
}

impl Default for PublicConfig {
    fn default() -> Self {
        Self {
            download_base_url: "http://127.0.0.1:3000".to_string(),
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .add_source(Config::try_from(&AppConfig::default())?);

        if std::path::Path::new("config.toml").exists() {
            builder = builder.add_source(File::with_name("config"));
        }

        builder = builder.add_source(
            Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        let app_config: AppConfig = config.try_deserialize()?;

        app_config.validate()?;

        Ok(app_config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Message("Server port cannot be 0".to_string()));
        }

        if self.database.url.is_empty() {
            return Err(ConfigError::Message(
                "Database URL cannot be empty".to_string(),
            ));
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::Message(
                "Database max connections must be greater than 0".to_string(),
            ));
        }

        if self.storage.max_upload_mb == 0 {
            return Err(ConfigError::Message(
                "Max upload size must be greater than 0".to_string(),
            ));
        }

        if self.storage.max_lifetime_days == 0 {
            return Err(ConfigError::Message(
                "Max file lifetime must be greater than 0 days".to_string(),
            ));
        }

        if self.auth.jwt_secret.len() < 32 {
            return Err(ConfigError::Message(
                "JWT secret must be at least 32 characters long".to_string(),
            ));
        }

        if self.auth.jwt_secret == DEFAULT_JWT_SECRET {
            tracing::warn!("Using default JWT secret - change this in production!");
        }

        if self.reclamation.interval_seconds == 0 {
            return Err(ConfigError::Message(
                "Reclamation interval must be greater than 0".to_string(),
            ));
        }

        if self.reclamation.batch_size == 0 {
            return Err(ConfigError::Message(
                "Reclamation batch size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn create_directories(&self) -> Result<(), std::io::Error> {
        std::fs::create_dir_all(&self.storage.root_dir)?;
        if let Some(parent) = self.database_file_parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    fn database_file_parent(&self) -> Option<PathBuf> {
        let path = self.database.url.strip_prefix("sqlite:")?;
        let path = path.trim_start_matches("//");
        if path.is_empty() || path.starts_with(':') {
            return None;
        }
        PathBuf::from(path.split('?').next()?)
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(PathBuf::from)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn file_manager_config(&self) -> FileManagerConfig {
        FileManagerConfig {
            validation: FileValidationConfig {
                max_file_size: self.storage.max_upload_mb * 1024 * 1024,
                max_lifetime: chrono::Duration::days(i64::from(self.storage.max_lifetime_days)),
                ..Default::default()
            },
        }
    }

    pub fn reclamation_config(&self) -> ReclamationConfig {
        ReclamationConfig {
            interval: Duration::from_secs(self.reclamation.interval_seconds),
            batch_size: self.reclamation.batch_size,
        }
    }
}
