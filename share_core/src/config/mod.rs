pub mod settings;

pub use settings::{
    AppConfig, AuthConfig, DatabaseConfig, PublicConfig, ReclamationSettings, ServerConfig,
    StorageConfig,
};
