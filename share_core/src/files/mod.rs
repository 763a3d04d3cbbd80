pub mod keys;
pub mod manager;
pub mod memory;
pub mod models;
pub mod repository;
pub mod validation;

pub use manager::{FileManager, FileManagerConfig};
pub use memory::MemoryFileRepository;
pub use models::{File, FileMetadataView, FileUpload};
pub use repository::{FileRepository, FileRepositoryTrait};
pub use validation::{FileValidationConfig, FileValidator, ValidationError};
