pub mod config;
pub mod error;
pub mod gcs;
pub mod local;
pub mod s3;
pub mod traits;

pub use config::StorageConfig;
pub use error::StorageError;
pub use gcs::GcsStorage;
pub use local::LocalStorage;
pub use s3::S3Storage;
pub use traits::StorageBackend;

use std::sync::Arc;

/// Factory: build a storage backend from configuration.
pub fn from_config(config: &StorageConfig) -> Result<Arc<dyn StorageBackend>, StorageError> {
    match config.backend.to_lowercase().as_str() {
        "local" => Ok(Arc::new(LocalStorage::new(
            config.local_storage_dir.clone(),
        ))),
        "s3" | "minio" => Ok(Arc::new(S3Storage::new(
            &config.s3_endpoint_url,
            &config.s3_region,
            &config.s3_access_key,
            &config.s3_secret_key,
            config.s3_bucket.clone(),
        ))),
        "gcs" => Ok(Arc::new(GcsStorage::new(&config.gcs_bucket)?)),
        other => Err(StorageError::Config(format!(
            "Unsupported storage backend: {other}. Use: local | s3 | minio | gcs"
        ))),
    }
}
