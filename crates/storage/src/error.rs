use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("S3 error: {0}")]
    S3(String),

    #[error("GCS error: {0}")]
    Gcs(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Storage config error: {0}")]
    Config(String),
}
