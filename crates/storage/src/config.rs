use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the blob storage layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Backend kind: `local`, `s3`, `minio`, or `gcs`.
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Root directory for the `local` backend.
    #[serde(default = "default_local_dir")]
    pub local_storage_dir: PathBuf,

    /// Endpoint URL for the `s3`/`minio` backends.
    #[serde(default = "default_s3_endpoint")]
    pub s3_endpoint_url: String,

    #[serde(default = "default_s3_region")]
    pub s3_region: String,

    #[serde(default)]
    pub s3_access_key: String,

    #[serde(default)]
    pub s3_secret_key: String,

    #[serde(default = "default_s3_bucket")]
    pub s3_bucket: String,

    /// Bucket name for the `gcs` backend (required when selected).
    #[serde(default)]
    pub gcs_bucket: String,
}

fn default_backend() -> String {
    "local".to_string()
}

fn default_local_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_s3_endpoint() -> String {
    "http://localhost:9000".to_string()
}

fn default_s3_region() -> String {
    "us-east-1".to_string()
}

fn default_s3_bucket() -> String {
    "slideforge".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            local_storage_dir: default_local_dir(),
            s3_endpoint_url: default_s3_endpoint(),
            s3_region: default_s3_region(),
            s3_access_key: String::new(),
            s3_secret_key: String::new(),
            s3_bucket: default_s3_bucket(),
            gcs_bucket: String::new(),
        }
    }
}
