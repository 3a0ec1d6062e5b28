use crate::error::StorageError;
use crate::traits::StorageBackend;
use object_store::ObjectStore;
use object_store::gcp::{GoogleCloudStorage, GoogleCloudStorageBuilder};
use object_store::path::Path as ObjectPath;

/// Google Cloud Storage backend.
///
/// Credentials come from the ambient environment
/// (`GOOGLE_APPLICATION_CREDENTIALS` or instance metadata).
pub struct GcsStorage {
    store: GoogleCloudStorage,
}

impl GcsStorage {
    /// Create a new GCS storage backend. `bucket` must be non-empty.
    pub fn new(bucket: &str) -> Result<Self, StorageError> {
        if bucket.is_empty() {
            return Err(StorageError::Config("GCS bucket is not configured".into()));
        }
        let store = GoogleCloudStorageBuilder::from_env()
            .with_bucket_name(bucket)
            .build()
            .map_err(|e| StorageError::Gcs(format!("Failed to build GCS client: {e}")))?;
        Ok(Self { store })
    }
}

#[async_trait::async_trait]
impl StorageBackend for GcsStorage {
    async fn upload(&self, key: &str, data: &[u8]) -> Result<(), StorageError> {
        let path = ObjectPath::from(key);
        self.store
            .put(&path, data.to_vec().into())
            .await
            .map_err(|e| StorageError::Gcs(format!("Failed to upload {key}: {e}")))?;
        Ok(())
    }

    async fn read(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let path = ObjectPath::from(key);
        let result = self
            .store
            .get(&path)
            .await
            .map_err(|e| match e {
                object_store::Error::NotFound { .. } => StorageError::NotFound(key.to_string()),
                other => StorageError::Gcs(format!("Failed to read {key}: {other}")),
            })?;
        let data = result
            .bytes()
            .await
            .map_err(|e| StorageError::Gcs(format!("Failed to read body for {key}: {e}")))?;
        Ok(data.to_vec())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = ObjectPath::from(key);
        self.store
            .delete(&path)
            .await
            .map_err(|e| StorageError::Gcs(format!("Failed to delete {key}: {e}")))?;
        Ok(())
    }

    fn backend_name(&self) -> &str {
        "gcs"
    }
}
