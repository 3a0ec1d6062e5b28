use crate::error::StorageError;
use crate::traits::StorageBackend;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use tokio::sync::OnceCell;

/// S3-compatible storage backend (AWS S3, MinIO, or any endpoint speaking the
/// S3 API). The bucket is created on first use if it does not exist.
pub struct S3Storage {
    client: Client,
    bucket: String,
    bucket_ready: OnceCell<()>,
}

impl S3Storage {
    /// Create a new S3 storage backend against an explicit endpoint.
    pub fn new(
        endpoint_url: &str,
        region: &str,
        access_key: &str,
        secret_key: &str,
        bucket: String,
    ) -> Self {
        let credentials = Credentials::new(access_key, secret_key, None, None, "slideforge");
        let config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .endpoint_url(endpoint_url)
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        Self {
            client: Client::from_conf(config),
            bucket,
            bucket_ready: OnceCell::new(),
        }
    }

    /// Ensure the target bucket exists, creating it on the first call.
    async fn ensure_bucket(&self) -> Result<(), StorageError> {
        self.bucket_ready
            .get_or_try_init(|| async {
                if self
                    .client
                    .head_bucket()
                    .bucket(&self.bucket)
                    .send()
                    .await
                    .is_ok()
                {
                    return Ok(());
                }
                tracing::info!("Creating S3 bucket {}", self.bucket);
                self.client
                    .create_bucket()
                    .bucket(&self.bucket)
                    .send()
                    .await
                    .map(|_| ())
                    .map_err(|e| {
                        StorageError::S3(format!("Failed to create bucket {}: {e}", self.bucket))
                    })
            })
            .await
            .map(|_| ())
    }
}

#[async_trait::async_trait]
impl StorageBackend for S3Storage {
    async fn upload(&self, key: &str, data: &[u8]) -> Result<(), StorageError> {
        self.ensure_bucket().await?;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(data.to_vec().into())
            .send()
            .await
            .map_err(|e| StorageError::S3(format!("Failed to upload {key}: {e}")))?;
        Ok(())
    }

    async fn read(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        self.ensure_bucket().await?;
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::S3(format!("Failed to read {key}: {e}")))?;

        let data = output
            .body
            .collect()
            .await
            .map_err(|e| StorageError::S3(format!("Failed to read body for {key}: {e}")))?
            .into_bytes()
            .to_vec();
        Ok(data)
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::S3(format!("Failed to delete {key}: {e}")))?;
        Ok(())
    }

    fn backend_name(&self) -> &str {
        "s3"
    }
}
