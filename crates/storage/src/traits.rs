use crate::error::StorageError;

/// Abstract blob store for document originals and extracted images.
#[async_trait::async_trait]
pub trait StorageBackend: Send + Sync {
    /// Write raw bytes under a key, creating intermediate prefixes as needed.
    async fn upload(&self, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Read the full object at a key.
    async fn read(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Delete the object at a key.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Storage backend name.
    fn backend_name(&self) -> &str;
}
