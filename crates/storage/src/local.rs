use crate::error::StorageError;
use crate::traits::StorageBackend;
use std::path::PathBuf;

/// Local filesystem storage backend.
pub struct LocalStorage {
    /// Root directory for all stored objects.
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn full_path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

#[async_trait::async_trait]
impl StorageBackend for LocalStorage {
    async fn upload(&self, key: &str, data: &[u8]) -> Result<(), StorageError> {
        let full = self.full_path(key);
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full, data).await?;
        Ok(())
    }

    async fn read(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let full = self.full_path(key);
        if !tokio::fs::try_exists(&full).await.unwrap_or(false) {
            return Err(StorageError::NotFound(key.to_string()));
        }
        let data = tokio::fs::read(&full).await?;
        Ok(data)
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let full = self.full_path(key);
        if tokio::fs::try_exists(&full).await.unwrap_or(false) {
            tokio::fs::remove_file(&full).await?;
        }
        Ok(())
    }

    fn backend_name(&self) -> &str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upload_read_delete_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path().to_path_buf());

        storage
            .upload("documents/u1/doc.pdf", b"pdf bytes")
            .await
            .unwrap();
        let data = storage.read("documents/u1/doc.pdf").await.unwrap();
        assert_eq!(data, b"pdf bytes");

        storage.delete("documents/u1/doc.pdf").await.unwrap();
        assert!(storage.read("documents/u1/doc.pdf").await.is_err());
    }

    #[tokio::test]
    async fn test_read_missing_key() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path().to_path_buf());
        let err = storage.read("nope/missing.bin").await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path().to_path_buf());
        storage.delete("never/existed.png").await.unwrap();
    }
}
