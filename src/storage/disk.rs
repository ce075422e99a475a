/// Disk-based storage backend
use crate::{
    error::{MarketError, MarketResult},
    storage::{Bucket, StorageBackend},
};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::fs;

/// Disk storage backend
///
/// Layout: {base}/{bucket}/{first 2 chars of key}/{key}. Keys are ASCII-only
/// and may not contain path separators.
#[derive(Clone)]
pub struct DiskBackend {
    base_path: PathBuf,
}

impl DiskBackend {
    /// Create a new disk storage backend
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn file_path(&self, bucket: Bucket, key: &str) -> MarketResult<PathBuf> {
        let valid = !key.is_empty()
            && !key.starts_with('.')
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
        if !valid {
            return Err(MarketError::Validation(format!("Invalid storage key: {}", key)));
        }

        let shard = key.get(0..2).unwrap_or("_");
        Ok(self.base_path.join(bucket.as_str()).join(shard).join(key))
    }
}

#[async_trait]
impl StorageBackend for DiskBackend {
    async fn put(&self, bucket: Bucket, key: &str, data: Vec<u8>) -> MarketResult<()> {
        let path = self.file_path(bucket, key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                MarketError::UpstreamFailure(format!("Failed to create storage directory: {}", e))
            })?;
        }

        fs::write(&path, data)
            .await
            .map_err(|e| MarketError::UpstreamFailure(format!("Failed to write {}: {}", key, e)))
    }

    async fn get(&self, bucket: Bucket, key: &str) -> MarketResult<Option<Vec<u8>>> {
        let path = self.file_path(bucket, key)?;

        match fs::read(&path).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(MarketError::UpstreamFailure(format!(
                "Failed to read {}: {}",
                key, e
            ))),
        }
    }

    async fn delete(&self, bucket: Bucket, key: &str) -> MarketResult<()> {
        let path = self.file_path(bucket, key)?;

        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(MarketError::UpstreamFailure(format!(
                "Failed to delete {}: {}",
                key, e
            ))),
        }
    }

    async fn exists(&self, bucket: Bucket, key: &str) -> MarketResult<bool> {
        let path = self.file_path(bucket, key)?;
        Ok(fs::try_exists(&path).await.unwrap_or(false))
    }
}
