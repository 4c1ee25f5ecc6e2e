//! Filesystem-backed object store
//!
//! Layout: `<root>/<bucket>/<key>`. A bucket exists when its directory exists;
//! buckets are never created implicitly by `put`.

use super::{join_public_url, validate_key, ObjectStorage, StorageError, StoredObject};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Object store rooted at a local directory
#[derive(Debug, Clone)]
pub struct FsStorage {
    root: PathBuf,
    public_base_url: String,
}

impl FsStorage {
    /// Create a store over `root`; objects are published under `public_base_url`
    pub fn new<P: Into<PathBuf>, S: Into<String>>(root: P, public_base_url: S) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into(),
        }
    }

    /// Create from the storage section of the application config
    #[must_use]
    pub fn from_config(config: &crate::config::StorageConfig) -> Self {
        Self::new(config.root.clone(), config.public_base_url.clone())
    }

    /// Root directory of the store
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create a bucket directory (no-op if it exists)
    ///
    /// # Errors
    /// - Bucket name is not a single path segment
    /// - Directory cannot be created
    pub async fn create_bucket(&self, bucket: &str) -> Result<(), StorageError> {
        validate_bucket(bucket)?;
        tokio::fs::create_dir_all(self.root.join(bucket)).await?;
        Ok(())
    }

    async fn bucket_dir(&self, bucket: &str) -> Result<PathBuf, StorageError> {
        validate_bucket(bucket)?;
        let dir = self.root.join(bucket);
        match tokio::fs::metadata(&dir).await {
            Ok(meta) if meta.is_dir() => Ok(dir),
            Ok(_) => Err(StorageError::BucketNotFound(bucket.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::BucketNotFound(bucket.to_string()))
            },
            Err(e) => Err(StorageError::Io(e)),
        }
    }
}

fn validate_bucket(bucket: &str) -> Result<(), StorageError> {
    if bucket.is_empty() || bucket.contains(['/', '\\']) || matches!(bucket, "." | "..") {
        return Err(StorageError::InvalidKey(format!("bucket '{}'", bucket)));
    }
    Ok(())
}

#[async_trait]
impl ObjectStorage for FsStorage {
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<StoredObject, StorageError> {
        validate_key(key)?;
        let dir = self.bucket_dir(bucket).await?;
        let path = dir.join(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // temp file + rename so readers never see a partial object
        let temp_path = path.with_extension(format!("{}.part", uuid::Uuid::new_v4().simple()));
        let mut file = tokio::fs::File::create(&temp_path).await?;
        file.write_all(&bytes).await?;
        file.flush().await?;
        drop(file);
        if let Err(e) = tokio::fs::rename(&temp_path, &path).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(StorageError::Io(e));
        }

        tracing::debug!(bucket, key, size = bytes.len(), "stored object");
        Ok(StoredObject {
            bucket: bucket.to_string(),
            key: key.to_string(),
            url: self.public_url(bucket, key),
            size: bytes.len(),
            content_type: content_type.to_string(),
        })
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes, StorageError> {
        validate_key(key)?;
        let path = self.bucket_dir(bucket).await?.join(key);
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::ObjectNotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            }),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        validate_key(key)?;
        let path = self.bucket_dir(bucket).await?.join(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    fn public_url(&self, bucket: &str, key: &str) -> String {
        join_public_url(&self.public_base_url, bucket, key)
    }
}
