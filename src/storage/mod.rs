//! Object storage seam
//!
//! The hosted object store is consumed through [`ObjectStorage`]. Two
//! implementations ship with the crate: a filesystem store that the proxy server
//! exposes under `/storage`, and an in-memory store for ephemeral sessions.

mod local;
mod memory;

pub use local::FsStorage;
pub use memory::MemoryStorage;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors reported by an object store
#[derive(Error, Debug)]
pub enum StorageError {
    /// Target bucket does not exist; uploads degrade instead of failing
    #[error("Bucket not found: {0}")]
    BucketNotFound(String),

    /// Object key is empty or escapes the bucket
    #[error("Invalid object key: {0}")]
    InvalidKey(String),

    /// No object stored under the key
    #[error("Object not found: {bucket}/{key}")]
    ObjectNotFound { bucket: String, key: String },

    /// Underlying filesystem failure
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other backend-specific failure
    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    /// Whether the error means the bucket is missing
    #[must_use]
    pub fn is_bucket_missing(&self) -> bool {
        matches!(self, Self::BucketNotFound(_))
    }
}

/// Metadata of a stored object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObject {
    pub bucket: String,
    pub key: String,
    /// Durable public URL
    pub url: String,
    pub size: usize,
    pub content_type: String,
}

/// Hosted object storage
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store `bytes` under `bucket/key`, replacing any existing object
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<StoredObject, StorageError>;

    /// Read an object back
    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes, StorageError>;

    /// Remove an object; removing a missing object is not an error
    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StorageError>;

    /// Public URL an object is (or would be) reachable at
    fn public_url(&self, bucket: &str, key: &str) -> String;
}

/// Reject keys that are empty, absolute or walk out of the bucket
pub(crate) fn validate_key(key: &str) -> Result<(), StorageError> {
    let invalid = key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..");
    if invalid {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}

pub(crate) fn join_public_url(base: &str, bucket: &str, key: &str) -> String {
    format!("{}/{}/{}", base.trim_end_matches('/'), bucket, key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_validation() {
        assert!(validate_key("banners/p1/a.png").is_ok());
        assert!(validate_key("a.png").is_ok());

        for bad in ["", "/abs.png", "../escape.png", "a//b.png", "a/./b.png", "a\\b.png"] {
            assert!(
                matches!(validate_key(bad), Err(StorageError::InvalidKey(_))),
                "key {:?} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_public_url_join() {
        assert_eq!(
            join_public_url("http://host/storage/", "banners", "x/y.png"),
            "http://host/storage/banners/x/y.png"
        );
    }

    #[test]
    fn test_bucket_missing_detection() {
        assert!(StorageError::BucketNotFound("b".into()).is_bucket_missing());
        assert!(!StorageError::Backend("quota".into()).is_bucket_missing());
    }
}
