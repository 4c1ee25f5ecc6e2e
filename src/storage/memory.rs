//! In-memory object store

use super::{join_public_url, validate_key, ObjectStorage, StorageError, StoredObject};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

type Bucket = HashMap<String, (Bytes, String)>;

/// Object store kept entirely in memory; clones share the same contents
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    buckets: Arc<Mutex<HashMap<String, Bucket>>>,
    public_base_url: String,
}

impl MemoryStorage {
    pub fn new<S: Into<String>>(public_base_url: S) -> Self {
        Self {
            buckets: Arc::new(Mutex::new(HashMap::new())),
            public_base_url: public_base_url.into(),
        }
    }

    /// Add an empty bucket
    #[must_use]
    pub fn with_bucket(self, bucket: &str) -> Self {
        self.create_bucket(bucket);
        self
    }

    pub fn create_bucket(&self, bucket: &str) {
        if let Ok(mut buckets) = self.buckets.lock() {
            buckets.entry(bucket.to_string()).or_default();
        }
    }

    /// Number of objects in a bucket (0 if the bucket is missing)
    #[must_use]
    pub fn object_count(&self, bucket: &str) -> usize {
        self.buckets
            .lock()
            .map(|b| b.get(bucket).map_or(0, HashMap::len))
            .unwrap_or(0)
    }

    /// Content type recorded for an object
    #[must_use]
    pub fn content_type(&self, bucket: &str, key: &str) -> Option<String> {
        let buckets = self.buckets.lock().ok()?;
        buckets.get(bucket)?.get(key).map(|(_, ct)| ct.clone())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Bucket>>, StorageError> {
        self.buckets
            .lock()
            .map_err(|_| StorageError::Backend("memory store lock poisoned".to_string()))
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new("memory://storage")
    }
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<StoredObject, StorageError> {
        validate_key(key)?;
        let size = bytes.len();
        {
            let mut buckets = self.lock()?;
            let objects = buckets
                .get_mut(bucket)
                .ok_or_else(|| StorageError::BucketNotFound(bucket.to_string()))?;
            objects.insert(key.to_string(), (bytes, content_type.to_string()));
        }
        Ok(StoredObject {
            bucket: bucket.to_string(),
            key: key.to_string(),
            url: self.public_url(bucket, key),
            size,
            content_type: content_type.to_string(),
        })
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes, StorageError> {
        let buckets = self.lock()?;
        let objects = buckets
            .get(bucket)
            .ok_or_else(|| StorageError::BucketNotFound(bucket.to_string()))?;
        objects
            .get(key)
            .map(|(bytes, _)| bytes.clone())
            .ok_or_else(|| StorageError::ObjectNotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        let mut buckets = self.lock()?;
        let objects = buckets
            .get_mut(bucket)
            .ok_or_else(|| StorageError::BucketNotFound(bucket.to_string()))?;
        objects.remove(key);
        Ok(())
    }

    fn public_url(&self, bucket: &str, key: &str) -> String {
        join_public_url(&self.public_base_url, bucket, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_clones_share_contents() {
        let storage = MemoryStorage::default().with_bucket("banners");
        let other = storage.clone();

        storage
            .put("banners", "a.webp", Bytes::from_static(b"data"), "image/webp")
            .await
            .unwrap();

        assert_eq!(other.object_count("banners"), 1);
        assert_eq!(other.content_type("banners", "a.webp").as_deref(), Some("image/webp"));
        assert_eq!(&other.get("banners", "a.webp").await.unwrap()[..], b"data");
    }

    #[tokio::test]
    async fn test_missing_bucket_is_reported() {
        let storage = MemoryStorage::default();
        let err = storage
            .put("banners", "a.png", Bytes::new(), "image/png")
            .await
            .unwrap_err();
        assert!(err.is_bucket_missing());
    }
}
