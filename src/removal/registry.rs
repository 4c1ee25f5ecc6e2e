//! Session-scoped registry of produced local object URLs
//!
//! Every cut-out gets a `blob:bannerkit/<uuid>` URL that stays resolvable until
//! it is revoked or the last handle to the registry is dropped.

use bytes::Bytes;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Scheme prefix of registry URLs
pub const OBJECT_URL_PREFIX: &str = "blob:bannerkit/";

/// URL of a registered blob
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectUrl(String);

impl ObjectUrl {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ObjectUrl {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Blob kept alive by the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredBlob {
    pub bytes: Bytes,
    pub mime_type: String,
}

/// Cloneable handle; clones share the same set of URLs
#[derive(Debug, Clone, Default)]
pub struct ObjectUrlRegistry {
    blobs: Arc<Mutex<HashMap<String, RegisteredBlob>>>,
}

impl ObjectUrlRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, RegisteredBlob>> {
        // the map stays consistent even if a holder panicked
        self.blobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Keep `bytes` alive and return the URL that resolves to them
    pub fn register(&self, bytes: Bytes, mime_type: &str) -> ObjectUrl {
        let url = format!("{}{}", OBJECT_URL_PREFIX, uuid::Uuid::new_v4());
        self.lock().insert(
            url.clone(),
            RegisteredBlob {
                bytes,
                mime_type: mime_type.to_string(),
            },
        );
        ObjectUrl(url)
    }

    #[must_use]
    pub fn resolve(&self, url: &str) -> Option<RegisteredBlob> {
        self.lock().get(url).cloned()
    }

    #[must_use]
    pub fn contains(&self, url: &str) -> bool {
        self.lock().contains_key(url)
    }

    /// Release one URL; returns whether it was registered
    pub fn revoke(&self, url: &str) -> bool {
        self.lock().remove(url).is_some()
    }

    /// Release every URL; returns how many were released
    pub fn revoke_all(&self) -> usize {
        let mut blobs = self.lock();
        let count = blobs.len();
        blobs.clear();
        if count > 0 {
            tracing::debug!(count, "revoked object URLs");
        }
        count
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
