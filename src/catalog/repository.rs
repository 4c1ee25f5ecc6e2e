//! Catalog persistence

use super::{Banner, Partner};
use crate::error::{BannerError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use uuid::Uuid;

/// Hosted database seam for partners and banners
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn insert_partner(&self, partner: Partner) -> Result<Partner>;

    /// Replace an existing partner
    ///
    /// # Errors
    /// - `BannerError::NotFound` when no partner has the id
    async fn update_partner(&self, partner: Partner) -> Result<Partner>;

    /// Delete a partner and its banners
    ///
    /// # Errors
    /// - `BannerError::NotFound` when no partner has the id
    async fn delete_partner(&self, id: Uuid) -> Result<()>;

    async fn get_partner(&self, id: Uuid) -> Result<Option<Partner>>;

    /// All partners, newest first
    async fn list_partners(&self) -> Result<Vec<Partner>>;

    async fn insert_banner(&self, banner: Banner) -> Result<Banner>;

    /// Banners of one partner, newest first
    async fn banners_for(&self, partner_id: Uuid) -> Result<Vec<Banner>>;

    /// All banners, newest first
    async fn list_banners(&self) -> Result<Vec<Banner>>;
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct CatalogDocument {
    #[serde(default)]
    partners: Vec<Partner>,
    #[serde(default)]
    banners: Vec<Banner>,
}

/// Catalog kept in one JSON document, optionally persisted to disk
#[derive(Debug)]
pub struct JsonCatalogRepository {
    path: Option<PathBuf>,
    document: Mutex<CatalogDocument>,
}

impl JsonCatalogRepository {
    /// Open (or start) the document at `path`
    ///
    /// # Errors
    /// - File exists but cannot be read or parsed
    pub async fn open<P: Into<PathBuf>>(path: P) -> Result<Self> {
        let path = path.into();
        let document = match tokio::fs::read(&path).await {
            Ok(data) => serde_json::from_slice(&data).map_err(|e| {
                BannerError::invalid_config(format!(
                    "Catalog '{}' is not valid: {}",
                    path.display(),
                    e
                ))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => CatalogDocument::default(),
            Err(e) => return Err(BannerError::file_io_error("read catalog", &path, &e)),
        };
        Ok(Self {
            path: Some(path),
            document: Mutex::new(document),
        })
    }

    /// Catalog that is never written to disk
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            path: None,
            document: Mutex::new(CatalogDocument::default()),
        }
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Write the document atomically; called with the lock held
    async fn persist(&self, document: &CatalogDocument) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| BannerError::file_io_error("create catalog directory", parent, &e))?;
        }
        let data = serde_json::to_vec_pretty(document)?;
        let temp = path.with_extension("json.tmp");
        tokio::fs::write(&temp, data)
            .await
            .map_err(|e| BannerError::file_io_error("write catalog", &temp, &e))?;
        tokio::fs::rename(&temp, path)
            .await
            .map_err(|e| BannerError::file_io_error("replace catalog", path, &e))?;
        Ok(())
    }

    /// Apply `change` to a copy of the document and install it once persisted
    async fn commit<F>(&self, change: F) -> Result<()>
    where
        F: FnOnce(&mut CatalogDocument) -> Result<()> + Send,
    {
        let mut doc = self.document.lock().await;
        let mut next = doc.clone();
        change(&mut next)?;
        self.persist(&next).await?;
        *doc = next;
        Ok(())
    }
}

fn newest_first<T, F>(mut items: Vec<T>, key: F) -> Vec<T>
where
    F: Fn(&T) -> chrono::DateTime<chrono::Utc>,
{
    items.sort_by(|a, b| key(b).cmp(&key(a)));
    items
}

#[async_trait]
impl CatalogRepository for JsonCatalogRepository {
    async fn insert_partner(&self, partner: Partner) -> Result<Partner> {
        let record = partner.clone();
        self.commit(move |doc| {
            if doc.partners.iter().any(|p| p.id == record.id) {
                return Err(BannerError::invalid_input(format!(
                    "Partner {} already exists",
                    record.id
                )));
            }
            doc.partners.push(record);
            Ok(())
        })
        .await?;
        Ok(partner)
    }

    async fn update_partner(&self, partner: Partner) -> Result<Partner> {
        let record = partner.clone();
        self.commit(move |doc| {
            let slot = doc
                .partners
                .iter_mut()
                .find(|p| p.id == record.id)
                .ok_or_else(|| BannerError::not_found(format!("partner {}", record.id)))?;
            *slot = record;
            Ok(())
        })
        .await?;
        Ok(partner)
    }

    async fn delete_partner(&self, id: Uuid) -> Result<()> {
        self.commit(move |doc| {
            let before = doc.partners.len();
            doc.partners.retain(|p| p.id != id);
            if doc.partners.len() == before {
                return Err(BannerError::not_found(format!("partner {}", id)));
            }
            doc.banners.retain(|b| b.partner_id != id);
            Ok(())
        })
        .await
    }

    async fn get_partner(&self, id: Uuid) -> Result<Option<Partner>> {
        let doc = self.document.lock().await;
        Ok(doc.partners.iter().find(|p| p.id == id).cloned())
    }

    async fn list_partners(&self) -> Result<Vec<Partner>> {
        let doc = self.document.lock().await;
        Ok(newest_first(doc.partners.clone(), |p| p.created_at))
    }

    async fn insert_banner(&self, banner: Banner) -> Result<Banner> {
        let record = banner.clone();
        self.commit(move |doc| {
            if !doc.partners.iter().any(|p| p.id == record.partner_id) {
                return Err(BannerError::not_found(format!("partner {}", record.partner_id)));
            }
            doc.banners.push(record);
            Ok(())
        })
        .await?;
        Ok(banner)
    }

    async fn banners_for(&self, partner_id: Uuid) -> Result<Vec<Banner>> {
        let doc = self.document.lock().await;
        let banners: Vec<Banner> = doc
            .banners
            .iter()
            .filter(|b| b.partner_id == partner_id)
            .cloned()
            .collect();
        Ok(newest_first(banners, |b| b.created_at))
    }

    async fn list_banners(&self) -> Result<Vec<Banner>> {
        let doc = self.document.lock().await;
        Ok(newest_first(doc.banners.clone(), |b| b.created_at))
    }
}
