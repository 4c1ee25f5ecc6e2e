//! Catalog operations on top of a repository and an object store

use super::{Banner, BannerDraft, CatalogRepository, Partner, PartnerDraft, PartnerUpdate};
use crate::acquisition::validate::coerce_image_mime;
use crate::acquisition::{ResolvedImage, UploadResolver};
use crate::error::{BannerError, Result};
use crate::storage::{ObjectStorage, StorageError, StoredObject};
use bytes::Bytes;
use chrono::Utc;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// Which partner field an asset belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetSlot {
    Logo,
    BrandManual,
    ReferenceBanner,
    ProductPhoto,
}

impl AssetSlot {
    fn dir(self) -> &'static str {
        match self {
            Self::Logo => "logo",
            Self::BrandManual => "brand-manual",
            Self::ReferenceBanner => "reference-banners",
            Self::ProductPhoto => "product-photos",
        }
    }
}

impl fmt::Display for AssetSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir())
    }
}

/// A file supplied with a new partner
#[derive(Debug, Clone)]
pub struct AssetFile {
    pub file_name: String,
    /// Declared type; sniffed from the bytes when absent
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

impl AssetFile {
    pub fn new<S: Into<String>, B: Into<Bytes>>(file_name: S, bytes: B) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: None,
            bytes: bytes.into(),
        }
    }

    #[must_use]
    pub fn with_content_type<S: Into<String>>(mut self, content_type: S) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    fn mime(&self) -> String {
        if self.file_name.to_ascii_lowercase().ends_with(".pdf") {
            return self
                .content_type
                .clone()
                .unwrap_or_else(|| "application/pdf".to_string());
        }
        coerce_image_mime(self.content_type.as_deref(), &self.bytes)
    }
}

/// Files uploaded while creating a partner
#[derive(Debug, Clone, Default)]
pub struct PartnerAssets {
    pub logo: Option<AssetFile>,
    pub brand_manual: Option<AssetFile>,
    pub reference_banners: Vec<AssetFile>,
    pub product_photos: Vec<AssetFile>,
}

impl PartnerAssets {
    fn into_tagged(self) -> Vec<(AssetSlot, usize, AssetFile)> {
        let mut tagged = Vec::new();
        if let Some(logo) = self.logo {
            tagged.push((AssetSlot::Logo, 0, logo));
        }
        if let Some(manual) = self.brand_manual {
            tagged.push((AssetSlot::BrandManual, 0, manual));
        }
        tagged.extend(
            self.reference_banners
                .into_iter()
                .enumerate()
                .map(|(i, f)| (AssetSlot::ReferenceBanner, i, f)),
        );
        tagged.extend(
            self.product_photos
                .into_iter()
                .enumerate()
                .map(|(i, f)| (AssetSlot::ProductPhoto, i, f)),
        );
        tagged
    }
}

/// Outcome of one asset upload, tagged with the input it came from
#[derive(Debug)]
pub struct AssetUpload {
    pub slot: AssetSlot,
    /// Position within the slot's list
    pub index: usize,
    pub file_name: String,
    pub result: std::result::Result<StoredObject, StorageError>,
}

impl AssetUpload {
    #[must_use]
    pub fn url(&self) -> Option<&str> {
        self.result.as_ref().ok().map(|o| o.url.as_str())
    }
}

/// A new partner and the outcome of every asset upload
#[derive(Debug)]
pub struct CreatedPartner {
    pub partner: Partner,
    pub uploads: Vec<AssetUpload>,
}

impl CreatedPartner {
    pub fn failed_uploads(&self) -> impl Iterator<Item = &AssetUpload> {
        self.uploads.iter().filter(|u| u.result.is_err())
    }
}

/// A recorded banner and how its image URL was obtained
#[derive(Debug)]
pub struct RecordedBanner {
    pub banner: Banner,
    pub resolution: ResolvedImage,
}

/// Partner and banner management
#[derive(Clone)]
pub struct CatalogService {
    repository: Arc<dyn CatalogRepository>,
    storage: Arc<dyn ObjectStorage>,
    resolver: UploadResolver,
    asset_bucket: String,
}

impl fmt::Debug for CatalogService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CatalogService")
            .field("asset_bucket", &self.asset_bucket)
            .finish_non_exhaustive()
    }
}

fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '-'
            }
        })
        .collect();
    let cleaned = cleaned.trim_matches('.').to_string();
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned
    }
}

fn validate_discount(discount: Option<u8>) -> Result<()> {
    match discount {
        Some(d) if d > 100 => Err(BannerError::invalid_input(format!(
            "Discount must be between 0 and 100, got {}",
            d
        ))),
        _ => Ok(()),
    }
}

/// Extension for a stored banner: from the URL path when recognisable
fn banner_extension(image_url: &str) -> &'static str {
    let ext = url::Url::parse(image_url).ok().and_then(|u| {
        u.path()
            .rsplit('.')
            .next()
            .map(str::to_ascii_lowercase)
            .filter(|e| !e.contains('/'))
    });
    match ext.as_deref() {
        Some("jpg" | "jpeg") => "jpg",
        Some("webp") => "webp",
        Some("gif") => "gif",
        _ => "png",
    }
}

impl CatalogService {
    pub fn new<S: Into<String>>(
        repository: Arc<dyn CatalogRepository>,
        storage: Arc<dyn ObjectStorage>,
        resolver: UploadResolver,
        asset_bucket: S,
    ) -> Self {
        Self {
            repository,
            storage,
            resolver,
            asset_bucket: asset_bucket.into(),
        }
    }

    #[must_use]
    pub fn repository(&self) -> &Arc<dyn CatalogRepository> {
        &self.repository
    }

    /// Create a partner, uploading its assets concurrently
    ///
    /// Failed uploads are reported in the result and left out of the record.
    ///
    /// # Errors
    /// - `BannerError::InvalidInput` for an empty name
    /// - Repository failures
    #[instrument(skip(self, draft, assets), fields(name = %draft.name))]
    pub async fn create_partner(
        &self,
        draft: PartnerDraft,
        assets: PartnerAssets,
    ) -> Result<CreatedPartner> {
        let name = draft.name.trim().to_string();
        if name.is_empty() {
            return Err(BannerError::invalid_input("Partner name must not be empty"));
        }

        let id = Uuid::new_v4();
        let uploads = join_all(assets.into_tagged().into_iter().map(|(slot, index, file)| {
            let key = format!(
                "partners/{}/{}/{}-{}",
                id,
                slot.dir(),
                index,
                sanitize_file_name(&file.file_name)
            );
            async move {
                let content_type = file.mime();
                let result = self
                    .storage
                    .put(&self.asset_bucket, &key, file.bytes, &content_type)
                    .await;
                if let Err(e) = &result {
                    tracing::warn!(%slot, index, file = %file.file_name, error = %e, "asset upload failed");
                }
                AssetUpload {
                    slot,
                    index,
                    file_name: file.file_name,
                    result,
                }
            }
        }))
        .await;

        let now = Utc::now();
        let mut partner = Partner {
            id,
            name,
            regions: draft.regions,
            logo_url: None,
            brand_manual_url: None,
            reference_banner_urls: Vec::new(),
            product_photo_urls: Vec::new(),
            benefits: draft.benefits,
            description: draft.description,
            status: draft.status,
            created_at: now,
            updated_at: now,
        };
        for upload in &uploads {
            let Some(url) = upload.url() else { continue };
            match upload.slot {
                AssetSlot::Logo => partner.logo_url = Some(url.to_string()),
                AssetSlot::BrandManual => partner.brand_manual_url = Some(url.to_string()),
                AssetSlot::ReferenceBanner => partner.reference_banner_urls.push(url.to_string()),
                AssetSlot::ProductPhoto => partner.product_photo_urls.push(url.to_string()),
            }
        }

        let partner = self.repository.insert_partner(partner).await?;
        tracing::info!(
            partner = %partner.id,
            uploaded = uploads.iter().filter(|u| u.result.is_ok()).count(),
            failed = uploads.iter().filter(|u| u.result.is_err()).count(),
            "partner created"
        );
        Ok(CreatedPartner { partner, uploads })
    }

    /// # Errors
    /// - `BannerError::NotFound` for an unknown id
    /// - `BannerError::InvalidInput` when the update empties the name
    pub async fn update_partner(&self, id: Uuid, update: PartnerUpdate) -> Result<Partner> {
        if update.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(BannerError::invalid_input("Partner name must not be empty"));
        }
        let mut partner = self.partner(id).await?;
        update.apply(&mut partner);
        self.repository.update_partner(partner).await
    }

    /// Delete a partner together with its banners
    ///
    /// # Errors
    /// - `BannerError::NotFound` for an unknown id
    pub async fn delete_partner(&self, id: Uuid) -> Result<()> {
        self.repository.delete_partner(id).await?;
        tracing::info!(partner = %id, "partner deleted");
        Ok(())
    }

    /// # Errors
    /// - `BannerError::NotFound` for an unknown id
    pub async fn partner(&self, id: Uuid) -> Result<Partner> {
        self.repository
            .get_partner(id)
            .await?
            .ok_or_else(|| BannerError::not_found(format!("partner {}", id)))
    }

    pub async fn partners(&self) -> Result<Vec<Partner>> {
        self.repository.list_partners().await
    }

    /// # Errors
    /// - `BannerError::NotFound` for an unknown partner
    pub async fn banners_for(&self, partner_id: Uuid) -> Result<Vec<Banner>> {
        self.partner(partner_id).await?;
        self.repository.banners_for(partner_id).await
    }

    /// Persist a generated banner, storing its image durably when possible
    ///
    /// # Errors
    /// - `BannerError::InvalidInput` for a discount above 100 or a bad URL
    /// - `BannerError::NotFound` for an unknown partner
    /// - Storage failures other than a missing bucket
    /// - Repository failures; an image stored for the banner is removed again
    #[instrument(skip(self, draft), fields(partner = %draft.partner_id))]
    pub async fn record_banner(&self, draft: BannerDraft, bucket: &str) -> Result<RecordedBanner> {
        validate_discount(draft.discount_percentage)?;
        self.partner(draft.partner_id).await?;

        let id = Uuid::new_v4();
        let key = format!(
            "banners/{}/{}.{}",
            draft.partner_id,
            id,
            banner_extension(&draft.image_url)
        );
        let resolution = self.resolver.resolve(&draft.image_url, &key, bucket).await?;

        let banner = Banner {
            id,
            partner_id: draft.partner_id,
            image_url: resolution.url.clone(),
            prompt: draft.prompt,
            main_text: draft.main_text,
            description_text: draft.description_text,
            cta_text: draft.cta_text,
            discount_percentage: draft.discount_percentage,
            created_at: Utc::now(),
        };
        let banner = match self.repository.insert_banner(banner).await {
            Ok(banner) => banner,
            Err(e) => {
                if resolution.is_stored() {
                    if let Err(cleanup) = self.storage.delete(bucket, &key).await {
                        tracing::warn!(bucket, key = %key, error = %cleanup, "stored banner image left behind");
                    }
                }
                return Err(e);
            },
        };
        tracing::info!(banner = %banner.id, stored = resolution.is_stored(), "banner recorded");
        Ok(RecordedBanner { banner, resolution })
    }
}
