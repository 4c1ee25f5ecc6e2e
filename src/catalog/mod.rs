//! Partner and banner records
//!
//! Records live behind [`CatalogRepository`]; [`CatalogService`] adds asset
//! uploads, validation and durable banner image URLs on top.

mod repository;
mod service;

pub use repository::{CatalogRepository, JsonCatalogRepository};
pub use service::{AssetFile, AssetSlot, AssetUpload, CatalogService, CreatedPartner, PartnerAssets, RecordedBanner};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Lifecycle of a partner
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartnerStatus {
    #[default]
    Draft,
    Active,
    Inactive,
}

impl fmt::Display for PartnerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Draft => write!(f, "draft"),
            Self::Active => write!(f, "active"),
            Self::Inactive => write!(f, "inactive"),
        }
    }
}

impl std::str::FromStr for PartnerStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "draft" => Ok(Self::Draft),
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            _ => Err(format!("Unknown partner status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partner {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub regions: Vec<String>,
    pub logo_url: Option<String>,
    pub brand_manual_url: Option<String>,
    #[serde(default)]
    pub reference_banner_urls: Vec<String>,
    #[serde(default)]
    pub product_photo_urls: Vec<String>,
    pub benefits: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub status: PartnerStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields supplied when creating a partner
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartnerDraft {
    pub name: String,
    pub regions: Vec<String>,
    pub benefits: Option<String>,
    pub description: Option<String>,
    pub status: PartnerStatus,
}

/// Partial update; `None` leaves a field unchanged
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartnerUpdate {
    pub name: Option<String>,
    pub regions: Option<Vec<String>>,
    pub logo_url: Option<String>,
    pub brand_manual_url: Option<String>,
    pub reference_banner_urls: Option<Vec<String>>,
    pub product_photo_urls: Option<Vec<String>>,
    pub benefits: Option<String>,
    pub description: Option<String>,
    pub status: Option<PartnerStatus>,
}

impl PartnerUpdate {
    /// Apply to `partner`, bumping `updated_at`
    pub fn apply(self, partner: &mut Partner) {
        if let Some(name) = self.name {
            partner.name = name;
        }
        if let Some(regions) = self.regions {
            partner.regions = regions;
        }
        if let Some(url) = self.logo_url {
            partner.logo_url = Some(url);
        }
        if let Some(url) = self.brand_manual_url {
            partner.brand_manual_url = Some(url);
        }
        if let Some(urls) = self.reference_banner_urls {
            partner.reference_banner_urls = urls;
        }
        if let Some(urls) = self.product_photo_urls {
            partner.product_photo_urls = urls;
        }
        if let Some(benefits) = self.benefits {
            partner.benefits = Some(benefits);
        }
        if let Some(description) = self.description {
            partner.description = Some(description);
        }
        if let Some(status) = self.status {
            partner.status = status;
        }
        partner.updated_at = Utc::now();
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Banner {
    pub id: Uuid,
    pub partner_id: Uuid,
    /// Durable URL when the upload succeeded, else the generator's URL
    pub image_url: String,
    pub prompt: String,
    pub main_text: String,
    pub description_text: String,
    pub cta_text: String,
    /// 0-100
    pub discount_percentage: Option<u8>,
    pub created_at: DateTime<Utc>,
}

/// Fields supplied when recording a generated banner
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BannerDraft {
    pub partner_id: Uuid,
    /// Generator URL of the image (usually short-lived)
    pub image_url: String,
    pub prompt: String,
    pub main_text: String,
    pub description_text: String,
    pub cta_text: String,
    pub discount_percentage: Option<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn partner() -> Partner {
        let now = Utc::now();
        Partner {
            id: Uuid::new_v4(),
            name: "Acme".into(),
            regions: vec!["EU".into()],
            logo_url: None,
            brand_manual_url: None,
            reference_banner_urls: vec![],
            product_photo_urls: vec![],
            benefits: None,
            description: None,
            status: PartnerStatus::Draft,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_update_only_touches_given_fields() {
        let mut p = partner();
        let before = p.clone();

        PartnerUpdate {
            status: Some(PartnerStatus::Active),
            description: Some("Outdoor gear".into()),
            ..PartnerUpdate::default()
        }
        .apply(&mut p);

        assert_eq!(p.status, PartnerStatus::Active);
        assert_eq!(p.description.as_deref(), Some("Outdoor gear"));
        assert_eq!(p.name, before.name);
        assert_eq!(p.regions, before.regions);
        assert!(p.updated_at >= before.updated_at);
    }

    #[test]
    fn test_status_serde() {
        assert_eq!(serde_json::to_string(&PartnerStatus::Inactive).unwrap(), "\"inactive\"");
        assert_eq!("ACTIVE".parse::<PartnerStatus>().unwrap(), PartnerStatus::Active);
        assert!("archived".parse::<PartnerStatus>().is_err());
    }

    #[test]
    fn test_partner_json_defaults() {
        let json = format!(
            r#"{{"id":"{}","name":"Acme","logo_url":null,"brand_manual_url":null,
                "benefits":null,"description":null,
                "created_at":"2025-01-01T00:00:00Z","updated_at":"2025-01-01T00:00:00Z"}}"#,
            Uuid::new_v4()
        );
        let p: Partner = serde_json::from_str(&json).unwrap();
        assert!(p.regions.is_empty());
        assert_eq!(p.status, PartnerStatus::Draft);
    }
}
