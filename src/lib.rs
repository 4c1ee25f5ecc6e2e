#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::module_name_repetitions)]

//! # bannerkit
//!
//! Backend for a marketing-banner tool: it turns short-lived AI-generated image
//! URLs into durable stored objects, relays requests to the BFL image API with a
//! server-held key, removes backgrounds from product photos, and keeps a
//! catalog of partners and their banners.
//!
//! ## Components
//!
//! - [`acquisition`]: the upload fallback resolver. AI delivery hosts go through
//!   the own image proxy and then a list of public relays; anything else is
//!   fetched directly. When nothing yields a valid image, the original URL is
//!   returned unchanged.
//! - [`proxy`]: the axum server exposing `GET /api/proxy-image` and
//!   `ANY /api/bfl/*path`.
//! - [`removal`]: the background-removal pipeline with its fallback ladder,
//!   white-halo post-processing and session-scoped object URLs.
//! - [`catalog`]: partners, banners and their asset uploads.
//! - [`storage`]: the object-store seam with filesystem and in-memory stores.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bannerkit::acquisition::{HttpFetcher, UploadResolver};
//! use bannerkit::config::AppConfig;
//! use bannerkit::storage::FsStorage;
//! use std::sync::Arc;
//!
//! # async fn example() -> bannerkit::Result<()> {
//! let config = AppConfig::default();
//! let storage = FsStorage::from_config(&config.storage);
//! storage.create_bucket("banners").await?;
//!
//! let resolver = UploadResolver::new(
//!     config.acquisition.clone(),
//!     Arc::new(HttpFetcher::new()?),
//!     Arc::new(storage),
//! );
//! let resolved = resolver
//!     .resolve("https://delivery-us1.bfl.ai/abc.png", "banners/abc.png", "banners")
//!     .await?;
//! println!("{} ({} attempts)", resolved.url, resolved.attempts.len());
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `onnx` (default): ONNX Runtime background remover
//! - `cli` (default): `bannerkit` binary, progress bars and subscriber setup
//! - `tracing-json`: JSON log output for the CLI

pub mod acquisition;
pub mod catalog;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod error;
pub mod fallback;
pub mod proxy;
pub mod removal;
pub mod storage;
#[cfg(test)]
pub(crate) mod test_utils;
#[cfg(feature = "cli")]
pub mod tracing_config;

pub use acquisition::{ResolvedImage, UploadResolver};
pub use catalog::{Banner, CatalogService, Partner};
pub use config::AppConfig;
pub use error::{BannerError, Result};
pub use removal::{InputImage, ObjectUrlRegistry, RemovalOutcome, RemovalPipeline};
pub use storage::{ObjectStorage, StorageError};
