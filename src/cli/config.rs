//! Turning command-line arguments into runtime components

use crate::acquisition::{HttpFetcher, UploadResolver};
use crate::catalog::{CatalogService, JsonCatalogRepository};
use crate::config::AppConfig;
use crate::storage::{FsStorage, ObjectStorage};
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

/// Builds the configuration and services a command needs
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// File (or defaults), then environment, then `--bind`
    pub(crate) fn load(config_path: Option<&Path>, bind: Option<&str>) -> Result<AppConfig> {
        Self::load_with_env(config_path, bind, |key| std::env::var(key).ok())
    }

    pub(crate) fn load_with_env<F>(
        config_path: Option<&Path>,
        bind: Option<&str>,
        lookup: F,
    ) -> Result<AppConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match config_path {
            Some(path) => AppConfig::from_json_file(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => AppConfig::default(),
        };
        config.apply_env_from(lookup);
        if let Some(bind) = bind {
            config.server.bind = bind.to_string();
        }
        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    /// Filesystem store with the configured default and asset buckets present
    pub(crate) async fn storage(config: &AppConfig) -> Result<Arc<FsStorage>> {
        let storage = FsStorage::from_config(&config.storage);
        for bucket in [&config.storage.default_bucket, &config.catalog.asset_bucket] {
            storage
                .create_bucket(bucket)
                .await
                .with_context(|| format!("Failed to create bucket '{}'", bucket))?;
        }
        Ok(Arc::new(storage))
    }

    pub(crate) fn resolver(config: &AppConfig, storage: Arc<dyn ObjectStorage>) -> Result<UploadResolver> {
        let fetcher = HttpFetcher::new().context("Failed to create HTTP fetcher")?;
        Ok(UploadResolver::new(
            config.acquisition.clone(),
            Arc::new(fetcher),
            storage,
        ))
    }

    pub(crate) async fn catalog(config: &AppConfig) -> Result<CatalogService> {
        let storage: Arc<dyn ObjectStorage> = Self::storage(config).await?;
        let resolver = Self::resolver(config, Arc::clone(&storage))?;
        let repository = JsonCatalogRepository::open(&config.catalog.path)
            .await
            .with_context(|| format!("Failed to open catalog {}", config.catalog.path.display()))?;
        Ok(CatalogService::new(
            Arc::new(repository),
            storage,
            resolver,
            config.catalog.asset_bucket.clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_defaults_without_file() {
        let config = CliConfigBuilder::load_with_env(None, None, no_env).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_bind_flag_wins_over_env() {
        let env: HashMap<&str, &str> = [("BANNERKIT_BIND", "0.0.0.0:9000")].into();
        let config = CliConfigBuilder::load_with_env(None, Some("127.0.0.1:7000"), |k| {
            env.get(k).map(|v| v.to_string())
        })
        .unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:7000");
    }

    #[test]
    fn test_file_is_loaded_and_validated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bannerkit.json");
        std::fs::write(&path, r#"{"storage": {"default_bucket": "promo"}}"#).unwrap();
        let config = CliConfigBuilder::load_with_env(Some(&path), None, no_env).unwrap();
        assert_eq!(config.storage.default_bucket, "promo");

        assert!(CliConfigBuilder::load_with_env(Some(&path), Some("not-an-addr"), no_env).is_err());
        assert!(CliConfigBuilder::load_with_env(Some(&dir.path().join("missing.json")), None, no_env).is_err());
    }

    #[tokio::test]
    async fn test_storage_creates_buckets() {
        let dir = TempDir::new().unwrap();
        let mut config = AppConfig::default();
        config.storage.root = dir.path().join("storage");

        CliConfigBuilder::storage(&config).await.unwrap();
        assert!(dir.path().join("storage/banners").is_dir());
        assert!(dir.path().join("storage/partner-assets").is_dir());
    }
}
