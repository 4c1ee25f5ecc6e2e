//! Configuration types for the banner backend
//!
//! Every section has a working default so a bare `AppConfig::default()` runs the
//! server locally. A JSON file can override any subset of fields, and a small set
//! of environment variables override the file (the BFL API key is only ever read
//! from the environment and never serialized).

use crate::error::{BannerError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable holding the BFL API key
pub const API_KEY_ENV: &str = "BFL_API_KEY";

/// Default minimum size for an acquired image payload
pub const DEFAULT_MIN_IMAGE_BYTES: usize = 1024;

/// Complete application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub acquisition: AcquisitionConfig,
    pub relay: RelayConfig,
    pub storage: StorageConfig,
    pub removal: RemovalLimits,
    pub models: ModelStoreConfig,
    pub catalog: CatalogConfig,
}

impl AppConfig {
    /// Load configuration from a JSON file; missing fields keep their defaults
    ///
    /// # Errors
    /// - File cannot be read
    /// - File is not valid JSON for this schema
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| BannerError::file_io_error("read config file", path, &e))?;
        let config: Self = serde_json::from_str(&content).map_err(|e| {
            BannerError::invalid_config(format!("Failed to parse '{}': {}", path.display(), e))
        })?;
        Ok(config)
    }

    /// Apply environment variable overrides
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup (tests inject a map here)
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(bind) = lookup("BANNERKIT_BIND") {
            self.server.bind = bind;
        }
        if let Some(base) = lookup("BANNERKIT_PUBLIC_BASE_URL") {
            let base = base.trim_end_matches('/').to_string();
            let endpoint = format!("{}/api/proxy-image", base);
            let previous = std::mem::replace(&mut self.acquisition.proxy_endpoint, endpoint.clone());
            for relay in &mut self.acquisition.relays {
                if let Some(rest) = relay.strip_prefix(previous.as_str()) {
                    *relay = format!("{}{}", endpoint, rest);
                }
            }
            self.storage.public_base_url = format!("{}/storage", base);
            self.server.public_base_url = base;
        }
        if let Some(root) = lookup("BANNERKIT_STORAGE_ROOT") {
            self.storage.root = PathBuf::from(root);
        }
        if let Some(path) = lookup("BANNERKIT_CATALOG_PATH") {
            self.catalog.path = PathBuf::from(path);
        }
        if let Some(key) = lookup(API_KEY_ENV).filter(|k| !k.trim().is_empty()) {
            self.relay.api_key = Some(key);
        }
    }

    /// Validate all sections
    ///
    /// # Errors
    /// - Any section fails its own validation
    pub fn validate(&self) -> Result<()> {
        self.acquisition.validate()?;
        self.removal.validate()?;
        if self.server.bind.parse::<std::net::SocketAddr>().is_err() {
            return Err(BannerError::invalid_config(format!(
                "Server bind address '{}' is not a socket address",
                self.server.bind
            )));
        }
        url::Url::parse(&self.relay.upstream_base).map_err(|e| {
            BannerError::invalid_config(format!(
                "Relay upstream '{}' is not a URL: {}",
                self.relay.upstream_base, e
            ))
        })?;
        Ok(())
    }
}

/// HTTP server settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address the proxy server listens on
    pub bind: String,
    /// Externally reachable base URL of this server
    pub public_base_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8787".to_string(),
            public_base_url: "http://127.0.0.1:8787".to_string(),
        }
    }
}

/// Settings for image acquisition (server proxy, relays, validation)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// AI delivery domains; a host matches a domain exactly or as a subdomain
    pub delivery_domains: Vec<String>,
    /// Own server-side image proxy endpoint (endpoint A)
    pub proxy_endpoint: String,
    /// Ordered relay templates; `{url}` is replaced by the encoded target URL
    pub relays: Vec<String>,
    /// Payloads below this many bytes are rejected as empty or corrupt
    pub min_image_bytes: usize,
    /// Upper bound for decode validation of a relay payload
    pub decode_timeout_secs: u64,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        let proxy_endpoint = "http://127.0.0.1:8787/api/proxy-image".to_string();
        Self {
            delivery_domains: vec![
                "bfl.ai".to_string(),
                "bfl.ml".to_string(),
                "oaidalleapiprodscus.blob.core.windows.net".to_string(),
                "replicate.delivery".to_string(),
            ],
            relays: vec![
                format!("{}?url={{url}}", proxy_endpoint),
                "https://corsproxy.io/?{url}".to_string(),
                "https://api.allorigins.win/raw?url={url}".to_string(),
            ],
            proxy_endpoint,
            min_image_bytes: DEFAULT_MIN_IMAGE_BYTES,
            decode_timeout_secs: 30,
        }
    }
}

impl AcquisitionConfig {
    /// Create a new configuration builder
    #[must_use]
    pub fn builder() -> AcquisitionConfigBuilder {
        AcquisitionConfigBuilder::default()
    }

    /// Decode-validation timeout as a `Duration`
    #[must_use]
    pub fn decode_timeout(&self) -> Duration {
        Duration::from_secs(self.decode_timeout_secs)
    }

    /// Whether `host` belongs to one of the configured delivery domains
    #[must_use]
    pub fn is_delivery_host(&self, host: &str) -> bool {
        let host = host.trim_end_matches('.').to_ascii_lowercase();
        self.delivery_domains.iter().any(|domain| {
            let domain = domain.to_ascii_lowercase();
            host == domain || host.ends_with(&format!(".{}", domain))
        })
    }

    /// Validate acquisition settings
    ///
    /// # Errors
    /// - `min_image_bytes` outside 1..=10 MiB
    /// - `decode_timeout_secs` of zero
    /// - relay templates without a `{url}` placeholder
    pub fn validate(&self) -> Result<()> {
        if self.min_image_bytes == 0 || self.min_image_bytes > 10 * 1024 * 1024 {
            return Err(BannerError::config_value_error(
                "min image bytes",
                self.min_image_bytes,
                "1-10485760",
                Some(DEFAULT_MIN_IMAGE_BYTES),
            ));
        }
        if self.decode_timeout_secs == 0 {
            return Err(BannerError::config_value_error(
                "decode timeout (s)",
                self.decode_timeout_secs,
                "1-600",
                Some(30),
            ));
        }
        if let Some(bad) = self.relays.iter().find(|r| !r.contains("{url}")) {
            return Err(BannerError::invalid_config(format!(
                "Relay template '{}' has no {{url}} placeholder",
                bad
            )));
        }
        Ok(())
    }
}

/// Builder for `AcquisitionConfig`
#[derive(Debug, Default)]
pub struct AcquisitionConfigBuilder {
    config: AcquisitionConfig,
}

impl AcquisitionConfigBuilder {
    /// Replace the delivery domain allow-list
    #[must_use]
    pub fn delivery_domains<I, S>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.delivery_domains = domains.into_iter().map(Into::into).collect();
        self
    }

    /// Set the own proxy endpoint
    #[must_use]
    pub fn proxy_endpoint<S: Into<String>>(mut self, endpoint: S) -> Self {
        self.config.proxy_endpoint = endpoint.into();
        self
    }

    /// Replace the relay template list
    #[must_use]
    pub fn relays<I, S>(mut self, relays: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.relays = relays.into_iter().map(Into::into).collect();
        self
    }

    /// Set the minimum payload size
    #[must_use]
    pub fn min_image_bytes(mut self, bytes: usize) -> Self {
        self.config.min_image_bytes = bytes;
        self
    }

    /// Set the decode-validation timeout
    #[must_use]
    pub fn decode_timeout_secs(mut self, secs: u64) -> Self {
        self.config.decode_timeout_secs = secs;
        self
    }

    /// Build and validate the configuration
    ///
    /// # Errors
    /// - Validation failures, see [`AcquisitionConfig::validate`]
    pub fn build(self) -> Result<AcquisitionConfig> {
        let config = self.config;
        config.validate()?;
        Ok(config)
    }
}

/// Settings for the BFL relay endpoint (endpoint B)
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Upstream API base URL
    pub upstream_base: String,
    /// Server-held API key, only ever read from the environment
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            upstream_base: "https://api.bfl.ml".to_string(),
            api_key: None,
        }
    }
}

impl std::fmt::Debug for RelayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayConfig")
            .field("upstream_base", &self.upstream_base)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Filesystem object storage settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory; each bucket is a sub-directory
    pub root: PathBuf,
    /// Public URL prefix under which the root is served
    pub public_base_url: String,
    /// Bucket used when a caller does not name one
    pub default_bucket: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./data/storage"),
            public_base_url: "http://127.0.0.1:8787/storage".to_string(),
            default_bucket: "banners".to_string(),
        }
    }
}

/// Input limits for background removal, by compute capability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemovalLimits {
    /// Maximum input size when GPU acceleration is reported
    pub max_bytes_gpu: usize,
    /// Maximum input size on CPU-only environments
    pub max_bytes_cpu: usize,
}

impl Default for RemovalLimits {
    fn default() -> Self {
        Self {
            max_bytes_gpu: 25 * 1024 * 1024,
            max_bytes_cpu: 10 * 1024 * 1024,
        }
    }
}

impl RemovalLimits {
    /// Size limit for the given capability
    #[must_use]
    pub fn max_bytes(&self, gpu_supported: bool) -> usize {
        if gpu_supported {
            self.max_bytes_gpu
        } else {
            self.max_bytes_cpu
        }
    }

    /// Validate limits
    ///
    /// # Errors
    /// - Zero limits
    pub fn validate(&self) -> Result<()> {
        if self.max_bytes_cpu == 0 || self.max_bytes_gpu == 0 {
            return Err(BannerError::invalid_config(
                "Removal size limits must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// Model download settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelStoreConfig {
    /// Base URL that holds `model.onnx`, `model_fp16.onnx`, `model_quantized.onnx`
    pub base_url: String,
    /// Cache directory override (default: user cache dir)
    pub cache_dir: Option<PathBuf>,
}

impl Default for ModelStoreConfig {
    fn default() -> Self {
        Self {
            base_url: "https://huggingface.co/briaai/RMBG-1.4/resolve/main/onnx".to_string(),
            cache_dir: None,
        }
    }
}

/// Partner/banner catalog settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// JSON document holding partners and banners
    pub path: PathBuf,
    /// Bucket receiving partner logos, manuals and photos
    pub asset_bucket: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/catalog.json"),
            asset_bucket: "partner-assets".to_string(),
        }
    }
}
