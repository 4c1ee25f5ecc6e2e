//! Model weights store
//!
//! Keeps the segmentation model variants in a local cache directory and
//! downloads missing ones on demand. Downloads stream into a temporary file
//! that is renamed into place, so a cached file is always complete.

use super::config::{ModelFetch, ModelPrecision};
use crate::config::ModelStoreConfig;
use crate::error::{BannerError, Result};
use futures_util::stream::TryStreamExt;
#[cfg(feature = "cli")]
use indicatif::{ProgressBar, ProgressStyle};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::io::StreamReader;

/// Environment variable overriding the model cache directory
pub const MODEL_DIR_ENV: &str = "BANNERKIT_MODEL_DIR";

/// Input edge length expected by the model
pub const MODEL_INPUT_SIZE: u32 = 1024;

/// Per-channel normalization mean
pub const NORMALIZATION_MEAN: [f32; 3] = [0.5, 0.5, 0.5];

/// Per-channel normalization std
pub const NORMALIZATION_STD: [f32; 3] = [1.0, 1.0, 1.0];

/// Model file name for each precision
#[must_use]
pub fn model_file_name(precision: ModelPrecision) -> &'static str {
    match precision {
        ModelPrecision::Full => "model.onnx",
        ModelPrecision::Fp16 => "model_fp16.onnx",
        ModelPrecision::Quantized => "model_quantized.onnx",
    }
}

/// Progress reporting that works with and without the `cli` feature
#[derive(Debug)]
pub enum ProgressIndicator {
    #[cfg(feature = "cli")]
    Indicatif(ProgressBar),
    NoOp,
}

impl ProgressIndicator {
    /// Progress bar when the CLI is compiled in, silent otherwise
    #[must_use]
    pub fn bar() -> Self {
        #[cfg(feature = "cli")]
        {
            let pb = ProgressBar::new(0);
            if let Ok(style) = ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")
            {
                pb.set_style(style.progress_chars("#>-"));
            }
            Self::Indicatif(pb)
        }
        #[cfg(not(feature = "cli"))]
        {
            Self::NoOp
        }
    }

    fn set_length(&self, _len: u64) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_length(_len),
            Self::NoOp => {},
        }
    }

    fn set_position(&self, _pos: u64) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_position(_pos),
            Self::NoOp => {},
        }
    }

    fn finish_with_message(&self, _msg: String) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.finish_with_message(_msg),
            Self::NoOp => {},
        }
    }
}

/// Cached model file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedModel {
    pub precision: ModelPrecision,
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// Local cache of model variants backed by a remote base URL
#[derive(Debug, Clone)]
pub struct ModelStore {
    base_url: String,
    cache_dir: PathBuf,
    client: reqwest::Client,
}

impl ModelStore {
    /// Create a store from config; the cache directory is created lazily
    ///
    /// # Errors
    /// - No cache directory could be determined
    /// - HTTP client construction failed
    pub fn new(config: &ModelStoreConfig) -> Result<Self> {
        let cache_dir = match &config.cache_dir {
            Some(dir) => dir.clone(),
            None => Self::default_cache_dir()?,
        };
        Self::with_cache_dir(config.base_url.clone(), cache_dir)
    }

    /// Create a store over an explicit directory
    ///
    /// # Errors
    /// - HTTP client construction failed
    pub fn with_cache_dir<S: Into<String>, P: Into<PathBuf>>(base_url: S, cache_dir: P) -> Result<Self> {
        // no request timeout: weights are hundreds of MB on slow links
        let client = reqwest::Client::builder()
            .user_agent(concat!("bannerkit/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BannerError::network_error("Failed to create HTTP client", e))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            cache_dir: cache_dir.into(),
            client,
        })
    }

    /// `$BANNERKIT_MODEL_DIR`, else `<user cache>/bannerkit/models`
    ///
    /// # Errors
    /// - Neither the override nor a user cache directory is available
    pub fn default_cache_dir() -> Result<PathBuf> {
        if let Ok(dir) = std::env::var(MODEL_DIR_ENV) {
            return Ok(PathBuf::from(dir));
        }
        Ok(dirs::cache_dir()
            .ok_or_else(|| {
                BannerError::invalid_config(format!(
                    "Failed to determine cache directory. Set {} environment variable.",
                    MODEL_DIR_ENV
                ))
            })?
            .join("bannerkit")
            .join("models"))
    }

    #[must_use]
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    #[must_use]
    pub fn model_path(&self, precision: ModelPrecision) -> PathBuf {
        self.cache_dir.join(model_file_name(precision))
    }

    #[must_use]
    pub fn model_url(&self, precision: ModelPrecision) -> String {
        format!("{}/{}", self.base_url, model_file_name(precision))
    }

    #[must_use]
    pub fn is_cached(&self, precision: ModelPrecision) -> bool {
        self.model_path(precision).is_file()
    }

    /// Every cached variant with its size
    #[must_use]
    pub fn cached_models(&self) -> Vec<CachedModel> {
        [
            ModelPrecision::Full,
            ModelPrecision::Fp16,
            ModelPrecision::Quantized,
        ]
        .into_iter()
        .filter_map(|precision| {
            let path = self.model_path(precision);
            let meta = std::fs::metadata(&path).ok()?;
            meta.is_file().then(|| CachedModel {
                precision,
                path,
                size_bytes: meta.len(),
            })
        })
        .collect()
    }

    /// Path of a usable model file, downloading it when allowed
    ///
    /// # Errors
    /// - `CacheOnly` and the variant is not cached
    /// - Download failure
    pub async fn ensure(&self, precision: ModelPrecision, fetch: ModelFetch) -> Result<PathBuf> {
        let path = self.model_path(precision);
        if path.is_file() {
            log::debug!("Using cached {} model: {}", precision, path.display());
            return Ok(path);
        }

        match fetch {
            ModelFetch::CacheOnly => Err(BannerError::not_found(format!(
                "{} model not in cache ({})",
                precision,
                path.display()
            ))),
            ModelFetch::Network => self.download(precision, None).await,
        }
    }

    /// Download a variant into the cache, replacing any cached copy
    ///
    /// # Errors
    /// - Network or HTTP failure
    /// - Cache directory not writable
    pub async fn download(
        &self,
        precision: ModelPrecision,
        progress: Option<&ProgressIndicator>,
    ) -> Result<PathBuf> {
        let url = self.model_url(precision);
        let final_path = self.model_path(precision);
        log::info!("Downloading {} model from: {}", precision, url);

        tokio::fs::create_dir_all(&self.cache_dir)
            .await
            .map_err(|e| BannerError::file_io_error("create cache directory", &self.cache_dir, &e))?;

        // unique temp name so concurrent downloads never share a file
        let temp_path = self.cache_dir.join(format!(
            ".{}.{}.part",
            model_file_name(precision),
            uuid::Uuid::new_v4().simple()
        ));

        match self.stream_to_file(&url, &temp_path, progress).await {
            Ok(digest) => {
                tokio::fs::rename(&temp_path, &final_path).await.map_err(|e| {
                    BannerError::file_io_error("move downloaded model to cache", &final_path, &e)
                })?;
                log::info!(
                    "Downloaded {} model to {} (sha256 {})",
                    precision,
                    final_path.display(),
                    digest
                );
                if let Some(pb) = progress {
                    pb.finish_with_message(format!("Downloaded {}", model_file_name(precision)));
                }
                Ok(final_path)
            },
            Err(e) => {
                if let Err(cleanup_err) = tokio::fs::remove_file(&temp_path).await {
                    log::warn!("Failed to cleanup temp file: {}", cleanup_err);
                }
                if let Some(pb) = progress {
                    pb.finish_with_message("Download failed".to_string());
                }
                Err(e)
            },
        }
    }

    /// Stream `url` into `path`, returning the hex SHA-256 of the content
    async fn stream_to_file(
        &self,
        url: &str,
        path: &Path,
        progress: Option<&ProgressIndicator>,
    ) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| BannerError::network_error(format!("Failed to download {}", url), e))?;

        if !response.status().is_success() {
            return Err(BannerError::network_error(
                format!("Failed to download {}", url),
                format!("HTTP {}", response.status()),
            ));
        }

        if let (Some(pb), Some(total)) = (progress, response.content_length()) {
            pb.set_length(total);
        }

        let mut file = tokio::fs::File::create(path)
            .await
            .map_err(|e| BannerError::file_io_error("create file", path, &e))?;
        let mut stream = StreamReader::new(
            response
                .bytes_stream()
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)),
        );

        let mut hasher = Sha256::new();
        let mut downloaded = 0u64;
        let mut buffer = vec![0; 64 * 1024];
        loop {
            let read = stream
                .read(&mut buffer)
                .await
                .map_err(|e| BannerError::network_error("Failed to read download stream", e))?;
            if read == 0 {
                break;
            }
            let chunk = buffer.get(..read).unwrap_or(&[]);
            hasher.update(chunk);
            file.write_all(chunk)
                .await
                .map_err(|e| BannerError::file_io_error("write to file", path, &e))?;
            downloaded += read as u64;
            if let Some(pb) = progress {
                pb.set_position(downloaded);
            }
        }

        file.flush()
            .await
            .map_err(|e| BannerError::file_io_error("flush file", path, &e))?;
        log::debug!("Downloaded {} bytes to {}", downloaded, path.display());

        Ok(format!("{:x}", hasher.finalize()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(dir: &Path) -> ModelStore {
        ModelStore::with_cache_dir("https://models.invalid/onnx/", dir).unwrap()
    }

    #[test]
    fn test_file_names_and_urls() {
        let dir = TempDir::new().unwrap();
        let store = store(dir.path());

        assert_eq!(
            store.model_url(ModelPrecision::Quantized),
            "https://models.invalid/onnx/model_quantized.onnx"
        );
        assert_eq!(store.model_path(ModelPrecision::Full), dir.path().join("model.onnx"));
        assert_eq!(model_file_name(ModelPrecision::Fp16), "model_fp16.onnx");
    }

    #[test]
    fn test_cached_models_listing() {
        let dir = TempDir::new().unwrap();
        let store = store(dir.path());
        assert!(store.cached_models().is_empty());

        std::fs::write(dir.path().join("model_fp16.onnx"), vec![0u8; 42]).unwrap();
        let cached = store.cached_models();
        assert_eq!(cached.len(), 1);
        assert_eq!(cached[0].precision, ModelPrecision::Fp16);
        assert_eq!(cached[0].size_bytes, 42);
        assert!(store.is_cached(ModelPrecision::Fp16));
        assert!(!store.is_cached(ModelPrecision::Full));
    }

    #[tokio::test]
    async fn test_cache_only_never_downloads() {
        let dir = TempDir::new().unwrap();
        let store = store(dir.path());

        let err = store
            .ensure(ModelPrecision::Quantized, ModelFetch::CacheOnly)
            .await
            .unwrap_err();
        assert!(matches!(err, BannerError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_cached_model_is_used() {
        let dir = TempDir::new().unwrap();
        let store = store(dir.path());
        std::fs::write(dir.path().join("model_quantized.onnx"), b"weights").unwrap();

        let path = store
            .ensure(ModelPrecision::Quantized, ModelFetch::CacheOnly)
            .await
            .unwrap();
        assert_eq!(path, dir.path().join("model_quantized.onnx"));
    }
}
