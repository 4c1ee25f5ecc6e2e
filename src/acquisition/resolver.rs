//! Upload fallback resolver
//!
//! Turns a short-lived remote image URL into a durable stored URL. Hosts on the
//! AI delivery allow-list go through the own proxy first and then every public
//! relay; other hosts are fetched directly. If nothing yields a usable image the
//! original URL is handed back unchanged.

use super::fetcher::{FetchedPayload, ImageFetcher};
use super::strategy::{classify_failure, AcquisitionAttempt, AcquisitionError, Strategy};
use super::validate::{check_min_size, coerce_image_mime, ensure_decodes, is_image_content_type};
use crate::config::AcquisitionConfig;
use crate::error::{BannerError, Result};
use crate::fallback::{attempt_in_order, Outcome};
use crate::storage::{ObjectStorage, StorageError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;
use url::Url;

/// Where the URL of a resolved image points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageOrigin {
    /// Bytes were uploaded; the strategy that produced them
    Stored(Strategy),
    /// Original URL kept
    Passthrough,
}

/// Result of a resolve call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedImage {
    pub url: String,
    pub origin: ImageOrigin,
    /// Every strategy tried, in order
    pub attempts: Vec<AcquisitionAttempt>,
}

impl ResolvedImage {
    #[must_use]
    pub fn is_stored(&self) -> bool {
        matches!(self.origin, ImageOrigin::Stored(_))
    }
}

/// Bytes that passed a strategy's acceptance checks
#[derive(Debug)]
struct Acquired {
    source_url: String,
    payload: FetchedPayload,
}

/// Resolves remote image URLs into stored URLs
#[derive(Clone)]
pub struct UploadResolver {
    config: AcquisitionConfig,
    fetcher: Arc<dyn ImageFetcher>,
    storage: Arc<dyn ObjectStorage>,
}

impl std::fmt::Debug for UploadResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadResolver")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl UploadResolver {
    pub fn new(
        config: AcquisitionConfig,
        fetcher: Arc<dyn ImageFetcher>,
        storage: Arc<dyn ObjectStorage>,
    ) -> Self {
        Self {
            config,
            fetcher,
            storage,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AcquisitionConfig {
        &self.config
    }

    /// Strategies tried for `url`, in order
    #[must_use]
    pub fn strategies_for(&self, url: &Url) -> Vec<Strategy> {
        let external = url
            .host_str()
            .is_some_and(|host| self.config.is_delivery_host(host));
        if external {
            std::iter::once(Strategy::ServerProxy)
                .chain((0..self.config.relays.len()).map(Strategy::PublicRelay))
                .collect()
        } else {
            vec![Strategy::Direct]
        }
    }

    /// URL requested for a strategy
    #[must_use]
    pub fn source_url(&self, strategy: Strategy, target: &str) -> String {
        let encoded: String = url::form_urlencoded::byte_serialize(target.as_bytes()).collect();
        match strategy {
            Strategy::Direct | Strategy::Passthrough => target.to_string(),
            Strategy::ServerProxy => {
                format!("{}?url={}", self.config.proxy_endpoint, encoded)
            },
            Strategy::PublicRelay(i) => self
                .config
                .relays
                .get(i)
                .map_or_else(|| target.to_string(), |t| t.replace("{url}", &encoded)),
        }
    }

    /// Store the image behind `url` at `bucket/key`
    ///
    /// # Errors
    /// - `BannerError::InvalidInput` when `url` is not an absolute URL
    /// - `BannerError::Storage` for storage failures other than a missing bucket
    #[instrument(skip(self), fields(strategies = tracing::field::Empty))]
    pub async fn resolve(&self, url: &str, key: &str, bucket: &str) -> Result<ResolvedImage> {
        let parsed = Url::parse(url)
            .map_err(|e| BannerError::invalid_input(format!("Invalid image URL '{}': {}", url, e)))?;
        let strategies = self.strategies_for(&parsed);
        tracing::Span::current().record("strategies", strategies.len());
        let started = instant::Instant::now();

        let outcome = attempt_in_order(
            strategies,
            |strategy| self.attempt(strategy, url),
            |strategy, acquired| self.accept(strategy, acquired),
        )
        .await;

        let mut attempts: Vec<AcquisitionAttempt> = outcome
            .failures()
            .iter()
            .map(|f| AcquisitionAttempt::failure(f.strategy, self.source_url(f.strategy, url), &f.error))
            .collect();

        let (strategy, acquired) = match outcome {
            Outcome::Succeeded {
                strategy, value, ..
            } => (strategy, value),
            Outcome::Exhausted { .. } => {
                tracing::warn!(
                    url,
                    tried = attempts.len(),
                    "all acquisition strategies failed, keeping original URL"
                );
                return Ok(passthrough(url, attempts));
            },
        };

        let bytes = acquired.payload.bytes;
        attempts.push(AcquisitionAttempt::success(
            strategy,
            acquired.source_url,
            bytes.len(),
        ));

        let content_type = coerce_image_mime(acquired.payload.content_type.as_deref(), &bytes);
        match self.storage.put(bucket, key, bytes, &content_type).await {
            Ok(stored) => {
                tracing::info!(
                    %strategy,
                    url = %stored.url,
                    size = stored.size,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "image stored"
                );
                Ok(ResolvedImage {
                    url: stored.url,
                    origin: ImageOrigin::Stored(strategy),
                    attempts,
                })
            },
            Err(StorageError::BucketNotFound(name)) => {
                tracing::warn!(bucket = %name, "bucket missing, keeping original URL");
                Ok(passthrough(url, attempts))
            },
            Err(e) => Err(e.into()),
        }
    }

    async fn attempt(&self, strategy: Strategy, target: &str) -> std::result::Result<Acquired, AcquisitionError> {
        let source_url = self.source_url(strategy, target);
        tracing::debug!(%strategy, %source_url, "attempting acquisition");

        let payload = match self.fetcher.fetch(&source_url).await {
            Ok(payload) => payload,
            Err(e) => {
                if strategy == Strategy::ServerProxy {
                    tracing::warn!(
                        class = %super::strategy::FailureClass::NetworkUnreachable,
                        error = %e,
                        "server proxy unreachable"
                    );
                }
                return Err(e);
            },
        };

        Ok(Acquired {
            source_url,
            payload,
        })
    }

    async fn accept(&self, strategy: Strategy, acquired: Acquired) -> std::result::Result<Acquired, AcquisitionError> {
        let payload = &acquired.payload;
        let is_image = is_image_content_type(payload.content_type.as_deref());

        match strategy {
            Strategy::ServerProxy if !is_image => {
                let details = payload.text();
                let class = classify_failure(payload.status, &details);
                tracing::warn!(%class, status = payload.status, %details, "server proxy returned no image");
                return Err(AcquisitionError::ProxyRefused {
                    class,
                    status: payload.status,
                    details,
                });
            },
            Strategy::ServerProxy if !payload.is_success() => {
                return Err(AcquisitionError::Status(payload.status));
            },
            Strategy::PublicRelay(_) if !payload.is_success() => {
                return Err(AcquisitionError::Status(payload.status));
            },
            Strategy::PublicRelay(_) if !is_image => {
                return Err(AcquisitionError::NotAnImage(payload.content_type.clone()));
            },
            Strategy::Direct if !payload.is_success() => {
                return Err(AcquisitionError::Status(payload.status));
            },
            _ => {},
        }

        check_min_size(&payload.bytes, self.config.min_image_bytes)?;

        if matches!(strategy, Strategy::PublicRelay(_)) {
            ensure_decodes(payload.bytes.clone(), self.config.decode_timeout()).await?;
        }

        Ok(acquired)
    }
}

fn passthrough(url: &str, mut attempts: Vec<AcquisitionAttempt>) -> ResolvedImage {
    attempts.push(AcquisitionAttempt {
        strategy: Strategy::Passthrough,
        source_url: url.to_string(),
        succeeded: true,
        byte_len: None,
        error: None,
    });
    ResolvedImage {
        url: url.to_string(),
        origin: ImageOrigin::Passthrough,
        attempts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use crate::test_utils::{png_fixture, MockFetcher};

    fn resolver(fetcher: MockFetcher, storage: MemoryStorage) -> UploadResolver {
        UploadResolver::new(
            AcquisitionConfig::default(),
            Arc::new(fetcher),
            Arc::new(storage),
        )
    }

    #[test]
    fn test_strategy_selection() {
        let r = resolver(MockFetcher::new(), MemoryStorage::default());

        let external = Url::parse("https://delivery-eu1.bfl.ai/x.png").unwrap();
        assert_eq!(
            r.strategies_for(&external),
            vec![
                Strategy::ServerProxy,
                Strategy::PublicRelay(0),
                Strategy::PublicRelay(1),
                Strategy::PublicRelay(2)
            ]
        );

        let other = Url::parse("https://cdn.example.com/x.png").unwrap();
        assert_eq!(r.strategies_for(&other), vec![Strategy::Direct]);
    }

    #[test]
    fn test_source_urls_are_encoded() {
        let r = resolver(MockFetcher::new(), MemoryStorage::default());
        let target = "https://delivery-us1.bfl.ai/a.png?sig=1&x=2";

        assert_eq!(
            r.source_url(Strategy::ServerProxy, target),
            "http://127.0.0.1:8787/api/proxy-image?url=https%3A%2F%2Fdelivery-us1.bfl.ai%2Fa.png%3Fsig%3D1%26x%3D2"
        );
        assert!(r
            .source_url(Strategy::PublicRelay(1), target)
            .starts_with("https://corsproxy.io/?https%3A%2F%2F"));
        assert_eq!(r.source_url(Strategy::Direct, target), target);
    }

    #[tokio::test]
    async fn test_invalid_url_is_rejected() {
        let r = resolver(MockFetcher::new(), MemoryStorage::default());
        let err = r.resolve("not a url", "k.png", "banners").await.unwrap_err();
        assert!(matches!(err, BannerError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_direct_fetch_is_stored() {
        let url = "https://cdn.example.com/photo.png";
        let fetcher = MockFetcher::new().respond(url, 200, Some("image/png"), png_fixture(64));
        let storage = MemoryStorage::default().with_bucket("banners");
        let r = resolver(fetcher.clone(), storage.clone());

        let resolved = r.resolve(url, "a/photo.png", "banners").await.unwrap();
        assert_eq!(resolved.origin, ImageOrigin::Stored(Strategy::Direct));
        assert_eq!(resolved.url, "memory://storage/banners/a/photo.png");
        assert_eq!(fetcher.requests(), vec![url.to_string()]);
        assert_eq!(storage.object_count("banners"), 1);
    }

    #[tokio::test]
    async fn test_small_direct_payload_degrades() {
        let url = "https://cdn.example.com/tiny.png";
        let fetcher = MockFetcher::new().respond(url, 200, Some("image/png"), vec![1, 2, 3]);
        let storage = MemoryStorage::default().with_bucket("banners");
        let r = resolver(fetcher, storage.clone());

        let resolved = r.resolve(url, "tiny.png", "banners").await.unwrap();
        assert_eq!(resolved.origin, ImageOrigin::Passthrough);
        assert_eq!(resolved.url, url);
        assert_eq!(storage.object_count("banners"), 0);
        assert!(resolved.attempts[0].error.as_deref().unwrap().contains("too small"));
    }

    #[tokio::test]
    async fn test_sniffed_content_type_on_upload() {
        let url = "https://cdn.example.com/blob";
        let fetcher =
            MockFetcher::new().respond(url, 200, Some("application/octet-stream"), png_fixture(64));
        let storage = MemoryStorage::default().with_bucket("banners");
        let r = resolver(fetcher, storage.clone());

        r.resolve(url, "blob.png", "banners").await.unwrap();
        assert_eq!(
            storage.content_type("banners", "blob.png").as_deref(),
            Some("image/png")
        );
    }

    #[tokio::test]
    async fn test_proxy_error_status_is_not_accepted() {
        let target = "https://delivery-us1.bfl.ai/abc.png";
        let urls = resolver(MockFetcher::new(), MemoryStorage::default());
        let proxy_url = urls.source_url(Strategy::ServerProxy, target);
        let relay_url = urls.source_url(Strategy::PublicRelay(1), target);

        // image content type on an error response
        let fetcher = MockFetcher::new()
            .respond(&proxy_url, 502, Some("image/png"), png_fixture(64))
            .respond(&relay_url, 200, Some("image/png"), png_fixture(48));
        let storage = MemoryStorage::default().with_bucket("banners");
        let r = resolver(fetcher, storage.clone());

        let resolved = r.resolve(target, "abc.png", "banners").await.unwrap();
        assert_eq!(resolved.origin, ImageOrigin::Stored(Strategy::PublicRelay(1)));
        assert_eq!(resolved.attempts[0].strategy, Strategy::ServerProxy);
        assert_eq!(resolved.attempts[0].error.as_deref(), Some("upstream status 502"));
    }

    #[tokio::test]
    async fn test_relay_skipped_when_decode_times_out() {
        let target = "https://delivery-us1.bfl.ai/slow.png";
        let urls = resolver(MockFetcher::new(), MemoryStorage::default());
        let proxy_url = urls.source_url(Strategy::ServerProxy, target);
        let relay_url = urls.source_url(Strategy::PublicRelay(1), target);
        let fetcher = MockFetcher::new()
            .respond(&proxy_url, 403, Some("text/plain"), b"Forbidden".to_vec())
            .respond(&relay_url, 200, Some("image/png"), png_fixture(1024));

        let patient = resolver(fetcher.clone(), MemoryStorage::default().with_bucket("banners"));
        let resolved = patient.resolve(target, "slow.png", "banners").await.unwrap();
        assert_eq!(resolved.origin, ImageOrigin::Stored(Strategy::PublicRelay(1)));

        let config = AcquisitionConfig {
            decode_timeout_secs: 0,
            ..AcquisitionConfig::default()
        };
        let storage = MemoryStorage::default().with_bucket("banners");
        let hasty = UploadResolver::new(config, Arc::new(fetcher), Arc::new(storage.clone()));
        let resolved = hasty.resolve(target, "slow.png", "banners").await.unwrap();

        assert_eq!(resolved.origin, ImageOrigin::Passthrough);
        assert_eq!(resolved.url, target);
        assert_eq!(resolved.attempts[2].strategy, Strategy::PublicRelay(1));
        assert!(resolved.attempts[2]
            .error
            .as_deref()
            .unwrap()
            .contains("timed out"));
        assert_eq!(storage.object_count("banners"), 0);
    }
}
