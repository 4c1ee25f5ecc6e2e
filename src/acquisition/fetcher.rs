//! HTTP fetching seam for image acquisition

use super::strategy::AcquisitionError;
use async_trait::async_trait;
use bytes::Bytes;

/// Raw response of a fetch; non-success statuses are still responses
#[derive(Debug, Clone)]
pub struct FetchedPayload {
    pub status: u16,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

impl FetchedPayload {
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body interpreted as (lossy) UTF-8 text
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

/// Fetches a URL and returns the full response body
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    /// # Errors
    /// - `AcquisitionError::Transport` when no response was received
    async fn fetch(&self, url: &str) -> Result<FetchedPayload, AcquisitionError>;
}

/// `reqwest`-backed fetcher
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Create a fetcher with a fresh client
    ///
    /// # Errors
    /// - HTTP client construction failed (TLS backend init)
    pub fn new() -> crate::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("bannerkit/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| crate::BannerError::network_error("Failed to create HTTP client", e))?;
        Ok(Self { client })
    }

    /// Wrap an existing client
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ImageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPayload, AcquisitionError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AcquisitionError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response
            .bytes()
            .await
            .map_err(|e| AcquisitionError::Transport(e.to_string()))?;

        Ok(FetchedPayload {
            status,
            content_type,
            bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_helpers() {
        let payload = FetchedPayload {
            status: 403,
            content_type: Some("text/plain".into()),
            bytes: Bytes::from_static(b"Forbidden"),
        };
        assert!(!payload.is_success());
        assert_eq!(payload.text(), "Forbidden");
    }

    #[tokio::test]
    async fn test_transport_failure_is_reported() {
        let fetcher = HttpFetcher::new().unwrap();
        // port 9 on localhost is the discard port and is normally closed
        let result = fetcher.fetch("http://127.0.0.1:9/image.png").await;
        assert!(matches!(result, Err(AcquisitionError::Transport(_))));
    }
}
