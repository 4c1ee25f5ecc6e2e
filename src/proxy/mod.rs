//! HTTP server: image proxy, BFL relay and stored-object serving
//!
//! Routes:
//! - `GET /api/proxy-image?url=<target>`: fetch an allow-listed AI image
//! - `ANY /api/bfl/*path`: forward to the BFL API with the server-held key
//! - `GET /storage/*`: objects written by the filesystem store
//!
//! Every route answers CORS pre-flight and bare `OPTIONS` with 200.

mod image_proxy;
mod relay;

pub use relay::{upstream_for, UpstreamTarget};

use crate::config::{AcquisitionConfig, AppConfig, RelayConfig};
use crate::error::{BannerError, Result};
use axum::http::{header, HeaderName, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// JSON error body returned by both endpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub details: String,
}

pub(crate) fn error_response<E: Into<String>, D: Into<String>>(
    status: StatusCode,
    error: E,
    details: D,
) -> Response {
    (
        status,
        Json(ErrorBody {
            error: error.into(),
            details: details.into(),
        }),
    )
        .into_response()
}

/// Shared state of the proxy handlers
#[derive(Clone)]
pub struct ProxyState {
    client: reqwest::Client,
    acquisition: Arc<AcquisitionConfig>,
    relay: Arc<RelayConfig>,
}

impl std::fmt::Debug for ProxyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyState")
            .field("delivery_domains", &self.acquisition.delivery_domains)
            .field("relay", &self.relay)
            .finish_non_exhaustive()
    }
}

impl ProxyState {
    /// # Errors
    /// - HTTP client construction failed
    pub fn new(acquisition: AcquisitionConfig, relay: RelayConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("bannerkit/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BannerError::network_error("Failed to create HTTP client", e))?;
        Ok(Self {
            client,
            acquisition: Arc::new(acquisition),
            relay: Arc::new(relay),
        })
    }
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-key"),
        ])
}

async fn preflight() -> StatusCode {
    StatusCode::OK
}

/// Router with both API endpoints
pub fn router(state: ProxyState) -> Router {
    Router::new()
        .route(
            "/api/proxy-image",
            get(image_proxy::proxy_image).options(preflight),
        )
        .route("/api/bfl/*path", any(relay::bfl_relay))
        .with_state(state)
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
}

/// Router that also serves `storage_root` under `/storage`
pub fn router_with_storage(state: ProxyState, storage_root: PathBuf) -> Router {
    router(state).nest_service("/storage", ServeDir::new(storage_root))
}

/// Bind `config.server.bind` and serve until the process stops
///
/// # Errors
/// - Invalid bind address or port in use
/// - Server failure
pub async fn serve(config: &AppConfig) -> Result<()> {
    let state = ProxyState::new(config.acquisition.clone(), config.relay.clone())?;
    if config.relay.api_key.is_none() {
        tracing::warn!("BFL_API_KEY is not set; /api/bfl requests will fail with 500");
    }

    tokio::fs::create_dir_all(&config.storage.root)
        .await
        .map_err(|e| BannerError::file_io_error("create storage root", &config.storage.root, &e))?;
    let app = router_with_storage(state, config.storage.root.clone());

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .map_err(|e| BannerError::network_error(format!("Failed to bind {}", config.server.bind), e))?;
    tracing::info!(bind = %config.server.bind, "proxy server listening");

    axum::serve(listener, app)
        .await
        .map_err(|e| BannerError::network_error("Server error", e))
}
