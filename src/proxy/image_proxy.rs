//! `GET /api/proxy-image`: fetch an allow-listed AI image server-side

use super::{error_response, ProxyState};
use crate::acquisition::validate::{sniff_mime, DEFAULT_IMAGE_MIME};
use axum::extract::{Query, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

/// Cache policy sent with proxied images
pub const CACHE_CONTROL: &str = "public, max-age=3600";

#[derive(Debug, Deserialize)]
pub(crate) struct ProxyQuery {
    url: Option<String>,
}

pub(crate) async fn proxy_image(
    State(state): State<ProxyState>,
    Query(query): Query<ProxyQuery>,
) -> Response {
    let Some(target) = query.url.filter(|u| !u.trim().is_empty()) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Missing url parameter",
            "Provide the image URL as ?url=<encoded url>",
        );
    };

    let parsed = match url::Url::parse(&target) {
        Ok(parsed) => parsed,
        Err(e) => {
            return error_response(StatusCode::BAD_REQUEST, "Invalid url parameter", e.to_string())
        },
    };

    let host = parsed.host_str().unwrap_or_default();
    if !state.acquisition.is_delivery_host(host) {
        tracing::warn!(host, "rejected proxy request for host outside allow-list");
        return error_response(
            StatusCode::FORBIDDEN,
            "Host not allowed",
            format!("'{}' is not an allowed image delivery host", host),
        );
    }

    let upstream = match state.client.get(parsed.as_str()).send().await {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(url = %parsed, error = %e, "image fetch failed");
            return error_response(StatusCode::BAD_GATEWAY, "Failed to fetch image", e.to_string());
        },
    };

    let status = StatusCode::from_u16(upstream.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    let declared = upstream
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let body = match upstream.bytes().await {
        Ok(body) => body,
        Err(e) => {
            return error_response(StatusCode::BAD_GATEWAY, "Failed to read image", e.to_string())
        },
    };

    if !status.is_success() {
        let details = String::from_utf8_lossy(&body).into_owned();
        tracing::info!(%status, url = %parsed, "upstream refused image");
        let details = if details.trim().is_empty() {
            status.canonical_reason().unwrap_or("upstream error").to_string()
        } else {
            details
        };
        return error_response(status, "Upstream request failed", details);
    }

    let content_type = declared
        .or_else(|| sniff_mime(&body).map(str::to_string))
        .unwrap_or_else(|| DEFAULT_IMAGE_MIME.to_string());
    let content_type = HeaderValue::from_str(&content_type)
        .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_IMAGE_MIME));

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_LENGTH, HeaderValue::from(body.len())),
            (header::CACHE_CONTROL, HeaderValue::from_static(CACHE_CONTROL)),
        ],
        body,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::super::{router, ErrorBody};
    use super::*;
    use crate::config::{AcquisitionConfig, RelayConfig};
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    async fn call(uri: &str) -> (StatusCode, ErrorBody) {
        let state = ProxyState::new(AcquisitionConfig::default(), RelayConfig::default()).unwrap();
        let response = router(state)
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), 64 * 1024).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_missing_url() {
        let (status, body) = call("/api/proxy-image").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.error, "Missing url parameter");

        let (status, _) = call("/api/proxy-image?url=").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unparsable_url() {
        let (status, body) = call("/api/proxy-image?url=not%20a%20url").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.error, "Invalid url parameter");
    }

    #[tokio::test]
    async fn test_host_not_allowed() {
        let (status, body) =
            call("/api/proxy-image?url=https%3A%2F%2Fevil.example.com%2Fa.png").await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(body.details.contains("evil.example.com"));
    }
}
