//! `ANY /api/bfl/*path`: forward requests to the BFL API
//!
//! The browser never sees the API key; it is injected here as `x-key`.

use super::{error_response, ProxyState};
use axum::body::Bytes;
use axum::extract::{Path, RawQuery, State};
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};

/// Header carrying the API key upstream
pub const API_KEY_HEADER: &str = "x-key";

/// Client headers passed upstream; the key header is never taken from the client
const FORWARDED_HEADERS: [&str; 3] = ["accept", "accept-language", "user-agent"];

/// Upstream request chosen for a relay path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamTarget {
    pub method: Method,
    pub url: String,
    /// Whether the incoming body is forwarded
    pub forward_body: bool,
}

/// Map an incoming relay request onto the upstream API
///
/// - `flux-pro*` paths start a generation: `POST {base}/v1/{path}`
/// - `get_result` polls with the incoming query string
/// - any other path mentioning `result` polls by its last segment as id
/// - everything else passes through unchanged
#[must_use]
pub fn upstream_for(base: &str, method: &Method, path: &str, query: Option<&str>) -> UpstreamTarget {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    let with_query = |url: String| match query.filter(|q| !q.is_empty()) {
        Some(q) => format!("{}?{}", url, q),
        None => url,
    };

    if path.starts_with("flux-pro") {
        UpstreamTarget {
            method: Method::POST,
            url: format!("{}/v1/{}", base, path),
            forward_body: true,
        }
    } else if path == "get_result" {
        UpstreamTarget {
            method: Method::GET,
            url: with_query(format!("{}/v1/get_result", base)),
            forward_body: false,
        }
    } else if path.contains("result") {
        let id = path.rsplit('/').next().unwrap_or_default();
        let encoded: String = url::form_urlencoded::byte_serialize(id.as_bytes()).collect();
        UpstreamTarget {
            method: Method::GET,
            url: format!("{}/v1/get_result?id={}", base, encoded),
            forward_body: false,
        }
    } else {
        UpstreamTarget {
            method: method.clone(),
            url: with_query(format!("{}/v1/{}", base, path)),
            forward_body: true,
        }
    }
}

/// Allow-listed client headers with a textual value
fn forwarded_headers(headers: &HeaderMap) -> Vec<(&'static str, String)> {
    FORWARDED_HEADERS
        .iter()
        .filter_map(|&name| {
            let value = headers.get(name)?.to_str().ok()?;
            Some((name, value.to_string()))
        })
        .collect()
}

pub(crate) async fn bfl_relay(
    State(state): State<ProxyState>,
    method: Method,
    Path(path): Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if method == Method::OPTIONS {
        return StatusCode::OK.into_response();
    }

    let Some(api_key) = state.relay.api_key.as_deref() else {
        tracing::error!("relay request rejected: API key not configured");
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "BFL API key not configured",
            "Set the BFL_API_KEY environment variable on the server",
        );
    };

    let target = upstream_for(&state.relay.upstream_base, &method, &path, query.as_deref());
    tracing::debug!(method = %target.method, url = %target.url, "relaying request");

    let upstream_method = match reqwest::Method::from_bytes(target.method.as_str().as_bytes()) {
        Ok(m) => m,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, "Unsupported method", e.to_string()),
    };

    let mut request = state
        .client
        .request(upstream_method, &target.url)
        .header(API_KEY_HEADER, api_key);
    let forwarded = forwarded_headers(&headers);
    if !forwarded.iter().any(|(name, _)| *name == "accept") {
        request = request.header(reqwest::header::ACCEPT, "application/json");
    }
    for (name, value) in forwarded {
        request = request.header(name, value);
    }
    if target.forward_body && !body.is_empty() {
        let content_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/json");
        request = request
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(body.to_vec());
    }

    let upstream = match request.send().await {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(url = %target.url, error = %e, "relay upstream unreachable");
            return error_response(StatusCode::BAD_GATEWAY, "Failed to reach BFL API", e.to_string());
        },
    };

    let status = StatusCode::from_u16(upstream.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    let content_type = upstream
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| HeaderValue::from_str(v).ok())
        .unwrap_or_else(|| HeaderValue::from_static("application/json"));

    match upstream.bytes().await {
        Ok(bytes) => (status, [(header::CONTENT_TYPE, content_type)], bytes).into_response(),
        Err(e) => error_response(StatusCode::BAD_GATEWAY, "Failed to read BFL response", e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://api.bfl.ml";

    #[test]
    fn test_generation_paths_post() {
        let target = upstream_for(BASE, &Method::GET, "flux-pro-1.1-ultra", Some("x=1"));
        assert_eq!(target.method, Method::POST);
        assert_eq!(target.url, "https://api.bfl.ml/v1/flux-pro-1.1-ultra");
        assert!(target.forward_body);
    }

    #[test]
    fn test_get_result_keeps_query() {
        let target = upstream_for(BASE, &Method::GET, "get_result", Some("id=abc-123"));
        assert_eq!(target.method, Method::GET);
        assert_eq!(target.url, "https://api.bfl.ml/v1/get_result?id=abc-123");

        let target = upstream_for(BASE, &Method::GET, "get_result", None);
        assert_eq!(target.url, "https://api.bfl.ml/v1/get_result");
    }

    #[test]
    fn test_result_polling_uses_last_segment() {
        let target = upstream_for(BASE, &Method::GET, "result/task 42", None);
        assert_eq!(target.url, "https://api.bfl.ml/v1/get_result?id=task+42");
        assert!(!target.forward_body);
    }

    #[test]
    fn test_pass_through() {
        let target = upstream_for("https://api.bfl.ml/", &Method::DELETE, "tasks/9", Some("force=true"));
        assert_eq!(target.method, Method::DELETE);
        assert_eq!(target.url, "https://api.bfl.ml/v1/tasks/9?force=true");
    }

    #[test]
    fn test_forwarded_headers_are_allow_listed() {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static("image/*"));
        headers.insert(header::USER_AGENT, HeaderValue::from_static("banner-ui/2"));
        headers.insert(API_KEY_HEADER, HeaderValue::from_static("client-supplied"));
        headers.insert(header::COOKIE, HeaderValue::from_static("session=1"));

        let forwarded = forwarded_headers(&headers);
        assert_eq!(
            forwarded,
            vec![
                ("accept", "image/*".to_string()),
                ("user-agent", "banner-ui/2".to_string()),
            ]
        );
        assert!(forwarded_headers(&HeaderMap::new()).is_empty());
    }
}
