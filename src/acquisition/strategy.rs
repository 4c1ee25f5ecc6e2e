//! Acquisition strategies, attempt records and failure classification

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Way of obtaining the bytes behind a remote image URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "index")]
pub enum Strategy {
    /// Fetch the URL as-is (hosts outside the delivery allow-list)
    Direct,
    /// Fetch through the own server-side image proxy
    ServerProxy,
    /// Fetch through the relay template at this index
    PublicRelay(usize),
    /// Keep the original URL, nothing stored
    Passthrough,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct => write!(f, "direct"),
            Self::ServerProxy => write!(f, "server-proxy"),
            Self::PublicRelay(i) => write!(f, "public-relay[{}]", i),
            Self::Passthrough => write!(f, "passthrough"),
        }
    }
}

/// Coarse class of a failed proxy response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    NetworkUnreachable,
    NotFound,
    AccessDenied,
    Unrecognized,
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NetworkUnreachable => "network unreachable",
            Self::NotFound => "not found",
            Self::AccessDenied => "access denied",
            Self::Unrecognized => "unrecognized",
        };
        f.write_str(s)
    }
}

/// Classify a non-image proxy response by status code, then by body text
#[must_use]
pub fn classify_failure(status: u16, body: &str) -> FailureClass {
    match status {
        401 | 403 => return FailureClass::AccessDenied,
        404 | 410 => return FailureClass::NotFound,
        502..=504 => return FailureClass::NetworkUnreachable,
        _ => {},
    }

    let text = body.to_ascii_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| text.contains(n));
    if has(&["forbidden", "access denied", "unauthorized", "not authorized"]) {
        FailureClass::AccessDenied
    } else if has(&["not found", "no such", "does not exist"]) {
        FailureClass::NotFound
    } else if has(&[
        "network",
        "timed out",
        "timeout",
        "unreachable",
        "connection refused",
        "fetch failed",
        "dns",
    ]) {
        FailureClass::NetworkUnreachable
    } else {
        FailureClass::Unrecognized
    }
}

/// Why a single strategy was rejected
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AcquisitionError {
    /// Request never produced a response
    #[error("transport failure: {0}")]
    Transport(String),

    /// Own proxy answered with something other than an image
    #[error("proxy refused ({class}, status {status}): {details}")]
    ProxyRefused {
        class: FailureClass,
        status: u16,
        details: String,
    },

    /// Non-success status code
    #[error("upstream status {0}")]
    Status(u16),

    /// Content type is missing or not `image/*`
    #[error("not an image (content-type {0:?})")]
    NotAnImage(Option<String>),

    /// Payload smaller than the configured minimum
    #[error("payload too small ({size} bytes, minimum {min})")]
    TooSmall { size: usize, min: usize },

    /// Payload does not decode as an image
    #[error("payload does not decode: {0}")]
    Undecodable(String),

    /// Decoding did not finish in time
    #[error("decode validation timed out after {0:?}")]
    DecodeTimeout(Duration),
}

/// One entry of the per-call diagnostic trail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquisitionAttempt {
    pub strategy: Strategy,
    /// URL actually requested for this strategy
    pub source_url: String,
    pub succeeded: bool,
    pub byte_len: Option<usize>,
    pub error: Option<String>,
}

impl AcquisitionAttempt {
    pub(crate) fn success(strategy: Strategy, source_url: String, byte_len: usize) -> Self {
        Self {
            strategy,
            source_url,
            succeeded: true,
            byte_len: Some(byte_len),
            error: None,
        }
    }

    pub(crate) fn failure(strategy: Strategy, source_url: String, error: &AcquisitionError) -> Self {
        Self {
            strategy,
            source_url,
            succeeded: false,
            byte_len: None,
            error: Some(error.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification_wins() {
        assert_eq!(classify_failure(403, "Forbidden"), FailureClass::AccessDenied);
        assert_eq!(classify_failure(404, "whatever"), FailureClass::NotFound);
        assert_eq!(classify_failure(502, ""), FailureClass::NetworkUnreachable);
        // status takes priority over misleading body text
        assert_eq!(classify_failure(404, "Forbidden"), FailureClass::NotFound);
    }

    #[test]
    fn test_body_classification() {
        assert_eq!(
            classify_failure(500, "Access denied for this blob"),
            FailureClass::AccessDenied
        );
        assert_eq!(
            classify_failure(500, "The specified blob does not exist"),
            FailureClass::NotFound
        );
        assert_eq!(
            classify_failure(500, "fetch failed: ECONNRESET network error"),
            FailureClass::NetworkUnreachable
        );
        assert_eq!(classify_failure(500, "boom"), FailureClass::Unrecognized);
        assert_eq!(classify_failure(200, "<html>"), FailureClass::Unrecognized);
    }

    #[test]
    fn test_strategy_display() {
        assert_eq!(Strategy::ServerProxy.to_string(), "server-proxy");
        assert_eq!(Strategy::PublicRelay(2).to_string(), "public-relay[2]");
    }

    #[test]
    fn test_attempt_records() {
        let err = AcquisitionError::TooSmall { size: 10, min: 1024 };
        let attempt = AcquisitionAttempt::failure(Strategy::Direct, "u".into(), &err);
        assert!(!attempt.succeeded);
        assert!(attempt.error.unwrap().contains("minimum 1024"));

        let ok = AcquisitionAttempt::success(Strategy::PublicRelay(0), "u".into(), 2048);
        assert_eq!(ok.byte_len, Some(2048));
    }
}
