//! Image compression through the Tinify (TinyPNG) web service.
//!
//! ## Protocol
//!
//! ```text
//! POST {base}/shrink          body = image bytes, basic auth api:<key>
//!   ← 201 Created, Location: {base}/output/<id>, Compression-Count: <n>
//! GET  {Location}             basic auth api:<key>
//!   ← 200 OK, body = compressed image (same format as the input)
//! ```
//!
//! Every failure is returned as a [`CompressionError`]; the pipeline writes
//! the original bytes instead and moves on. There are no retries: one image
//! is never worth stalling the whole batch.

use crate::config::ProcessConfig;
use crate::error::{CompressionError, CompressionErrorKind, PdfImgError};
use async_trait::async_trait;
use reqwest::header::LOCATION;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Header carrying the number of compressions used this month.
const COMPRESSION_COUNT_HEADER: &str = "compression-count";

/// Longest slice of an unparseable error body quoted in a message.
const MAX_BODY_SNIPPET: usize = 200;

/// A successfully compressed image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressionResult {
    pub data: Vec<u8>,
    /// Compressions used this month, when the service reported it.
    pub compression_count: Option<u64>,
}

/// Something that can shrink an encoded image.
///
/// The pipeline only needs this seam; tests substitute scripted
/// implementations for the web service.
#[async_trait]
pub trait ImageCompressor: Send + Sync {
    async fn compress(&self, data: &[u8]) -> Result<CompressionResult, CompressionError>;
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ShrinkBody {
    output: Option<ShrinkOutput>,
}

#[derive(Debug, Deserialize)]
struct ShrinkOutput {
    url: Option<String>,
}

/// HTTP client for the Tinify API.
pub struct TinifyClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl std::fmt::Debug for TinifyClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TinifyClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl TinifyClient {
    /// Build a client from the run configuration.
    ///
    /// The key is only stored; it is first checked by the service on the
    /// initial upload.
    pub fn new(config: &ProcessConfig) -> Result<Self, PdfImgError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.api_timeout_secs))
            .user_agent(concat!("edgequake-pdfimg/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PdfImgError::InvalidConfig(format!("HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    /// Upload `data`; returns the output URL and the reported compression count.
    async fn shrink(&self, data: &[u8]) -> Result<(String, Option<u64>), CompressionError> {
        let resp = self
            .http
            .post(format!("{}/shrink", self.base_url))
            .basic_auth("api", Some(&self.api_key))
            .body(data.to_vec())
            .send()
            .await
            .map_err(transport_error)?;

        let status = resp.status();
        let count = resp
            .headers()
            .get(COMPRESSION_COUNT_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let location = resp
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = resp.text().await.map_err(transport_error)?;
        if !status.is_success() {
            return Err(classify_status(status, &body));
        }

        let url = match location {
            Some(url) => url,
            None => serde_json::from_str::<ShrinkBody>(&body)
                .ok()
                .and_then(|b| b.output)
                .and_then(|o| o.url)
                .ok_or_else(|| {
                    CompressionError::new(
                        CompressionErrorKind::Protocol,
                        "shrink response has neither a Location header nor output.url",
                    )
                })?,
        };

        Ok((self.resolve_url(&url), count))
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, CompressionError> {
        let resp = self
            .http
            .get(url)
            .basic_auth("api", Some(&self.api_key))
            .send()
            .await
            .map_err(transport_error)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let bytes = resp.bytes().await.map_err(transport_error)?;
        if bytes.is_empty() {
            return Err(CompressionError::new(
                CompressionErrorKind::Protocol,
                "compressed image is empty",
            ));
        }
        Ok(bytes.to_vec())
    }

    fn resolve_url(&self, url: &str) -> String {
        if url.starts_with('/') {
            format!("{}{url}", self.base_url)
        } else {
            url.to_string()
        }
    }
}

#[async_trait]
impl ImageCompressor for TinifyClient {
    async fn compress(&self, data: &[u8]) -> Result<CompressionResult, CompressionError> {
        let (url, compression_count) = self.shrink(data).await?;
        debug!(url = %url, ?compression_count, "shrink accepted");
        let data = self.download(&url).await?;
        Ok(CompressionResult {
            data,
            compression_count,
        })
    }
}

fn transport_error(e: reqwest::Error) -> CompressionError {
    let kind = if e.is_decode() {
        CompressionErrorKind::Protocol
    } else {
        CompressionErrorKind::Network
    };
    CompressionError::new(kind, e.to_string())
}

/// Map a non-success response to an error kind, quoting the service's
/// `{"error": .., "message": ..}` body when present.
pub fn classify_status(status: StatusCode, body: &str) -> CompressionError {
    let kind = match status.as_u16() {
        401 | 403 => CompressionErrorKind::Unauthorized,
        429 => CompressionErrorKind::QuotaExceeded,
        400..=499 => CompressionErrorKind::InvalidInput,
        500..=599 => CompressionErrorKind::Server,
        _ => CompressionErrorKind::Protocol,
    };

    let reason = match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(ApiErrorBody {
            error: Some(error),
            message,
        }) => match message {
            Some(message) => format!("{error}: {message}"),
            None => error,
        },
        _ => body.trim().chars().take(MAX_BODY_SNIPPET).collect(),
    };

    let detail = if reason.is_empty() {
        format!("HTTP {status}")
    } else {
        format!("HTTP {status}: {reason}")
    };
    CompressionError::new(kind, detail)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> TinifyClient {
        let config = ProcessConfig::builder()
            .api_key("test-key")
            .api_base_url(base)
            .api_timeout_secs(2)
            .build()
            .unwrap();
        TinifyClient::new(&config).unwrap()
    }

    #[test]
    fn classify_maps_status_families() {
        let cases = [
            (401, CompressionErrorKind::Unauthorized),
            (403, CompressionErrorKind::Unauthorized),
            (429, CompressionErrorKind::QuotaExceeded),
            (400, CompressionErrorKind::InvalidInput),
            (415, CompressionErrorKind::InvalidInput),
            (500, CompressionErrorKind::Server),
            (503, CompressionErrorKind::Server),
            (302, CompressionErrorKind::Protocol),
        ];
        for (code, kind) in cases {
            let err = classify_status(StatusCode::from_u16(code).unwrap(), "");
            assert_eq!(err.kind, kind, "status {code}");
        }
    }

    #[test]
    fn classify_quotes_api_error_body() {
        let err = classify_status(
            StatusCode::UNAUTHORIZED,
            r#"{"error":"Unauthorized","message":"Credentials are invalid."}"#,
        );
        assert!(err.detail.contains("Unauthorized: Credentials are invalid."));
    }

    #[test]
    fn classify_truncates_plain_bodies() {
        let body = "x".repeat(1000);
        let err = classify_status(StatusCode::BAD_GATEWAY, &body);
        assert!(err.detail.len() < 300);
    }

    #[test]
    fn relative_location_is_resolved_against_base() {
        let c = client("http://127.0.0.1:9/");
        assert_eq!(c.resolve_url("/output/abc"), "http://127.0.0.1:9/output/abc");
        assert_eq!(
            c.resolve_url("https://api.tinify.com/output/abc"),
            "https://api.tinify.com/output/abc"
        );
    }

    #[test]
    fn debug_omits_key() {
        let c = client("http://127.0.0.1:9");
        assert!(!format!("{c:?}").contains("test-key"));
    }

    #[tokio::test]
    async fn unreachable_service_is_a_network_error() {
        // Bind then drop to get a port nothing listens on.
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let c = client(&format!("http://127.0.0.1:{port}"));
        let err = c.compress(b"\x89PNG").await.unwrap_err();
        assert_eq!(err.kind, CompressionErrorKind::Network);
        assert!(err.is_transient());
    }
}
