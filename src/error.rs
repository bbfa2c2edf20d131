//! Error types for the edgequake-pdfimg library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`PdfImgError`] — **Fatal for one document**: the pipeline cannot finish
//!   this PDF (folder not creatable, corrupt document, disk full). Returned
//!   as `Err(PdfImgError)` from [`crate::process::process_file`]. The batch
//!   driver catches it, reports it, and moves on to the next document.
//!
//! * [`CompressionError`] — **Non-fatal**: the remote compression service
//!   refused or failed a single image. The pipeline writes the original bytes
//!   instead and keeps going. The [`CompressionErrorKind`] tag tells callers
//!   whether the failure was transient (network, 5xx) or permanent (bad key,
//!   quota, unsupported format) without changing the fallback policy.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All per-document errors returned by the edgequake-pdfimg library.
///
/// Compression failures use [`CompressionError`] and never surface here.
#[derive(Debug, Error)]
pub enum PdfImgError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    // ── Placement errors ──────────────────────────────────────────────────
    /// The per-document work folder could not be created.
    #[error("Failed to create folder '{path}': {source}")]
    CreateFolderFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Moving the document into or out of its work folder failed.
    #[error("Failed to move '{from}' to '{to}': {source}")]
    MoveFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The work folder already holds a file with the document's name.
    #[error("'{path}' already exists; move or delete it before processing this PDF again")]
    PlacementOccupied { path: PathBuf },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// The document could not be parsed, or its image objects are malformed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    // ── Output errors ─────────────────────────────────────────────────────
    /// An extracted image could not be written to disk.
    #[error("Failed to write image '{path}': {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The manifest document could not be written.
    #[error("Failed to write manifest '{path}': {source}")]
    ManifestWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// The compression-service credential is absent from the environment.
    #[error(
        "{var} environment variable not set.\n\
Get a key from https://tinypng.com/developers and export it:\n  export {var}=<your key>"
    )]
    MissingApiKey { var: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Why a single compression attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressionErrorKind {
    /// Connection refused, DNS failure, timeout, truncated body.
    Network,
    /// HTTP 401/403: the API key was rejected.
    Unauthorized,
    /// HTTP 429: the monthly compression allowance is used up.
    QuotaExceeded,
    /// HTTP 4xx: the service refused the image (unsupported format, too large).
    InvalidInput,
    /// HTTP 5xx from the service.
    Server,
    /// The service answered with a success status but an unusable payload.
    Protocol,
}

impl CompressionErrorKind {
    /// `true` when retrying the same request later could succeed.
    pub fn is_transient(self) -> bool {
        matches!(self, Self::Network | Self::Server)
    }
}

/// A non-fatal error for a single image compression attempt.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("{kind:?}: {detail}")]
pub struct CompressionError {
    pub kind: CompressionErrorKind,
    pub detail: String,
}

impl CompressionError {
    pub fn new(kind: CompressionErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    /// See [`CompressionErrorKind::is_transient`].
    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn move_failed_display_names_both_paths() {
        let e = PdfImgError::MoveFailed {
            from: PathBuf::from("/a/1.2.pdf"),
            to: PathBuf::from("/a/1.2/1.2.pdf"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        let msg = e.to_string();
        assert!(msg.contains("/a/1.2.pdf"), "got: {msg}");
        assert!(msg.contains("/a/1.2/1.2.pdf"), "got: {msg}");
    }

    #[test]
    fn placement_occupied_display_names_path() {
        let e = PdfImgError::PlacementOccupied {
            path: PathBuf::from("/a/1.2/1.2.pdf"),
        };
        assert!(e.to_string().contains("/a/1.2/1.2.pdf"));
    }

    #[test]
    fn missing_api_key_display_names_variable() {
        let e = PdfImgError::MissingApiKey {
            var: "TINYPNG_API_KEY".into(),
        };
        assert!(e.to_string().contains("TINYPNG_API_KEY"));
    }

    #[test]
    fn transient_kinds() {
        assert!(CompressionErrorKind::Network.is_transient());
        assert!(CompressionErrorKind::Server.is_transient());
        assert!(!CompressionErrorKind::Unauthorized.is_transient());
        assert!(!CompressionErrorKind::QuotaExceeded.is_transient());
        assert!(!CompressionErrorKind::InvalidInput.is_transient());
        assert!(!CompressionErrorKind::Protocol.is_transient());
    }

    #[test]
    fn compression_error_display_includes_detail() {
        let e = CompressionError::new(CompressionErrorKind::QuotaExceeded, "limit reached");
        let msg = e.to_string();
        assert!(msg.contains("QuotaExceeded"), "got: {msg}");
        assert!(msg.contains("limit reached"), "got: {msg}");
    }

    #[test]
    fn kind_serialises_snake_case() {
        let json = serde_json::to_string(&CompressionErrorKind::QuotaExceeded).unwrap();
        assert_eq!(json, "\"quota_exceeded\"");
    }
}
