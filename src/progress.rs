//! Progress-callback trait for per-file and per-image pipeline events.
//!
//! Inject an [`Arc<dyn ProcessProgressCallback>`] via
//! [`crate::config::ProcessConfigBuilder::progress_callback`] to receive
//! events as the batch runs. The library itself only logs through `tracing`;
//! user-facing reporting (terminal lines, JSON, a GUI) lives in the callback.
//!
//! # Example
//!
//! ```rust
//! use edgequake_pdfimg::{ProcessProgressCallback, ProcessConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     written: AtomicUsize,
//! }
//!
//! impl ProcessProgressCallback for CountingCallback {
//!     fn on_image_written(&self, file_name: &str, _bytes: usize, compressed: bool) {
//!         self.written.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{file_name} (compressed: {compressed})");
//!     }
//! }
//!
//! let config = ProcessConfig::builder()
//!     .api_key("sk-test")
//!     .progress_callback(Arc::new(CountingCallback { written: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use crate::output::FileOutcome;
use std::path::Path;
use std::sync::Arc;

/// Called by the pipeline as it processes each document.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. The pipeline is sequential, so events for one file
/// never interleave with events for another.
pub trait ProcessProgressCallback: Send + Sync {
    /// Called once before the first document.
    ///
    /// # Arguments
    /// * `total_files` — number of paths in the batch (including non-PDFs)
    fn on_batch_start(&self, total_files: usize) {
        let _ = total_files;
    }

    /// Called before a PDF enters the pipeline.
    fn on_file_start(&self, path: &Path) {
        let _ = path;
    }

    /// Called when a path is skipped without being processed
    /// (not a PDF, no numeric prefix).
    fn on_file_skipped(&self, path: &Path, reason: &str) {
        let _ = (path, reason);
    }

    /// Called after each image is written to the work folder.
    ///
    /// # Arguments
    /// * `file_name`  — e.g. `page1_img2.png`
    /// * `bytes`      — size written
    /// * `compressed` — `false` when the original bytes were written as a fallback
    fn on_image_written(&self, file_name: &str, bytes: usize, compressed: bool) {
        let _ = (file_name, bytes, compressed);
    }

    /// Called when a PDF reaches a terminal state without error.
    fn on_file_complete(&self, path: &Path, outcome: &FileOutcome) {
        let _ = (path, outcome);
    }

    /// Called when a PDF fails; the batch continues with the next path.
    fn on_file_error(&self, path: &Path, error: &str) {
        let _ = (path, error);
    }

    /// Called once after every path has been attempted.
    ///
    /// # Arguments
    /// * `total_files` — number of paths in the batch
    /// * `failed`      — paths that ended in an error
    fn on_batch_complete(&self, total_files: usize, failed: usize) {
        let _ = (total_files, failed);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ProcessProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ProcessConfig`].
pub type ProgressCallback = Arc<dyn ProcessProgressCallback>;
