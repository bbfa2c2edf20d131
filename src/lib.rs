//! # edgequake-pdfimg
//!
//! Pull the embedded images out of numbered PDF documents, shrink them with
//! TinyPNG, and catalogue them in a Markdown note.
//!
//! ## Pipeline Overview
//!
//! ```text
//! 1.2.3.pdf
//!  │
//!  ├─ 1. Place     create ./1.2.3/ and move the PDF into it
//!  ├─ 2. Extract   every image XObject, page by page (lopdf)
//!  ├─ 3. Compress  POST /shrink to Tinify; original bytes on any failure
//!  ├─ 4. Write     1.2.3/page{P}_img{I}.{ext}
//!  ├─ 5. Manifest  1.2.3/1.2.3.md with one ![[name]] per image
//!  └─ 6. Restore   move the PDF back unless its name is taken
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdfimg::{process_batch, ProcessConfig, TinifyClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Reads TINYPNG_API_KEY
//!     let config = ProcessConfig::from_env()?;
//!     let client = TinifyClient::new(&config)?;
//!     let report = process_batch(&["1.2.3.pdf"], &client, &config).await;
//!     eprintln!(
//!         "{} images written, {} failed files",
//!         report.images_written(),
//!         report.failed_count()
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdfimg` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! edgequake-pdfimg = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod process;
pub mod progress;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    api_key_from_env, ProcessConfig, ProcessConfigBuilder, API_KEY_ENV, API_URL_ENV,
    DEFAULT_API_BASE_URL,
};
pub use error::{CompressionError, CompressionErrorKind, PdfImgError};
pub use output::{BatchReport, FileOutcome, FileReport, FileStatus, ImageRecord};
pub use pipeline::compress::{CompressionResult, ImageCompressor, TinifyClient};
pub use process::{extract_and_compress, is_pdf_path, process_batch, process_file};
pub use progress::{NoopProgressCallback, ProcessProgressCallback, ProgressCallback};
