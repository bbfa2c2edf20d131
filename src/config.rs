//! Configuration types for the image-extraction pipeline.
//!
//! All pipeline behaviour is controlled through [`ProcessConfig`], built via
//! its [`ProcessConfigBuilder`]. The compression-service credential is a plain
//! field here: it is read from the environment once at startup (see
//! [`api_key_from_env`]) and handed to [`crate::pipeline::compress::TinifyClient::new`]
//! explicitly, so nothing in the library touches process-global state.

use crate::error::PdfImgError;
use crate::progress::ProgressCallback;
use std::fmt;

/// Environment variable holding the TinyPNG API key.
pub const API_KEY_ENV: &str = "TINYPNG_API_KEY";

/// Environment variable overriding the Tinify API endpoint.
pub const API_URL_ENV: &str = "TINIFY_API_URL";

/// Default Tinify API endpoint.
pub const DEFAULT_API_BASE_URL: &str = "https://api.tinify.com";

/// Configuration for a batch run.
///
/// # Example
/// ```rust
/// use edgequake_pdfimg::ProcessConfig;
///
/// let config = ProcessConfig::builder()
///     .api_key("sk-test")
///     .api_timeout_secs(30)
///     .build()
///     .unwrap();
/// assert_eq!(config.manifest_extension, "md");
/// ```
#[derive(Clone)]
pub struct ProcessConfig {
    /// TinyPNG API key, sent as the basic-auth password with user `api`.
    pub api_key: String,

    /// Base URL of the Tinify API. Default: `https://api.tinify.com`.
    pub api_base_url: String,

    /// Per-request timeout for the compression service, in seconds. Default: 60.
    ///
    /// Covers both the upload (`POST /shrink`) and the download of the
    /// compressed result. A timed-out request falls back to the original bytes.
    pub api_timeout_secs: u64,

    /// Extension of the manifest document, without the dot. Default: `md`.
    pub manifest_extension: String,

    /// Optional progress callback receiving per-file and per-image events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            api_timeout_secs: 60,
            manifest_extension: "md".to_string(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ProcessConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_base_url", &self.api_base_url)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("manifest_extension", &self.manifest_extension)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ProcessProgressCallback>"),
            )
            .finish()
    }
}

fn redact(key: &str) -> &'static str {
    if key.is_empty() {
        "<unset>"
    } else {
        "<redacted>"
    }
}

impl ProcessConfig {
    /// Create a new builder for `ProcessConfig`.
    pub fn builder() -> ProcessConfigBuilder {
        ProcessConfigBuilder {
            config: Self::default(),
        }
    }

    /// Build a default configuration with the API key taken from
    /// [`API_KEY_ENV`] and the endpoint from [`API_URL_ENV`] when set.
    pub fn from_env() -> Result<Self, PdfImgError> {
        let mut builder = Self::builder().api_key(api_key_from_env()?);
        if let Ok(url) = std::env::var(API_URL_ENV) {
            if !url.trim().is_empty() {
                builder = builder.api_base_url(url.trim());
            }
        }
        builder.build()
    }
}

/// Read the API key from [`API_KEY_ENV`]. Absent or blank values are an error.
pub fn api_key_from_env() -> Result<String, PdfImgError> {
    api_key_from_lookup(|name| std::env::var(name).ok())
}

/// [`api_key_from_env`] over an arbitrary variable lookup.
pub fn api_key_from_lookup<F>(lookup: F) -> Result<String, PdfImgError>
where
    F: FnOnce(&str) -> Option<String>,
{
    match lookup(API_KEY_ENV) {
        Some(key) if !key.trim().is_empty() => Ok(key.trim().to_string()),
        _ => Err(PdfImgError::MissingApiKey {
            var: API_KEY_ENV.to_string(),
        }),
    }
}

/// Builder for [`ProcessConfig`].
#[derive(Debug)]
pub struct ProcessConfigBuilder {
    config: ProcessConfig,
}

impl ProcessConfigBuilder {
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = key.into();
        self
    }

    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn manifest_extension(mut self, ext: impl Into<String>) -> Self {
        self.config.manifest_extension = ext.into().trim_start_matches('.').to_string();
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ProcessConfig, PdfImgError> {
        let c = &self.config;
        if c.api_key.trim().is_empty() {
            return Err(PdfImgError::InvalidConfig("API key must not be empty".into()));
        }
        if c.api_timeout_secs == 0 {
            return Err(PdfImgError::InvalidConfig(
                "API timeout must be ≥ 1 second".into(),
            ));
        }
        if !c.api_base_url.starts_with("http://") && !c.api_base_url.starts_with("https://") {
            return Err(PdfImgError::InvalidConfig(format!(
                "API URL must be http(s), got '{}'",
                c.api_base_url
            )));
        }
        if c.manifest_extension.is_empty()
            || c.manifest_extension.contains(['/', '\\'])
        {
            return Err(PdfImgError::InvalidConfig(format!(
                "Invalid manifest extension '{}'",
                c.manifest_extension
            )));
        }
        Ok(self.config)
    }
}
