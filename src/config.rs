//! Configuration for the grading pipeline.
//!
//! Every knob lives in [`GraderConfig`], built via [`GraderConfigBuilder`].
//! The config is cloned into the HTTP server state once at start-up and is
//! read-only afterwards, so concurrent requests share it without locking.

use crate::error::GraderError;
use std::fmt;
use std::path::PathBuf;

/// Model identifier used when none is configured.
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";

/// Base URL of the Gemini REST API.
pub const DEFAULT_API_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Upload ceiling shared by the server and the browser widget: 10 MiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Configuration for grading a submission.
///
/// Built via [`GraderConfig::builder()`] or using [`GraderConfig::default()`].
///
/// # Example
/// ```rust
/// use essay_grader::GraderConfig;
///
/// let config = GraderConfig::builder()
///     .model("gemini-1.5-flash")
///     .default_api_key("AIza...")
///     .build()
///     .unwrap();
/// assert_eq!(config.model, "gemini-1.5-flash");
/// ```
#[derive(Clone)]
pub struct GraderConfig {
    /// Model identifier sent to the provider and echoed in `meta.model`.
    /// Default: `gemini-1.5-flash`.
    pub model: String,

    /// Server-side credential used when the caller supplies none.
    pub default_api_key: Option<String>,

    /// Base URL of the Gemini REST API. Overridable for proxies and tests.
    pub api_base_url: String,

    /// edgequake-llm provider name used when no credential is available at all.
    /// The provider reads its own environment (e.g. `GEMINI_API_KEY`). Default: `gemini`.
    pub fallback_provider: String,

    /// Sampling temperature for the grading call. Range 0.0–2.0. Default: 0.2.
    pub temperature: f32,

    /// Maximum tokens the model may generate for one report. Default: 4096.
    pub max_output_tokens: usize,

    /// Largest accepted upload in bytes. Default: 10 MiB.
    pub max_upload_bytes: usize,

    /// Per-call timeout for the model request. `None` leaves the lifetime to
    /// the hosting platform. Default: `None`.
    pub api_timeout_secs: Option<u64>,

    /// Explicit path to a pdfium shared library. `None` binds the system library.
    pub pdfium_library_path: Option<PathBuf>,
}

impl Default for GraderConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            default_api_key: None,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            fallback_provider: "gemini".to_string(),
            temperature: 0.2,
            max_output_tokens: 4096,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            api_timeout_secs: None,
            pdfium_library_path: None,
        }
    }
}

impl fmt::Debug for GraderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraderConfig")
            .field("model", &self.model)
            .field(
                "default_api_key",
                &self.default_api_key.as_ref().map(|_| "<redacted>"),
            )
            .field("api_base_url", &self.api_base_url)
            .field("fallback_provider", &self.fallback_provider)
            .field("temperature", &self.temperature)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("pdfium_library_path", &self.pdfium_library_path)
            .finish()
    }
}

impl GraderConfig {
    /// Create a new builder for `GraderConfig`.
    pub fn builder() -> GraderConfigBuilder {
        GraderConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`GraderConfig`].
#[derive(Debug)]
pub struct GraderConfigBuilder {
    config: GraderConfig,
}

impl GraderConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    /// Blank keys are treated as absent.
    pub fn default_api_key(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.config.default_api_key = if key.trim().is_empty() {
            None
        } else {
            Some(key.trim().to_string())
        };
        self
    }

    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn fallback_provider(mut self, name: impl Into<String>) -> Self {
        self.config.fallback_provider = name.into();
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_output_tokens(mut self, n: usize) -> Self {
        self.config.max_output_tokens = n;
        self
    }

    pub fn max_upload_bytes(mut self, n: usize) -> Self {
        self.config.max_upload_bytes = n;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = Some(secs);
        self
    }

    pub fn pdfium_library_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library_path = Some(path.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<GraderConfig, GraderError> {
        let c = &self.config;
        if c.model.trim().is_empty() {
            return Err(GraderError::InvalidConfig("model must not be empty".into()));
        }
        if c.api_base_url.trim().is_empty() {
            return Err(GraderError::InvalidConfig(
                "API base URL must not be empty".into(),
            ));
        }
        if c.max_upload_bytes == 0 {
            return Err(GraderError::InvalidConfig(
                "Upload ceiling must be ≥ 1 byte".into(),
            ));
        }
        if c.max_output_tokens == 0 {
            return Err(GraderError::InvalidConfig(
                "max_output_tokens must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = GraderConfig::default();
        assert_eq!(c.model, "gemini-1.5-flash");
        assert_eq!(c.max_upload_bytes, 10 * 1024 * 1024);
        assert!(c.default_api_key.is_none());
        assert!(c.api_timeout_secs.is_none());
    }

    #[test]
    fn blank_key_is_absent() {
        let c = GraderConfig::builder().default_api_key("   ").build().unwrap();
        assert!(c.default_api_key.is_none());
    }

    #[test]
    fn temperature_is_clamped() {
        let c = GraderConfig::builder().temperature(5.0).build().unwrap();
        assert_eq!(c.temperature, 2.0);
    }

    #[test]
    fn trailing_slash_stripped_from_base_url() {
        let c = GraderConfig::builder()
            .api_base_url("http://localhost:8080/v1beta/")
            .build()
            .unwrap();
        assert_eq!(c.api_base_url, "http://localhost:8080/v1beta");
    }

    #[test]
    fn rejects_empty_model() {
        let err = GraderConfig::builder().model("").build().unwrap_err();
        assert!(matches!(err, GraderError::InvalidConfig(_)));
    }

    #[test]
    fn rejects_zero_upload_ceiling() {
        assert!(GraderConfig::builder().max_upload_bytes(0).build().is_err());
    }

    #[test]
    fn debug_redacts_key() {
        let c = GraderConfig::builder()
            .default_api_key("secret-key")
            .build()
            .unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("secret-key"));
        assert!(dbg.contains("<redacted>"));
    }
}
