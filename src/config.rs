//! Configuration types for schema and color extraction.
//!
//! All pipeline behaviour is controlled through [`ExtractorConfig`], built via
//! its [`ExtractorConfigBuilder`] or read once from the environment with
//! [`ExtractorConfig::from_env`]. The value is immutable after construction:
//! orchestrators take it as `Arc<ExtractorConfig>` and never look anything up
//! from the environment while handling a request.

use crate::error::ExtractError;
use crate::pipeline::llm::Provider;
use std::fmt;
use std::path::PathBuf;

/// Default Anthropic Messages endpoint.
pub const DEFAULT_ANTHROPIC_URL: &str = "https://api.anthropic.com/v1/messages";
/// Protocol version sent in the `anthropic-version` header.
pub const ANTHROPIC_VERSION: &str = "2023-06-01";
/// Default Gemini API base (the model and `:generateContent` are appended).
pub const DEFAULT_GEMINI_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
/// Default ScreenshotOne capture endpoint.
pub const DEFAULT_CAPTURE_URL: &str = "https://api.screenshotone.com/take";
/// Default Logo.dev image endpoint.
pub const DEFAULT_LOGO_URL: &str = "https://img.logo.dev";

/// Configuration for every component of the extraction pipeline.
///
/// # Example
/// ```rust
/// use formlift::ExtractorConfig;
///
/// let config = ExtractorConfig::builder()
///     .anthropic_api_key("sk-ant-...")
///     .dpi(150)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_attempts, 2);
/// ```
#[derive(Clone)]
pub struct ExtractorConfig {
    // ── Claude ──────────────────────────────────────────────────────────
    /// Anthropic API key. `None` leaves the Claude provider unconfigured.
    pub anthropic_api_key: Option<String>,
    /// Anthropic Messages endpoint.
    pub anthropic_api_url: String,
    /// Claude model identifier.
    pub anthropic_model: String,

    // ── Gemini ──────────────────────────────────────────────────────────
    /// Google AI API key. `None` leaves the Google provider unconfigured.
    pub gemini_api_key: Option<String>,
    /// Gemini API base URL.
    pub gemini_api_url: String,
    /// Gemini model identifier.
    pub gemini_model: String,

    /// Provider used by the color paths. Default: Claude.
    pub vision_provider: Provider,

    // ── Model calls ─────────────────────────────────────────────────────
    /// Output token budget for schema extraction. Default: 16000.
    ///
    /// A dense multi-page enrollment form easily produces 8–12k tokens of
    /// schema; running out mid-object is the most common cause of parse
    /// failures, so this errs on the generous side.
    pub schema_max_tokens: u32,
    /// Output token budget for color analysis. Default: 500.
    pub vision_max_tokens: u32,
    /// Total attempts per logical model call. Default: 2.
    pub max_attempts: u32,
    /// Fixed delay between attempts in milliseconds. Default: 2000.
    pub retry_delay_ms: u64,
    /// Per-attempt timeout for schema requests in seconds. Default: 300.
    pub schema_timeout_secs: u64,
    /// Per-attempt timeout for vision color requests in seconds. Default: 90.
    pub vision_timeout_secs: u64,
    /// Payload size above which a warning is logged. Default: 10 MB.
    pub payload_warn_bytes: usize,

    // ── Rasterisation ───────────────────────────────────────────────────
    /// Rendering DPI. Range: 72–400. Default: 150.
    pub dpi: u32,
    /// Longest-edge cap in pixels for a rendered page. Default: 2000.
    ///
    /// Keeps a 150-DPI render of an oversized page (A0 posters, engineering
    /// drawings) from exhausting memory or blowing the upload limit.
    pub max_rendered_pixels: u32,
    /// Directory containing libpdfium, or the library file itself.
    /// `None` falls back to the system library search path.
    pub pdfium_library_path: Option<PathBuf>,

    // ── Screenshot capture ──────────────────────────────────────────────
    /// ScreenshotOne access key. `None` means capture is not ready.
    pub capture_access_key: Option<String>,
    /// Capture endpoint.
    pub capture_api_url: String,
    /// Viewport width in CSS pixels. Default: 1440.
    pub viewport_width: u32,
    /// Viewport height in CSS pixels. Default: 900.
    pub viewport_height: u32,
    /// Settle delay before capture, for client-side rendering. Default: 3.
    pub capture_delay_secs: u32,
    /// Ask the capture service to block ads. Default: true.
    pub block_ads: bool,
    /// Ask the capture service to hide cookie banners. Default: true.
    pub block_cookie_banners: bool,
    /// Capture request timeout in seconds. Default: 60.
    pub capture_timeout_secs: u64,

    // ── Logo lookup ─────────────────────────────────────────────────────
    /// Logo.dev token. `None` disables logo lookup.
    pub logo_api_token: Option<String>,
    /// Logo.dev image endpoint.
    pub logo_api_url: String,
    /// Requested logo size in pixels. Default: 400.
    pub logo_size: u32,
    /// HEAD probe timeout in seconds. Default: 10.
    pub logo_timeout_secs: u64,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            anthropic_api_key: None,
            anthropic_api_url: DEFAULT_ANTHROPIC_URL.to_string(),
            anthropic_model: "claude-sonnet-4-20250514".to_string(),
            gemini_api_key: None,
            gemini_api_url: DEFAULT_GEMINI_URL.to_string(),
            gemini_model: "gemini-2.0-flash".to_string(),
            vision_provider: Provider::Claude,
            schema_max_tokens: 16000,
            vision_max_tokens: 500,
            max_attempts: 2,
            retry_delay_ms: 2000,
            schema_timeout_secs: 300,
            vision_timeout_secs: 90,
            payload_warn_bytes: 10 * 1024 * 1024,
            dpi: 150,
            max_rendered_pixels: 2000,
            pdfium_library_path: None,
            capture_access_key: None,
            capture_api_url: DEFAULT_CAPTURE_URL.to_string(),
            viewport_width: 1440,
            viewport_height: 900,
            capture_delay_secs: 3,
            block_ads: true,
            block_cookie_banners: true,
            capture_timeout_secs: 60,
            logo_api_token: None,
            logo_api_url: DEFAULT_LOGO_URL.to_string(),
            logo_size: 400,
            logo_timeout_secs: 10,
        }
    }
}

fn redact(secret: &Option<String>) -> &'static str {
    if secret.is_some() {
        "<redacted>"
    } else {
        "<unset>"
    }
}

impl fmt::Debug for ExtractorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractorConfig")
            .field("anthropic_api_key", &redact(&self.anthropic_api_key))
            .field("anthropic_api_url", &self.anthropic_api_url)
            .field("anthropic_model", &self.anthropic_model)
            .field("gemini_api_key", &redact(&self.gemini_api_key))
            .field("gemini_model", &self.gemini_model)
            .field("vision_provider", &self.vision_provider)
            .field("schema_max_tokens", &self.schema_max_tokens)
            .field("max_attempts", &self.max_attempts)
            .field("retry_delay_ms", &self.retry_delay_ms)
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("pdfium_library_path", &self.pdfium_library_path)
            .field("capture_access_key", &redact(&self.capture_access_key))
            .field("capture_api_url", &self.capture_api_url)
            .field("logo_api_token", &redact(&self.logo_api_token))
            .finish()
    }
}

impl ExtractorConfig {
    /// Create a new builder for `ExtractorConfig`.
    pub fn builder() -> ExtractorConfigBuilder {
        ExtractorConfigBuilder {
            config: Self::default(),
        }
    }

    /// Read the configuration from process environment variables.
    ///
    /// Call once at startup. Unset variables keep their defaults; empty
    /// values are treated as unset.
    pub fn from_env() -> Result<Self, ExtractError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (the environment, a map in tests).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ExtractError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut b = Self::builder();

        if let Some(v) = get("ANTHROPIC_API_KEY") {
            b = b.anthropic_api_key(v);
        }
        if let Some(v) = get("ANTHROPIC_API_URL") {
            b = b.anthropic_api_url(v);
        }
        if let Some(v) = get("ANTHROPIC_MODEL") {
            b = b.anthropic_model(v);
        }
        if let Some(v) = get("GEMINI_API_KEY").or_else(|| get("GOOGLE_API_KEY")) {
            b = b.gemini_api_key(v);
        }
        if let Some(v) = get("GEMINI_API_URL") {
            b = b.gemini_api_url(v);
        }
        if let Some(v) = get("GEMINI_MODEL") {
            b = b.gemini_model(v);
        }
        if let Some(v) = get("SCREENSHOTONE_API_KEY") {
            b = b.capture_access_key(v);
        }
        if let Some(v) = get("SCREENSHOT_API_URL") {
            b = b.capture_api_url(v);
        }
        if let Some(v) = get("LOGO_DEV_TOKEN") {
            b = b.logo_api_token(v);
        }
        if let Some(v) = get("LOGO_API_URL") {
            b = b.logo_api_url(v);
        }
        if let Some(v) = get("PDFIUM_LIB_PATH") {
            b = b.pdfium_library_path(v);
        }

        b.build()
    }

    /// Whether the given provider has credentials.
    pub fn has_credentials(&self, provider: Provider) -> bool {
        match provider {
            Provider::Claude => self.anthropic_api_key.is_some(),
            Provider::Google => self.gemini_api_key.is_some(),
        }
    }

    /// Model identifier configured for the given provider.
    pub fn model_for(&self, provider: Provider) -> &str {
        match provider {
            Provider::Claude => &self.anthropic_model,
            Provider::Google => &self.gemini_model,
        }
    }
}

/// Builder for [`ExtractorConfig`].
#[derive(Debug)]
pub struct ExtractorConfigBuilder {
    config: ExtractorConfig,
}

impl ExtractorConfigBuilder {
    pub fn anthropic_api_key(mut self, key: impl Into<String>) -> Self {
        self.config.anthropic_api_key = Some(key.into());
        self
    }

    pub fn anthropic_api_url(mut self, url: impl Into<String>) -> Self {
        self.config.anthropic_api_url = url.into();
        self
    }

    pub fn anthropic_model(mut self, model: impl Into<String>) -> Self {
        self.config.anthropic_model = model.into();
        self
    }

    pub fn gemini_api_key(mut self, key: impl Into<String>) -> Self {
        self.config.gemini_api_key = Some(key.into());
        self
    }

    pub fn gemini_api_url(mut self, url: impl Into<String>) -> Self {
        self.config.gemini_api_url = url.into();
        self
    }

    pub fn gemini_model(mut self, model: impl Into<String>) -> Self {
        self.config.gemini_model = model.into();
        self
    }

    pub fn vision_provider(mut self, provider: Provider) -> Self {
        self.config.vision_provider = provider;
        self
    }

    pub fn schema_max_tokens(mut self, n: u32) -> Self {
        self.config.schema_max_tokens = n;
        self
    }

    pub fn vision_max_tokens(mut self, n: u32) -> Self {
        self.config.vision_max_tokens = n;
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.max_attempts = n.max(1);
        self
    }

    pub fn retry_delay_ms(mut self, ms: u64) -> Self {
        self.config.retry_delay_ms = ms;
        self
    }

    pub fn schema_timeout_secs(mut self, secs: u64) -> Self {
        self.config.schema_timeout_secs = secs;
        self
    }

    pub fn vision_timeout_secs(mut self, secs: u64) -> Self {
        self.config.vision_timeout_secs = secs;
        self
    }

    pub fn payload_warn_bytes(mut self, bytes: usize) -> Self {
        self.config.payload_warn_bytes = bytes;
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 400);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn pdfium_library_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library_path = Some(path.into());
        self
    }

    pub fn capture_access_key(mut self, key: impl Into<String>) -> Self {
        self.config.capture_access_key = Some(key.into());
        self
    }

    pub fn capture_api_url(mut self, url: impl Into<String>) -> Self {
        self.config.capture_api_url = url.into();
        self
    }

    pub fn viewport(mut self, width: u32, height: u32) -> Self {
        self.config.viewport_width = width;
        self.config.viewport_height = height;
        self
    }

    pub fn capture_delay_secs(mut self, secs: u32) -> Self {
        self.config.capture_delay_secs = secs;
        self
    }

    pub fn capture_timeout_secs(mut self, secs: u64) -> Self {
        self.config.capture_timeout_secs = secs;
        self
    }

    pub fn logo_api_token(mut self, token: impl Into<String>) -> Self {
        self.config.logo_api_token = Some(token.into());
        self
    }

    pub fn logo_api_url(mut self, url: impl Into<String>) -> Self {
        self.config.logo_api_url = url.into();
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractorConfig, ExtractError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 400 {
            return Err(ExtractError::InvalidConfig(format!(
                "DPI must be 72–400, got {}",
                c.dpi
            )));
        }
        if c.max_attempts == 0 {
            return Err(ExtractError::InvalidConfig(
                "max_attempts must be ≥ 1".into(),
            ));
        }
        if c.schema_timeout_secs == 0 || c.vision_timeout_secs == 0 || c.capture_timeout_secs == 0 {
            return Err(ExtractError::InvalidConfig(
                "timeouts must be at least one second".into(),
            ));
        }
        for (name, url) in [
            ("anthropic_api_url", &c.anthropic_api_url),
            ("gemini_api_url", &c.gemini_api_url),
            ("capture_api_url", &c.capture_api_url),
            ("logo_api_url", &c.logo_api_url),
        ] {
            if reqwest::Url::parse(url).is_err() {
                return Err(ExtractError::InvalidConfig(format!(
                    "{name} is not a valid URL: '{url}'"
                )));
            }
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_pipeline_constants() {
        let c = ExtractorConfig::default();
        assert_eq!(c.dpi, 150);
        assert_eq!(c.max_attempts, 2);
        assert_eq!(c.retry_delay_ms, 2000);
        assert_eq!(c.schema_timeout_secs, 300);
        assert_eq!(c.vision_timeout_secs, 90);
        assert_eq!(c.capture_timeout_secs, 60);
        assert_eq!((c.viewport_width, c.viewport_height), (1440, 900));
        assert_eq!(c.capture_delay_secs, 3);
        assert_eq!(c.payload_warn_bytes, 10 * 1024 * 1024);
        assert_eq!(c.vision_provider, Provider::Claude);
    }

    #[test]
    fn builder_clamps_dpi() {
        let c = ExtractorConfig::builder().dpi(10).build().unwrap();
        assert_eq!(c.dpi, 72);
        let c = ExtractorConfig::builder().dpi(1000).build().unwrap();
        assert_eq!(c.dpi, 400);
    }

    #[test]
    fn builder_rejects_bad_url() {
        let err = ExtractorConfig::builder()
            .capture_api_url("not a url")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("capture_api_url"));
    }

    #[test]
    fn from_lookup_reads_keys_and_ignores_blanks() {
        let vars: HashMap<&str, &str> = [
            ("ANTHROPIC_API_KEY", "sk-ant-test"),
            ("GOOGLE_API_KEY", "g-key"),
            ("SCREENSHOTONE_API_KEY", "   "),
            ("PDFIUM_LIB_PATH", "/opt/pdfium/lib"),
        ]
        .into_iter()
        .collect();

        let c = ExtractorConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(c.anthropic_api_key.as_deref(), Some("sk-ant-test"));
        assert_eq!(c.gemini_api_key.as_deref(), Some("g-key"));
        assert!(c.capture_access_key.is_none());
        assert_eq!(
            c.pdfium_library_path.as_deref(),
            Some(std::path::Path::new("/opt/pdfium/lib"))
        );
        assert!(c.has_credentials(Provider::Claude));
        assert!(c.has_credentials(Provider::Google));
    }

    #[test]
    fn debug_redacts_secrets() {
        let c = ExtractorConfig::builder()
            .anthropic_api_key("sk-ant-secret")
            .capture_access_key("shot-secret")
            .build()
            .unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("sk-ant-secret"));
        assert!(!dbg.contains("shot-secret"));
        assert!(dbg.contains("<redacted>"));
    }
}
