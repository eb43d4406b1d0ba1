//! Brand color extraction with layered fallbacks.
//!
//! Two independent layers produce a [`ColorPalette`]:
//!
//! 1. **Vision**: a screenshot or PDF goes to the vision model, which names
//!    six role colors ([`COLOR_KEYS`]). `from_url` and `from_document`.
//! 2. **Histogram**: the most frequent non-background pixels of a
//!    screenshot, falling back to a fixed palette. `suggest_from_url` and
//!    `suggest_from_image`.
//!
//! The layers are not chained: when the vision path fails the caller gets a
//! [`ColorFailure`] it can show, and decides whether to ask for a histogram
//! suggestion instead. A failed capture is reported as `blocked` and steers
//! the user towards uploading a PDF.

use crate::config::ExtractorConfig;
use crate::error::ErrorKind;
use crate::output::{ColorFailure, ColorPalette, PaletteSource};
use crate::pipeline::capture::{CaptureClient, CaptureFailure, CaptureResult};
use crate::pipeline::encode::to_base64;
use crate::pipeline::input::Document;
use crate::pipeline::llm::{ContentBlock, ModelInvoker, ModelRequest};
use crate::pipeline::palette;
use crate::pipeline::sanitize;
use crate::prompts::{color_prompt, DOCUMENT_SOURCE, WEBSITE_SOURCE};
use crate::transport::{HttpTransport, ReqwestTransport};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Role colors requested from the model, in palette order.
pub const COLOR_KEYS: [&str; 6] = [
    "primaryButton",
    "header",
    "footer",
    "accent",
    "secondaryButton",
    "sidebar",
];

/// Palette returned when no histogram can be computed.
pub const FALLBACK_PALETTE: [&str; 6] = [
    "#E41F35", "#000000", "#FFFFFF", "#0066CC", "#FF6600", "#333333",
];

const VISION_REASONING: &str = "AI-analyzed brand colors from visual content";
const HISTOGRAM_REASONING: &str = "Most frequent colors in the website screenshot";

const SERVICE_UNAVAILABLE: &str =
    "Screenshot service is not available. Please try using the 'Analyze PDF' feature instead.";
const SITE_BLOCKED: &str = "Unable to capture screenshot of the website. The site may be \
blocking automated access. Please try using the 'Analyze PDF' feature to extract colors \
from a PDF document instead.";
const INCOMPLETE_PALETTE: &str = "Unable to determine all brand colors from the visual \
content. Please manually select colors or try a different source.";

static RE_HEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#(?:[0-9A-F]{3}|[0-9A-F]{6}|[0-9A-F]{8})$").unwrap());

/// Extracts brand palettes from websites, documents and images.
#[derive(Clone)]
pub struct ColorExtractor {
    config: Arc<ExtractorConfig>,
    invoker: ModelInvoker,
    capture: CaptureClient,
}

impl ColorExtractor {
    pub fn new(config: Arc<ExtractorConfig>, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            invoker: ModelInvoker::new(transport.clone(), config.clone()),
            capture: CaptureClient::new(transport, config.clone()),
            config,
        }
    }

    pub fn from_config(config: ExtractorConfig) -> Result<Self, crate::error::ExtractError> {
        let transport = Arc::new(ReqwestTransport::new()?);
        Ok(Self::new(Arc::new(config), transport))
    }

    /// Whether website capture is configured.
    pub fn capture_ready(&self) -> bool {
        self.capture.is_ready()
    }

    /// Vision palette from a screenshot of `url`.
    ///
    /// The model is only called when a screenshot was captured. On success
    /// the palette carries the screenshot as its preview.
    pub async fn from_url(&self, url: &str) -> Result<ColorPalette, ColorFailure> {
        let url = url.trim();
        if url.is_empty() {
            return Err(ColorFailure::new(
                ErrorKind::InputInvalid,
                "Website URL is required",
            ));
        }
        if !self.capture.is_ready() {
            warn!("Color analysis requested for {} but capture is not configured", url);
            return Err(ColorFailure::new(ErrorKind::Internal, SERVICE_UNAVAILABLE));
        }
        self.invoker.api_key(self.config.vision_provider)?;

        info!("Analyzing website colors: {}", url);
        let screenshot = match self.capture.capture(url).await {
            CaptureResult::Captured(bytes) => bytes,
            CaptureResult::Unavailable(failure) => return Err(blocked_failure(url, &failure)),
        };

        let preview = to_base64(&screenshot);
        let block = ContentBlock::png(preview.clone());
        self.analyze(block, WEBSITE_SOURCE)
            .await
            .map(|p| p.with_preview(Some(preview)))
    }

    /// Vision palette from a PDF sent to the model as a document block.
    pub async fn from_document(&self, document: &Document) -> Result<ColorPalette, ColorFailure> {
        document.validate_pdf()?;
        info!("Analyzing document colors: {} bytes", document.len());
        let block = ContentBlock::document(document.media_type(), document.to_base64());
        self.analyze(block, DOCUMENT_SOURCE).await
    }

    /// Histogram palette of a screenshot of `url`.
    ///
    /// Fails only on a blank URL; capture problems yield the fallback palette.
    pub async fn suggest_from_url(&self, url: &str) -> Result<ColorPalette, ColorFailure> {
        let url = url.trim();
        if url.is_empty() {
            return Err(ColorFailure::new(
                ErrorKind::InputInvalid,
                "Website URL is required",
            ));
        }
        match self.capture.capture(url).await {
            CaptureResult::Captured(bytes) => {
                Ok(suggest_from_image(&bytes).with_preview(Some(to_base64(&bytes))))
            }
            CaptureResult::Unavailable(failure) => {
                info!("No screenshot for {} ({}); using fallback palette", url, failure);
                Ok(fallback_palette())
            }
        }
    }

    async fn analyze(
        &self,
        block: ContentBlock,
        source: &str,
    ) -> Result<ColorPalette, ColorFailure> {
        let provider = self.config.vision_provider;
        let request = ModelRequest::new(
            self.config.model_for(provider),
            self.config.vision_max_tokens,
            Duration::from_secs(self.config.vision_timeout_secs),
        )
        .block(ContentBlock::text(color_prompt(source)))
        .block(block);

        let response = self.invoker.invoke(provider, &request).await?;
        let text = response.into_text().map_err(|e| {
            warn!("Color analysis of {} failed: {}", source, e);
            ColorFailure::new(e.kind(), format!("Failed to analyze {source}: {e}"))
        })?;
        debug!("Color analysis answer: {}", text);
        parse_palette(&text)
    }
}

/// Histogram palette of encoded image bytes.
///
/// Undecodable or all-white images yield [`FALLBACK_PALETTE`].
pub fn suggest_from_image(image_bytes: &[u8]) -> ColorPalette {
    match palette::try_extract(image_bytes) {
        Ok(colors) => ColorPalette::new(colors, PaletteSource::Histogram)
            .map(|p| p.with_reasoning(HISTOGRAM_REASONING))
            .unwrap_or_else(|| {
                debug!("Histogram is empty; using fallback palette");
                fallback_palette()
            }),
        Err(e) => {
            warn!("Could not decode screenshot ({}); using fallback palette", e);
            fallback_palette()
        }
    }
}

/// Read the six role colors out of a model answer.
///
/// Values are normalised to upper-case with a leading `#`; anything that
/// does not look like hex is dropped, and fewer than six usable values is a
/// failure.
pub fn parse_palette(text: &str) -> Result<ColorPalette, ColorFailure> {
    let value = sanitize::parse_located(text).map_err(|e| {
        ColorFailure::new(
            ErrorKind::ParseFailure,
            format!("Could not read colors from the AI response: {e}"),
        )
    })?;

    let colors: Vec<String> = COLOR_KEYS
        .iter()
        .filter_map(|key| value.get(key).and_then(normalize_color))
        .collect();
    if colors.len() < COLOR_KEYS.len() {
        warn!(
            "Only {}/{} usable colors in the answer",
            colors.len(),
            COLOR_KEYS.len()
        );
        return Err(ColorFailure::new(ErrorKind::ParseFailure, INCOMPLETE_PALETTE));
    }

    ColorPalette::new(colors, PaletteSource::Vision)
        .map(|p| p.with_reasoning(VISION_REASONING))
        .ok_or_else(|| ColorFailure::new(ErrorKind::ParseFailure, INCOMPLETE_PALETTE))
}

fn normalize_color(value: &Value) -> Option<String> {
    let raw = value.as_str()?.trim();
    let hex = if raw.starts_with('#') {
        raw.to_ascii_uppercase()
    } else {
        format!("#{}", raw.to_ascii_uppercase())
    };
    RE_HEX.is_match(&hex).then_some(hex)
}

fn fallback_palette() -> ColorPalette {
    ColorPalette::fixed(&FALLBACK_PALETTE, PaletteSource::Default)
}

fn blocked_failure(url: &str, failure: &CaptureFailure) -> ColorFailure {
    warn!("Screenshot unavailable for {}: {}", url, failure);
    let mut f = ColorFailure::blocked(SITE_BLOCKED);
    if matches!(failure, CaptureFailure::Network { .. }) {
        f.kind = ErrorKind::TransientNetwork;
    }
    f
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::fake::{ScriptedTransport, Step};
    use crate::transport::{Method, TransportError};
    use image::{DynamicImage, Rgb, RgbImage};
    use serde_json::json;
    use std::io::Cursor;

    fn png(img: RgbImage) -> Vec<u8> {
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    fn config(capture: bool) -> Arc<ExtractorConfig> {
        let mut b = ExtractorConfig::builder().anthropic_api_key("sk-ant-test");
        if capture {
            b = b.capture_access_key("shot-key");
        }
        Arc::new(b.build().unwrap())
    }

    fn extractor(capture: bool, steps: Vec<Step>) -> (ColorExtractor, Arc<ScriptedTransport>) {
        let transport = Arc::new(ScriptedTransport::new(steps));
        (ColorExtractor::new(config(capture), transport.clone()), transport)
    }

    fn claude_says(text: &str) -> Step {
        Step::json(200, json!({ "content": [{ "type": "text", "text": text }] }))
    }

    const SIX: &str = r##"Here you go:
{"primaryButton":"#e41f35","header":"003366","footer":"#222222",
 "accent":"#FF6600","secondaryButton":"#666666","sidebar":"#F5F5F5"}"##;

    #[test]
    fn parse_normalises_in_key_order() {
        let p = parse_palette(SIX).unwrap();
        assert_eq!(
            p.colors(),
            ["#E41F35", "#003366", "#222222", "#FF6600", "#666666", "#F5F5F5"]
        );
        assert_eq!(p.source(), PaletteSource::Vision);
        assert!(p.reasoning().is_some());
    }

    #[test]
    fn five_usable_colors_is_a_failure() {
        let text = r##"{"primaryButton":"#E41F35","header":"navy","footer":"#222222",
            "accent":"#FF6600","secondaryButton":"#666666","sidebar":"#F5F5F5"}"##;
        let f = parse_palette(text).unwrap_err();
        assert_eq!(f.kind, ErrorKind::ParseFailure);
        assert!(f.message.contains("manually select"));
        assert!(!f.blocked);
    }

    #[test]
    fn prose_without_json_is_a_parse_failure() {
        let f = parse_palette("I cannot see any colors.").unwrap_err();
        assert_eq!(f.kind, ErrorKind::ParseFailure);
    }

    #[tokio::test]
    async fn blank_url_fails_without_any_call() {
        let (ex, transport) = extractor(true, vec![]);
        let f = ex.from_url("   ").await.unwrap_err();
        assert_eq!(f.kind, ErrorKind::InputInvalid);
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn capture_not_configured_steers_to_pdf() {
        let (ex, transport) = extractor(false, vec![]);
        let f = ex.from_url("https://example.com").await.unwrap_err();
        assert!(f.message.contains("Analyze PDF"));
        assert!(!f.blocked);
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn blocked_capture_never_calls_the_model() {
        let (ex, transport) = extractor(
            true,
            vec![Step::json(
                400,
                json!({"error_code":"host_returned_error","status":403}),
            )],
        );
        let f = ex.from_url("https://bank.example").await.unwrap_err();
        assert!(f.blocked);
        assert!(f.message.contains("Analyze PDF"));
        let calls = transport.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].method, Method::Get);
    }

    #[tokio::test]
    async fn unreachable_capture_is_blocked_and_transient() {
        let (ex, _) = extractor(
            true,
            vec![Step::Fail(TransportError::Connect("refused".into()))],
        );
        let f = ex.from_url("https://example.com").await.unwrap_err();
        assert!(f.blocked);
        assert_eq!(f.kind, ErrorKind::TransientNetwork);
    }

    #[tokio::test]
    async fn captured_site_is_analysed_with_preview() {
        let shot = png(RgbImage::from_pixel(20, 20, Rgb([0, 51, 102])));
        let (ex, transport) = extractor(
            true,
            vec![Step::Reply(200, shot.clone()), claude_says(SIX)],
        );
        let p = ex.from_url("https://example.com").await.unwrap();
        assert_eq!(p.colors().len(), 6);
        assert_eq!(p.preview(), Some(to_base64(&shot).as_str()));

        let calls = transport.calls();
        assert_eq!(calls.len(), 2);
        let body: Value = serde_json::from_slice(calls[1].body.as_deref().unwrap()).unwrap();
        assert_eq!(body["max_tokens"], 500);
        let content = body["messages"][0]["content"].as_array().unwrap();
        assert_eq!(content[0]["type"], "text");
        assert!(content[0]["text"].as_str().unwrap().contains("website screenshot"));
        assert_eq!(content[1]["type"], "image");
    }

    #[tokio::test]
    async fn document_path_sends_document_block() {
        let (ex, transport) = extractor(false, vec![claude_says(SIX)]);
        let doc = Document::pdf(b"%PDF-1.4 brand guide".to_vec());
        let p = ex.from_document(&doc).await.unwrap();
        assert_eq!(p.colors()[0], "#E41F35");
        assert!(p.preview().is_none());

        let body: Value =
            serde_json::from_slice(transport.calls()[0].body.as_deref().unwrap()).unwrap();
        let block = &body["messages"][0]["content"][1];
        assert_eq!(block["type"], "document");
        assert_eq!(block["source"]["media_type"], "application/pdf");
        assert_eq!(block["source"]["data"], doc.to_base64());
    }

    #[tokio::test]
    async fn document_path_rejects_empty_and_non_pdf() {
        let (ex, transport) = extractor(false, vec![]);
        let f = ex.from_document(&Document::pdf(Vec::new())).await.unwrap_err();
        assert_eq!(f.kind, ErrorKind::InputInvalid);
        let f = ex
            .from_document(&Document::new(b"GIF89a".to_vec(), "image/gif"))
            .await
            .unwrap_err();
        assert_eq!(f.kind, ErrorKind::InputInvalid);
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn model_rejection_becomes_failure() {
        let (ex, _) = extractor(
            false,
            vec![Step::json(529, json!({"error":{"message":"Overloaded"}}))],
        );
        let f = ex
            .from_document(&Document::pdf(b"%PDF-1.4".to_vec()))
            .await
            .unwrap_err();
        assert_eq!(f.kind, ErrorKind::UpstreamRejected);
        assert!(f.message.contains("Overloaded"));
    }

    #[tokio::test]
    async fn suggestion_uses_histogram_of_capture() {
        let mut img = RgbImage::from_pixel(100, 100, Rgb([255, 255, 255]));
        for x in 0..50 {
            for y in 0..100 {
                img.put_pixel(x, y, Rgb([0xE4, 0x1F, 0x35]));
            }
        }
        let (ex, _) = extractor(true, vec![Step::Reply(200, png(img))]);
        let p = ex.suggest_from_url("https://example.com").await.unwrap();
        assert_eq!(p.source(), PaletteSource::Histogram);
        assert_eq!(p.colors(), ["#E41F35"]);
        assert!(p.preview().is_some());
    }

    #[tokio::test]
    async fn suggestion_falls_back_when_capture_fails() {
        let (ex, _) = extractor(true, vec![Step::json(403, json!({}))]);
        let p = ex.suggest_from_url("https://example.com").await.unwrap();
        assert_eq!(p.source(), PaletteSource::Default);
        assert_eq!(p.colors(), FALLBACK_PALETTE);
        assert!(p.preview().is_none());
    }

    #[test]
    fn white_or_broken_images_get_fallback() {
        let white = png(RgbImage::from_pixel(30, 30, Rgb([255, 255, 255])));
        assert_eq!(suggest_from_image(&white).source(), PaletteSource::Default);
        assert_eq!(suggest_from_image(b"nope").colors(), FALLBACK_PALETTE);
    }

    #[test]
    fn hex_normalisation() {
        assert_eq!(normalize_color(&json!("abc")), Some("#ABC".into()));
        assert_eq!(normalize_color(&json!(" #0066cc ")), Some("#0066CC".into()));
        assert_eq!(normalize_color(&json!("blue")), None);
        assert_eq!(normalize_color(&json!(123456)), None);
    }
}
