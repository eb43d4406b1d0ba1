//! Artifacts returned by the orchestrators.

use crate::error::{ErrorKind, ExtractError, PageError};
use crate::pipeline::llm::Provider;
use crate::schema::SchemaSummary;
use serde::{Deserialize, Serialize};

/// Placeholder confidence reported for every extracted schema.
///
/// The model reports no calibrated confidence; this is a constant stub.
pub const SCHEMA_CONFIDENCE: u8 = 85;

/// A form schema extracted from a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedSchema {
    /// Sanitized JSON text of the schema.
    pub schema: String,
    pub form_id: String,
    pub confidence: u8,
    pub notes: String,
    pub provider: Provider,
    /// Number of page images sent to the model.
    pub pages_sent: usize,
    /// Pages left out because they failed to render.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped_pages: Vec<PageError>,
    /// Present when the schema fits the typed contract.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<SchemaSummary>,
}

/// Which layer produced a palette.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaletteSource {
    Vision,
    Histogram,
    Default,
}

/// An ordered, non-empty list of `#RRGGBB` colors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorPalette {
    colors: Vec<String>,
    source: PaletteSource,
    reasoning: Option<String>,
    /// Base64 PNG of the analysed screenshot.
    preview: Option<String>,
}

impl ColorPalette {
    /// `None` when `colors` is empty.
    pub fn new(colors: Vec<String>, source: PaletteSource) -> Option<Self> {
        if colors.is_empty() {
            return None;
        }
        Some(Self {
            colors,
            source,
            reasoning: None,
            preview: None,
        })
    }

    /// A palette from a fixed six-color table.
    pub(crate) fn fixed(colors: &[&str; 6], source: PaletteSource) -> Self {
        Self {
            colors: colors.iter().map(|c| c.to_string()).collect(),
            source,
            reasoning: None,
            preview: None,
        }
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }

    pub fn with_preview(mut self, preview: Option<String>) -> Self {
        self.preview = preview;
        self
    }

    pub fn colors(&self) -> &[String] {
        &self.colors
    }

    pub fn source(&self) -> PaletteSource {
        self.source
    }

    pub fn reasoning(&self) -> Option<&str> {
        self.reasoning.as_deref()
    }

    pub fn preview(&self) -> Option<&str> {
        self.preview.as_deref()
    }
}

/// A color path that produced no palette.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorFailure {
    pub message: String,
    /// The target site is likely hostile to automated capture.
    pub blocked: bool,
    pub kind: ErrorKind,
}

impl ColorFailure {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            blocked: false,
            kind,
        }
    }

    pub fn blocked(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            blocked: true,
            kind: ErrorKind::UpstreamRejected,
        }
    }
}

impl From<ExtractError> for ColorFailure {
    fn from(e: ExtractError) -> Self {
        Self::new(e.kind(), e.to_string())
    }
}

impl std::fmt::Display for ColorFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// Serialisable envelope of a color result, as handed to a web client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColorAnalysisResponse {
    pub success: bool,
    #[serde(default)]
    pub colors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot_base64: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default)]
    pub website_blocked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<PaletteSource>,
}

impl From<Result<ColorPalette, ColorFailure>> for ColorAnalysisResponse {
    fn from(result: Result<ColorPalette, ColorFailure>) -> Self {
        match result {
            Ok(p) => Self {
                success: true,
                colors: p.colors,
                reasoning: p.reasoning,
                screenshot_base64: p.preview,
                error_message: None,
                website_blocked: false,
                source: Some(p.source),
            },
            Err(f) => Self {
                success: false,
                error_message: Some(f.message),
                website_blocked: f.blocked,
                ..Default::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn palette_is_never_empty() {
        assert!(ColorPalette::new(vec![], PaletteSource::Default).is_none());
        let p = ColorPalette::new(vec!["#000000".into()], PaletteSource::Histogram).unwrap();
        assert_eq!(p.colors().len(), 1);
        assert_eq!(p.source(), PaletteSource::Histogram);
    }

    #[test]
    fn success_envelope_uses_camel_case() {
        let palette = ColorPalette::new(vec!["#112233".into()], PaletteSource::Vision)
            .unwrap()
            .with_reasoning("AI-analyzed")
            .with_preview(Some("AAAA".into()));
        let v = serde_json::to_value(ColorAnalysisResponse::from(Ok(palette))).unwrap();
        assert_eq!(
            v,
            json!({
                "success": true,
                "colors": ["#112233"],
                "reasoning": "AI-analyzed",
                "screenshotBase64": "AAAA",
                "websiteBlocked": false,
                "source": "vision"
            })
        );
    }

    #[test]
    fn blocked_envelope() {
        let resp = ColorAnalysisResponse::from(Err(ColorFailure::blocked("site blocks bots")));
        assert!(!resp.success);
        assert!(resp.website_blocked);
        assert_eq!(resp.error_message.as_deref(), Some("site blocks bots"));
        assert!(resp.colors.is_empty());
    }

    #[test]
    fn failure_from_extract_error_keeps_kind() {
        let f = ColorFailure::from(ExtractError::InputInvalid("blank url".into()));
        assert_eq!(f.kind, ErrorKind::InputInvalid);
        assert!(!f.blocked);
        assert!(f.message.contains("blank url"));
    }
}
