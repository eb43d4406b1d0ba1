//! Input handling: the uploaded [`Document`] and its validation.
//!
//! A document is immutable once received. The media type is whatever the
//! uploader declared; [`Document::validate_pdf`] cross-checks it against the
//! `%PDF` magic bytes so callers get a meaningful `InputInvalid` error
//! rather than a pdfium failure deep inside rasterisation.

use crate::error::ExtractError;
use crate::pipeline::encode::to_base64;
use std::path::Path;
use tracing::debug;

/// Media type of PDF documents.
pub const PDF_MEDIA_TYPE: &str = "application/pdf";

const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// An uploaded document.
#[derive(Clone)]
pub struct Document {
    bytes: Vec<u8>,
    media_type: String,
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("len", &self.bytes.len())
            .field("media_type", &self.media_type)
            .finish()
    }
}

impl Document {
    pub fn new(bytes: impl Into<Vec<u8>>, media_type: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            media_type: media_type.into(),
        }
    }

    /// Convenience constructor declaring `application/pdf`.
    pub fn pdf(bytes: impl Into<Vec<u8>>) -> Self {
        Self::new(bytes, PDF_MEDIA_TYPE)
    }

    /// Read a local file, declaring its media type from content and extension.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ExtractError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ExtractError::FileNotFound {
                path: path.to_path_buf(),
            },
            _ => ExtractError::InputInvalid(format!("cannot read '{}': {e}", path.display())),
        })?;

        let media_type = sniff_media_type(&bytes, path);
        debug!(
            "Loaded {} ({} bytes, {})",
            path.display(),
            bytes.len(),
            media_type
        );
        Ok(Self::new(bytes, media_type))
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Base64 of the raw bytes, for `document` content blocks.
    pub fn to_base64(&self) -> String {
        to_base64(&self.bytes)
    }

    /// Reject anything that is not a non-empty PDF.
    pub fn validate_pdf(&self) -> Result<(), ExtractError> {
        if self.bytes.is_empty() {
            return Err(ExtractError::InputInvalid(
                "document is empty; please select a PDF file".into(),
            ));
        }
        if !self.media_type.eq_ignore_ascii_case(PDF_MEDIA_TYPE) {
            return Err(ExtractError::InputInvalid(format!(
                "expected {PDF_MEDIA_TYPE}, got '{}'; please upload a valid PDF file",
                self.media_type
            )));
        }
        if !self.bytes.starts_with(PDF_MAGIC) {
            return Err(ExtractError::NotAPdf {
                media_type: self.media_type.clone(),
                magic: self.bytes.iter().take(4).copied().collect(),
            });
        }
        Ok(())
    }
}

/// Declared media type for a file on disk.
fn sniff_media_type(bytes: &[u8], path: &Path) -> String {
    if bytes.starts_with(PDF_MAGIC) {
        return PDF_MEDIA_TYPE.to_string();
    }
    if let Ok(format) = image::guess_format(bytes) {
        return format.to_mime_type().to_string();
    }
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("pdf") => PDF_MEDIA_TYPE.to_string(),
        Some("png") => "image/png".to_string(),
        Some("jpg") | Some("jpeg") => "image/jpeg".to_string(),
        _ => "application/octet-stream".to_string(),
    }
}
