//! Error types for the formlift library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ExtractError`] — **Fatal**: the extraction cannot produce its artifact
//!   (bad input, unbindable pdfium, model unreachable, unparsable reply).
//!   Returned as `Err(ExtractError)` from [`crate::extract::SchemaExtractor`]
//!   and folded into a [`crate::output::ColorFailure`] by the color paths.
//!
//! * [`PageError`] — **Non-fatal**: a single page failed to rasterise but the
//!   rest of the document is fine. Collected in
//!   [`crate::pipeline::render::RasterOutput::skipped`] so callers can see
//!   what was dropped from the model payload.
//!
//! Every `ExtractError` maps onto one [`ErrorKind`] so callers can render
//! differentiated guidance without matching on every variant.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Coarse classification of an [`ExtractError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Empty or wrong-media-type document, blank URL. Never retried.
    InputInvalid,
    /// Connection reset/refused, DNS failure or timeout on an outbound call.
    TransientNetwork,
    /// The model or capture service answered, but with an error.
    UpstreamRejected,
    /// Model output could not be turned into valid JSON.
    ParseFailure,
    /// The host (pdfium library, fonts) could not render; not the input's fault.
    HostEnvironment,
    /// The document itself could not be rendered.
    DocumentContent,
    /// Misconfiguration or an unexpected internal condition.
    Internal,
}

/// All fatal errors returned by the formlift library.
#[derive(Debug, Error)]
pub enum ExtractError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The caller supplied something the pipeline cannot accept.
    #[error("Invalid input: {0}")]
    InputInvalid(String),

    /// Input file was not found at the given path.
    #[error("File not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// The bytes were read, but they are not a PDF.
    #[error("Document is not a valid PDF (declared '{media_type}', first bytes {magic:?})")]
    NotAPdf { media_type: String, magic: Vec<u8> },

    // ── Rasterisation errors ──────────────────────────────────────────────
    /// No page of the document could be rendered.
    #[error("Rasterization failed: {detail}\nThe document is likely corrupt or uses an unsupported sub-format.")]
    RasterizationFailed { detail: String },

    /// The host cannot render at all (pdfium missing, font subsystem broken).
    #[error(
        "Host environment cannot render documents: {detail}\n\
This is a problem with the machine, not the document. Check that libpdfium is\n\
installed (or set PDFIUM_LIB_PATH) and that system fonts are intact, then retry."
    )]
    HostEnvironment { detail: String },

    // ── Model / network errors ────────────────────────────────────────────
    /// The selected provider has no API key configured.
    #[error("Model provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Transport-level failure that persisted through every attempt.
    #[error("{}", transient_message(.attempts, .detail, .reset))]
    TransientNetwork {
        attempts: u32,
        detail: String,
        /// The last failure was a connection reset.
        reset: bool,
    },

    /// The upstream answered with an error status or an unusable payload.
    #[error("Upstream service rejected the request{}: {message}", status_suffix(.status))]
    UpstreamRejected { status: Option<u16>, message: String },

    // ── Response errors ───────────────────────────────────────────────────
    /// Sanitization could not produce valid JSON.
    #[error("Could not parse model output as JSON: {detail}\nTail of response: {fragment:?}")]
    ParseFailure { detail: String, fragment: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

fn transient_message(attempts: &u32, detail: &str, reset: &bool) -> String {
    if *reset {
        format!(
            "Connection reset by the model endpoint after {attempts} attempt(s) - \
the payload is likely too large or the network is unstable. Try a smaller document. ({detail})"
        )
    } else {
        format!("Network failure after {attempts} attempt(s): {detail}")
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

impl ExtractError {
    /// Classify this error into the taxonomy used for user-facing guidance.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExtractError::InputInvalid(_)
            | ExtractError::FileNotFound { .. }
            | ExtractError::NotAPdf { .. } => ErrorKind::InputInvalid,
            ExtractError::RasterizationFailed { .. } => ErrorKind::DocumentContent,
            ExtractError::HostEnvironment { .. } => ErrorKind::HostEnvironment,
            ExtractError::TransientNetwork { .. } => ErrorKind::TransientNetwork,
            ExtractError::ProviderNotConfigured { .. } | ExtractError::UpstreamRejected { .. } => {
                ErrorKind::UpstreamRejected
            }
            ExtractError::ParseFailure { .. } => ErrorKind::ParseFailure,
            ExtractError::InvalidConfig(_) | ExtractError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether re-running the same call later could plausibly succeed.
    ///
    /// Host-environment failures count: an operator can fix the host and retry
    /// with the very same document.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::TransientNetwork | ErrorKind::HostEnvironment
        )
    }
}

/// A non-fatal error for a single page.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum PageError {
    /// Page rasterisation failed; the page was left out of the payload.
    #[error("Page {page}: rasterisation failed: {detail}")]
    RenderFailed { page: usize, detail: String },
}
