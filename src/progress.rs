//! Progress-callback trait for schema extraction events.
//!
//! Pass an [`Arc<dyn ExtractionProgressCallback>`] to
//! [`crate::extract::SchemaExtractor::with_progress`] to receive events as the
//! pipeline moves through its stages. The CLI drives a spinner from it; a
//! server could forward the events to a WebSocket instead.
//!
//! # Example
//!
//! ```rust
//! use formlift::ExtractionProgressCallback;
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct PageCounter {
//!     rendered: AtomicUsize,
//! }
//!
//! impl ExtractionProgressCallback for PageCounter {
//!     fn on_render_complete(&self, rendered: usize, _total: usize) {
//!         self.rendered.store(rendered, Ordering::SeqCst);
//!     }
//! }
//!
//! let counter: Arc<dyn ExtractionProgressCallback> =
//!     Arc::new(PageCounter { rendered: AtomicUsize::new(0) });
//! counter.on_render_complete(3, 3);
//! ```

use std::sync::Arc;

/// Called by [`crate::extract::SchemaExtractor`] at each stage.
///
/// All methods default to no-ops so callers override only what they need.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called before the document is rasterised.
    fn on_render_start(&self) {}

    /// Called after rasterisation.
    ///
    /// # Arguments
    /// * `rendered` — pages that will be sent to the model
    /// * `total`    — pages in the document
    fn on_render_complete(&self, rendered: usize, total: usize) {
        let _ = (rendered, total);
    }

    /// Called just before the model request is sent.
    ///
    /// # Arguments
    /// * `provider`      — display name of the provider
    /// * `payload_bytes` — base64 payload size
    fn on_model_call(&self, provider: &str, payload_bytes: usize) {
        let _ = (provider, payload_bytes);
    }

    /// Called when a schema has been parsed.
    fn on_extraction_complete(&self, form_id: &str) {
        let _ = form_id;
    }

    /// Called when the extraction fails at any stage.
    fn on_extraction_error(&self, error: &str) {
        let _ = error;
    }
}

/// Does nothing. The default when no callback is set.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;
