//! # formlift
//!
//! Lift enrollment forms and brand palettes out of PDFs and websites using
//! Vision Language Models (VLMs).
//!
//! ## Why this crate?
//!
//! Scanned and flattened PDF forms carry no usable field structure: text
//! extraction loses the boxes, the side-by-side layout and the asterisks
//! that mark required fields. This crate rasterises every page and lets a
//! VLM read the form as a person would, producing a JSON Schema a web form
//! renderer can use directly.
//!
//! ## Pipeline Overview
//!
//! ```text
//! Schema:  PDF ─▶ validate ─▶ render (pdfium, spawn_blocking) ─▶ PNG/base64
//!              ─▶ one multimodal request ─▶ sanitize ─▶ ExtractedSchema
//!
//! Colors:  URL ─▶ capture API ─▶ screenshot ─┐
//!          PDF ─────────────────────────────┴▶ vision model ─▶ ColorPalette
//!          URL / image ─▶ pixel histogram ─▶ ColorPalette (fallback layer)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use formlift::{Document, ExtractorConfig, Provider, SchemaExtractor};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Keys come from ANTHROPIC_API_KEY / GEMINI_API_KEY
//!     let extractor = SchemaExtractor::from_config(ExtractorConfig::from_env()?)?;
//!     let output = extractor
//!         .extract(&Document::from_path("enrollment.pdf")?, Provider::Claude)
//!         .await?;
//!     println!("{}", output.schema);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `formlift` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! formlift = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod colors;
pub mod config;
pub mod error;
pub mod extract;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod schema;
pub mod transport;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use colors::{parse_palette, suggest_from_image, ColorExtractor, COLOR_KEYS};
pub use config::{ExtractorConfig, ExtractorConfigBuilder};
pub use error::{ErrorKind, ExtractError, PageError};
pub use extract::SchemaExtractor;
pub use output::{
    ColorAnalysisResponse, ColorFailure, ColorPalette, ExtractedSchema, PaletteSource,
};
pub use pipeline::capture::{CaptureClient, CaptureFailure, CaptureResult};
pub use pipeline::input::Document;
pub use pipeline::llm::{ContentBlock, ModelInvoker, ModelRequest, ModelResponse, Provider};
pub use pipeline::logo::{validate_logo_url, LogoClient};
pub use pipeline::render::{PageRasterizer, PdfiumRasterizer, RasterOutput, RenderedPage};
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use schema::{FormSchema, SchemaSummary};
pub use transport::{HttpCall, HttpReply, HttpTransport, Method, ReqwestTransport, TransportError};
