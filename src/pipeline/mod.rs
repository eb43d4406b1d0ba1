//! Pipeline stages for schema and color extraction.
//!
//! Each submodule implements exactly one step and is independently
//! testable. The orchestrators in [`crate::extract`] and [`crate::colors`]
//! compose them.
//!
//! ## Data Flow
//!
//! ```text
//! schema:  input ──▶ render ──▶ encode ──▶ llm ──▶ sanitize
//!          (PDF)     (pdfium)   (base64)   (VLM)   (JSON repair)
//!
//! colors:  capture ──▶ llm ──▶ sanitize          (vision)
//!          capture ──▶ palette                    (histogram)
//! ```
//!
//! 1. [`input`]    — the uploaded document and its validation
//! 2. [`render`]   — rasterise every page; runs in `spawn_blocking` because
//!    pdfium is not async-safe
//! 3. [`encode`]   — PNG-encode and base64-wrap page images
//! 4. [`llm`]      — provider envelopes and the retrying invoker; network I/O
//! 5. [`sanitize`] — strip fences and repair almost-JSON
//! 6. [`capture`]  — website screenshots; network I/O
//! 7. [`palette`]  — pixel-histogram dominant colors
//! 8. [`logo`]     — brand logo lookup; network I/O

pub mod capture;
pub mod encode;
pub mod input;
pub mod llm;
pub mod logo;
pub mod palette;
pub mod render;
pub mod sanitize;
