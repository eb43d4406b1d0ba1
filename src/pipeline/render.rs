//! Document rasterisation: render every page to a lossless PNG via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which keeps thread-local
//! state and blocks for the whole render. [`rasterize`] moves the work onto
//! tokio's blocking pool so the async workers keep serving other requests.
//!
//! ## Why cap pixels as well as DPI?
//!
//! Forms are rendered at a fixed 150 DPI so small print and asterisks stay
//! legible, but an A0 poster at that resolution is 7000 px wide.
//! `max_rendered_pixels` bounds the longest edge regardless of paper size.
//!
//! ## Partial success
//!
//! Every page is attempted. A page that fails is recorded as a
//! [`PageError`] and left out; only a document with no renderable page at
//! all is an error. When every failure comes from the font subsystem the
//! host is blamed ([`ExtractError::HostEnvironment`]), not the document.

use crate::config::ExtractorConfig;
use crate::error::{ExtractError, PageError};
use crate::pipeline::encode::{encode_png, to_base64};
use pdfium_render::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One rendered page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPage {
    /// 0-based position in the document.
    pub index: usize,
    pub dpi: u32,
    /// PNG bytes.
    pub png: Vec<u8>,
}

impl RenderedPage {
    pub fn to_base64(&self) -> String {
        to_base64(&self.png)
    }
}

/// Result of rasterising a document.
#[derive(Debug, Clone, Default)]
pub struct RasterOutput {
    /// Rendered pages in document order.
    pub pages: Vec<RenderedPage>,
    /// Pages that could not be rendered.
    pub skipped: Vec<PageError>,
    /// Total pages in the document.
    pub page_count: usize,
}

/// Turns document bytes into page images.
///
/// Implementations are blocking; call them through [`rasterize`].
pub trait PageRasterizer: Send + Sync {
    fn render(&self, document: &[u8]) -> Result<RasterOutput, ExtractError>;
}

/// Run `rasterizer` on the blocking pool.
pub async fn rasterize(
    rasterizer: Arc<dyn PageRasterizer>,
    document: Vec<u8>,
) -> Result<RasterOutput, ExtractError> {
    tokio::task::spawn_blocking(move || rasterizer.render(&document))
        .await
        .map_err(|e| ExtractError::Internal(format!("Render task panicked: {}", e)))?
}

/// Per-page outcome before collection: PNG bytes or a failure detail.
pub type PageOutcome = Result<Vec<u8>, String>;

/// Fold per-page outcomes into a [`RasterOutput`], enforcing the
/// zero-page and host-environment rules.
pub fn collect_pages(dpi: u32, outcomes: Vec<PageOutcome>) -> Result<RasterOutput, ExtractError> {
    let page_count = outcomes.len();
    if page_count == 0 {
        return Err(ExtractError::RasterizationFailed {
            detail: "document contains no pages".into(),
        });
    }

    let mut output = RasterOutput {
        page_count,
        ..Default::default()
    };
    for (index, outcome) in outcomes.into_iter().enumerate() {
        match outcome {
            Ok(png) => output.pages.push(RenderedPage { index, dpi, png }),
            Err(detail) => {
                warn!("Skipping page {}: {}", index + 1, detail);
                output.skipped.push(PageError::RenderFailed {
                    page: index + 1,
                    detail,
                });
            }
        }
    }

    if output.pages.is_empty() {
        let details: Vec<&str> = output
            .skipped
            .iter()
            .map(|PageError::RenderFailed { detail, .. }| detail.as_str())
            .collect();
        let summary = format!("all {} page(s) failed; first: {}", page_count, details[0]);
        return Err(if details.iter().all(|d| is_font_failure(d)) {
            ExtractError::HostEnvironment { detail: summary }
        } else {
            ExtractError::RasterizationFailed { detail: summary }
        });
    }

    Ok(output)
}

fn is_font_failure(detail: &str) -> bool {
    let lower = detail.to_ascii_lowercase();
    lower.contains("font") || lower.contains("glyph")
}

/// pdfium-backed rasteriser.
#[derive(Debug, Clone)]
pub struct PdfiumRasterizer {
    dpi: u32,
    max_pixels: u32,
    library_path: Option<PathBuf>,
}

impl PdfiumRasterizer {
    pub fn new(dpi: u32, max_pixels: u32, library_path: Option<PathBuf>) -> Self {
        Self {
            dpi,
            max_pixels,
            library_path,
        }
    }

    pub fn from_config(config: &ExtractorConfig) -> Self {
        Self::new(
            config.dpi,
            config.max_rendered_pixels,
            config.pdfium_library_path.clone(),
        )
    }

    /// Bind the configured library, falling back to the system search path.
    fn bind(&self) -> Result<Pdfium, ExtractError> {
        let configured = self.library_path.as_ref().map(|p| {
            let path = if p.is_dir() {
                Pdfium::pdfium_platform_library_name_at_path(p)
            } else {
                p.clone()
            };
            debug!("Binding pdfium at {}", path.display());
            Pdfium::bind_to_library(&path)
        });

        let bindings = match configured {
            Some(Ok(bindings)) => Ok(bindings),
            Some(Err(e)) => {
                warn!("Configured pdfium library unusable ({:?}); trying system library", e);
                Pdfium::bind_to_system_library()
            }
            None => Pdfium::bind_to_system_library(),
        };

        bindings.map(Pdfium::new).map_err(|e| ExtractError::HostEnvironment {
            detail: format!("cannot load libpdfium: {:?}", e),
        })
    }
}

impl PageRasterizer for PdfiumRasterizer {
    fn render(&self, document: &[u8]) -> Result<RasterOutput, ExtractError> {
        let pdfium = self.bind()?;

        let doc = pdfium
            .load_pdf_from_byte_slice(document, None)
            .map_err(|e| {
                let detail = format!("{:?}", e);
                ExtractError::RasterizationFailed {
                    detail: if detail.to_ascii_lowercase().contains("password") {
                        "document is password-protected".into()
                    } else {
                        detail
                    },
                }
            })?;

        let pages = doc.pages();
        let total = pages.len() as usize;
        info!("PDF loaded: {} pages, rendering at {} DPI", total, self.dpi);

        let render_config = PdfRenderConfig::new()
            .scale_page_by_factor(self.dpi as f32 / 72.0)
            .set_maximum_width(self.max_pixels as i32)
            .set_maximum_height(self.max_pixels as i32);

        let mut outcomes: Vec<PageOutcome> = Vec::with_capacity(total);
        for idx in 0..total {
            let outcome = match pages.get(idx as u16) {
                Ok(page) => render_page(&page, &render_config, idx),
                Err(e) => Err(format!("{:?}", e)),
            };
            outcomes.push(outcome);
        }

        collect_pages(self.dpi, outcomes)
    }
}

fn render_page(page: &PdfPage, config: &PdfRenderConfig, idx: usize) -> PageOutcome {
    let bitmap = page
        .render_with_config(config)
        .map_err(|e| format!("{:?}", e))?;
    let image = bitmap.as_image();
    debug!(
        "Rendered page {} → {}x{} px",
        idx + 1,
        image.width(),
        image.height()
    );
    encode_png(&image).map_err(|e| format!("PNG encoding failed: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    struct Fixed(Vec<PageOutcome>);

    impl PageRasterizer for Fixed {
        fn render(&self, _document: &[u8]) -> Result<RasterOutput, ExtractError> {
            collect_pages(150, self.0.clone())
        }
    }

    #[test]
    fn pages_keep_document_order() {
        let out = collect_pages(
            150,
            vec![Ok(vec![0]), Ok(vec![1]), Ok(vec![2])],
        )
        .unwrap();
        let indices: Vec<usize> = out.pages.iter().map(|p| p.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert!(out.pages.iter().all(|p| p.dpi == 150));
        assert_eq!(out.page_count, 3);
        assert!(out.skipped.is_empty());
    }

    #[test]
    fn failing_page_is_skipped() {
        let out = collect_pages(
            150,
            vec![Ok(vec![0]), Err("bad content stream".into()), Ok(vec![2])],
        )
        .unwrap();
        let indices: Vec<usize> = out.pages.iter().map(|p| p.index).collect();
        assert_eq!(indices, vec![0, 2]);
        assert_eq!(out.skipped.len(), 1);
        assert!(matches!(
            &out.skipped[0],
            PageError::RenderFailed { page: 2, .. }
        ));
    }

    #[test]
    fn zero_pages_is_rasterization_failure() {
        let err = collect_pages(150, vec![]).unwrap_err();
        assert!(matches!(err, ExtractError::RasterizationFailed { .. }));
        assert_eq!(err.kind(), ErrorKind::DocumentContent);
    }

    #[test]
    fn all_pages_failing_is_rasterization_failure() {
        let err = collect_pages(150, vec![Err("x".into()), Err("y".into())]).unwrap_err();
        assert!(matches!(err, ExtractError::RasterizationFailed { .. }));
        assert!(err.to_string().contains("all 2 page(s) failed"));
    }

    #[test]
    fn font_failures_blame_the_host() {
        let err = collect_pages(
            150,
            vec![
                Err("FreeType: cannot load font".into()),
                Err("missing glyph table".into()),
            ],
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::HostEnvironment);
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn rasterize_runs_on_blocking_pool() {
        let rasterizer: Arc<dyn PageRasterizer> = Arc::new(Fixed(vec![Ok(vec![7])]));
        let out = rasterize(rasterizer, b"%PDF".to_vec()).await.unwrap();
        assert_eq!(out.pages[0].png, vec![7]);
        assert_eq!(out.pages[0].to_base64(), "Bw==");
    }

    #[test]
    fn from_config_carries_dpi_and_cap() {
        let config = ExtractorConfig::builder().dpi(200).build().unwrap();
        let r = PdfiumRasterizer::from_config(&config);
        assert_eq!(r.dpi, 200);
        assert_eq!(r.max_pixels, 2000);
        assert!(r.library_path.is_none());
    }
}
