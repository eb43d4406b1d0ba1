//! Shared fakes for the integration tests: a scripted HTTP transport and an
//! in-memory rasteriser, so the public pipeline runs without network or pdfium.

#![allow(dead_code)]

use async_trait::async_trait;
use formlift::{
    ExtractError, ExtractorConfig, HttpCall, HttpReply, HttpTransport, PageRasterizer,
    RasterOutput, RenderedPage, TransportError,
};
use image::{DynamicImage, Rgb, RgbImage};
use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Replays canned outcomes in order and records every call.
#[derive(Default)]
pub struct FakeTransport {
    replies: Mutex<VecDeque<Result<HttpReply, TransportError>>>,
    calls: Mutex<Vec<HttpCall>>,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reply(self: &Arc<Self>, status: u16, body: impl Into<Vec<u8>>) -> Arc<Self> {
        self.replies.lock().unwrap().push_back(Ok(HttpReply {
            status,
            body: body.into(),
        }));
        self.clone()
    }

    pub fn fail(self: &Arc<Self>, e: TransportError) -> Arc<Self> {
        self.replies.lock().unwrap().push_back(Err(e));
        self.clone()
    }

    /// A Claude-shaped success carrying `text`.
    pub fn claude_text(self: &Arc<Self>, text: &str) -> Arc<Self> {
        let body = serde_json::json!({ "content": [{ "type": "text", "text": text }] });
        self.reply(200, body.to_string())
    }

    pub fn calls(&self) -> Vec<HttpCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls that went to the model endpoint.
    pub fn model_calls(&self) -> Vec<HttpCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.headers.iter().any(|(k, _)| k == "x-api-key"))
            .collect()
    }
}

#[async_trait]
impl HttpTransport for FakeTransport {
    async fn send(&self, call: HttpCall) -> Result<HttpReply, TransportError> {
        self.calls.lock().unwrap().push(call);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Other("no canned reply".into())))
    }
}

/// Returns a fixed set of single-byte "pages".
pub struct FakeRasterizer {
    pages: usize,
    pub renders: AtomicUsize,
}

impl FakeRasterizer {
    pub fn with_pages(pages: usize) -> Arc<Self> {
        Arc::new(Self {
            pages,
            renders: AtomicUsize::new(0),
        })
    }

    pub fn render_count(&self) -> usize {
        self.renders.load(Ordering::SeqCst)
    }
}

impl PageRasterizer for FakeRasterizer {
    fn render(&self, _document: &[u8]) -> Result<RasterOutput, ExtractError> {
        self.renders.fetch_add(1, Ordering::SeqCst);
        if self.pages == 0 {
            return Err(ExtractError::RasterizationFailed {
                detail: "document contains no pages".into(),
            });
        }
        Ok(RasterOutput {
            pages: (0..self.pages)
                .map(|index| RenderedPage {
                    index,
                    dpi: 150,
                    png: vec![index as u8],
                })
                .collect(),
            skipped: Vec::new(),
            page_count: self.pages,
        })
    }
}

pub fn config() -> Arc<ExtractorConfig> {
    Arc::new(
        ExtractorConfig::builder()
            .anthropic_api_key("sk-ant-test")
            .capture_access_key("capture-test")
            .logo_api_token("logo-test")
            .build()
            .unwrap(),
    )
}

/// PNG bytes of `img`.
pub fn png(img: RgbImage) -> Vec<u8> {
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    buf
}

/// White canvas with `count` sampled pixels of `rgb`.
pub fn screenshot_with(rgb: [u8; 3], count: u32) -> Vec<u8> {
    let mut img = RgbImage::from_pixel(400, 400, Rgb([255, 255, 255]));
    for i in 0..count {
        // Every tenth pixel on both axes is sampled.
        let (x, y) = ((i % 40) * 10, (i / 40) * 10);
        img.put_pixel(x, y, Rgb(rgb));
    }
    png(img)
}

/// Route library logs to the test harness; `RUST_LOG=debug` to see them.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
