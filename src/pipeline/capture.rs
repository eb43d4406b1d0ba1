//! Website screenshots via an external capture API (ScreenshotOne).
//!
//! Capture failure is an expected outcome, not an error: plenty of sites
//! sit behind bot protection. Every failure is returned as a
//! [`CaptureResult::Unavailable`] value whose [`CaptureFailure`] tells the
//! color orchestrator whether the target site is hostile to automation or
//! the capture service itself had a problem.

use crate::config::ExtractorConfig;
use crate::transport::{HttpCall, HttpTransport, Method, TransportError};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Why no screenshot was produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureFailure {
    /// No access key is configured.
    NotConfigured,
    /// The capture service could not be reached in time.
    Network { detail: String },
    /// The capture service answered with an error of its own.
    ApiError { status: u16, detail: String },
    /// The target site refused or broke the automated visit.
    SiteBlocked { status: Option<u16> },
}

impl CaptureFailure {
    /// The failure points at the target site rather than the service.
    pub fn is_blocked(&self) -> bool {
        matches!(self, CaptureFailure::SiteBlocked { .. })
    }
}

impl fmt::Display for CaptureFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureFailure::NotConfigured => f.write_str("screenshot service is not configured"),
            CaptureFailure::Network { detail } => write!(f, "screenshot service unreachable: {detail}"),
            CaptureFailure::ApiError { status, detail } => {
                write!(f, "screenshot service error (HTTP {status}): {detail}")
            }
            CaptureFailure::SiteBlocked { status: Some(s) } => {
                write!(f, "target site blocked the capture (HTTP {s})")
            }
            CaptureFailure::SiteBlocked { status: None } => {
                f.write_str("target site returned an empty capture")
            }
        }
    }
}

/// Screenshot bytes or an unavailability marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureResult {
    Captured(Vec<u8>),
    Unavailable(CaptureFailure),
}

impl CaptureResult {
    pub fn image(&self) -> Option<&[u8]> {
        match self {
            CaptureResult::Captured(bytes) => Some(bytes),
            CaptureResult::Unavailable(_) => None,
        }
    }
}

/// Client for the capture API.
#[derive(Clone)]
pub struct CaptureClient {
    transport: Arc<dyn HttpTransport>,
    config: Arc<ExtractorConfig>,
}

impl CaptureClient {
    pub fn new(transport: Arc<dyn HttpTransport>, config: Arc<ExtractorConfig>) -> Self {
        Self { transport, config }
    }

    /// Whether an access key is configured.
    pub fn is_ready(&self) -> bool {
        self.config.capture_access_key.is_some()
    }

    /// Capture the above-the-fold viewport of `url` as PNG.
    pub async fn capture(&self, url: &str) -> CaptureResult {
        let Some(key) = self.config.capture_access_key.as_deref() else {
            return CaptureResult::Unavailable(CaptureFailure::NotConfigured);
        };
        info!("Capturing screenshot of: {}", url);

        let c = &self.config;
        let timeout = Duration::from_secs(c.capture_timeout_secs);
        let call = HttpCall::new(Method::Get, c.capture_api_url.clone(), timeout)
            .query("access_key", key)
            .query("url", url)
            .query("viewport_width", c.viewport_width.to_string())
            .query("viewport_height", c.viewport_height.to_string())
            .query("format", "png")
            .query("full_page", "false")
            .query("delay", c.capture_delay_secs.to_string())
            .query("block_ads", c.block_ads.to_string())
            .query("block_cookie_banners", c.block_cookie_banners.to_string());

        let outcome = match tokio::time::timeout(timeout, self.transport.send(call)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(timeout)),
        };

        let reply = match outcome {
            Ok(reply) => reply,
            Err(e) => {
                warn!("Screenshot capture failed for {}: {}", url, e);
                return CaptureResult::Unavailable(CaptureFailure::Network {
                    detail: e.to_string(),
                });
            }
        };

        if !reply.is_success() {
            let body = reply.text();
            warn!("Screenshot capture failed for {} - HTTP {}", url, reply.status);
            debug!("Capture error body: {}", body);
            let failure = if reply.status == 403 || names_target_failure(&body) {
                CaptureFailure::SiteBlocked {
                    status: Some(reply.status),
                }
            } else {
                CaptureFailure::ApiError {
                    status: reply.status,
                    detail: body.chars().take(200).collect(),
                }
            };
            return CaptureResult::Unavailable(failure);
        }

        if reply.body.is_empty() {
            warn!("Screenshot API returned an empty response for {}", url);
            return CaptureResult::Unavailable(CaptureFailure::SiteBlocked { status: None });
        }

        info!("Screenshot captured, {} bytes", reply.body.len());
        CaptureResult::Captured(reply.body)
    }
}

/// The service's error body blames the target host.
fn names_target_failure(body: &str) -> bool {
    let lower = body.to_ascii_lowercase();
    lower.contains("host_returned_error") || lower.contains("blocked")
}
