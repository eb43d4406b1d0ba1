//! Brand logo lookup via Logo.dev.
//!
//! The service serves a PNG for any domain it knows. We probe with `HEAD`
//! and hand back the image URL itself; the caller stores or renders it.

use crate::config::ExtractorConfig;
use crate::transport::{HttpCall, HttpTransport, Method, TransportError};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Longest logo URL accepted by [`validate_logo_url`].
pub const MAX_LOGO_URL_LEN: usize = 255;

/// Client for the logo service.
#[derive(Clone)]
pub struct LogoClient {
    transport: Arc<dyn HttpTransport>,
    config: Arc<ExtractorConfig>,
}

impl LogoClient {
    pub fn new(transport: Arc<dyn HttpTransport>, config: Arc<ExtractorConfig>) -> Self {
        Self { transport, config }
    }

    pub fn is_ready(&self) -> bool {
        self.config.logo_api_token.is_some()
    }

    /// Logo image URL for `website_url`'s domain, if the service has one.
    pub async fn fetch(&self, website_url: &str) -> Option<String> {
        let token = self.config.logo_api_token.as_deref()?;
        let domain = extract_domain(website_url)?;
        info!("Looking up logo for {}", domain);

        let mut url = reqwest::Url::parse(&self.config.logo_api_url).ok()?;
        url.path_segments_mut().ok()?.pop_if_empty().push(&domain);
        url.query_pairs_mut()
            .append_pair("token", token)
            .append_pair("format", "png")
            .append_pair("size", &self.config.logo_size.to_string());
        let logo_url = url.to_string();

        let timeout = Duration::from_secs(self.config.logo_timeout_secs);
        let call = HttpCall::new(Method::Head, logo_url.clone(), timeout);
        let outcome = match tokio::time::timeout(timeout, self.transport.send(call)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(timeout)),
        };

        match outcome {
            Ok(reply) if reply.is_success() => {
                info!("Logo found for {}", domain);
                Some(logo_url)
            }
            Ok(reply) => {
                info!("No logo for {} (HTTP {})", domain, reply.status);
                None
            }
            Err(e) => {
                debug!("Logo probe for {} failed: {}", domain, e);
                None
            }
        }
    }
}

/// Host of `url` without a leading `www.`.
///
/// Falls back to string surgery for inputs without a scheme.
pub fn extract_domain(url: &str) -> Option<String> {
    let url = url.trim();
    let host = match reqwest::Url::parse(url) {
        Ok(parsed) if parsed.host_str().is_some() => parsed.host_str().map(str::to_string),
        _ => {
            let rest = url
                .strip_prefix("https://")
                .or_else(|| url.strip_prefix("http://"))
                .unwrap_or(url);
            rest.split(['/', '?', '#']).next().map(str::to_string)
        }
    }?;
    let host = host.to_ascii_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);
    if host.is_empty() {
        None
    } else {
        Some(host.to_string())
    }
}

/// A logo URL may be empty, but never a `data:` URL or overlong.
pub fn validate_logo_url(url: &str) -> Result<(), String> {
    if url.is_empty() {
        return Ok(());
    }
    if url.trim_start().to_ascii_lowercase().starts_with("data:") {
        return Err("Logo must be an image URL, not embedded image data".into());
    }
    if url.len() > MAX_LOGO_URL_LEN {
        return Err(format!(
            "Logo URL is too long ({} characters, maximum {MAX_LOGO_URL_LEN})",
            url.len()
        ));
    }
    Ok(())
}
