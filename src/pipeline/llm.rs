//! Model invocation: build a multimodal request and call the provider.
//!
//! This module turns an immutable [`ModelRequest`] into a provider-specific
//! wire envelope, sends it through the [`HttpTransport`] seam and returns a
//! [`ModelResponse`]. It is intentionally thin: prompts live in
//! [`crate::prompts`], JSON repair lives in [`crate::pipeline::sanitize`].
//!
//! ## Retry Strategy
//!
//! Only transport-level failures are retried: connection reset, refused,
//! DNS failure, timeout. A response that arrived, whatever its status, is
//! returned as-is. An overloaded 529 is not retried either; the caller
//! surfaces it and the user decides. With the defaults the worst case for a
//! schema call is `300 s + 2 s + 300 s`.

use crate::config::{ExtractorConfig, ANTHROPIC_VERSION};
use crate::error::ExtractError;
use crate::transport::{HttpCall, HttpReply, HttpTransport, Method, TransportError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

// ── Provider ─────────────────────────────────────────────────────────────

/// The closed set of model backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Anthropic Messages API.
    #[default]
    Claude,
    /// Google Gemini `generateContent`.
    Google,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Claude => "claude",
            Provider::Google => "google",
        }
    }

    /// Human-facing name, used in notes and error messages.
    pub fn display_name(&self) -> &'static str {
        match self {
            Provider::Claude => "Claude",
            Provider::Google => "Gemini",
        }
    }

    fn key_hint(&self) -> &'static str {
        match self {
            Provider::Claude => "Set ANTHROPIC_API_KEY.",
            Provider::Google => "Set GEMINI_API_KEY (or GOOGLE_API_KEY).",
        }
    }

    fn endpoint(&self, config: &ExtractorConfig, model: &str) -> String {
        match self {
            Provider::Claude => config.anthropic_api_url.clone(),
            Provider::Google => format!(
                "{}/{}:generateContent",
                config.gemini_api_url.trim_end_matches('/'),
                model
            ),
        }
    }

    /// Serialise a fresh wire envelope for one attempt.
    fn envelope(&self, request: &ModelRequest) -> Value {
        match self {
            Provider::Claude => json!({
                "model": request.model,
                "max_tokens": request.max_tokens,
                "messages": [{ "role": "user", "content": request.blocks }],
            }),
            Provider::Google => {
                let parts: Vec<Value> = request.blocks.iter().map(gemini_part).collect();
                json!({
                    "contents": [{ "role": "user", "parts": parts }],
                    "generationConfig": { "maxOutputTokens": request.max_tokens },
                })
            }
        }
    }

    fn authorize(&self, call: HttpCall, key: &str) -> HttpCall {
        match self {
            Provider::Claude => call
                .header("x-api-key", key)
                .header("anthropic-version", ANTHROPIC_VERSION),
            Provider::Google => call.header("x-goog-api-key", key),
        }
    }

    /// Where the answer text lives in a successful response body.
    fn answer_text(&self, body: &Value) -> Option<String> {
        let text = match self {
            Provider::Claude => body.pointer("/content/0/text"),
            Provider::Google => body.pointer("/candidates/0/content/parts/0/text"),
        };
        text.and_then(Value::as_str).map(str::to_string)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = ExtractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "claude" | "anthropic" => Ok(Provider::Claude),
            "google" | "gemini" => Ok(Provider::Google),
            other => Err(ExtractError::InputInvalid(format!(
                "unknown provider '{other}' (expected 'claude' or 'google')"
            ))),
        }
    }
}

// ── Request ──────────────────────────────────────────────────────────────

/// Encoding tag of a block source. Only base64 is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceEncoding {
    Base64,
}

/// Inline binary payload of an image or document block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSource {
    #[serde(rename = "type")]
    pub encoding: SourceEncoding,
    pub media_type: String,
    pub data: String,
}

/// One content block of a request. Serialises to the Anthropic block shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
    Text { text: String },
    Image { source: BlockSource },
    Document { source: BlockSource },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text { text: text.into() }
    }

    /// A PNG image from base64 data.
    pub fn png(data: String) -> Self {
        ContentBlock::Image {
            source: BlockSource {
                encoding: SourceEncoding::Base64,
                media_type: "image/png".to_string(),
                data,
            },
        }
    }

    pub fn document(media_type: impl Into<String>, data: String) -> Self {
        ContentBlock::Document {
            source: BlockSource {
                encoding: SourceEncoding::Base64,
                media_type: media_type.into(),
                data,
            },
        }
    }

    /// Base64 payload size, zero for text.
    pub fn payload_len(&self) -> usize {
        match self {
            ContentBlock::Text { .. } => 0,
            ContentBlock::Image { source } | ContentBlock::Document { source } => {
                source.data.len()
            }
        }
    }
}

fn gemini_part(block: &ContentBlock) -> Value {
    match block {
        ContentBlock::Text { text } => json!({ "text": text }),
        ContentBlock::Image { source } | ContentBlock::Document { source } => json!({
            "inline_data": { "mime_type": source.media_type, "data": source.data }
        }),
    }
}

/// A multimodal request. Built once; never mutated by retries.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub model: String,
    pub max_tokens: u32,
    pub timeout: Duration,
    pub blocks: Vec<ContentBlock>,
}

impl ModelRequest {
    pub fn new(model: impl Into<String>, max_tokens: u32, timeout: Duration) -> Self {
        Self {
            model: model.into(),
            max_tokens,
            timeout,
            blocks: Vec::new(),
        }
    }

    pub fn block(mut self, block: ContentBlock) -> Self {
        self.blocks.push(block);
        self
    }

    pub fn blocks(mut self, blocks: impl IntoIterator<Item = ContentBlock>) -> Self {
        self.blocks.extend(blocks);
        self
    }

    /// Sum of base64 payload sizes across all blocks.
    pub fn payload_bytes(&self) -> usize {
        self.blocks.iter().map(ContentBlock::payload_len).sum()
    }

    pub fn image_count(&self) -> usize {
        self.blocks
            .iter()
            .filter(|b| matches!(b, ContentBlock::Image { .. }))
            .count()
    }
}

// ── Response ─────────────────────────────────────────────────────────────

/// Why an invocation did not produce an answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    /// No response after every attempt.
    TransientNetwork { detail: String, reset: bool },
    /// A response arrived but carried no usable answer.
    NonRetryable { message: String },
}

/// Outcome of one logical model call.
#[derive(Debug, Clone)]
pub struct ModelResponse {
    /// HTTP status of the final attempt; `None` when nothing was received.
    pub status: Option<u16>,
    /// Raw body of the final attempt.
    pub body: String,
    /// Answer text from the provider's top-level output.
    pub text: Option<String>,
    pub success: bool,
    pub failure: Option<FailureKind>,
    pub attempts: u32,
}

impl ModelResponse {
    /// The answer text, or the failure reclassified into [`ExtractError`].
    pub fn into_text(self) -> Result<String, ExtractError> {
        match (self.text, self.failure) {
            (Some(text), None) => Ok(text),
            (_, Some(FailureKind::TransientNetwork { detail, reset })) => {
                Err(ExtractError::TransientNetwork {
                    attempts: self.attempts,
                    detail,
                    reset,
                })
            }
            (_, Some(FailureKind::NonRetryable { message })) => {
                Err(ExtractError::UpstreamRejected {
                    status: self.status,
                    message,
                })
            }
            (None, None) => Err(ExtractError::UpstreamRejected {
                status: self.status,
                message: "response contained no text".into(),
            }),
        }
    }

    fn from_reply(provider: Provider, reply: HttpReply, attempts: u32) -> Self {
        let body = reply.text();
        let parsed: Option<Value> = serde_json::from_str(&body).ok();

        if !reply.is_success() {
            let message = parsed
                .as_ref()
                .and_then(|v| v.pointer("/error/message"))
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| truncate(&body, 300));
            return Self {
                status: Some(reply.status),
                body,
                text: None,
                success: false,
                failure: Some(FailureKind::NonRetryable { message }),
                attempts,
            };
        }

        match parsed.as_ref().and_then(|v| provider.answer_text(v)) {
            Some(text) => Self {
                status: Some(reply.status),
                body,
                text: Some(text),
                success: true,
                failure: None,
                attempts,
            },
            None => Self {
                status: Some(reply.status),
                text: None,
                success: false,
                failure: Some(FailureKind::NonRetryable {
                    message: format!(
                        "{} response had no text content: {}",
                        provider.display_name(),
                        truncate(&body, 200)
                    ),
                }),
                body,
                attempts,
            },
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max).collect();
        format!("{head}…")
    }
}

// ── Invoker ──────────────────────────────────────────────────────────────

/// Sends [`ModelRequest`]s with bounded retry.
#[derive(Clone)]
pub struct ModelInvoker {
    transport: Arc<dyn HttpTransport>,
    config: Arc<ExtractorConfig>,
}

impl ModelInvoker {
    pub fn new(transport: Arc<dyn HttpTransport>, config: Arc<ExtractorConfig>) -> Self {
        Self { transport, config }
    }

    /// The credential for `provider`, or [`ExtractError::ProviderNotConfigured`].
    ///
    /// Orchestrators call this before doing expensive work such as rendering.
    pub fn api_key(&self, provider: Provider) -> Result<&str, ExtractError> {
        match provider {
            Provider::Claude => self.config.anthropic_api_key.as_deref(),
            Provider::Google => self.config.gemini_api_key.as_deref(),
        }
        .ok_or_else(|| ExtractError::ProviderNotConfigured {
            provider: provider.display_name().to_string(),
            hint: provider.key_hint().to_string(),
        })
    }

    /// Invoke `provider` with `request`.
    ///
    /// `Err` only for conditions that make sending impossible (no API key,
    /// unserialisable envelope). Everything observed on the wire comes back
    /// as a [`ModelResponse`].
    pub async fn invoke(
        &self,
        provider: Provider,
        request: &ModelRequest,
    ) -> Result<ModelResponse, ExtractError> {
        let key = self.api_key(provider)?;

        let payload = request.payload_bytes();
        let payload_mb = payload as f64 / (1024.0 * 1024.0);
        info!(
            "{} request: {} block(s), {} image(s), payload {:.2} MB",
            provider.display_name(),
            request.blocks.len(),
            request.image_count(),
            payload_mb
        );
        if payload > self.config.payload_warn_bytes {
            warn!(
                "Large payload ({:.2} MB) - may cause connection resets or timeouts",
                payload_mb
            );
        }

        let url = provider.endpoint(&self.config, &request.model);
        let max_attempts = self.config.max_attempts.max(1);
        let delay = Duration::from_millis(self.config.retry_delay_ms);
        let start = Instant::now();
        let mut last_err: Option<TransportError> = None;

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                sleep(delay).await;
            }
            info!(
                "Calling {} (attempt {}/{})",
                provider.display_name(),
                attempt,
                max_attempts
            );

            let body = serde_json::to_vec(&provider.envelope(request))
                .map_err(|e| ExtractError::Internal(format!("request serialisation: {e}")))?;
            let call = provider.authorize(
                HttpCall::new(Method::Post, url.clone(), request.timeout).json_body(body),
                key,
            );

            let outcome = match tokio::time::timeout(request.timeout, self.transport.send(call)).await
            {
                Ok(result) => result,
                Err(_) => Err(TransportError::Timeout(request.timeout)),
            };

            match outcome {
                Ok(reply) => {
                    debug!(
                        "{} answered HTTP {} in {:?}",
                        provider.display_name(),
                        reply.status,
                        start.elapsed()
                    );
                    if !reply.is_success() {
                        warn!(
                            "{} returned HTTP {} (not retried)",
                            provider.display_name(),
                            reply.status
                        );
                    }
                    return Ok(ModelResponse::from_reply(provider, reply, attempt));
                }
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    warn!(
                        "Connection error on attempt {}, retrying in {}ms: {}",
                        attempt,
                        delay.as_millis(),
                        e
                    );
                    last_err = Some(e);
                }
                Err(e) => {
                    if e.is_transient() {
                        error!("All {} attempts failed: {}", attempt, e);
                    } else {
                        error!("Non-retryable transport error: {}", e);
                    }
                    return Ok(Self::transport_failure(e, attempt));
                }
            }
        }

        // The final attempt always returns from inside the loop.
        let e = last_err.unwrap_or_else(|| TransportError::Other("no attempt made".into()));
        Ok(Self::transport_failure(e, max_attempts))
    }

    fn transport_failure(e: TransportError, attempts: u32) -> ModelResponse {
        let reset = matches!(e, TransportError::ConnectionReset(_));
        ModelResponse {
            status: None,
            body: String::new(),
            text: None,
            success: false,
            failure: Some(FailureKind::TransientNetwork {
                detail: e.to_string(),
                reset,
            }),
            attempts,
        }
    }
}
