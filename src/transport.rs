//! Outbound HTTP: the single seam through which the pipeline talks to the
//! model endpoint, the capture service and the logo service.
//!
//! Components never hold a `reqwest::Client` directly; they hold an
//! `Arc<dyn HttpTransport>`. The production implementation is
//! [`ReqwestTransport`]. Tests substitute scripted transports to exercise
//! retry, timeout and fallback behaviour without a network.
//!
//! A transport returns `Ok(HttpReply)` for *every* HTTP response it receives,
//! whatever the status, and `Err(TransportError)` only when no response was
//! received. That split is what the retry policy in
//! [`crate::pipeline::llm`] keys on.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// HTTP method of an outbound call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Head,
}

/// A fully described outbound call.
#[derive(Debug, Clone)]
pub struct HttpCall {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
    pub timeout: Duration,
}

impl HttpCall {
    pub fn new(method: Method, url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            query: Vec::new(),
            body: None,
            timeout,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn json_body(mut self, body: Vec<u8>) -> Self {
        self.headers
            .push(("content-type".to_string(), "application/json".to_string()));
        self.body = Some(body);
        self
    }

    /// Look up a query parameter by name.
    pub fn query_value(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// A received HTTP response, successful or not.
#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body decoded as UTF-8, lossily.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// No response was received.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The peer reset the connection mid-exchange.
    #[error("connection reset: {0}")]
    ConnectionReset(String),

    /// Connection could not be established (refused, DNS, TLS handshake).
    #[error("connection failed: {0}")]
    Connect(String),

    /// No response within the call's timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The request could not be built or sent for a non-network reason.
    #[error("request error: {0}")]
    Other(String),
}

impl TransportError {
    /// Transport-level failures worth another attempt.
    pub fn is_transient(&self) -> bool {
        !matches!(self, TransportError::Other(_))
    }
}

/// Sends [`HttpCall`]s.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, call: HttpCall) -> Result<HttpReply, TransportError>;
}

/// Production transport over a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, crate::error::ExtractError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("formlift/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| crate::error::ExtractError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, call: HttpCall) -> Result<HttpReply, TransportError> {
        let mut req = match call.method {
            Method::Get => self.client.get(&call.url),
            Method::Post => self.client.post(&call.url),
            Method::Head => self.client.head(&call.url),
        }
        .timeout(call.timeout);

        if !call.query.is_empty() {
            req = req.query(&call.query);
        }
        for (name, value) in &call.headers {
            req = req.header(name.as_str(), value.as_str());
        }
        if let Some(body) = call.body {
            req = req.body(body);
        }

        let response = req
            .send()
            .await
            .map_err(|e| classify(e, call.timeout))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| classify(e, call.timeout))?;

        debug!("{:?} {} → HTTP {} ({} bytes)", call.method, call.url, status, body.len());
        Ok(HttpReply {
            status,
            body: body.to_vec(),
        })
    }
}

/// Map a `reqwest` error onto the transport taxonomy.
fn classify(e: reqwest::Error, timeout: Duration) -> TransportError {
    if e.is_timeout() {
        return TransportError::Timeout(timeout);
    }
    if is_connection_reset(&e) {
        return TransportError::ConnectionReset(e.to_string());
    }
    if e.is_connect() {
        return TransportError::Connect(e.to_string());
    }
    if e.is_request() || e.is_body() || e.is_decode() {
        // Failures mid-exchange without an io source are still network-level.
        return TransportError::Connect(e.to_string());
    }
    TransportError::Other(e.to_string())
}

fn is_connection_reset(e: &reqwest::Error) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> = std::error::Error::source(e);
    while let Some(err) = source {
        if let Some(io) = err.downcast_ref::<std::io::Error>() {
            if matches!(
                io.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
            ) {
                return true;
            }
        }
        source = err.source();
    }
    false
}
