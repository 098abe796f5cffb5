//! The pluggable transport boundary and its default `reqwest` implementation.
//!
//! The engine only ever talks to a [`Transport`] (to build clients) and a
//! [`TransportClient`] (to execute built requests). Everything below that
//! abstraction (connection pooling, TLS, header parsing) is the transport's
//! business.

use crate::error::BoxError;
use crate::request::{HttpRequest, RequestBody};
use http::HeaderMap;
use std::fmt;
use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

/// Default connect, read and write timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Settings applied once per transport client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Timeout for establishing a connection.
    pub connect_timeout: Duration,
    /// Timeout for reading the response.
    pub read_timeout: Duration,
    /// Timeout for writing the request.
    pub write_timeout: Duration,
    /// Whether calls advertise `Accept-Encoding: gzip`.
    pub accept_gzip: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_TIMEOUT,
            read_timeout: DEFAULT_TIMEOUT,
            write_timeout: DEFAULT_TIMEOUT,
            accept_gzip: false,
        }
    }
}

/// Builds transport clients.
///
/// Implementations must not hand out partially initialized clients: either a
/// usable client is returned or an error is.
pub trait Transport: Send + Sync {
    /// Builds a new client for `config`.
    fn build(&self, config: &TransportConfig) -> Result<Arc<dyn TransportClient>, BoxError>;
}

/// Executes built requests.
pub trait TransportClient: Send + Sync {
    /// Sends `request` and returns the raw response.
    ///
    /// Returning a boxed [`crate::Error`] makes the engine propagate it unchanged.
    fn execute(&self, request: &HttpRequest) -> Result<RawResponse, BoxError>;
}

/// A response as handed back by a transport, before any decoding.
pub struct RawResponse {
    /// The numeric status code.
    pub status: u16,
    /// The reason phrase, when the transport knows it.
    pub reason: Option<String>,
    /// The response headers in arrival order.
    pub headers: HeaderMap,
    /// The undecoded body stream.
    pub body: Box<dyn Read + Send>,
}

impl RawResponse {
    /// Creates a raw response without a reason phrase.
    pub fn new(status: u16, headers: HeaderMap, body: Box<dyn Read + Send>) -> Self {
        Self {
            status,
            reason: None,
            headers,
            body,
        }
    }

    /// Sets the reason phrase.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// The reason phrase, falling back to the canonical one for the status.
    pub fn message(&self) -> String {
        self.reason
            .clone()
            .or_else(|| {
                http::StatusCode::from_u16(self.status)
                    .ok()
                    .and_then(|status| status.canonical_reason())
                    .map(str::to_owned)
            })
            .unwrap_or_default()
    }
}

impl fmt::Debug for RawResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawResponse")
            .field("status", &self.status)
            .field("reason", &self.reason)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// The default transport, backed by `reqwest::blocking`.
///
/// Automatic decompression is left off so that the content decoder sees the
/// `Content-Encoding` the server actually used. `reqwest` applies a single
/// per-request timeout, so the read and write timeouts are added up.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReqwestTransport;

impl Transport for ReqwestTransport {
    fn build(&self, config: &TransportConfig) -> Result<Arc<dyn TransportClient>, BoxError> {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.read_timeout.saturating_add(config.write_timeout))
            .build()?;

        Ok(Arc::new(ReqwestClient { client }))
    }
}

struct ReqwestClient {
    client: reqwest::blocking::Client,
}

impl TransportClient for ReqwestClient {
    fn execute(&self, request: &HttpRequest) -> Result<RawResponse, BoxError> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone());

        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Text(text) => builder.body(text.clone()),
            RequestBody::Form(fields) => builder.form(fields),
            RequestBody::Multipart {
                fields,
                attachments,
            } => {
                let mut form = reqwest::blocking::multipart::Form::new();
                for attachment in attachments {
                    let part = reqwest::blocking::multipart::Part::bytes(attachment.data.clone())
                        .file_name(attachment.file_name.clone())
                        .mime_str(&attachment.content_type)?;
                    form = form.part(attachment.field_name.clone(), part);
                }
                for (name, value) in fields {
                    form = form.text(name.clone(), value.clone());
                }
                builder.multipart(form)
            }
        };

        let response = builder.send()?;
        let status = response.status();
        let headers = response.headers().clone();

        let raw = RawResponse::new(status.as_u16(), headers, Box::new(response));
        Ok(match status.canonical_reason() {
            Some(reason) => raw.with_reason(reason),
            None => raw,
        })
    }
}
