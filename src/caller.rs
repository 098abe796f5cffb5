//! The request execution engine.
//!
//! The [`Caller`] type is the main entry point for running calls.
//! Use [`CallerBuilder`] to configure and create callers.

use crate::connectivity::{AlwaysConnected, Connectivity};
use crate::decode::{ContentDecoder, ResponseBody};
use crate::lifecycle::{ClientLifecycle, ReusePolicy};
use crate::request::{CallSpec, HttpRequest, Verb};
use crate::retry::{NeverRetry, RetryContext, RetryPolicy, RetryStrategy};
use crate::transport::{RawResponse, ReqwestTransport, Transport, TransportClient, TransportConfig};
use crate::{CallResponse, Error, Result};
use http::header::ACCEPT_ENCODING;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use serde::de::DeserializeOwned;
use std::io::{Cursor, Read};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use url::Url;

/// Hard ceiling on the number of attempts of a single call.
pub const DEFAULT_MAX_ATTEMPTS: usize = 10;

/// Upper bound on the error body kept by [`Error::Status`].
pub const ERROR_BODY_LIMIT: usize = 64 * 1024;

/// Mutates the built request right before every send.
///
/// Typical uses are authentication or tracing headers. The hook runs on the
/// first send and again before every retry, on the same request object.
/// Closures `Fn(&mut HttpRequest, usize) -> Result<()>` are interceptors too.
pub trait RequestInterceptor: Send + Sync {
    /// Called with the request about to be sent and the attempt number,
    /// starting from 1. An error aborts the call without sending.
    fn before_send(&self, request: &mut HttpRequest, attempt: usize) -> Result<()>;
}

impl<F> RequestInterceptor for F
where
    F: Fn(&mut HttpRequest, usize) -> Result<()> + Send + Sync,
{
    fn before_send(&self, request: &mut HttpRequest, attempt: usize) -> Result<()> {
        self(request, attempt)
    }
}

/// The default interceptor, which leaves requests untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopInterceptor;

impl RequestInterceptor for NoopInterceptor {
    fn before_send(&self, _request: &mut HttpRequest, _attempt: usize) -> Result<()> {
        Ok(())
    }
}

/// Runs calls described by [`CallSpec`]s.
///
/// A caller is cheap to clone and safe to share between threads. Every call
/// blocks the calling thread until it succeeds or fails; retries run on that
/// same thread.
///
/// # Examples
///
/// ```no_run
/// use webcaller::{Caller, CallSpec, RetryStrategy, retry::RetryOn5xx};
/// use std::time::Duration;
///
/// # fn example() -> Result<(), webcaller::Error> {
/// let caller = Caller::builder()
///     .base_url("https://api.example.com")?
///     .read_timeout(Duration::from_secs(30))
///     .retry_policy(Box::new(RetryOn5xx))
///     .retry_strategy(RetryStrategy::ExponentialBackoff {
///         initial_delay: Duration::from_millis(100),
///         max_delay: Duration::from_secs(10),
///         max_retries: 3,
///         jitter: true,
///     })
///     .build()?;
///
/// // GET request
/// let response = caller.get("/users/123")?;
/// println!("Status: {}", response.status);
///
/// // POST request with form parameters
/// let spec = CallSpec::post("/users")
///     .with_form_param("name", "Alice")
///     .with_form_param("email", "alice@example.com");
/// let created = caller.run(&spec)?;
/// println!("Created: {}", created.text()?);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Caller {
    inner: Arc<CallerInner>,
}

struct CallerInner {
    lifecycle: ClientLifecycle,
    base_url: Option<Url>,
    default_headers: HeaderMap,
    retry_strategy: RetryStrategy,
    retry_policy: Box<dyn RetryPolicy>,
    max_attempts: usize,
    interceptor: Box<dyn RequestInterceptor>,
    connectivity: Arc<dyn Connectivity>,
    decoder: ContentDecoder,
}

impl Caller {
    /// Creates a new `CallerBuilder` for configuring a caller.
    pub fn builder() -> CallerBuilder {
        CallerBuilder::new()
    }

    /// Runs a call.
    ///
    /// The request is built once; retries resend it unchanged, after the
    /// interceptor had its turn.
    ///
    /// # Errors
    ///
    /// - [`Error::NoConnectivity`] if the probe reports no network, before
    ///   anything is sent.
    /// - [`Error::Transport`] if the client cannot be built or the send fails.
    /// - [`Error::Status`] for a non-2xx status the retry policy did not retry.
    /// - [`Error::Decode`] if the body cannot be decoded.
    /// - [`Error::Configuration`] or [`Error::InvalidUrl`] for invalid calls.
    pub fn run(&self, spec: &CallSpec) -> Result<CallResponse> {
        let inner = &*self.inner;

        if !inner.connectivity.is_connected() {
            tracing::warn!(
                verb = %spec.verb(),
                uri = spec.uri(),
                "No network connectivity, call not sent"
            );
            return Err(Error::NoConnectivity);
        }

        let url = self.resolve(spec.uri())?;
        let mut request = HttpRequest::build(spec, url, &inner.default_headers)?;
        let client = inner.lifecycle.acquire()?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            inner.interceptor.before_send(&mut request, attempt)?;

            let error = match self.send(client.as_ref(), spec, &request, attempt) {
                Ok(response) => return Ok(response),
                Err(e) => e,
            };

            if !error.reaches_retry_hook() {
                return Err(error);
            }

            tracing::warn!(
                error = %error,
                attempt = attempt,
                method = %request.method,
                url = %request.url,
                "Request failed"
            );

            let context = RetryContext {
                uri: spec.uri(),
                verb: spec.verb(),
                request: &request,
                error: &error,
                attempt,
            };
            if !inner.retry_policy.should_retry(&context) {
                return Err(error);
            }

            let delay = if attempt < inner.max_attempts {
                inner.retry_strategy.delay_for_attempt(attempt)
            } else {
                None
            };

            match delay {
                Some(delay) => {
                    tracing::info!(
                        delay_ms = delay.as_millis() as u64,
                        attempt = attempt,
                        "Retrying request after delay"
                    );
                    if !delay.is_zero() {
                        thread::sleep(delay);
                    }
                }
                None => {
                    tracing::warn!(
                        attempts = attempt,
                        url = %request.url,
                        "Retry budget exhausted"
                    );
                    return Err(error);
                }
            }
        }
    }

    /// Executes a single attempt.
    fn send(
        &self,
        client: &dyn TransportClient,
        spec: &CallSpec,
        request: &HttpRequest,
        attempt: usize,
    ) -> Result<CallResponse> {
        tracing::debug!(
            method = %request.method,
            url = %request.url,
            attempt = attempt,
            "Executing HTTP request"
        );
        if let Some(limit) = self.inner.decoder.capture_limit() {
            if tracing::enabled!(tracing::Level::DEBUG) {
                tracing::debug!(curl = %request.to_curl(limit), "Equivalent curl command");
            }
        }

        let started = Instant::now();
        let raw = client
            .execute(request)
            .map_err(|e| Error::from_transport("request failed", e))?;
        let latency = started.elapsed();

        tracing::info!(
            status = raw.status,
            latency_ms = latency.as_millis() as u64,
            attempt = attempt,
            "Received HTTP response"
        );

        let status = match StatusCode::from_u16(raw.status) {
            Ok(status) if status.as_u16() <= 599 => status,
            _ => {
                return Err(Error::transport(
                    format!("invalid status code {}", raw.status),
                    None,
                ))
            }
        };

        if !status.is_success() {
            return Err(Self::status_error(spec, status, raw));
        }

        let RawResponse { headers, body, .. } = raw;
        let content = match spec.verb() {
            Verb::Head => Vec::new(),
            _ => read_raw_body(body)?,
        };

        let body = match self.inner.decoder.decode(
            spec.uri(),
            spec.verb(),
            &headers,
            Box::new(Cursor::new(content)),
        ) {
            Some(decoded) => Some(ResponseBody::new(Box::new(Cursor::new(decoded.bytes()?)))),
            None => None,
        };

        Ok(CallResponse::new(status, headers, body, latency, attempt))
    }

    /// Releases a non-2xx response and describes it as an [`Error::Status`].
    ///
    /// At most [`ERROR_BODY_LIMIT`] decoded bytes of the body are kept.
    fn status_error(spec: &CallSpec, status: StatusCode, raw: RawResponse) -> Error {
        let message = raw.message();
        let RawResponse { headers, body, .. } = raw;
        let body = read_error_body(spec, &headers, body);

        if status.is_client_error() {
            tracing::error!(status = status.as_u16(), message = %message, "Client error (4xx)");
        } else if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), message = %message, "Server error (5xx)");
        } else {
            tracing::warn!(status = status.as_u16(), message = %message, "Unexpected status");
        }

        Error::Status {
            status,
            message,
            headers,
            body,
        }
    }

    fn resolve(&self, uri: &str) -> Result<Url> {
        match &self.inner.base_url {
            Some(base) => Ok(base.join(uri)?),
            None => Ok(Url::parse(uri)?),
        }
    }

    /// Runs a GET call.
    pub fn get(&self, uri: impl Into<String>) -> Result<CallResponse> {
        self.run(&CallSpec::get(uri))
    }

    /// Runs a HEAD call. The response has no body.
    pub fn head(&self, uri: impl Into<String>) -> Result<CallResponse> {
        self.run(&CallSpec::head(uri))
    }

    /// Runs a DELETE call.
    pub fn delete(&self, uri: impl Into<String>) -> Result<CallResponse> {
        self.run(&CallSpec::delete(uri))
    }

    /// Runs a POST call with a raw body.
    pub fn post(&self, uri: impl Into<String>, body: impl Into<String>) -> Result<CallResponse> {
        self.run(&CallSpec::post(uri).with_body(body))
    }

    /// Runs a PUT call with a raw body.
    pub fn put(&self, uri: impl Into<String>, body: impl Into<String>) -> Result<CallResponse> {
        self.run(&CallSpec::put(uri).with_body(body))
    }

    /// Runs a GET call and parses the body as JSON.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use webcaller::Caller;
    /// use serde::Deserialize;
    ///
    /// #[derive(Deserialize)]
    /// struct User { name: String }
    ///
    /// # fn example() -> Result<(), webcaller::Error> {
    /// let caller = Caller::builder()
    ///     .base_url("https://api.example.com")?
    ///     .build()?;
    ///
    /// let user: User = caller.get_json("/users/123")?;
    /// println!("User: {}", user.name);
    /// # Ok(())
    /// # }
    /// ```
    pub fn get_json<T: DeserializeOwned>(&self, uri: impl Into<String>) -> Result<T> {
        self.get(uri)?.json()
    }

    /// Drops the reused transport client; the next call builds a new one.
    pub fn invalidate_client(&self) {
        self.inner.lifecycle.invalidate();
    }

    /// The lifecycle owning this caller's transport client.
    pub fn lifecycle(&self) -> &ClientLifecycle {
        &self.inner.lifecycle
    }
}

fn read_raw_body(mut body: Box<dyn Read + Send>) -> Result<Vec<u8>> {
    let mut content = Vec::new();
    body.read_to_end(&mut content)
        .map_err(|e| Error::transport("cannot read the response body", Some(Box::new(e))))?;
    Ok(content)
}

fn read_error_body(spec: &CallSpec, headers: &HeaderMap, body: Box<dyn Read + Send>) -> Option<Vec<u8>> {
    let decoded = ContentDecoder::new().decode(spec.uri(), spec.verb(), headers, body)?;
    let mut content = Vec::new();
    match decoded.take(ERROR_BODY_LIMIT as u64).read_to_end(&mut content) {
        Ok(0) => None,
        Ok(_) => Some(content),
        Err(e) => {
            tracing::debug!(error = %e, "Cannot read the error response body");
            None
        }
    }
}

/// Builder for configuring and creating a [`Caller`].
///
/// # Examples
///
/// ```no_run
/// use webcaller::{CallerBuilder, ReusePolicy};
/// use std::time::Duration;
///
/// # fn example() -> Result<(), webcaller::Error> {
/// let caller = CallerBuilder::new()
///     .base_url("https://api.example.com")?
///     .reuse_policy(ReusePolicy::Reused)
///     .connect_timeout(Duration::from_secs(5))
///     .accept_gzip(true)
///     .default_header("User-Agent", "my-app/1.0")?
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct CallerBuilder {
    transport: Arc<dyn Transport>,
    reuse_policy: ReusePolicy,
    config: TransportConfig,
    base_url: Option<Url>,
    default_headers: HeaderMap,
    retry_strategy: RetryStrategy,
    retry_policy: Option<Box<dyn RetryPolicy>>,
    max_attempts: usize,
    interceptor: Option<Box<dyn RequestInterceptor>>,
    connectivity: Arc<dyn Connectivity>,
    capture_limit: Option<usize>,
}

impl CallerBuilder {
    /// Creates a new `CallerBuilder` with default settings.
    pub fn new() -> Self {
        Self {
            transport: Arc::new(ReqwestTransport),
            reuse_policy: ReusePolicy::default(),
            config: TransportConfig::default(),
            base_url: None,
            default_headers: HeaderMap::new(),
            retry_strategy: RetryStrategy::default(),
            retry_policy: None,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            interceptor: None,
            connectivity: Arc::new(AlwaysConnected),
            capture_limit: None,
        }
    }

    /// Sets the transport used to build clients. Defaults to [`ReqwestTransport`].
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Arc::new(transport);
        self
    }

    /// Sets whether the transport client is rebuilt per call or reused.
    pub fn reuse_policy(mut self, policy: ReusePolicy) -> Self {
        self.reuse_policy = policy;
        self
    }

    /// Sets the base URL relative URIs are resolved against.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn base_url(mut self, url: impl AsRef<str>) -> Result<Self> {
        self.base_url = Some(Url::parse(url.as_ref())?);
        Ok(self)
    }

    /// Adds a default header that will be included in all requests.
    ///
    /// Default headers are applied before the call's own headers.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn default_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self> {
        let name = HeaderName::try_from(name.as_ref())
            .map_err(|e| Error::Configuration(format!("Invalid header name: {}", e)))?;
        let value = HeaderValue::try_from(value.as_ref())
            .map_err(|e| Error::Configuration(format!("Invalid header value: {}", e)))?;
        self.default_headers.append(name, value);
        Ok(self)
    }

    /// Sets the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Sets the read timeout.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    /// Sets the write timeout.
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.config.write_timeout = timeout;
        self
    }

    /// Advertises `Accept-Encoding: gzip` on every call.
    pub fn accept_gzip(mut self, enabled: bool) -> Self {
        self.config.accept_gzip = enabled;
        self
    }

    /// Sets the delay between retries and the retry cap.
    pub fn retry_strategy(mut self, strategy: RetryStrategy) -> Self {
        self.retry_strategy = strategy;
        self
    }

    /// Sets the retry policy.
    ///
    /// By default, failed calls are never retried.
    pub fn retry_policy(mut self, policy: Box<dyn RetryPolicy>) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    /// Sets the maximum number of attempts per call, whatever the strategy
    /// allows.
    pub fn max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Sets the hook run before every send.
    pub fn interceptor(mut self, interceptor: Box<dyn RequestInterceptor>) -> Self {
        self.interceptor = Some(interceptor);
        self
    }

    /// Sets the connectivity probe consulted before every call.
    pub fn connectivity(mut self, probe: Arc<dyn Connectivity>) -> Self {
        self.connectivity = probe;
        self
    }

    /// Logs up to `limit` bytes of every response body, and the request as a
    /// `curl` command, at `debug` level.
    pub fn debug_body_capture(mut self, limit: usize) -> Self {
        self.capture_limit = Some(limit);
        self
    }

    /// Builds the configured `Caller`.
    ///
    /// The transport client itself is built lazily, on the first call.
    ///
    /// # Errors
    ///
    /// Returns an error if `max_attempts` is zero.
    pub fn build(self) -> Result<Caller> {
        if self.max_attempts == 0 {
            return Err(Error::Configuration(
                "max_attempts must be at least 1".to_string(),
            ));
        }

        let mut default_headers = self.default_headers;
        if self.config.accept_gzip && !default_headers.contains_key(ACCEPT_ENCODING) {
            default_headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip"));
        }

        let decoder = match self.capture_limit {
            Some(limit) => ContentDecoder::with_capture(limit),
            None => ContentDecoder::new(),
        };

        Ok(Caller {
            inner: Arc::new(CallerInner {
                lifecycle: ClientLifecycle::new(self.transport, self.config, self.reuse_policy),
                base_url: self.base_url,
                default_headers,
                retry_strategy: self.retry_strategy,
                retry_policy: self.retry_policy.unwrap_or_else(|| Box::new(NeverRetry)),
                max_attempts: self.max_attempts,
                interceptor: self
                    .interceptor
                    .unwrap_or_else(|| Box::new(NoopInterceptor)),
                connectivity: self.connectivity,
                decoder,
            }),
        })
    }
}

impl Default for CallerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_attempts_is_rejected() {
        let result = Caller::builder().max_attempts(0).build();
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn test_accept_gzip_adds_a_single_default_header() {
        let caller = Caller::builder()
            .accept_gzip(true)
            .default_header("Accept-Encoding", "gzip, br")
            .unwrap()
            .build()
            .unwrap();
        let values: Vec<_> = caller.inner.default_headers.get_all(ACCEPT_ENCODING).iter().collect();
        assert_eq!(values, vec!["gzip, br"]);

        let caller = Caller::builder().accept_gzip(true).build().unwrap();
        assert_eq!(caller.inner.default_headers[ACCEPT_ENCODING], "gzip");
    }

    #[test]
    fn test_relative_uris_need_a_base_url() {
        let caller = Caller::builder().build().unwrap();
        assert!(matches!(caller.resolve("/posts/1"), Err(Error::InvalidUrl(_))));

        let caller = Caller::builder()
            .base_url("https://api.example.com/v1/")
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(
            caller.resolve("posts/1").unwrap().as_str(),
            "https://api.example.com/v1/posts/1"
        );
    }

    #[test]
    fn test_builder_does_not_build_a_client() {
        let caller = Caller::builder()
            .reuse_policy(ReusePolicy::Reused)
            .build()
            .unwrap();
        assert_eq!(caller.lifecycle().builds(), 0);
        assert_eq!(caller.lifecycle().policy(), ReusePolicy::Reused);
    }
}
