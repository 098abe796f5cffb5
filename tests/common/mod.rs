//! Shared helpers: a scripted in-process transport and response builders.

#![allow(dead_code)]

use flate2::write::GzEncoder;
use flate2::Compression;
use http::{HeaderMap, HeaderName, HeaderValue};
use parking_lot::Mutex;
use std::io::{Cursor, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use webcaller::{BoxError, Caller, CallerBuilder, HttpRequest, RawResponse, Transport, TransportClient, TransportConfig};

type Handler = dyn Fn(&HttpRequest, usize) -> Result<RawResponse, BoxError> + Send + Sync;

struct MockState {
    handler: Box<Handler>,
    executions: AtomicUsize,
    builds: AtomicUsize,
    requests: Mutex<Vec<HttpRequest>>,
}

/// A transport answering every request with a closure.
///
/// The closure receives the request and the 1-based execution number across
/// all clients built by this transport.
#[derive(Clone)]
pub struct MockTransport {
    state: Arc<MockState>,
}

impl MockTransport {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&HttpRequest, usize) -> Result<RawResponse, BoxError> + Send + Sync + 'static,
    {
        Self {
            state: Arc::new(MockState {
                handler: Box::new(handler),
                executions: AtomicUsize::new(0),
                builds: AtomicUsize::new(0),
                requests: Mutex::new(Vec::new()),
            }),
        }
    }

    /// A transport answering `status` with `body` to everything.
    pub fn fixed(status: u16, body: &'static str) -> Self {
        Self::new(move |_, _| Ok(response(status, body.as_bytes())))
    }

    pub fn executions(&self) -> usize {
        self.state.executions.load(Ordering::SeqCst)
    }

    pub fn builds(&self) -> usize {
        self.state.builds.load(Ordering::SeqCst)
    }

    /// Every request executed so far, in order.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.state.requests.lock().clone()
    }

    /// A caller builder wired to this transport.
    pub fn caller(&self) -> CallerBuilder {
        Caller::builder().transport(self.clone())
    }
}

impl Transport for MockTransport {
    fn build(&self, _config: &TransportConfig) -> Result<Arc<dyn TransportClient>, BoxError> {
        self.state.builds.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockClient {
            state: Arc::clone(&self.state),
        }))
    }
}

struct MockClient {
    state: Arc<MockState>,
}

impl TransportClient for MockClient {
    fn execute(&self, request: &HttpRequest) -> Result<RawResponse, BoxError> {
        let execution = self.state.executions.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.requests.lock().push(request.clone());
        (self.state.handler)(request, execution)
    }
}

/// A raw response with no headers.
pub fn response(status: u16, body: &[u8]) -> RawResponse {
    RawResponse::new(status, HeaderMap::new(), Box::new(Cursor::new(body.to_vec())))
}

/// A raw response with headers, appended in the given order.
pub fn response_with_headers(status: u16, headers: &[(&str, &str)], body: &[u8]) -> RawResponse {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        map.append(
            HeaderName::try_from(*name).unwrap(),
            HeaderValue::try_from(*value).unwrap(),
        );
    }
    RawResponse::new(status, map, Box::new(Cursor::new(body.to_vec())))
}

pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Log output collected in memory, for asserting on what was logged.
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` with a `DEBUG` subscriber writing into this buffer.
    pub fn record<T>(&self, f: impl FnOnce() -> T) -> T {
        let writer = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, f)
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

impl Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
