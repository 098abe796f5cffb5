//! Turns raw response bodies into consumable byte streams.
//!
//! Decoding covers `Content-Encoding: gzip` and, when enabled, a bounded
//! capture of the body start for debug logging. The capture never consumes the
//! stream: the caller still reads the full body exactly once.

use crate::codec::{Codec, JsonCodec};
use crate::request::Verb;
use crate::{Error, Result};
use flate2::read::GzDecoder;
use http::header::CONTENT_ENCODING;
use http::HeaderMap;
use serde::de::DeserializeOwned;
use std::fmt;
use std::io::{self, BufRead, BufReader, Cursor, Read};

/// Default number of body bytes captured for debug logging.
pub const DEFAULT_CAPTURE_LIMIT: usize = 8 * 1024;

/// Decodes response bodies according to their headers.
#[derive(Debug, Clone, Default)]
pub struct ContentDecoder {
    capture_limit: Option<usize>,
}

impl ContentDecoder {
    /// Creates a decoder without body capture.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a decoder that previews up to `limit` bytes of every body at
    /// `debug` level.
    pub fn with_capture(limit: usize) -> Self {
        Self {
            capture_limit: Some(limit),
        }
    }

    /// The configured capture limit, if any.
    pub fn capture_limit(&self) -> Option<usize> {
        self.capture_limit
    }

    /// Decodes `raw` into the body handed to the caller.
    ///
    /// Returns `None` for `HEAD` calls. Empty bodies are never decompressed,
    /// whatever their `Content-Encoding`.
    pub fn decode(
        &self,
        uri: &str,
        verb: Verb,
        headers: &HeaderMap,
        raw: Box<dyn Read + Send>,
    ) -> Option<ResponseBody> {
        if verb == Verb::Head {
            return None;
        }

        let stream: Box<dyn Read + Send> = if is_gzip(headers) {
            gunzip(raw)
        } else {
            raw
        };

        let stream = match self.capture_limit {
            Some(limit) if tracing::enabled!(tracing::Level::DEBUG) => capture(uri, stream, limit),
            _ => stream,
        };

        Some(ResponseBody::new(stream))
    }
}

fn gunzip(raw: Box<dyn Read + Send>) -> Box<dyn Read + Send> {
    let mut raw = BufReader::new(raw);
    let empty = raw.fill_buf().map(|buffered| buffered.is_empty());
    match empty {
        Ok(true) => Box::new(raw),
        Ok(false) => Box::new(GzDecoder::new(raw)),
        Err(e) => Box::new(Replay::new(Vec::new(), Some(e), Some(GzDecoder::new(raw)))),
    }
}

/// Returns `true` if any `Content-Encoding` value names gzip.
pub fn is_gzip(headers: &HeaderMap) -> bool {
    headers
        .get_all(CONTENT_ENCODING)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|coding| coding.trim().eq_ignore_ascii_case("gzip"))
}

/// Reads up to `limit` bytes from `stream`, logs them and returns a reader
/// yielding the whole body.
pub(crate) fn capture(
    uri: &str,
    mut stream: Box<dyn Read + Send>,
    limit: usize,
) -> Box<dyn Read + Send> {
    let mut prefix = Vec::with_capacity(limit.min(DEFAULT_CAPTURE_LIMIT));
    // One byte past the limit tells a truncated body from one of exactly `limit` bytes.
    let outcome = stream
        .by_ref()
        .take((limit as u64).saturating_add(1))
        .read_to_end(&mut prefix);

    match outcome {
        Ok(read) => {
            let shown = read.min(limit);
            tracing::debug!(
                uri = uri,
                bytes = shown,
                truncated = read > limit,
                body = %String::from_utf8_lossy(&prefix[..shown]),
                "Response body preview"
            );
            Box::new(Replay::new(prefix, None, Some(stream)))
        }
        Err(e) => {
            tracing::warn!(
                uri = uri,
                error = %e,
                "Cannot capture the response body, diagnostics unavailable"
            );
            Box::new(Replay::new(prefix, Some(e), Some(stream)))
        }
    }
}

/// Replays a captured prefix, then a deferred error if capturing hit one, then
/// the rest of the original stream.
struct Replay<R> {
    prefix: Cursor<Vec<u8>>,
    pending: Option<io::Error>,
    rest: Option<R>,
}

impl<R: Read> Replay<R> {
    fn new(prefix: Vec<u8>, pending: Option<io::Error>, rest: Option<R>) -> Self {
        Self {
            prefix: Cursor::new(prefix),
            pending,
            rest,
        }
    }
}

impl<R: Read> Read for Replay<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let read = self.prefix.read(buf)?;
        if read > 0 {
            return Ok(read);
        }
        if let Some(error) = self.pending.take() {
            return Err(error);
        }
        match self.rest.as_mut() {
            Some(rest) => rest.read(buf),
            None => Ok(0),
        }
    }
}

/// A decoded response body.
///
/// Implements [`Read`] for streaming; [`bytes`](Self::bytes),
/// [`text`](Self::text) and [`json`](Self::json) consume it in one go and
/// report stream failures as [`Error::Decode`].
pub struct ResponseBody {
    inner: Box<dyn Read + Send>,
}

impl ResponseBody {
    /// Wraps a decoded stream.
    pub fn new(inner: Box<dyn Read + Send>) -> Self {
        Self { inner }
    }

    /// Reads the whole body.
    pub fn bytes(mut self) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        self.inner.read_to_end(&mut bytes).map_err(Error::decode)?;
        Ok(bytes)
    }

    /// Reads the whole body as UTF-8 text.
    pub fn text(self) -> Result<String> {
        String::from_utf8(self.bytes()?)
            .map_err(|e| Error::decode(io::Error::new(io::ErrorKind::InvalidData, e)))
    }

    /// Reads the whole body and parses it as JSON.
    pub fn json<T: DeserializeOwned>(self) -> Result<T> {
        JsonCodec.decode(&self.bytes()?)
    }
}

impl Read for ResponseBody {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseBody").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use http::HeaderValue;
    use std::io::Write;

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn gzip_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
        headers
    }

    /// A stream that cannot be rewound and fails after a number of bytes.
    struct Flaky {
        data: Cursor<Vec<u8>>,
        fail_at: u64,
        failed: bool,
    }

    impl Read for Flaky {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if !self.failed && self.data.position() >= self.fail_at {
                self.failed = true;
                return Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
            }
            let room = (self.fail_at.saturating_sub(self.data.position()) as usize).max(1);
            let end = buf.len().min(room);
            self.data.read(&mut buf[..end])
        }
    }

    #[test]
    fn test_head_has_no_body() {
        let decoder = ContentDecoder::new();
        let body = decoder.decode("u", Verb::Head, &HeaderMap::new(), Box::new(io::empty()));
        assert!(body.is_none());
    }

    #[test]
    fn test_gzip_round_trip() {
        let original = b"{\"userId\":1,\"id\":1,\"title\":\"t\",\"body\":\"b\"}";
        let decoder = ContentDecoder::new();

        let body = decoder
            .decode("u", Verb::Get, &gzip_headers(), Box::new(Cursor::new(gzip(original))))
            .unwrap();

        assert_eq!(body.bytes().unwrap(), original.to_vec());
    }

    #[test]
    fn test_gzip_detection_in_coding_lists() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_ENCODING, HeaderValue::from_static("identity, GZIP"));
        assert!(is_gzip(&headers));

        headers.insert(CONTENT_ENCODING, HeaderValue::from_static("br"));
        assert!(!is_gzip(&headers));
        assert!(!is_gzip(&HeaderMap::new()));
    }

    #[test]
    fn test_corrupt_gzip_is_a_decode_error() {
        let decoder = ContentDecoder::new();
        let body = decoder
            .decode(
                "u",
                Verb::Get,
                &gzip_headers(),
                Box::new(Cursor::new(b"definitely not gzip".to_vec())),
            )
            .unwrap();

        assert!(matches!(body.bytes(), Err(Error::Decode(_))));
    }

    #[test]
    fn test_empty_gzip_body_is_left_alone() {
        let decoder = ContentDecoder::new();
        let body = decoder
            .decode("u", Verb::Delete, &gzip_headers(), Box::new(io::empty()))
            .unwrap();

        assert!(body.bytes().unwrap().is_empty());
    }

    #[test]
    fn test_capture_replays_long_bodies() {
        let data: Vec<u8> = (0..100u8).collect();
        let stream = capture("u", Box::new(Cursor::new(data.clone())), 10);

        let body = ResponseBody::new(stream);
        assert_eq!(body.bytes().unwrap(), data);
    }

    #[test]
    fn test_capture_of_short_body_returns_only_the_prefix() {
        let stream = capture("u", Box::new(Cursor::new(b"short".to_vec())), 64);
        assert_eq!(ResponseBody::new(stream).text().unwrap(), "short");
    }

    #[test]
    fn test_capture_exactly_at_limit() {
        let stream = capture("u", Box::new(Cursor::new(b"abcd".to_vec())), 4);
        assert_eq!(ResponseBody::new(stream).text().unwrap(), "abcd");
    }

    #[test]
    fn test_capture_failure_keeps_the_content() {
        let flaky = Flaky {
            data: Cursor::new(b"0123456789".to_vec()),
            fail_at: 4,
            failed: false,
        };

        let mut stream = capture("u", Box::new(flaky), 8);

        let mut prefix = [0u8; 4];
        stream.read_exact(&mut prefix).unwrap();
        assert_eq!(&prefix, b"0123");

        let mut buf = [0u8; 16];
        let error = stream.read(&mut buf).unwrap_err();
        assert_eq!(error.kind(), io::ErrorKind::ConnectionReset);

        let mut rest = Vec::new();
        stream.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, b"456789");
    }

    #[test]
    fn test_json_body() {
        #[derive(serde::Deserialize)]
        struct Post {
            id: u32,
        }

        let body = ResponseBody::new(Box::new(Cursor::new(br#"{"id":7,"extra":true}"#.to_vec())));
        let post: Post = body.json().unwrap();
        assert_eq!(post.id, 7);

        let body = ResponseBody::new(Box::new(Cursor::new(b"nope".to_vec())));
        assert!(matches!(body.json::<Post>(), Err(Error::Codec { .. })));
    }
}
