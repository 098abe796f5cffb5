//! The successful outcome of a call.
//!
//! A [`CallResponse`] carries the status, the headers in arrival order and a
//! decoded body that the caller reads exactly once. The transport response has
//! already been released by the time a `CallResponse` is returned.

use crate::codec::{Codec, JsonCodec};
use crate::decode::ResponseBody;
use crate::Result;
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// A successful (`2xx`) response.
///
/// # Examples
///
/// ```no_run
/// use webcaller::Caller;
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct Post {
///     id: u64,
///     title: String,
/// }
///
/// # fn example() -> Result<(), webcaller::Error> {
/// let caller = Caller::builder().build()?;
///
/// let response = caller.get("https://jsonplaceholder.typicode.com/posts/1")?;
/// println!("Status: {}", response.status);
/// println!("Request took {:?}", response.latency);
/// println!("Attempts: {}", response.attempts);
///
/// let post: Post = response.json()?;
/// println!("Title: {}", post.title);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct CallResponse {
    /// The HTTP status code, always in `[200, 300)`.
    pub status: StatusCode,

    /// The response headers. Repeated names keep their arrival order.
    pub headers: HeaderMap,

    /// The decoded body, `None` for `HEAD` calls.
    pub body: Option<ResponseBody>,

    /// Time spent in the successful send, excluding earlier failed attempts.
    pub latency: Duration,

    /// The number of attempts made to complete this call.
    ///
    /// This will be `1` for calls that succeeded on the first try.
    pub attempts: usize,
}

impl CallResponse {
    /// Creates a new `CallResponse`.
    pub fn new(
        status: StatusCode,
        headers: HeaderMap,
        body: Option<ResponseBody>,
        latency: Duration,
        attempts: usize,
    ) -> Self {
        Self {
            status,
            headers,
            body,
            latency,
            attempts,
        }
    }

    /// Returns `true` if the call required retries.
    pub fn was_retried(&self) -> bool {
        self.attempts > 1
    }

    /// Returns the first value of a header by name.
    ///
    /// # Examples
    ///
    /// ```
    /// # use webcaller::CallResponse;
    /// # use http::{HeaderMap, HeaderValue, StatusCode};
    /// # use std::time::Duration;
    /// let mut headers = HeaderMap::new();
    /// headers.insert("content-type", HeaderValue::from_static("application/json"));
    ///
    /// let response = CallResponse::new(StatusCode::OK, headers, None, Duration::ZERO, 1);
    /// assert_eq!(response.header("content-type"), Some("application/json"));
    /// ```
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }

    /// Returns every value of a header, in arrival order.
    pub fn header_values(&self, name: &str) -> Vec<&str> {
        self.headers
            .get_all(name)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .collect()
    }

    /// Takes the body stream out of the response.
    pub fn into_body(self) -> Option<ResponseBody> {
        self.body
    }

    /// Reads the whole body. A missing body reads as empty.
    pub fn bytes(self) -> Result<Vec<u8>> {
        match self.body {
            Some(body) => body.bytes(),
            None => Ok(Vec::new()),
        }
    }

    /// Reads the whole body as UTF-8 text.
    pub fn text(self) -> Result<String> {
        match self.body {
            Some(body) => body.text(),
            None => Ok(String::new()),
        }
    }

    /// Reads the whole body and parses it as JSON.
    pub fn json<T: DeserializeOwned>(self) -> Result<T> {
        JsonCodec.decode(&self.bytes()?)
    }
}
