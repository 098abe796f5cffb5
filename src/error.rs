//! Error types for call execution and cached retrieval.
//!
//! Every public entry point fails with exactly one [`Error`] variant. Causes are
//! held behind `Arc` so that a single failure can be handed to every caller that
//! was waiting on the same cached fetch.

use http::{HeaderMap, StatusCode};
use std::sync::Arc;

/// A boxed error as produced by transports and other pluggable collaborators.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The main error type of the crate.
///
/// # Examples
///
/// ```no_run
/// use webcaller::{Caller, Error};
///
/// # fn example() -> Result<(), Error> {
/// let caller = Caller::builder().build()?;
///
/// match caller.get("https://api.example.com/posts/1") {
///     Ok(response) => println!("Status: {}", response.status),
///     Err(Error::Status { status, message, .. }) => {
///         eprintln!("Server answered {status}: {message}");
///     }
///     Err(Error::NoConnectivity) => eprintln!("Offline, try again later"),
///     Err(e) => eprintln!("Other error: {e}"),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(thiserror::Error, Debug, Clone)]
pub enum Error {
    /// The connectivity probe reported that the network is unavailable.
    ///
    /// Raised before anything is sent; the transport is never invoked.
    #[error("No network connectivity")]
    NoConnectivity,

    /// The transport failed: client construction, connection, timeout, or
    /// reading the raw response.
    #[error("Transport error: {message}")]
    Transport {
        /// What the engine was doing when the transport failed.
        message: String,
        /// The underlying transport error, when there is one.
        #[source]
        source: Option<Arc<dyn std::error::Error + Send + Sync>>,
    },

    /// The server answered with a status outside of `[200, 300)`.
    #[error("Non-success status {status}: {message}")]
    Status {
        /// The HTTP status code.
        status: StatusCode,
        /// The response message (reason phrase).
        message: String,
        /// The response headers.
        headers: HeaderMap,
        /// The start of the decoded response body, if the server sent one.
        body: Option<Vec<u8>>,
    },

    /// The response body could not be decoded, e.g. a corrupt gzip stream.
    #[error("Failed to decode response body: {0}")]
    Decode(#[source] Arc<std::io::Error>),

    /// A value could not be serialized or deserialized by the codec.
    #[error("Codec error: {message}")]
    Codec {
        /// The codec error message.
        message: String,
    },

    /// The caller or the call was misconfigured.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An invalid URL was provided.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl Error {
    /// Creates a transport error with an optional underlying cause.
    pub fn transport(message: impl Into<String>, source: Option<BoxError>) -> Self {
        Error::Transport {
            message: message.into(),
            source: source.map(Arc::from),
        }
    }

    /// Wraps a failure reported by a transport.
    ///
    /// Errors that already are an [`Error`] are returned unchanged.
    pub fn from_transport(message: impl Into<String>, error: BoxError) -> Self {
        match error.downcast::<Error>() {
            Ok(error) => *error,
            Err(other) => Error::transport(message, Some(other)),
        }
    }

    /// Creates a decode error from a stream failure.
    pub fn decode(error: std::io::Error) -> Self {
        Error::Decode(Arc::new(error))
    }

    /// Creates a codec error.
    pub fn codec(error: impl std::fmt::Display) -> Self {
        Error::Codec {
            message: error.to_string(),
        }
    }

    /// Returns `true` if this error is potentially retryable.
    ///
    /// Transport errors, 5xx and 429 responses are considered retryable.
    /// Decoding, codec and configuration failures never are.
    ///
    /// # Examples
    ///
    /// ```
    /// use webcaller::Error;
    /// use http::{HeaderMap, StatusCode};
    ///
    /// let err = Error::Status {
    ///     status: StatusCode::SERVICE_UNAVAILABLE,
    ///     message: "Service Unavailable".to_string(),
    ///     headers: HeaderMap::new(),
    ///     body: None,
    /// };
    /// assert!(err.is_retryable());
    ///
    /// let err = Error::Status {
    ///     status: StatusCode::NOT_FOUND,
    ///     message: "Not Found".to_string(),
    ///     headers: HeaderMap::new(),
    ///     body: None,
    /// };
    /// assert!(!err.is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Transport { .. } => true,
            Error::Status { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            Error::NoConnectivity
            | Error::Decode(_)
            | Error::Codec { .. }
            | Error::Configuration(_)
            | Error::InvalidUrl(_) => false,
        }
    }

    /// Returns `true` for the failure kinds the retry hook is allowed to see.
    pub fn reaches_retry_hook(&self) -> bool {
        matches!(self, Error::Transport { .. } | Error::Status { .. })
    }

    /// Returns the HTTP status code for [`Error::Status`].
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns the error body the server sent along with a non-success status.
    pub fn error_body(&self) -> Option<&[u8]> {
        match self {
            Error::Status { body, .. } => body.as_deref(),
            _ => None,
        }
    }

    /// Returns `true` if this is a transport failure.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport { .. })
    }
}

/// A specialized `Result` type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_transport_passes_crate_errors_through() {
        let original: BoxError = Box::new(Error::Status {
            status: StatusCode::BAD_GATEWAY,
            message: "Bad Gateway".to_string(),
            headers: HeaderMap::new(),
            body: None,
        });

        let error = Error::from_transport("send failed", original);
        assert_eq!(error.status(), Some(StatusCode::BAD_GATEWAY));
    }

    #[test]
    fn test_from_transport_wraps_foreign_errors() {
        let io: BoxError = Box::new(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "refused",
        ));

        let error = Error::from_transport("send failed", io);
        match &error {
            Error::Transport { message, source } => {
                assert_eq!(message, "send failed");
                assert!(source.is_some());
            }
            other => panic!("Expected Transport, got {:?}", other),
        }
        assert!(error.is_retryable());
        assert!(std::error::Error::source(&error).is_some());
    }

    #[test]
    fn test_only_transport_and_status_reach_retry_hook() {
        assert!(Error::transport("boom", None).reaches_retry_hook());
        assert!(!Error::NoConnectivity.reaches_retry_hook());
        assert!(!Error::codec("bad json").reaches_retry_hook());
        assert!(!Error::decode(std::io::Error::other("corrupt")).reaches_retry_hook());
    }

    #[test]
    fn test_too_many_requests_is_retryable() {
        let err = Error::Status {
            status: StatusCode::TOO_MANY_REQUESTS,
            message: String::new(),
            headers: HeaderMap::new(),
            body: None,
        };
        assert!(err.is_retryable());
    }
}
