//! # Webcaller - blocking HTTP call execution with retries and caching
//!
//! Webcaller sits between application code and a pluggable HTTP transport. It
//! turns call descriptions into decoded responses with consistent timeout,
//! retry, compression and caching behavior, so call sites do not have to
//! re-implement any of it.
//!
//! ## Quick Start
//!
//! ```no_run
//! use webcaller::{Caller, CallSpec};
//! use serde::Deserialize;
//! use std::time::Duration;
//!
//! #[derive(Deserialize)]
//! struct Post {
//!     id: u64,
//!     title: String,
//! }
//!
//! fn main() -> Result<(), webcaller::Error> {
//!     let caller = Caller::builder()
//!         .base_url("https://jsonplaceholder.typicode.com")?
//!         .read_timeout(Duration::from_secs(30))
//!         .accept_gzip(true)
//!         .build()?;
//!
//!     // Make a GET request
//!     let response = caller.get("/posts/1")?;
//!     println!("Status: {}, took {:?}", response.status, response.latency);
//!     let post: Post = response.json()?;
//!     println!("Post {}: {}", post.id, post.title);
//!
//!     // Make a POST request with form parameters
//!     let spec = CallSpec::post("/posts")
//!         .with_form_param("title", "hello")
//!         .with_form_param("body", "world");
//!     let created = caller.run(&spec)?;
//!     println!("Created: {}", created.text()?);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Blocking API** - Every call runs on the calling thread; share a [`Caller`] between threads for concurrency
//! - **Pluggable transport** - [`Transport`] and [`TransportClient`] traits, `reqwest` by default
//! - **Client reuse policy** - Rebuild the transport client per call or keep one until invalidated
//! - **Retry hooks** - Injected [`RetryPolicy`] with bounded [`RetryStrategy`] backoff; never retries by default
//! - **Gzip-aware decoding** - Transparent `Content-Encoding: gzip` handling and bounded debug previews
//! - **Deduplicating cache** - [`cache::CachedCaller`] serves fresh values and collapses concurrent misses
//! - **Automatic logging** - Structured logging with `tracing` for observability
//!
//! ## Error Handling
//!
//! Every entry point fails with exactly one [`Error`] variant:
//!
//! ```no_run
//! use webcaller::{Caller, Error};
//!
//! # fn example() -> Result<(), Error> {
//! # let caller = Caller::builder().build()?;
//! match caller.get("https://api.example.com/endpoint") {
//!     Ok(response) => println!("Success: {}", response.text()?),
//!     Err(Error::Status { status, message, .. }) => {
//!         eprintln!("HTTP error {}: {}", status, message);
//!     }
//!     Err(Error::NoConnectivity) => eprintln!("Offline"),
//!     Err(e) => eprintln!("Other error: {}", e),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Retries
//!
//! Retries happen only when the policy asks for them, within the budget of the
//! strategy:
//!
//! ```no_run
//! use webcaller::{Caller, RetryStrategy, retry::{OrPredicate, RetryOn5xx, RetryOnConnectionError}};
//! use std::time::Duration;
//!
//! # fn example() -> Result<(), webcaller::Error> {
//! let caller = Caller::builder()
//!     .retry_strategy(RetryStrategy::ExponentialBackoff {
//!         initial_delay: Duration::from_millis(100),
//!         max_delay: Duration::from_secs(30),
//!         max_retries: 5,
//!         jitter: true,
//!     })
//!     .retry_policy(Box::new(OrPredicate::new(vec![
//!         Box::new(RetryOn5xx),
//!         Box::new(RetryOnConnectionError),
//!     ])))
//!     .build()?;
//! # Ok(())
//! # }
//! ```

pub mod cache;
mod caller;
pub mod codec;
pub mod connectivity;
pub mod decode;
mod error;
pub mod lifecycle;
pub mod request;
mod response;
pub mod retry;
pub mod transport;

pub use caller::{Caller, CallerBuilder, NoopInterceptor, RequestInterceptor, DEFAULT_MAX_ATTEMPTS, ERROR_BODY_LIMIT};
pub use connectivity::{AlwaysConnected, Connectivity, ConnectivityFlag};
pub use error::{BoxError, Error, Result};
pub use lifecycle::ReusePolicy;
pub use request::{Attachment, CallSpec, HttpRequest, RequestBody, Verb};
pub use response::CallResponse;
pub use retry::{RetryContext, RetryPolicy, RetryStrategy};
pub use transport::{RawResponse, ReqwestTransport, Transport, TransportClient, TransportConfig};
