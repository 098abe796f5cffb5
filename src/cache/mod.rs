//! Time-windowed caching of parsed responses.
//!
//! [`CachedCaller`] wraps a [`Caller`] with a fingerprint to value cache. A
//! stored value is served while it is younger than the retention window given
//! to each [`get`](CachedCaller::get); otherwise it is fetched again, parsed,
//! stored and returned. Concurrent misses on the same fingerprint share a
//! single fetch.
//!
//! # Examples
//!
//! ```no_run
//! use webcaller::cache::{CachedCaller, MemoryStore};
//! use webcaller::{Caller, CallSpec};
//! use serde::{Deserialize, Serialize};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[derive(Serialize, Deserialize)]
//! struct Post {
//!     id: u64,
//!     title: String,
//! }
//!
//! # fn example() -> Result<(), webcaller::Error> {
//! let caller = Caller::builder().build()?;
//! let cached = CachedCaller::new(caller, Arc::new(MemoryStore::new()));
//!
//! let spec = CallSpec::get("https://jsonplaceholder.typicode.com/posts/1");
//! let post: Post = cached.get(&spec, Duration::from_secs(300), false)?;
//! println!("{}", post.title);
//! # Ok(())
//! # }
//! ```

mod clock;
mod flight;
mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use store::{CacheStore, FileStore, MemoryStore};

use crate::codec::{Codec, JsonCodec};
use crate::request::CallSpec;
use crate::{Caller, Result};
use flight::{Fetched, InFlight, Role};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Deterministic key of a logical request.
///
/// Built from the verb, the URI with its query parameters sorted, the sorted
/// form parameters and a digest of the raw body. Headers and attachments do
/// not participate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Computes the fingerprint of `spec`.
    ///
    /// # Examples
    ///
    /// ```
    /// use webcaller::cache::Fingerprint;
    /// use webcaller::CallSpec;
    ///
    /// let a = Fingerprint::of(&CallSpec::get("https://example.com/items?b=2&a=1"));
    /// let b = Fingerprint::of(
    ///     &CallSpec::get("https://example.com/items?a=1&b=2").with_header("X-Trace", "1"),
    /// );
    /// assert_eq!(a, b);
    /// ```
    pub fn of(spec: &CallSpec) -> Self {
        let mut key = format!("{} {}", spec.verb(), sorted_uri(spec.uri()));

        if !spec.form_parameters().is_empty() {
            let mut params = spec.form_parameters().to_vec();
            params.sort();
            key.push_str(" form:");
            key.push_str(&encode_pairs(&params));
        }

        if let Some(body) = spec.raw_body() {
            key.push_str(" body:");
            key.push_str(&format!("{:x}", Sha256::digest(body.as_bytes())));
        }

        Self(key)
    }

    /// Wraps an already computed key.
    pub fn from_key(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The fingerprint as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Hex SHA-256 digest of the fingerprint, safe to use as a file name.
    pub fn digest(&self) -> String {
        format!("{:x}", Sha256::digest(self.0.as_bytes()))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn sorted_uri(uri: &str) -> String {
    let Some((path, query)) = uri.split_once('?') else {
        return uri.to_string();
    };

    let mut pairs: Vec<(String, String)> = url::form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect();
    pairs.sort();
    format!("{}?{}", path, encode_pairs(&pairs))
}

fn encode_pairs(pairs: &[(String, String)]) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish()
}

/// A stored value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// The key the value was fetched for.
    pub fingerprint: Fingerprint,
    /// When the value was fetched.
    pub stored_at: SystemTime,
    /// The value, serialized with the cache's codec.
    pub value: Vec<u8>,
}

impl CacheEntry {
    /// Creates an entry.
    pub fn new(fingerprint: Fingerprint, stored_at: SystemTime, value: Vec<u8>) -> Self {
        Self {
            fingerprint,
            stored_at,
            value,
        }
    }

    /// Returns `true` if the entry is no older than `retention` at `now`.
    ///
    /// Entries stored after `now` are fresh.
    pub fn is_fresh(&self, now: SystemTime, retention: Duration) -> bool {
        match now.duration_since(self.stored_at) {
            Ok(age) => age <= retention,
            Err(_) => true,
        }
    }
}

/// A [`Caller`] with a deduplicating, time-windowed response cache.
///
/// Values are parsed from response bodies and persisted with the codec `C`.
/// A failed fetch is returned to every caller waiting on it and leaves the
/// store untouched.
pub struct CachedCaller<C: Codec = JsonCodec> {
    inner: Arc<CachedInner<C>>,
}

struct CachedInner<C> {
    caller: Caller,
    store: Arc<dyn CacheStore>,
    codec: C,
    clock: Arc<dyn Clock>,
    flights: InFlight,
}

impl<C: Codec> Clone for CachedCaller<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl CachedCaller<JsonCodec> {
    /// Creates a JSON cache over `store` using the system clock.
    pub fn new(caller: Caller, store: Arc<dyn CacheStore>) -> Self {
        Self::builder(caller, store).build()
    }

    /// Creates a builder to pick the codec and clock.
    pub fn builder(caller: Caller, store: Arc<dyn CacheStore>) -> CachedCallerBuilder<JsonCodec> {
        CachedCallerBuilder {
            caller,
            store,
            codec: JsonCodec,
            clock: Arc::new(SystemClock),
        }
    }
}

impl<C: Codec> CachedCaller<C> {
    /// Returns the value for `spec`, from the cache when fresh enough.
    ///
    /// With `force_refresh` the stored value is ignored and the value always
    /// comes from the network. Joining a concurrent fetch counts only if that
    /// fetch went to the network; otherwise a new fetch is started.
    ///
    /// # Errors
    ///
    /// Every error of [`Caller::run`], plus [`Error::Codec`](crate::Error::Codec)
    /// when the body cannot be parsed into `T`.
    pub fn get<T>(&self, spec: &CallSpec, retention: Duration, force_refresh: bool) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
    {
        let fingerprint = Fingerprint::of(spec);

        if !force_refresh {
            if let Some(value) = self.fresh::<T>(&fingerprint, retention) {
                tracing::debug!(fingerprint = %fingerprint, "Cache hit");
                return Ok(value);
            }
        }

        let fetched = loop {
            match self.inner.flights.join(&fingerprint) {
                Role::Leader(guard) => {
                    let outcome = self.produce::<T>(spec, &fingerprint, retention, force_refresh);
                    guard.publish(outcome.clone());
                    break outcome?;
                }
                Role::Follower(flight) => {
                    tracing::debug!(fingerprint = %fingerprint, "Waiting for a fetch in progress");
                    let fetched = flight.wait()?;
                    if force_refresh && !fetched.from_network {
                        tracing::debug!(fingerprint = %fingerprint, "Shared fetch was served from the cache, refreshing");
                        continue;
                    }
                    break fetched;
                }
            }
        };

        self.inner.codec.decode(&fetched.bytes)
    }

    /// Shorthand for [`get`](Self::get) with a GET call to `uri`.
    pub fn get_uri<T>(&self, uri: impl Into<String>, retention: Duration, force_refresh: bool) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
    {
        self.get(&CallSpec::get(uri), retention, force_refresh)
    }

    /// Reads the cache only, never the network.
    ///
    /// With `Some(retention)`, entries older than the window are ignored.
    pub fn peek<T: DeserializeOwned>(&self, spec: &CallSpec, retention: Option<Duration>) -> Option<T> {
        let fingerprint = Fingerprint::of(spec);
        let entry = self.lookup(&fingerprint)?;
        if let Some(retention) = retention {
            if !entry.is_fresh(self.inner.clock.now(), retention) {
                return None;
            }
        }
        self.inner.codec.decode(&entry.value).ok()
    }

    /// The wrapped caller.
    pub fn caller(&self) -> &Caller {
        &self.inner.caller
    }

    /// The number of fetches currently in progress.
    pub fn fetches_in_progress(&self) -> usize {
        self.inner.flights.len()
    }

    /// Fetches, parses and stores the value; run by the leader of a miss.
    fn produce<T>(
        &self,
        spec: &CallSpec,
        fingerprint: &Fingerprint,
        retention: Duration,
        force_refresh: bool,
    ) -> Result<Fetched>
    where
        T: Serialize + DeserializeOwned,
    {
        // Another leader may have stored the value since our first look.
        if !force_refresh {
            if let Some(entry) = self.lookup(fingerprint) {
                if entry.is_fresh(self.inner.clock.now(), retention)
                    && self.inner.codec.decode::<T>(&entry.value).is_ok()
                {
                    return Ok(Fetched::new(entry.value, false));
                }
            }
        }

        tracing::debug!(fingerprint = %fingerprint, force_refresh = force_refresh, "Cache miss, fetching");
        let response = self.inner.caller.run(spec)?;
        let value: T = self.inner.codec.decode(&response.bytes()?)?;
        let bytes = self.inner.codec.encode(&value)?;

        let entry = CacheEntry::new(fingerprint.clone(), self.inner.clock.now(), bytes.clone());
        if let Err(e) = self.inner.store.put(entry) {
            tracing::warn!(fingerprint = %fingerprint, error = %e, "Cannot store cache entry");
        }

        Ok(Fetched::new(bytes, true))
    }

    fn fresh<T: DeserializeOwned>(&self, fingerprint: &Fingerprint, retention: Duration) -> Option<T> {
        let entry = self.lookup(fingerprint)?;
        if !entry.is_fresh(self.inner.clock.now(), retention) {
            return None;
        }

        match self.inner.codec.decode(&entry.value) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(fingerprint = %fingerprint, error = %e, "Ignoring undecodable cache entry");
                None
            }
        }
    }

    fn lookup(&self, fingerprint: &Fingerprint) -> Option<CacheEntry> {
        match self.inner.store.get(fingerprint) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(fingerprint = %fingerprint, error = %e, "Cannot read cache entry");
                None
            }
        }
    }
}

/// Builder for a [`CachedCaller`].
pub struct CachedCallerBuilder<C> {
    caller: Caller,
    store: Arc<dyn CacheStore>,
    codec: C,
    clock: Arc<dyn Clock>,
}

impl<C: Codec> CachedCallerBuilder<C> {
    /// Sets the codec used to parse bodies and persist values.
    pub fn codec<D: Codec>(self, codec: D) -> CachedCallerBuilder<D> {
        CachedCallerBuilder {
            caller: self.caller,
            store: self.store,
            codec,
            clock: self.clock,
        }
    }

    /// Sets the clock freshness is judged with.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Builds the cache.
    pub fn build(self) -> CachedCaller<C> {
        CachedCaller {
            inner: Arc::new(CachedInner {
                caller: self.caller,
                store: self.store,
                codec: self.codec,
                clock: self.clock,
                flights: InFlight::new(),
            }),
        }
    }
}
