//! Per-fingerprint coordination of cache misses.
//!
//! The first thread missing on a fingerprint becomes the leader and performs
//! the fetch. Threads missing on the same fingerprint meanwhile become
//! followers and block until the leader publishes its outcome. Unrelated
//! fingerprints never share a lock beyond the map shard access.

use super::Fingerprint;
use crate::{Error, Result};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;

/// The serialized value a leader hands to its followers.
#[derive(Debug, Clone)]
pub(crate) struct Fetched {
    pub(crate) bytes: Arc<Vec<u8>>,
    /// `false` when the leader found a fresh stored value and skipped the network.
    pub(crate) from_network: bool,
}

impl Fetched {
    pub(crate) fn new(bytes: Vec<u8>, from_network: bool) -> Self {
        Self {
            bytes: Arc::new(bytes),
            from_network,
        }
    }
}

pub(crate) type Shared = Result<Fetched>;

/// One fetch in progress.
#[derive(Debug, Default)]
pub(crate) struct Flight {
    outcome: Mutex<Option<Shared>>,
    ready: Condvar,
}

impl Flight {
    /// Blocks until the leader publishes.
    pub(crate) fn wait(&self) -> Shared {
        let mut outcome = self.outcome.lock();
        loop {
            if let Some(outcome) = outcome.as_ref() {
                return outcome.clone();
            }
            self.ready.wait(&mut outcome);
        }
    }
}

/// The role a thread plays for a fingerprint miss.
pub(crate) enum Role<'a> {
    Leader(LeaderGuard<'a>),
    Follower(Arc<Flight>),
}

/// Table of fetches in progress, keyed by fingerprint.
#[derive(Debug, Default)]
pub(crate) struct InFlight {
    flights: DashMap<Fingerprint, Arc<Flight>>,
}

impl InFlight {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Joins the fetch for `fingerprint`, starting one if none is running.
    pub(crate) fn join(&self, fingerprint: &Fingerprint) -> Role<'_> {
        match self.flights.entry(fingerprint.clone()) {
            Entry::Occupied(entry) => Role::Follower(Arc::clone(entry.get())),
            Entry::Vacant(entry) => {
                let flight = Arc::new(Flight::default());
                entry.insert(Arc::clone(&flight));
                Role::Leader(LeaderGuard {
                    table: self,
                    fingerprint: fingerprint.clone(),
                    flight,
                    published: false,
                })
            }
        }
    }

    /// The number of fetches currently in progress.
    pub(crate) fn len(&self) -> usize {
        self.flights.len()
    }
}

/// Held by the leader of a fetch.
///
/// Dropping the guard without publishing (the leader panicked) releases
/// followers with a transport failure.
pub(crate) struct LeaderGuard<'a> {
    table: &'a InFlight,
    fingerprint: Fingerprint,
    flight: Arc<Flight>,
    published: bool,
}

impl LeaderGuard<'_> {
    /// Publishes the outcome to every follower.
    pub(crate) fn publish(mut self, outcome: Shared) {
        self.complete(outcome);
    }

    fn complete(&mut self, outcome: Shared) {
        // New arrivals start a fresh flight from here on.
        self.table.flights.remove(&self.fingerprint);
        *self.flight.outcome.lock() = Some(outcome);
        self.flight.ready.notify_all();
        self.published = true;
    }
}

impl Drop for LeaderGuard<'_> {
    fn drop(&mut self) {
        if !self.published {
            tracing::warn!(
                fingerprint = %self.fingerprint,
                "Cache fetch abandoned, releasing waiters"
            );
            self.complete(Err(Error::transport("the cache fetch was abandoned", None)));
        }
    }
}
