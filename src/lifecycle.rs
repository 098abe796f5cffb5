//! Creation, reuse and invalidation of the transport client.

use crate::transport::{Transport, TransportClient, TransportConfig};
use crate::{Error, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Whether a caller keeps its transport client across calls.
///
/// Fixed when the [`Caller`](crate::Caller) is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReusePolicy {
    /// A fresh client is built for every call and dropped afterwards.
    #[default]
    PerCall,
    /// One client is built lazily and reused until
    /// [`ClientLifecycle::invalidate`] is called.
    Reused,
}

/// Owns the transport client of one caller.
///
/// `acquire` and `invalidate` are serialized on a single lock. Only client
/// creation happens under it; requests are executed by the caller after
/// `acquire` returns.
pub struct ClientLifecycle {
    transport: Arc<dyn Transport>,
    config: TransportConfig,
    policy: ReusePolicy,
    current: Mutex<Option<Arc<dyn TransportClient>>>,
    builds: AtomicUsize,
}

impl ClientLifecycle {
    /// Creates a lifecycle that builds clients with `transport`.
    pub fn new(transport: Arc<dyn Transport>, config: TransportConfig, policy: ReusePolicy) -> Self {
        Self {
            transport,
            config,
            policy,
            current: Mutex::new(None),
            builds: AtomicUsize::new(0),
        }
    }

    /// Returns a client for one execution.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] if the transport cannot build a client.
    pub fn acquire(&self) -> Result<Arc<dyn TransportClient>> {
        let mut current = self.current.lock();

        match self.policy {
            ReusePolicy::PerCall => self.build_client(),
            ReusePolicy::Reused => {
                if let Some(client) = current.as_ref() {
                    return Ok(Arc::clone(client));
                }

                let client = self.build_client()?;
                *current = Some(Arc::clone(&client));
                Ok(client)
            }
        }
    }

    /// Forgets the reused client so that the next [`acquire`](Self::acquire)
    /// builds a new one.
    ///
    /// Executions already holding a client are unaffected; the old client is
    /// released once its last holder drops it.
    pub fn invalidate(&self) {
        let previous = self.current.lock().take();
        tracing::info!(
            had_client = previous.is_some(),
            "Resetting the transport client"
        );
    }

    /// Returns `true` if a reused client is currently held.
    pub fn is_initialized(&self) -> bool {
        self.current.lock().is_some()
    }

    /// The number of clients built so far.
    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::Relaxed)
    }

    /// The policy this lifecycle was created with.
    pub fn policy(&self) -> ReusePolicy {
        self.policy
    }

    /// The configuration clients are built with.
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    fn build_client(&self) -> Result<Arc<dyn TransportClient>> {
        let client = self.transport.build(&self.config).map_err(|e| {
            tracing::error!(error = %e, "Cannot instantiate the transport client");
            Error::transport("cannot instantiate the transport client", Some(e))
        })?;

        let builds = self.builds.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!(policy = ?self.policy, builds = builds, "Built a transport client");
        Ok(client)
    }
}
