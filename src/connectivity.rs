//! Connectivity probes consulted before every call.

use std::sync::atomic::{AtomicBool, Ordering};

/// Reports whether the network is believed to be reachable.
///
/// When it answers `false`, calls fail with
/// [`Error::NoConnectivity`](crate::Error::NoConnectivity) without sending anything.
pub trait Connectivity: Send + Sync {
    /// Returns `true` if requests may be attempted.
    fn is_connected(&self) -> bool;
}

/// A probe that always reports connectivity. The default.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysConnected;

impl Connectivity for AlwaysConnected {
    fn is_connected(&self) -> bool {
        true
    }
}

/// A probe backed by a flag the application flips from its network callbacks.
#[derive(Debug)]
pub struct ConnectivityFlag {
    connected: AtomicBool,
}

impl ConnectivityFlag {
    /// Creates a flag with the given initial state.
    pub fn new(connected: bool) -> Self {
        Self {
            connected: AtomicBool::new(connected),
        }
    }

    /// Records a connectivity change.
    pub fn set_connected(&self, connected: bool) {
        let previous = self.connected.swap(connected, Ordering::SeqCst);
        if previous != connected {
            tracing::info!(connected = connected, "Connectivity changed");
        }
    }
}

impl Default for ConnectivityFlag {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Connectivity for ConnectivityFlag {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_toggles() {
        let flag = ConnectivityFlag::default();
        assert!(flag.is_connected());

        flag.set_connected(false);
        assert!(!flag.is_connected());

        flag.set_connected(true);
        assert!(flag.is_connected());
    }
}
