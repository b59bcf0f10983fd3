//! Silence detection for remote entities.

use std::time::{Duration, Instant};

use crate::store::EntityStore;

/// Evicts entities that have not updated within the timeout.
///
/// An evicted entity leaves the store, so it cannot be reported twice. If it
/// starts sending again it is re-created and a later silence is reported anew.
/// Nothing is retained per departed id.
#[derive(Debug, Clone, Copy)]
pub struct DisconnectMonitor {
    timeout: Duration,
}

impl DisconnectMonitor {
    /// Create a monitor with the given silence timeout.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Remove every non-exempt entity silent for longer than the timeout and
    /// return their ids.
    pub fn sweep(&self, store: &mut EntityStore, now: Instant) -> Vec<String> {
        let stale: Vec<String> = store
            .iter()
            .filter(|e| !e.exempt && now.saturating_duration_since(e.last_update) > self.timeout)
            .map(|e| e.id.clone())
            .collect();

        for id in &stale {
            store.remove(id);
            tracing::warn!(entity = %id, timeout = ?self.timeout, "Remote entity timed out");
        }
        stale
    }
}
