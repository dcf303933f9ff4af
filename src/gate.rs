//! Per-key async gates.
//!
//! A read-through miss holds the gate for its cache key while it loads and
//! stores, so concurrent misses on that key collapse into one load. Write-through
//! mutations take the same gate, so a load that started before a write cannot
//! overwrite the write's cache update with an older snapshot.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Default)]
pub(crate) struct KeyGates {
    gates: DashMap<String, Arc<Mutex<()>>>,
}

impl KeyGates {
    pub(crate) fn new() -> Self {
        KeyGates {
            gates: DashMap::new(),
        }
    }

    /// Wait for exclusive use of `key`.
    ///
    /// Dropping the returned future while it waits still releases the gate's
    /// table entry.
    pub(crate) async fn acquire(&self, key: &str) -> GateGuard<'_> {
        let gate = self.gates.entry(key.to_string()).or_default().clone();
        // Cleans up on drop whether or not the lock was ever obtained.
        let mut pending = GateGuard {
            gates: self,
            key: key.to_string(),
            guard: None,
        };
        pending.guard = Some(gate.lock_owned().await);
        pending
    }

    /// Number of gates currently held or awaited.
    #[cfg(test)]
    pub(crate) fn active(&self) -> usize {
        self.gates.len()
    }
}

pub(crate) struct GateGuard<'a> {
    gates: &'a KeyGates,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // The table holds one reference; any other means a task is still waiting.
        self.gates
            .gates
            .remove_if(&self.key, |_, gate| Arc::strong_count(gate) == 1);
    }
}
