//! Restart policy for the worker.
//!
//! The worker remembers, per key, the timestamp it was first asked about. A
//! later request with a newer timestamp for the same key means whatever the
//! worker loaded for that key is out of date and the process must be replaced.
//! Keys are tracked independently, so a change to one module only forces a
//! restart once that module is actually requested again.

use std::collections::HashMap;
use std::time::SystemTime;

/// What to do with the current worker before serving a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Staleness {
    /// Key never seen by this worker: remember it, keep the worker.
    Register,
    /// Incoming timestamp is the same as or older than the recorded one: keep
    /// the worker.
    Fresh,
    /// Incoming timestamp is newer than the recorded one: replace the worker.
    Restart,
}

/// Key → timestamp table owned by one worker instance.
#[derive(Debug, Clone, Default)]
pub struct StalenessTable {
    keys: HashMap<String, SystemTime>,
}

impl StalenessTable {
    /// Table for a freshly spawned worker, holding only the key that caused
    /// the spawn.
    pub fn seeded(key: &str, timestamp: SystemTime) -> Self {
        let mut table = Self::default();
        table.keys.insert(key.to_string(), timestamp);
        table
    }

    /// Decide without mutating.
    pub fn decide(&self, key: &str, timestamp: SystemTime) -> Staleness {
        decide(self.keys.get(key).copied(), timestamp)
    }

    /// Decide, and record the key if it was unknown.
    pub fn observe(&mut self, key: &str, timestamp: SystemTime) -> Staleness {
        let decision = self.decide(key, timestamp);
        if decision == Staleness::Register {
            self.keys.insert(key.to_string(), timestamp);
        }
        decision
    }

    pub fn get(&self, key: &str) -> Option<SystemTime> {
        self.keys.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// The policy itself.
pub fn decide(recorded: Option<SystemTime>, incoming: SystemTime) -> Staleness {
    match recorded {
        None => Staleness::Register,
        Some(recorded) if incoming > recorded => Staleness::Restart,
        Some(_) => Staleness::Fresh,
    }
}
