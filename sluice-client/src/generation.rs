//! Per-key invalidation generations.
//!
//! A fetch records the generation of its key before it starts. Invalidation
//! bumps the generation, so a fetch that finishes afterwards can tell its
//! result predates the mutation and must not be cached.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
pub struct Generations {
    counters: Mutex<HashMap<String, u64>>,
}

impl Generations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current generation of `key`. Keys never bumped are at zero.
    pub fn current(&self, key: &str) -> u64 {
        self.lock().get(key).copied().unwrap_or(0)
    }

    /// Advance the generation of `key` and return the new value.
    pub fn bump(&self, key: &str) -> u64 {
        let mut counters = self.lock();
        let counter = counters.entry(key.to_string()).or_insert(0);
        *counter += 1;
        *counter
    }

    pub fn is_current(&self, key: &str, generation: u64) -> bool {
        self.current(key) == generation
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, u64>> {
        self.counters
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
