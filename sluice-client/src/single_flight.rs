//! Coalescing of concurrent fetches for the same cache key.
//!
//! The first caller for a key becomes the leader and runs the fetch. Callers
//! that arrive while the leader is still working subscribe to its result and
//! receive an exact copy, success or failure. If the leader's future is
//! dropped before it finishes, the waiters are released with the error
//! produced by the caller-supplied `abandoned` closure.
//!
//! [`forget`](SingleFlight::forget) detaches a running fetch from its key.
//! Callers already waiting still get its result, but later callers start a
//! new fetch instead of joining one that began before a mutation.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use sluice_core::{SluiceError, SluiceResult};
use tokio::sync::broadcast;

type Outcome<T> = SluiceResult<T>;

#[derive(Debug)]
struct Flight<T: Clone> {
    id: u64,
    sender: broadcast::Sender<Outcome<T>>,
}

type FlightMap<T> = Mutex<HashMap<String, Flight<T>>>;

/// Per-key in-flight request map.
#[derive(Debug)]
pub struct SingleFlight<T: Clone> {
    inflight: FlightMap<T>,
    next_id: AtomicU64,
}

impl<T: Clone> Default for SingleFlight<T> {
    fn default() -> Self {
        Self {
            inflight: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }
}

enum Role<T: Clone> {
    Leader(u64, broadcast::Sender<Outcome<T>>),
    Follower(broadcast::Receiver<Outcome<T>>),
}

/// Removes the leader's entry when it finishes or is dropped mid-fetch.
struct LeaderGuard<'a, T: Clone> {
    inflight: &'a FlightMap<T>,
    key: &'a str,
    id: u64,
}

impl<T: Clone> Drop for LeaderGuard<'_, T> {
    fn drop(&mut self) {
        let mut map = self
            .inflight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // A forgotten flight may have been replaced by a newer leader
        if map.get(self.key).is_some_and(|flight| flight.id == self.id) {
            map.remove(self.key);
        }
    }
}

impl<T: Clone> SingleFlight<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys with a fetch currently running.
    pub fn in_flight(&self) -> usize {
        self.lock().len()
    }

    /// Detach the fetch running for `key`, if any. Returns whether one was.
    pub fn forget(&self, key: &str) -> bool {
        self.lock().remove(key).is_some()
    }

    /// Detach every running fetch. Returns how many were.
    pub fn forget_all(&self) -> usize {
        let mut map = self.lock();
        let count = map.len();
        map.clear();
        count
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Flight<T>>> {
        self.inflight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run `fetch` for `key`, or join the fetch already running for it.
    pub async fn run<F, Fut>(
        &self,
        key: &str,
        abandoned: impl FnOnce() -> SluiceError,
        fetch: F,
    ) -> SluiceResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = SluiceResult<T>>,
    {
        let role = {
            let mut map = self.lock();
            match map.get(key) {
                Some(flight) => Role::Follower(flight.sender.subscribe()),
                None => {
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    let (sender, _) = broadcast::channel(1);
                    map.insert(
                        key.to_string(),
                        Flight {
                            id,
                            sender: sender.clone(),
                        },
                    );
                    Role::Leader(id, sender)
                }
            }
        };

        match role {
            Role::Follower(mut receiver) => {
                tracing::debug!(key, "joining in-flight fetch");
                match receiver.recv().await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(abandoned()),
                }
            }
            Role::Leader(id, sender) => {
                let guard = LeaderGuard {
                    inflight: &self.inflight,
                    key,
                    id,
                };
                let outcome = fetch().await;
                // Unregister before publishing so a late caller starts fresh
                // instead of subscribing to a channel that already fired.
                drop(guard);
                // No subscribers is not an error
                let _ = sender.send(outcome.clone());
                outcome
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
