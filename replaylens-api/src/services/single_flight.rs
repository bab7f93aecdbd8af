//! Per-key async mutexes for coalescing duplicate work.

use dashmap::DashMap;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Serializes work per key. Holders of the same key run one at a time;
/// different keys never contend.
#[derive(Debug)]
pub struct SingleFlight<K: Eq + Hash> {
    inflight: DashMap<K, Arc<Mutex<()>>>,
}

impl<K: Eq + Hash + Clone> Default for SingleFlight<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash + Clone> SingleFlight<K> {
    pub fn new() -> Self {
        Self {
            inflight: DashMap::new(),
        }
    }

    /// Wait for exclusive use of `key`.
    pub async fn acquire(&self, key: &K) -> FlightGuard<'_, K> {
        let lock = Arc::clone(
            self.inflight
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        );
        FlightGuard {
            guard: Some(lock.lock_owned().await),
            key: key.clone(),
            owner: self,
        }
    }

    /// Keys with a holder or waiter.
    pub fn in_flight(&self) -> usize {
        self.inflight.len()
    }
}

/// Releases the key on drop and forgets it once nobody else is waiting.
pub struct FlightGuard<'a, K: Eq + Hash> {
    guard: Option<OwnedMutexGuard<()>>,
    key: K,
    owner: &'a SingleFlight<K>,
}

impl<K: Eq + Hash> Drop for FlightGuard<'_, K> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Only the map still holds the lock: no waiter can be parked on it.
        self.owner
            .inflight
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}
