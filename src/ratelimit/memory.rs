//! In-memory counter store.
//!
//! Counters live in a sharded concurrent map. Expiry is checked lazily on
//! every access and, optionally, by a background sweeper that evicts elapsed
//! entries so idle keys do not accumulate.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::trace;

use super::store::{CounterStore, StoreError};

/// State of a single counter.
#[derive(Debug, Clone, Copy)]
struct Slot {
    count: u64,
    expires_at: Option<Instant>,
}

impl Slot {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// A counter store held in process memory.
///
/// Uses the tokio clock, so paused-time tests can step through windows.
/// Counters are not shared between processes.
#[derive(Debug, Default)]
pub struct MemoryStore {
    slots: DashMap<String, Slot>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the live count for a key, if any.
    pub fn count(&self, key: &str) -> Option<u64> {
        let now = Instant::now();
        self.slots
            .get(key)
            .filter(|slot| !slot.is_expired(now))
            .map(|slot| slot.count)
    }

    /// Get the remaining time-to-live of a key.
    ///
    /// Returns `None` when the key is absent, expired, or has no expiry.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let slot = self.slots.get(key)?;
        let expires_at = slot.expires_at?;
        (expires_at > now).then(|| expires_at - now)
    }

    /// Number of stored entries, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Check if the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Evict every expired entry, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.slots.len();
        self.slots.retain(|_, slot| !slot.is_expired(now));
        before.saturating_sub(self.slots.len())
    }

    /// Spawn a task that evicts expired entries every `interval`.
    ///
    /// The task only holds a weak reference and exits once the store is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let store = Arc::downgrade(self);
        let interval = interval.max(Duration::from_millis(1));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(store) = store.upgrade() else {
                    break;
                };

                let evicted = store.purge_expired();
                if evicted > 0 {
                    trace!(evicted = evicted, remaining = store.len(), "Evicted expired counters");
                }
            }
        })
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<u64>, StoreError> {
        let now = Instant::now();
        let live = match self.slots.get(key) {
            Some(slot) if slot.is_expired(now) => None,
            Some(slot) => return Ok(Some(slot.count)),
            None => return Ok(None),
        };

        // The read guard is released before removal to avoid a shard deadlock
        self.slots.remove_if(key, |_, slot| slot.is_expired(now));
        Ok(live)
    }

    async fn increment(&self, key: &str) -> Result<u64, StoreError> {
        let now = Instant::now();
        let count = match self.slots.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                let slot = entry.get_mut();
                if slot.is_expired(now) {
                    *slot = Slot {
                        count: 1,
                        expires_at: None,
                    };
                } else {
                    slot.count = slot.count.saturating_add(1);
                }
                slot.count
            }
            Entry::Vacant(entry) => {
                entry.insert(Slot {
                    count: 1,
                    expires_at: None,
                });
                1
            }
        };
        Ok(count)
    }

    async fn set_expiry(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        let now = Instant::now();
        if let Some(mut slot) = self.slots.get_mut(key) {
            if !slot.is_expired(now) {
                slot.expires_at = Some(now + ttl);
            }
        }
        Ok(())
    }
}
