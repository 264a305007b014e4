//! Counter store trait for abstracting counter persistence.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Errors returned by a counter store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The store could not be reached (connection refused, dropped, timed out)
    #[error("counter store unavailable: {0}")]
    Unavailable(String),

    /// The store was reached but rejected or failed the operation
    #[error("counter store operation failed: {0}")]
    OperationFailed(String),
}

/// Trait for counter store implementations.
///
/// Counters are integers identified by a string key, with an optional
/// time-to-live after which the key disappears. Implementations must be
/// safe for concurrent use and `increment` must be atomic: the rate limiter
/// relies on it instead of locking.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Get the current count for a key.
    ///
    /// Returns `Ok(None)` when the key is absent or has expired.
    async fn get(&self, key: &str) -> Result<Option<u64>, StoreError>;

    /// Atomically increment a key by one, creating it at 1 if absent.
    ///
    /// Returns the new value. The key's expiry is left untouched.
    async fn increment(&self, key: &str) -> Result<u64, StoreError>;

    /// Set or overwrite the time-to-live of an existing key.
    ///
    /// Setting an expiry on a missing key is a no-op.
    async fn set_expiry(&self, key: &str, ttl: Duration) -> Result<(), StoreError>;
}
