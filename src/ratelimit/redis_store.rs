//! Redis-backed counter store.
//!
//! Counters map directly onto Redis integer keys: `GET` reads a count,
//! `INCR` atomically increments (creating the key at 1), and `PEXPIRE` sets
//! the window. Redis' own key expiry resets the counter, so several
//! Turnstile instances pointed at the same server share one set of windows.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisError};
use tracing::info;

use super::store::{CounterStore, StoreError};

/// Configuration for Redis storage.
#[derive(Debug, Clone)]
pub struct RedisStoreConfig {
    /// Prefix prepended to every counter key (default: "turnstile:").
    ///
    /// Set it to an empty string to use bare `ip:<addr>` and `token:<value>`
    /// keys, e.g. to share counters with deployments that write them unprefixed.
    pub key_prefix: String,
}

impl Default for RedisStoreConfig {
    fn default() -> Self {
        Self {
            key_prefix: "turnstile:".to_string(),
        }
    }
}

/// Counter store backed by a Redis server.
///
/// Cloning is cheap; clones share the same multiplexed connection.
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
    config: RedisStoreConfig,
}

impl fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Connect to Redis with default configuration.
    ///
    /// `addr` is either a `redis://` URL or a bare `host:port`.
    pub async fn connect(addr: &str) -> Result<Self, StoreError> {
        Self::connect_with_config(addr, RedisStoreConfig::default()).await
    }

    /// Connect to Redis with custom configuration.
    ///
    /// The connection is verified with `PING` before returning.
    pub async fn connect_with_config(
        addr: &str,
        config: RedisStoreConfig,
    ) -> Result<Self, StoreError> {
        let url = connection_url(addr);
        let client = Client::open(url.as_str())?;
        let mut connection = ConnectionManager::new(client).await?;

        let pong: String = redis::cmd("PING").query_async(&mut connection).await?;
        info!(addr = %addr, reply = %pong, "Connected to Redis");

        Ok(Self { connection, config })
    }

    fn key(&self, key: &str) -> String {
        format!("{}{}", self.config.key_prefix, key)
    }
}

#[async_trait]
impl CounterStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<u64>, StoreError> {
        let mut conn = self.connection.clone();
        let count: Option<u64> = conn.get(self.key(key)).await?;
        Ok(count)
    }

    async fn increment(&self, key: &str) -> Result<u64, StoreError> {
        let mut conn = self.connection.clone();
        let count: u64 = conn.incr(self.key(key), 1u64).await?;
        Ok(count)
    }

    async fn set_expiry(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        let millis = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX).max(1);
        // PEXPIRE replies 0 for a missing key, which is not an error here
        let _: bool = conn.pexpire(self.key(key), millis).await?;
        Ok(())
    }
}

impl From<RedisError> for StoreError {
    fn from(err: RedisError) -> Self {
        if err.is_io_error()
            || err.is_connection_refusal()
            || err.is_connection_dropped()
            || err.is_timeout()
        {
            StoreError::Unavailable(err.to_string())
        } else {
            StoreError::OperationFailed(err.to_string())
        }
    }
}

/// Normalize a Redis address into a connection URL.
fn connection_url(addr: &str) -> String {
    if addr.contains("://") {
        addr.to_string()
    } else {
        format!("redis://{}/", addr)
    }
}
