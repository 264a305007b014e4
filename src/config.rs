//! Configuration management for Turnstile.
//!
//! Settings are layered from an optional YAML file and then the process
//! environment. Environment variables are unprefixed and keep their
//! conventional names (`TOKEN_MAX_REQUESTS`, `IP_MAX_REQUESTS`,
//! `BAN_DURATION`, `REDIS_ADDR`, ...). Durations use human-readable forms
//! such as `5s`, `1m` or `1h 30m`.

use serde::{Deserialize, Deserializer};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use axum::http::HeaderName;
use config::{Config, Environment, File, FileFormat};
use tracing::{info, warn};

use crate::error::{Result, TurnstileError};
use crate::http::DEFAULT_IDENTITY_HEADER;
use crate::ratelimit::PolicySet;

/// Main configuration for the Turnstile service.
#[derive(Debug, Clone, Deserialize)]
pub struct TurnstileConfig {
    /// HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Header carrying the API credential
    #[serde(default = "default_identity_header")]
    pub identity_header: String,

    /// Requests allowed per window for a credential
    pub token_max_requests: u64,

    /// Requests allowed per window for a client address
    pub ip_max_requests: u64,

    /// Window length shared by both limits
    #[serde(deserialize_with = "deserialize_duration")]
    pub ban_duration: Duration,

    /// Counter store backend
    #[serde(default)]
    pub store: StoreBackend,

    /// Redis address, `host:port` or a `redis://` URL
    #[serde(default)]
    pub redis_addr: Option<String>,

    /// Prefix for counter keys in Redis
    #[serde(default = "default_redis_key_prefix")]
    pub redis_key_prefix: String,

    /// Deadline for one rate limit check against the store
    #[serde(default, deserialize_with = "deserialize_optional_duration")]
    pub store_timeout: Option<Duration>,

    /// How often the in-memory store evicts expired counters
    #[serde(
        default = "default_sweep_interval",
        deserialize_with = "deserialize_duration"
    )]
    pub sweep_interval: Duration,
}

/// Which counter store backs the rate limiter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Shared Redis server
    #[default]
    Redis,
    /// Process-local memory, counters are lost on restart
    Memory,
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_identity_header() -> String {
    DEFAULT_IDENTITY_HEADER.to_string()
}

fn default_redis_key_prefix() -> String {
    "turnstile:".to_string()
}

fn default_sweep_interval() -> Duration {
    Duration::from_secs(30)
}

fn deserialize_duration<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    humantime::parse_duration(raw.trim()).map_err(serde::de::Error::custom)
}

fn deserialize_optional_duration<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(raw) if !raw.trim().is_empty() => humantime::parse_duration(raw.trim())
            .map(Some)
            .map_err(serde::de::Error::custom),
        _ => Ok(None),
    }
}

impl TurnstileConfig {
    /// Load configuration from an optional file and the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => {
                info!(path = %path.display(), "Loading configuration file");
                let contents = std::fs::read_to_string(path)?;
                Some(contents)
            }
            None => None,
        };
        Self::from_sources(file.as_deref(), Environment::default())
    }

    /// Build configuration from YAML contents layered under an environment source.
    pub fn from_sources(yaml: Option<&str>, environment: Environment) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(yaml) = yaml {
            builder = builder.add_source(File::from_str(yaml, FileFormat::Yaml));
        }

        let config: TurnstileConfig = builder
            .add_source(environment)
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| TurnstileError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Check values that deserialize fine but cannot be served.
    pub fn validate(&self) -> Result<()> {
        if self.ban_duration.is_zero() {
            return Err(TurnstileError::Config(
                "ban_duration must be greater than zero".to_string(),
            ));
        }

        if self.sweep_interval.is_zero() {
            return Err(TurnstileError::Config(
                "sweep_interval must be greater than zero".to_string(),
            ));
        }

        self.identity_header()?;

        if self.store == StoreBackend::Redis
            && self.redis_addr.as_deref().map_or(true, str::is_empty)
        {
            return Err(TurnstileError::Config(
                "redis_addr is required when store is redis".to_string(),
            ));
        }

        if self.token_max_requests == 0 || self.ip_max_requests == 0 {
            warn!(
                token_max_requests = self.token_max_requests,
                ip_max_requests = self.ip_max_requests,
                "A limit of zero rejects every request of that kind"
            );
        }

        Ok(())
    }

    /// The credential header as a typed header name.
    pub fn identity_header(&self) -> Result<HeaderName> {
        HeaderName::try_from(self.identity_header.as_str()).map_err(|e| {
            TurnstileError::Config(format!(
                "invalid identity_header {:?}: {}",
                self.identity_header, e
            ))
        })
    }

    /// Rate limit policies derived from the configured limits.
    pub fn policies(&self) -> PolicySet {
        PolicySet::new(
            self.token_max_requests,
            self.ip_max_requests,
            self.ban_duration,
        )
    }
}
