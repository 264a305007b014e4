use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use turnstile::config::{StoreBackend, TurnstileConfig};
use turnstile::error::TurnstileError;
use turnstile::http::{Admission, HttpServer};
use turnstile::ratelimit::{CounterStore, MemoryStore, RateLimiter, RedisStore, RedisStoreConfig};

/// HTTP admission control with per-key fixed-window rate limits.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// YAML configuration file; environment variables override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);
    if args.json_logs {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    info!("Starting Turnstile");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = TurnstileConfig::load(args.config.as_deref())?;
    info!(
        listen_addr = %config.listen_addr,
        store = ?config.store,
        token_max_requests = config.token_max_requests,
        ip_max_requests = config.ip_max_requests,
        ban_duration = %humantime::format_duration(config.ban_duration),
        "Configuration loaded"
    );

    let store: Arc<dyn CounterStore> = match config.store {
        StoreBackend::Redis => {
            let addr = config.redis_addr.as_deref().unwrap_or_default();
            let redis_config = RedisStoreConfig {
                key_prefix: config.redis_key_prefix.clone(),
            };
            let store = RedisStore::connect_with_config(addr, redis_config)
                .await
                .map_err(TurnstileError::Store)?;
            Arc::new(store)
        }
        StoreBackend::Memory => {
            let store = Arc::new(MemoryStore::new());
            store.spawn_sweeper(config.sweep_interval);
            store
        }
    };

    let rate_limiter = Arc::new(RateLimiter::new(store, config.policies()));
    info!("Rate limiter initialized");

    let mut admission =
        Admission::new(rate_limiter).with_identity_header(config.identity_header()?);
    if let Some(timeout) = config.store_timeout {
        admission = admission.with_store_timeout(timeout);
    }

    let server = HttpServer::new(config.listen_addr, admission);

    // Run the server with graceful shutdown on Ctrl+C
    server.serve_with_shutdown(shutdown_signal()).await?;

    info!("Turnstile stopped");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
