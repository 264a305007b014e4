//! HTTP server implementation.

use std::future::Future;
use std::net::SocketAddr;

use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tracing::{error, info};

use super::middleware::{admit, Admission};
use crate::error::{Result, TurnstileError};

/// Build the application router with every route behind admission control.
pub fn build_router(admission: Admission) -> Router {
    Router::new()
        .route("/", get(welcome))
        .layer(axum::middleware::from_fn_with_state(admission, admit))
}

async fn welcome() -> &'static str {
    "All good - you may continue"
}

/// HTTP server fronted by the admission middleware.
pub struct HttpServer {
    /// Address to bind to
    addr: SocketAddr,
    /// The application router
    router: Router,
}

impl HttpServer {
    /// Create a new HTTP server.
    pub fn new(addr: SocketAddr, admission: Admission) -> Self {
        Self {
            addr,
            router: build_router(admission),
        }
    }

    /// Start the HTTP server with graceful shutdown.
    ///
    /// The server will shut down when the provided signal resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.addr).await.map_err(|e| {
            error!(addr = %self.addr, error = %e, "Failed to bind HTTP listener");
            TurnstileError::Io(e)
        })?;
        self.serve_on(listener, signal).await
    }

    /// Serve on an already bound listener.
    pub async fn serve_on<F>(self, listener: TcpListener, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        info!(addr = %addr, "Starting HTTP server");

        axum::serve(
            listener,
            self.router
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(signal)
        .await
        .map_err(|e| {
            error!(error = %e, "HTTP server failed");
            TurnstileError::Io(e)
        })
    }
}
