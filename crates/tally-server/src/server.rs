//! HTTP server lifecycle management.
//!
//! Provides [`start_server`], which binds to the configured address and
//! serves until the given shutdown future resolves, and [`serve`] for
//! callers that bring their own listener.
//!
//! Event streams never end on their own, so graceful shutdown first shuts
//! the broadcaster down. Every open bridge then closes, its response body
//! ends, and the connection can drain.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tally_core::ServerConfig;
use tokio::net::TcpListener;
use tracing::info;

use crate::router::build_router;
use crate::state::AppState;

/// Errors that can occur when starting or running the server.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    /// Failed to bind to the network address.
    #[error("bind error: {0}")]
    Bind(String),

    /// The server encountered a fatal error while serving.
    #[error("serve error: {0}")]
    Serve(String),
}

/// Bind to the configured address and serve until `shutdown` resolves.
///
/// # Errors
///
/// Returns an error if the address is invalid, the TCP listener cannot
/// bind, or the server encounters a fatal I/O error.
pub async fn start_server<F>(
    config: &ServerConfig,
    state: Arc<AppState>,
    shutdown: F,
) -> Result<(), StartupError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| StartupError::Bind(format!("invalid address: {e}")))?;

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| StartupError::Bind(format!("bind failed on {addr}: {e}")))?;

    serve(listener, state, shutdown).await
}

/// Serve on an already-bound listener until `shutdown` resolves.
///
/// # Errors
///
/// Returns an error if the server encounters a fatal I/O error.
pub async fn serve<F>(
    listener: TcpListener,
    state: Arc<AppState>,
    shutdown: F,
) -> Result<(), StartupError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener
        .local_addr()
        .map_err(|e| StartupError::Bind(format!("listener has no local address: {e}")))?;
    let router = build_router(Arc::clone(&state));

    info!(%addr, "Tally server listening");

    let broadcaster = Arc::clone(&state.broadcaster);
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            shutdown.await;
            info!("Shutdown requested, closing event streams");
            broadcaster.shutdown();
        })
        .await
        .map_err(|e| StartupError::Serve(format!("serve error: {e}")))?;

    info!("Tally server stopped");
    Ok(())
}
