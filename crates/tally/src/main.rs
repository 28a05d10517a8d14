//! Tally server binary.
//!
//! Serves a single shared counter and pushes every change to all connected
//! browsers over server-sent events.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `tally-config.yaml` (or `$TALLY_CONFIG`)
//! 2. Initialize structured logging (tracing)
//! 3. Build shared state (counter, broadcaster, renderer)
//! 4. Serve HTTP until Ctrl-C / SIGTERM
//! 5. Close every open event stream and drain connections

mod error;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tally_core::TallyConfig;
use tally_server::AppState;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::AppError;

/// Default configuration file, relative to the working directory.
const DEFAULT_CONFIG_PATH: &str = "tally-config.yaml";

/// Application entry point.
///
/// # Errors
///
/// Returns an error if configuration is invalid or the server cannot bind.
#[tokio::main]
async fn main() -> Result<(), AppError> {
    // 1. Load configuration. Logging is not up yet, so report where the
    //    config came from once it is.
    let path = config_path(std::env::var("TALLY_CONFIG").ok());
    let (config, from_file) = load_config(&path)?;

    // 2. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with_target(true)
        .init();

    info!("tally starting");
    if from_file {
        info!(path = %path.display(), "Configuration loaded");
    } else {
        info!(path = %path.display(), "Config file not found, using defaults");
    }
    info!(
        host = config.server.host,
        port = config.server.port,
        max_subscribers = config.stream.max_subscribers,
        keep_alive_secs = config.stream.keep_alive_secs,
        "Effective configuration"
    );

    // 3. Build shared state.
    let state = Arc::new(AppState::new(&config.stream)?);

    // 4. Serve until a shutdown signal arrives.
    tally_server::start_server(&config.server, Arc::clone(&state), shutdown_signal()).await?;

    // 5. Log results.
    info!(
        final_value = state.counter.read(),
        "tally shutdown complete"
    );

    Ok(())
}

/// Resolve the configuration path from an optional override.
fn config_path(override_path: Option<String>) -> PathBuf {
    override_path
        .filter(|p| !p.trim().is_empty())
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from)
}

/// Load configuration from `path`, falling back to defaults (plus
/// environment overrides) when the file does not exist.
///
/// Returns the configuration and whether it came from the file.
fn load_config(path: &Path) -> Result<(TallyConfig, bool), AppError> {
    if path.exists() {
        Ok((TallyConfig::from_file(path)?, true))
    } else {
        Ok((TallyConfig::parse("")?, false))
    }
}

/// Resolve when the process is asked to stop.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Ctrl-C received"),
        () = terminate => info!("SIGTERM received"),
    }
}
