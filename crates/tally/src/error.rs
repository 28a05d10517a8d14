//! Error types for the Tally binary.
//!
//! [`AppError`] is the top-level error type that wraps all possible
//! failure modes during startup and serving.

/// Top-level error for the Tally binary.
///
/// Each variant wraps a specific subsystem error, providing a single
/// error type that `main` can propagate with `?`.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: tally_core::ConfigError,
    },

    /// Application state could not be built.
    #[error("state error: {source}")]
    State {
        /// The underlying server error.
        #[from]
        source: tally_server::ServerError,
    },

    /// The HTTP server failed to bind or serve.
    #[error("server error: {source}")]
    Server {
        /// The underlying startup error.
        #[from]
        source: tally_server::StartupError,
    },
}
