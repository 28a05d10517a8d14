//! Error types for the HTTP layer.
//!
//! [`ServerError`] unifies handler failure modes into a single enum that
//! converts into an Axum HTTP response via its
//! [`IntoResponse`](axum::response::IntoResponse) implementation.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tally_core::{BroadcastError, ConfigError, RenderError};

/// Errors that can occur while handling a request.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The counter could not be rendered.
    #[error("render error: {0}")]
    Render(#[from] RenderError),

    /// A new event stream could not be opened.
    #[error("stream unavailable: {0}")]
    Stream(#[from] BroadcastError),

    /// The stream settings are out of range.
    #[error("invalid stream settings: {0}")]
    Config(#[from] ConfigError),

    /// The built-in templates failed to compile.
    #[error("template error: {0}")]
    Template(String),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Render(_) | Self::Config(_) | Self::Template(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Stream(_) => StatusCode::SERVICE_UNAVAILABLE,
        };

        let body = serde_json::json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        });

        (status, axum::Json(body)).into_response()
    }
}
