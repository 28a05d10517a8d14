//! Axum router construction.
//!
//! Assembles all routes into a single [`Router`] with CORS and request
//! tracing middleware.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::sse;
use crate::state::AppState;

/// Build the complete Axum router.
///
/// The router includes:
/// - `GET /` -- counter page
/// - `POST /increment` -- increment and announce
/// - `GET /sse` -- server-sent event stream of counter updates
/// - `GET /api/counter` -- current value as JSON
///
/// CORS allows any origin so the stream can be consumed from other pages.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handlers::index))
        .route("/increment", post(handlers::increment))
        .route("/sse", get(sse::stream_counter))
        .route("/api/counter", get(handlers::get_counter))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
