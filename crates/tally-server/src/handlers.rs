//! Page and mutation handlers.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/` | Full page showing the current value |
//! | `POST` | `/increment` | Increment, announce, and return the new markup |
//! | `GET` | `/api/counter` | Current value and stream count as JSON |

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{Html, IntoResponse};
use axum::Json;

use crate::error::ServerError;
use crate::state::AppState;

/// Header HTMX sets on every request it issues.
const HX_REQUEST: &str = "hx-request";

/// JSON body for `GET /api/counter`.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct CounterResponse {
    /// Current counter value.
    pub value: u64,
    /// Number of open event streams.
    pub subscribers: usize,
}

/// Serve the full page with the value in effect right now.
///
/// This is also how a new observer learns the starting value: the
/// stream it opens afterwards only carries later changes.
pub async fn index(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ServerError> {
    let value = state.counter.read();
    Ok(Html(state.renderer.page(value)?))
}

/// Increment the counter and notify every stream.
///
/// HTMX requests get only the counter fragment to swap in place; plain
/// form posts get the whole page.
pub async fn increment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ServerError> {
    let value = state.increment();

    let is_htmx = headers
        .get(HX_REQUEST)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("true"));

    let body = if is_htmx {
        state.renderer.counter_fragment(value)?
    } else {
        state.renderer.page(value)?
    };
    Ok(Html(body))
}

/// Return the current value and the number of open streams.
pub async fn get_counter(State(state): State<Arc<AppState>>) -> Json<CounterResponse> {
    Json(CounterResponse {
        value: state.counter.read(),
        subscribers: state.broadcaster.subscriber_count(),
    })
}
