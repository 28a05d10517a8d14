//! Server-sent event stream of counter updates.
//!
//! Clients connect to `GET /sse` and receive one `message` event carrying
//! the rendered counter fragment each time the counter changes. A slow
//! client only ever has the latest value pending; it never holds up the
//! increment handler or other clients.
//!
//! Each connection gets its own task running a [`SubscriptionBridge`]
//! into a small bounded channel that feeds the response body. When the
//! client goes away the body, and with it the channel's receiver, is
//! dropped. The bridge is cancelled at that moment, even while it is
//! parked waiting for a value, and unregisters.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use tally_core::{Frame, SubscriptionBridge};
use tokio::sync::mpsc;
use tokio_util::sync::PollSender;
use tracing::{debug, warn};

use crate::error::ServerError;
use crate::state::AppState;

/// Open an event stream for one client.
///
/// # Route
///
/// `GET /sse`
///
/// Responds `503 Service Unavailable` when the configured stream limit
/// is reached or the server is shutting down.
pub async fn stream_counter(State(state): State<Arc<AppState>>) -> Result<Response, ServerError> {
    let bridge = SubscriptionBridge::open(
        &state.broadcaster,
        Arc::clone(&state.renderer),
        state.stream.bridge_options(),
    )
    .inspect_err(|e| warn!(error = %e, "Refusing event stream"))?;

    let subscriber = bridge.subscriber_id();
    let (tx, rx) = mpsc::channel::<Frame>(state.stream.write_buffer);
    let closed = tx.clone();

    tokio::spawn(async move {
        let reason = bridge
            .run_until(PollSender::new(tx), async move { closed.closed().await })
            .await;
        debug!(subscriber = ?subscriber, ?reason, "Event stream finished");
    });

    let frames = futures::stream::unfold(rx, |mut rx| async move {
        let frame = rx.recv().await?;
        Some((Ok::<_, Infallible>(frame.into_bytes()), rx))
    });

    Ok((
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(frames),
    )
        .into_response())
}
