//! Shared application state.
//!
//! [`AppState`] owns the counter, the broadcaster every stream subscribes
//! to, and the renderer. It is wrapped in [`Arc`] and injected via Axum's
//! `State` extractor.

use std::sync::Arc;

use tally_core::{Broadcaster, CounterCell, StreamConfig};

use crate::error::ServerError;
use crate::render::HtmlRenderer;

/// Shared state for the Axum application.
#[derive(Debug)]
pub struct AppState {
    /// The shared counter. Only [`AppState::increment`] writes it.
    pub counter: CounterCell,
    /// Fan-out hub for counter updates.
    pub broadcaster: Arc<Broadcaster>,
    /// Fragment and page renderer, shared with every stream.
    pub renderer: Arc<HtmlRenderer>,
    /// Event stream settings.
    pub stream: StreamConfig,
}

impl AppState {
    /// Create state with the counter at zero.
    pub fn new(stream: &StreamConfig) -> Result<Self, ServerError> {
        Self::with_initial(0, stream)
    }

    /// Create state with the counter at `initial`.
    ///
    /// Rejects stream settings that [`StreamConfig::validate`] refuses.
    pub fn with_initial(initial: u64, stream: &StreamConfig) -> Result<Self, ServerError> {
        stream.validate()?;
        Ok(Self {
            counter: CounterCell::new(initial),
            broadcaster: Arc::new(Broadcaster::with_capacity_limit(stream.max_subscribers)),
            renderer: Arc::new(HtmlRenderer::new()?),
            stream: stream.clone(),
        })
    }

    /// Increment the counter and announce the new value to every stream.
    ///
    /// Returns the value this call produced. Never waits on subscribers.
    pub fn increment(&self) -> u64 {
        let value = self.counter.increment();
        let subscribers = self.broadcaster.notify_mutation_occurred(value);
        tracing::debug!(value, subscribers, "Counter incremented");
        value
    }
}
