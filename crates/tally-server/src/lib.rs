//! HTTP front end for the Tally live counter.
//!
//! This crate provides an Axum HTTP server that exposes:
//!
//! - **Counter page** (`GET /`) rendered with `minijinja`, wired to HTMX
//!   and its SSE extension
//! - **Mutation endpoint** (`POST /increment`) that increments the shared
//!   counter and announces the new value
//! - **Event stream** (`GET /sse`) delivering every change as a
//!   server-sent event, one [`SubscriptionBridge`] per connection
//! - **JSON endpoint** (`GET /api/counter`) for scripts and health checks
//!
//! # Architecture
//!
//! All broadcast logic lives in [`tally_core`]. This crate only renders
//! markup, maps HTTP onto the core's two entry points (increment and
//! publish, and the [`Render`] hook), and moves frames onto the wire.
//!
//! [`SubscriptionBridge`]: tally_core::SubscriptionBridge
//! [`Render`]: tally_core::Render

pub mod error;
pub mod handlers;
pub mod render;
pub mod router;
pub mod server;
pub mod sse;
pub mod state;

// Re-export primary types for convenience.
pub use error::ServerError;
pub use render::HtmlRenderer;
pub use router::build_router;
pub use server::{serve, start_server, StartupError};
pub use state::AppState;
