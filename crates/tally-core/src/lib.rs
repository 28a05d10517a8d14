//! Core of the Tally live counter.
//!
//! A single shared counter whose every change is pushed to any number of
//! connected observers as server-sent events.
//!
//! - [`cell`] -- the [`CounterCell`] holding the value (atomic read and
//!   increment)
//! - [`broadcast`] -- the [`Broadcaster`] fan-out hub with coalescing
//!   per-subscriber slots and scoped [`Subscription`]s
//! - [`bridge`] -- the per-connection [`SubscriptionBridge`] turning
//!   updates into frames
//! - [`frame`] -- server-sent event framing
//! - [`config`] -- typed configuration loaded from `tally-config.yaml`
//!
//! # Flow
//!
//! ```text
//! POST /increment -> CounterCell::increment -> Broadcaster::publish
//!     -> subscriber slots -> SubscriptionBridge -> Frame -> connection
//! ```
//!
//! The core never renders anything itself: the presentation layer passes a
//! [`Render`] implementation to each bridge.

pub mod bridge;
pub mod broadcast;
pub mod cell;
pub mod config;
pub mod frame;

// Re-export primary types for convenience.
pub use bridge::{
    BridgeOptions, BridgeState, CloseReason, Render, RenderError, RenderFn, SubscriptionBridge,
};
pub use broadcast::{BroadcastError, Broadcaster, SubscriberId, Subscription};
pub use cell::CounterCell;
pub use config::{ConfigError, LoggingConfig, ServerConfig, StreamConfig, TallyConfig};
pub use frame::Frame;
