//! Per-connection adapter from counter updates to event frames.
//!
//! A [`SubscriptionBridge`] owns one [`Subscription`] for the lifetime of
//! one streaming connection. It moves through an explicit state machine:
//!
//! ```text
//! open() --subscribe--> Waiting --value--> Emitting --written--> Waiting
//!                          |                   |
//!                          +---- closed / write failure / cancel ----> Closing --> Closed
//! ```
//!
//! Acquiring the subscription happens inside
//! [`open`](SubscriptionBridge::open), so a bridge value starts in Waiting.
//!
//! The subscription is released when the bridge enters Closing, on every
//! path: [`run`](SubscriptionBridge::run) returning, an explicit
//! [`close`](SubscriptionBridge::close), or the bridge being dropped
//! mid-await when its task is aborted.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::{Sink, SinkExt as _};
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, warn};

use crate::broadcast::{BroadcastError, Broadcaster, SubscriberId, Subscription};
use crate::frame::Frame;

/// Turns a counter value into the text carried by one event frame.
///
/// Supplied by the presentation layer. Implementations must be pure; a
/// failure skips one emission for one subscriber and is otherwise
/// harmless.
pub trait Render: Send + Sync {
    /// Render `value` for the wire.
    fn render(&self, value: u64) -> Result<String, RenderError>;
}

impl<T: Render + ?Sized> Render for Arc<T> {
    fn render(&self, value: u64) -> Result<String, RenderError> {
        (**self).render(value)
    }
}

/// Adapter implementing [`Render`] for a plain function or closure.
#[derive(Debug, Clone, Copy)]
pub struct RenderFn<F>(pub F);

impl<F> Render for RenderFn<F>
where
    F: Fn(u64) -> Result<String, RenderError> + Send + Sync,
{
    fn render(&self, value: u64) -> Result<String, RenderError> {
        (self.0)(value)
    }
}

/// Longest keep-alive period a bridge accepts. Longer periods are
/// clamped to it.
pub const MAX_KEEP_ALIVE: Duration = Duration::from_secs(86_400);

/// A value could not be rendered.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("render failed: {0}")]
pub struct RenderError(pub String);

/// Lifecycle of a [`SubscriptionBridge`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    /// Suspended until a value arrives or the connection goes away.
    Waiting,
    /// Rendering and handing a frame to the transport.
    Emitting,
    /// Releasing the subscription. No further frames are produced.
    Closing,
    /// Terminal.
    Closed,
}

/// Why a bridge stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Writing a frame to the connection failed.
    WriteFailed,
    /// The network layer cancelled the stream.
    Cancelled,
    /// The subscriber was removed or the broadcaster shut down.
    BroadcasterClosed,
    /// The bridge was dropped while still open.
    Dropped,
}

/// Tunables for one bridge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeOptions {
    /// Emit a comment frame after this much idle time. `None` or zero
    /// disables keep-alives. Capped at [`MAX_KEEP_ALIVE`].
    pub keep_alive: Option<Duration>,
}

/// What woke the bridge from Waiting.
enum Wake {
    Value(Option<u64>),
    KeepAlive,
}

/// Per-connection loop translating counter updates into event frames.
#[derive(Debug)]
pub struct SubscriptionBridge<R: Render> {
    subscription: Option<Subscription>,
    renderer: R,
    state: BridgeState,
    keep_alive: Option<Interval>,
    emitted: u64,
    skipped: u64,
}

impl<R: Render> SubscriptionBridge<R> {
    /// Open a bridge: register a subscriber and enter Waiting.
    ///
    /// Must be called from within a Tokio runtime when keep-alives are
    /// enabled.
    pub fn open(
        broadcaster: &Arc<Broadcaster>,
        renderer: R,
        options: BridgeOptions,
    ) -> Result<Self, BroadcastError> {
        let subscription = broadcaster.subscribe()?;

        let keep_alive = options
            .keep_alive
            .filter(|period| !period.is_zero())
            .map(|period| {
                let mut ticker = tokio::time::interval(period.min(MAX_KEEP_ALIVE));
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                // The first tick would fire immediately; push it out one period.
                ticker.reset();
                ticker
            });

        debug!(subscriber = %subscription.id(), "Subscription bridge opened");

        Ok(Self {
            subscription: Some(subscription),
            renderer,
            state: BridgeState::Waiting,
            keep_alive,
            emitted: 0,
            skipped: 0,
        })
    }

    /// Current lifecycle state.
    pub const fn state(&self) -> BridgeState {
        self.state
    }

    /// The subscriber this bridge holds, until it closes.
    pub fn subscriber_id(&self) -> Option<SubscriberId> {
        self.subscription.as_ref().map(Subscription::id)
    }

    /// Values skipped because rendering failed.
    pub const fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Wait for the next frame to send.
    ///
    /// Returns `None` once the bridge is closed. Cancel-safe: dropping
    /// the future loses no value, the next call picks up the latest one.
    pub async fn next_frame(&mut self) -> Option<Frame> {
        loop {
            let subscription = self.subscription.as_mut()?;
            let id = subscription.id();
            self.state = BridgeState::Waiting;

            let wake = match self.keep_alive.as_mut() {
                Some(ticker) => tokio::select! {
                    biased;
                    value = subscription.recv() => Wake::Value(value),
                    _ = ticker.tick() => Wake::KeepAlive,
                },
                None => Wake::Value(subscription.recv().await),
            };

            let value = match wake {
                Wake::KeepAlive => {
                    self.state = BridgeState::Emitting;
                    return Some(Frame::comment("keep-alive"));
                }
                Wake::Value(None) => {
                    self.close(CloseReason::BroadcasterClosed);
                    return None;
                }
                Wake::Value(Some(value)) => value,
            };

            self.state = BridgeState::Emitting;
            match self.renderer.render(value) {
                Ok(payload) => {
                    if let Some(ticker) = self.keep_alive.as_mut() {
                        ticker.reset();
                    }
                    return Some(Frame::data(&payload));
                }
                Err(e) => {
                    warn!(subscriber = %id, value, error = %e, "Skipping counter update");
                    self.skipped = self.skipped.saturating_add(1);
                }
            }
        }
    }

    /// Drive the bridge until the broadcaster closes or a write fails.
    pub async fn run<S>(self, sink: S) -> CloseReason
    where
        S: Sink<Frame> + Unpin,
    {
        self.run_until(sink, std::future::pending::<()>()).await
    }

    /// Drive the bridge until `cancel` resolves, the broadcaster closes,
    /// or a write fails. The subscription is released before returning.
    pub async fn run_until<S, C>(mut self, mut sink: S, cancel: C) -> CloseReason
    where
        S: Sink<Frame> + Unpin,
        C: Future<Output = ()>,
    {
        let mut cancel = std::pin::pin!(cancel);

        let reason = loop {
            let next = tokio::select! {
                biased;
                () = &mut cancel => None,
                frame = self.next_frame() => Some(frame),
            };
            let frame = match next {
                None => break CloseReason::Cancelled,
                Some(None) => break CloseReason::BroadcasterClosed,
                Some(Some(frame)) => frame,
            };

            let written = tokio::select! {
                biased;
                () = &mut cancel => None,
                result = sink.send(frame) => Some(result.is_ok()),
            };
            match written {
                None => break CloseReason::Cancelled,
                Some(false) => break CloseReason::WriteFailed,
                Some(true) => self.emitted = self.emitted.saturating_add(1),
            }
        };

        self.close(reason);
        reason
    }

    /// Enter Closing: release the subscription and stop producing frames.
    ///
    /// Idempotent.
    pub fn close(&mut self, reason: CloseReason) {
        let Some(subscription) = self.subscription.take() else {
            return;
        };
        self.state = BridgeState::Closing;

        let id = subscription.id();
        // Dropping the subscription unregisters it from the broadcaster.
        drop(subscription);
        self.keep_alive = None;
        self.state = BridgeState::Closed;

        debug!(
            subscriber = %id,
            ?reason,
            emitted = self.emitted,
            skipped = self.skipped,
            "Subscription bridge closed"
        );
    }
}

impl<R: Render> Drop for SubscriptionBridge<R> {
    fn drop(&mut self) {
        self.close(CloseReason::Dropped);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use futures::channel::{mpsc, oneshot};
    use futures::StreamExt as _;
    use tokio::time::timeout;

    use super::*;

    const WAIT: Duration = Duration::from_secs(1);

    type Plain = RenderFn<fn(u64) -> Result<String, RenderError>>;

    fn render_plain(value: u64) -> Result<String, RenderError> {
        Ok(value.to_string())
    }

    fn plain() -> Plain {
        RenderFn(render_plain as fn(u64) -> Result<String, RenderError>)
    }

    fn open(hub: &Arc<Broadcaster>) -> SubscriptionBridge<Plain> {
        SubscriptionBridge::open(hub, plain(), BridgeOptions::default()).unwrap()
    }

    #[tokio::test]
    async fn open_registers_and_waits() {
        let hub = Arc::new(Broadcaster::new());
        let bridge = open(&hub);

        assert_eq!(bridge.state(), BridgeState::Waiting);
        assert!(bridge.subscriber_id().is_some());
        assert_eq!(hub.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn published_value_becomes_data_frame() {
        let hub = Arc::new(Broadcaster::new());
        let mut bridge = open(&hub);

        hub.publish(1);
        let frame = timeout(WAIT, bridge.next_frame()).await.unwrap().unwrap();
        assert_eq!(frame.as_str(), "data: 1\n\n");
        assert_eq!(bridge.state(), BridgeState::Emitting);
    }

    #[tokio::test]
    async fn coalesced_values_emit_only_latest() {
        let hub = Arc::new(Broadcaster::new());
        let mut bridge = open(&hub);

        hub.publish(1);
        let first = timeout(WAIT, bridge.next_frame()).await.unwrap().unwrap();
        hub.publish(2);
        hub.publish(3);
        let second = timeout(WAIT, bridge.next_frame()).await.unwrap().unwrap();

        assert_eq!(first.as_str(), "data: 1\n\n");
        assert_eq!(second.as_str(), "data: 3\n\n");
    }

    #[tokio::test]
    async fn render_failure_skips_one_value() {
        let hub = Arc::new(Broadcaster::new());
        let renderer = RenderFn(|value: u64| {
            if value % 2 == 1 {
                Err(RenderError(format!("odd value {value}")))
            } else {
                Ok(format!("v{value}"))
            }
        });
        let mut bridge = SubscriptionBridge::open(&hub, renderer, BridgeOptions::default()).unwrap();

        hub.publish(1);
        // The failed value is consumed and skipped; nothing else is pending.
        let idle = timeout(Duration::from_millis(50), bridge.next_frame()).await;
        assert!(idle.is_err());
        assert_eq!(bridge.skipped(), 1);

        hub.publish(2);
        let frame = timeout(WAIT, bridge.next_frame()).await.unwrap().unwrap();
        assert_eq!(frame.as_str(), "data: v2\n\n");
        assert_eq!(hub.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn run_writes_frames_in_order() {
        let hub = Arc::new(Broadcaster::new());
        let bridge = open(&hub);
        let (tx, mut rx) = mpsc::channel::<Frame>(8);

        let task = tokio::spawn(bridge.run(tx));

        let mut received = Vec::new();
        for value in 1..=3 {
            hub.publish(value);
            received.push(timeout(WAIT, rx.next()).await.unwrap().unwrap());
        }
        assert_eq!(
            received.iter().map(Frame::as_str).collect::<Vec<_>>(),
            ["data: 1\n\n", "data: 2\n\n", "data: 3\n\n"]
        );

        hub.shutdown();
        let reason = timeout(WAIT, task).await.unwrap().unwrap();
        assert_eq!(reason, CloseReason::BroadcasterClosed);
    }

    #[tokio::test]
    async fn write_failure_unsubscribes() {
        let hub = Arc::new(Broadcaster::new());
        let bridge = open(&hub);
        let (tx, rx) = mpsc::channel::<Frame>(8);
        drop(rx);

        let task = tokio::spawn(bridge.run(tx));
        hub.publish(1);

        let reason = timeout(WAIT, task).await.unwrap().unwrap();
        assert_eq!(reason, CloseReason::WriteFailed);
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn cancellation_unsubscribes() {
        let hub = Arc::new(Broadcaster::new());
        let bridge = open(&hub);
        let (tx, _rx) = mpsc::channel::<Frame>(8);
        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(bridge.run_until(tx, async move {
            let _ = cancel_rx.await;
        }));
        cancel_tx.send(()).unwrap();

        let reason = timeout(WAIT, task).await.unwrap().unwrap();
        assert_eq!(reason, CloseReason::Cancelled);
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn aborted_task_unsubscribes() {
        let hub = Arc::new(Broadcaster::new());
        let bridge = open(&hub);
        let (tx, _rx) = mpsc::channel::<Frame>(8);

        let task = tokio::spawn(bridge.run(tx));
        tokio::task::yield_now().await;
        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());

        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn close_is_idempotent_and_final() {
        let hub = Arc::new(Broadcaster::new());
        let mut bridge = open(&hub);

        bridge.close(CloseReason::Cancelled);
        bridge.close(CloseReason::WriteFailed);

        assert_eq!(bridge.state(), BridgeState::Closed);
        assert_eq!(bridge.subscriber_id(), None);
        assert_eq!(hub.subscriber_count(), 0);

        hub.publish(1);
        assert!(bridge.next_frame().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn idle_bridge_emits_keep_alive() {
        let hub = Arc::new(Broadcaster::new());
        let options = BridgeOptions {
            keep_alive: Some(Duration::from_secs(15)),
        };
        let mut bridge = SubscriptionBridge::open(&hub, plain(), options).unwrap();

        let frame = bridge.next_frame().await.unwrap();
        assert_eq!(frame.as_str(), ": keep-alive\n\n");

        hub.publish(4);
        let frame = bridge.next_frame().await.unwrap();
        assert_eq!(frame.as_str(), "data: 4\n\n");
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_keep_alive_is_clamped() {
        let hub = Arc::new(Broadcaster::new());
        let options = BridgeOptions {
            keep_alive: Some(Duration::MAX),
        };
        let mut bridge = SubscriptionBridge::open(&hub, plain(), options).unwrap();

        let started = tokio::time::Instant::now();
        let frame = bridge.next_frame().await.unwrap();
        assert_eq!(frame.as_str(), ": keep-alive\n\n");
        let elapsed = started.elapsed();
        assert!(elapsed >= MAX_KEEP_ALIVE);
        assert!(elapsed < MAX_KEEP_ALIVE.saturating_add(Duration::from_secs(1)));
    }

    #[tokio::test]
    async fn subscriber_limit_refuses_bridge() {
        let hub = Arc::new(Broadcaster::with_capacity_limit(1));
        let _first = open(&hub);

        let second = SubscriptionBridge::open(&hub, plain(), BridgeOptions::default());
        assert_eq!(
            second.unwrap_err(),
            BroadcastError::AtCapacity { limit: 1 }
        );
    }
}
