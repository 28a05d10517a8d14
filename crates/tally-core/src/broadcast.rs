//! Process-wide fan-out of counter updates.
//!
//! The [`Broadcaster`] keeps a registry of subscribers, each with a
//! private single-slot [`watch`] channel. Publishing writes the new value
//! into every slot; a value a subscriber has not consumed yet is simply
//! replaced, so a slow reader costs one slot of memory and never holds up
//! the publisher or the other readers.
//!
//! # Locking
//!
//! The registry mutex is held for the map mutation in
//! [`subscribe`](Broadcaster::subscribe) / [`unsubscribe`](Broadcaster::unsubscribe),
//! and during [`publish`](Broadcaster::publish) only long enough to clone
//! the list of slots. The fan-out itself runs without the lock.
//!
//! # Scoped subscriptions
//!
//! [`Subscription`] unregisters itself on drop. Whatever ends a streaming
//! connection (a write failure, a cancelled task, a panic while unwinding)
//! the registry entry goes away with it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tracing::{debug, info, trace};
use uuid::Uuid;

/// Unique identifier for one registered subscriber.
///
/// Uses UUID v7 so identifiers sort by registration time in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriberId(pub Uuid);

impl SubscriberId {
    /// Create a new identifier using UUID v7 (time-ordered).
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors returned when registering a subscriber.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BroadcastError {
    /// The configured subscriber limit has been reached.
    #[error("subscriber limit of {limit} reached")]
    AtCapacity {
        /// The configured maximum number of concurrent subscribers.
        limit: usize,
    },

    /// The broadcaster has been shut down.
    #[error("broadcaster is shut down")]
    Closed,
}

/// Delivery slot for one subscriber. `None` until the first publish after
/// registration.
type Slot = Arc<watch::Sender<Option<u64>>>;

#[derive(Debug, Default)]
struct Registry {
    subscribers: HashMap<SubscriberId, Slot>,
    closed: bool,
}

/// Publish/subscribe hub for counter values.
///
/// Shared through an [`Arc`]; [`subscribe`](Self::subscribe) takes
/// `self: &Arc<Self>` so the returned [`Subscription`] can unregister
/// itself later.
#[derive(Debug, Default)]
pub struct Broadcaster {
    registry: Mutex<Registry>,
    /// Maximum concurrent subscribers (0 = unlimited).
    max_subscribers: usize,
}

impl Broadcaster {
    /// Create a broadcaster with no subscriber limit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a broadcaster that accepts at most `max_subscribers`
    /// concurrent subscribers. `0` means unlimited.
    pub fn with_capacity_limit(max_subscribers: usize) -> Self {
        Self {
            registry: Mutex::new(Registry::default()),
            max_subscribers,
        }
    }

    /// The configured subscriber limit (0 = unlimited).
    pub const fn max_subscribers(&self) -> usize {
        self.max_subscribers
    }

    // A panic elsewhere while holding the lock cannot leave the map in a
    // half-written state, so a poisoned lock is still usable.
    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new subscriber.
    ///
    /// The subscriber sees only values published after this call returns.
    pub fn subscribe(self: &Arc<Self>) -> Result<Subscription, BroadcastError> {
        let (tx, rx) = watch::channel(None);
        let id = SubscriberId::new();

        let active = {
            let mut registry = self.registry();
            if registry.closed {
                return Err(BroadcastError::Closed);
            }
            if self.max_subscribers != 0 && registry.subscribers.len() >= self.max_subscribers {
                return Err(BroadcastError::AtCapacity {
                    limit: self.max_subscribers,
                });
            }
            registry.subscribers.insert(id, Arc::new(tx));
            registry.subscribers.len()
        };

        debug!(subscriber = %id, active, "Subscriber registered");

        Ok(Subscription {
            id,
            rx,
            broadcaster: Arc::clone(self),
        })
    }

    /// Remove a subscriber and release its delivery slot.
    ///
    /// Returns `true` if the subscriber was registered. Unknown or
    /// already-removed ids are ignored.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let (removed, active) = {
            let mut registry = self.registry();
            let removed = registry.subscribers.remove(&id).is_some();
            (removed, registry.subscribers.len())
        };

        if removed {
            debug!(subscriber = %id, active, "Subscriber unregistered");
        } else {
            trace!(subscriber = %id, "Unsubscribe for unknown subscriber ignored");
        }
        removed
    }

    /// Deliver `value` to every registered subscriber.
    ///
    /// Never blocks and never fails. If a subscriber has not consumed its
    /// previous value yet, `value` replaces it. A value that is not newer
    /// than the one already in a subscriber's slot is dropped for that
    /// subscriber, so each subscriber sees a non-decreasing sequence even
    /// when two mutation handlers publish out of order.
    ///
    /// Returns the number of subscribers the value was offered to.
    pub fn publish(&self, value: u64) -> usize {
        let slots: Vec<Slot> = self.registry().subscribers.values().cloned().collect();

        let mut delivered: usize = 0;
        for slot in &slots {
            let fresh = slot.send_if_modified(|pending| match *pending {
                Some(current) if current >= value => false,
                _ => {
                    *pending = Some(value);
                    true
                }
            });
            if fresh {
                delivered = delivered.saturating_add(1);
            }
        }

        trace!(value, offered = slots.len(), delivered, "Counter value published");
        slots.len()
    }

    /// Entry point for the mutation handler once it has incremented the
    /// counter. Same as [`publish`](Self::publish).
    pub fn notify_mutation_occurred(&self, new_value: u64) -> usize {
        self.publish(new_value)
    }

    /// Number of currently registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.registry().subscribers.len()
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    pub fn is_closed(&self) -> bool {
        self.registry().closed
    }

    /// Drop every subscriber and refuse new ones.
    ///
    /// Open subscriptions observe their channel closing on the next wait.
    pub fn shutdown(&self) {
        let dropped = {
            let mut registry = self.registry();
            registry.closed = true;
            let dropped = registry.subscribers.len();
            registry.subscribers.clear();
            dropped
        };
        info!(dropped, "Broadcaster shut down");
    }
}

/// One registered subscriber, held by the connection that owns it.
///
/// Dropping the subscription unregisters it.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    rx: watch::Receiver<Option<u64>>,
    broadcaster: Arc<Broadcaster>,
}

impl Subscription {
    /// This subscriber's identifier.
    pub const fn id(&self) -> SubscriberId {
        self.id
    }

    /// Wait for the next value.
    ///
    /// Suspends until a value newer than the last one returned is
    /// published. Returns `None` once the subscriber has been removed or
    /// the broadcaster shut down.
    pub async fn recv(&mut self) -> Option<u64> {
        loop {
            self.rx.changed().await.ok()?;
            if let Some(value) = *self.rx.borrow_and_update() {
                return Some(value);
            }
        }
    }

    /// Take the pending value without waiting, if there is one.
    pub fn try_recv(&mut self) -> Option<u64> {
        if self.rx.has_changed().unwrap_or(false) {
            *self.rx.borrow_and_update()
        } else {
            None
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.broadcaster.unsubscribe(self.id);
    }
}
