//! Subscriber lists and lifecycle notifications.
//!
//! The original design of this layer calls for multicast callbacks
//! with two delivery guarantees: inbound messages are dispatched one
//! at a time per link (a message is fully delivered to every
//! subscriber before the next is dispatched), and delivery is *not*
//! serialized against outbound sends. [`EventHub`] implements exactly
//! that: a dedicated delivery lock for messages, none for lifecycle
//! events.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::state::ConnectionState;

/// Why a link stopped exchanging data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Local graceful disconnect.
    Graceful,
    /// Failure detected; the peer is presumed unreachable.
    Lost,
}

/// Lifecycle notifications raised by a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    /// The live state changed.
    StateChanged {
        /// State before the transition.
        from: ConnectionState,
        /// State after the transition.
        to: ConnectionState,
    },
    /// The link left `Activated` for good. Raised exactly once.
    Disconnected {
        /// Graceful or failure-detected.
        reason: DisconnectReason,
    },
}

/// Inbound message subscriber.
pub type MessageSubscriber<R> = Arc<dyn Fn(&R) + Send + Sync>;

/// Lifecycle event subscriber.
pub type EventSubscriber = Arc<dyn Fn(&LinkEvent) + Send + Sync>;

/// Poison-tolerant lock: a subscriber that panicked must not wedge the
/// link it was observing.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Subscriber lists for one link.
pub struct EventHub<R> {
    messages: Mutex<Vec<MessageSubscriber<R>>>,
    events: Mutex<Vec<EventSubscriber>>,
    /// Held across a full message dispatch; the per-link receive-order
    /// guarantee.
    delivery: Mutex<()>,
}

impl<R> EventHub<R> {
    /// An empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self { messages: Mutex::new(Vec::new()), events: Mutex::new(Vec::new()), delivery: Mutex::new(()) }
    }

    /// Register an inbound message subscriber.
    pub fn on_message(&self, subscriber: MessageSubscriber<R>) {
        lock(&self.messages).push(subscriber);
    }

    /// Register a lifecycle event subscriber.
    pub fn on_event(&self, subscriber: EventSubscriber) {
        lock(&self.events).push(subscriber);
    }

    /// Deliver one inbound message to every subscriber, in
    /// registration order, serialized against other deliveries on the
    /// same hub.
    pub fn deliver(&self, message: &R) {
        let _serial = lock(&self.delivery);
        // Snapshot so a subscriber may register further subscribers
        // without deadlocking the list lock.
        let subscribers: Vec<MessageSubscriber<R>> = lock(&self.messages).clone();
        for subscriber in &subscribers {
            subscriber(message);
        }
    }

    /// Raise a lifecycle event to every subscriber.
    ///
    /// Not serialized against message delivery: a state change must be
    /// observable while an inbound dispatch is in flight.
    pub fn raise(&self, event: LinkEvent) {
        let subscribers: Vec<EventSubscriber> = lock(&self.events).clone();
        for subscriber in &subscribers {
            subscriber(&event);
        }
    }
}

impl<R> Default for EventHub<R> {
    fn default() -> Self {
        Self::new()
    }
}
