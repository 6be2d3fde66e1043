//! The `Link` contract: the one interface every connection object
//! satisfies.
//!
//! Decorators wrap a `Box<dyn Link>` and implement `Link` themselves,
//! so encryption, framing and any further capability compose without
//! the inner transport knowing about the outer layers. The application
//! only ever sees this contract.

use async_trait::async_trait;
use tokio::sync::watch;

use crate::error::LinkError;
use crate::event::{EventSubscriber, MessageSubscriber};
use crate::state::ConnectionState;

/// A duplex session-layer connection sending `S` and receiving `R`.
///
/// # Thread safety
///
/// `send` and `disconnect` are serialized against each other by an
/// exclusive per-link lock; inbound delivery runs concurrently with
/// sends but serialized against itself. `activate` is **not** safe
/// against concurrent use of the link: the caller must ensure
/// activation is single-threaded and happens-before any send or
/// receive activity.
///
/// # Lifecycle
///
/// Operations are gated by the live [`ConnectionState`]; calling one
/// from a disallowed state fails with
/// [`LinkError::InvalidState`] naming the required state. `dispose` is
/// the exception: legal from every state, idempotent, infallible.
#[async_trait]
pub trait Link<S, R>: Send + Sync {
    /// The live lifecycle state.
    fn state(&self) -> ConnectionState;

    /// A receiver observing every state transition.
    fn watch_state(&self) -> watch::Receiver<ConnectionState>;

    /// Transport-level reachability, independent of activation.
    fn is_connected(&self) -> bool;

    /// Make the link ready for data exchange.
    ///
    /// Legal only from `Initialized`. A failed activation hook leaves
    /// the link in `Initialized` and surfaces the failure.
    async fn activate(&self) -> Result<(), LinkError>;

    /// Send one message. Legal only while `Activated`; holds the
    /// exclusive I/O lock for the duration of the call.
    async fn send(&self, message: S) -> Result<(), LinkError>;

    /// Gracefully terminate. Legal only from `Activated`; holds the
    /// same exclusive lock as `send`.
    ///
    /// Teardown-hook failures do not strand the state machine: the
    /// transition to `Disconnected` completes, then the error
    /// propagates.
    async fn disconnect(&self) -> Result<(), LinkError>;

    /// Failure-detected teardown: `Activated -> Lost`, best-effort
    /// transport disconnect with errors swallowed. No-op outside
    /// `Activated`.
    async fn abandon(&self);

    /// Release all resources. Legal from every state; calls after the
    /// first are no-ops; never fails, even for a link that was never
    /// activated.
    async fn dispose(&self);

    /// Register an inbound message subscriber.
    fn on_message(&self, subscriber: MessageSubscriber<R>);

    /// Register a lifecycle event subscriber.
    fn on_event(&self, subscriber: EventSubscriber);
}
