//! Transport hook set.
//!
//! Abstracts over the byte or message pump underneath a link (TCP,
//! UDP, an in-memory channel pair in tests). The session layer never
//! inspects socket state directly: everything it needs from the
//! transport goes through these hooks, and everything the transport
//! produces comes back through the [`Inbound`] push handle it receives
//! at activation.

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::event::EventHub;
use crate::state::ConnectionState;

/// Hook set implemented by each concrete transport.
///
/// The endpoint serializes calls to `send` and `disconnect` behind its
/// exclusive I/O lock, so implementations never see those two
/// concurrently. `dispose` must be safe to call after any other hook,
/// including after `disconnect`, and must release the underlying
/// resource at most once.
///
/// Hooks must eventually return: the session layer never cancels an
/// in-flight hook mid-write, so a hook that can hang forever will hang
/// its link's teardown with it.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Message type accepted by the send hook.
    type Outbound: Send + 'static;

    /// Message type the transport pushes on arrival.
    type Inbound: Send + 'static;

    /// Transport-specific activation: start the read side and begin
    /// pushing received messages through `inbound`.
    async fn activate(&mut self, inbound: Inbound<Self::Inbound>) -> io::Result<()>;

    /// Write one outbound message.
    async fn send(&mut self, message: Self::Outbound) -> io::Result<()>;

    /// Transport-specific graceful teardown (e.g. FIN, goodbye frame).
    async fn disconnect(&mut self) -> io::Result<()>;

    /// Release the underlying resource. Idempotent; errors are logged
    /// by the endpoint, never surfaced to the disposing caller.
    async fn dispose(&mut self) -> io::Result<()>;

    /// Transport-level reachability.
    fn is_connected(&self) -> bool;
}

/// Push handle a transport uses to deliver received messages.
///
/// Delivery is synchronous with respect to the calling task and
/// serialized per link: one message is fully dispatched to every
/// subscriber before the next begins. Messages arriving after the link
/// left the activated phase are dropped.
pub struct Inbound<R> {
    hub: Arc<EventHub<R>>,
    state: watch::Receiver<ConnectionState>,
}

impl<R> Inbound<R> {
    pub(crate) fn new(hub: Arc<EventHub<R>>, state: watch::Receiver<ConnectionState>) -> Self {
        Self { hub, state }
    }

    /// Deliver one received message to the link's subscribers.
    pub fn deliver(&self, message: R) {
        let state = *self.state.borrow();
        if !matches!(state, ConnectionState::Activating | ConnectionState::Activated) {
            tracing::trace!(?state, "dropping inbound message delivered after deactivation");
            return;
        }
        self.hub.deliver(&message);
    }
}

impl<R> Clone for Inbound<R> {
    fn clone(&self) -> Self {
        Self { hub: self.hub.clone(), state: self.state.clone() }
    }
}
