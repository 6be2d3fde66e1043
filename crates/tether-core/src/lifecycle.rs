//! State-plus-events machine shared by the endpoint and decorators.
//!
//! The inheritance chain of the original design collapses into this
//! one concrete piece: a [`StateCell`] paired with an [`EventHub`],
//! raising `StateChanged` for every transition it performs.

use std::sync::Arc;

use tokio::sync::watch;

use crate::error::LinkError;
use crate::event::{DisconnectReason, EventHub, LinkEvent};
use crate::state::{ConnectionState, StateCell};

pub(crate) struct Machine<R> {
    cell: StateCell,
    hub: Arc<EventHub<R>>,
}

impl<R> Machine<R> {
    /// A machine advanced through construction-time validation,
    /// resting in `Initialized`.
    pub(crate) fn initialized() -> Self {
        let machine = Self { cell: StateCell::new(), hub: Arc::new(EventHub::new()) };
        machine.force(ConnectionState::Constructed, ConnectionState::Initializing);
        machine.force(ConnectionState::Initializing, ConnectionState::Initialized);
        machine
    }

    pub(crate) fn current(&self) -> ConnectionState {
        self.cell.current()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.cell.subscribe()
    }

    pub(crate) fn hub(&self) -> &Arc<EventHub<R>> {
        &self.hub
    }

    /// Transition that must succeed by construction (no concurrent
    /// caller can hold a conflicting state yet).
    fn force(&self, from: ConnectionState, to: ConnectionState) {
        let moved = self.cell.transition(from, to).is_ok();
        debug_assert!(moved);
        self.raise_changed(from, to);
    }

    /// Transition or fail with `InvalidState` naming the required
    /// state.
    pub(crate) fn require_transition(
        &self,
        from: ConnectionState,
        to: ConnectionState,
        operation: &'static str,
    ) -> Result<(), LinkError> {
        self.cell.transition(from, to).map_err(|state| LinkError::InvalidState {
            operation,
            state,
            required: from,
        })?;
        self.raise_changed(from, to);
        Ok(())
    }

    /// Transition if the live state allows it; a `false` return is a
    /// benign shutdown race, not an error.
    pub(crate) fn try_transition(&self, from: ConnectionState, to: ConnectionState) -> bool {
        if self.cell.transition(from, to).is_ok() {
            self.raise_changed(from, to);
            true
        } else {
            false
        }
    }

    /// Claim the disposing phase; `None` means another dispose already
    /// ran or is running.
    pub(crate) fn begin_dispose(&self) -> Option<ConnectionState> {
        let previous = self.cell.begin_dispose()?;
        self.raise_changed(previous, ConnectionState::Disposing);
        Some(previous)
    }

    pub(crate) fn finish_dispose(&self) {
        self.try_transition(ConnectionState::Disposing, ConnectionState::Disposed);
    }

    pub(crate) fn raise_disconnected(&self, reason: DisconnectReason) {
        self.hub.raise(LinkEvent::Disconnected { reason });
    }

    fn raise_changed(&self, from: ConnectionState, to: ConnectionState) {
        tracing::trace!(?from, ?to, "link state transition");
        self.hub.raise(LinkEvent::StateChanged { from, to });
    }
}
