//! Connection lifecycle states and the shared state cell.
//!
//! Every link (the concrete endpoint and each decorator layered on
//! top of it) owns exactly one live [`ConnectionState`] value. That
//! value is the single source of truth for which operations are legal;
//! there is no secondary "connected" boolean to drift out of sync.
//!
//! # State machine
//!
//! ```text
//! Constructed -> Initializing -> Initialized -> Activating -> Activated
//!                                     ^              |            |
//!                                     └── (hook err)─┘            ├──> Disconnecting -> Disconnected
//!                                                                 └──> Lost
//!
//! every non-disposing state ──> Disposing -> Disposed
//! ```
//!
//! Transitions are enforced by [`StateCell`], which performs atomic
//! compare-and-transition over a watch channel so background loops and
//! queued lock waiters can await a departure from `Activated` instead
//! of polling.

use tokio::sync::watch;

/// Lifecycle states of a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Object exists; construction-time validation has not run yet.
    Constructed,
    /// Construction-time validation in progress.
    Initializing,
    /// Validated and connected at the transport level; not yet ready
    /// to exchange application data.
    Initialized,
    /// Activation hook running.
    Activating,
    /// Ready to send and receive application data.
    Activated,
    /// Graceful teardown hook running.
    Disconnecting,
    /// Gracefully terminated.
    Disconnected,
    /// Terminated by failure detection (peer presumed unreachable).
    Lost,
    /// Resource teardown running.
    Disposing,
    /// All resources released. Final.
    Disposed,
}

impl ConnectionState {
    /// Whether data exchange can never resume from this state.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Disconnected | Self::Lost | Self::Disposed)
    }

    /// Whether resource teardown has started (or finished).
    #[must_use]
    pub fn is_disposing(self) -> bool {
        matches!(self, Self::Disposing | Self::Disposed)
    }

    /// Legal-transition table.
    ///
    /// Disposal is reachable from every state that is not already
    /// disposing; all other edges follow the lifecycle diagram.
    #[must_use]
    pub fn may_transition_to(self, next: Self) -> bool {
        if next == Self::Disposing {
            return !self.is_disposing();
        }

        matches!(
            (self, next),
            (Self::Constructed, Self::Initializing)
                | (Self::Initializing, Self::Initialized)
                | (Self::Initialized, Self::Activating)
                | (Self::Activating, Self::Activated)
                // Failed activation hook: the link stays re-activatable.
                | (Self::Activating, Self::Initialized)
                | (Self::Activated, Self::Disconnecting)
                | (Self::Activated, Self::Lost)
                | (Self::Disconnecting, Self::Disconnected)
                | (Self::Disposing, Self::Disposed)
        )
    }
}

/// Atomic holder of a link's live [`ConnectionState`].
///
/// Backed by a watch channel: [`StateCell::subscribe`] hands out
/// receivers that observe every transition, which is how send calls
/// queued on the I/O lock and keep-alive loops learn that the link
/// left `Activated`.
#[derive(Debug)]
pub struct StateCell {
    tx: watch::Sender<ConnectionState>,
}

impl StateCell {
    /// Create a cell in [`ConnectionState::Constructed`].
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ConnectionState::Constructed);
        Self { tx }
    }

    /// The live state.
    #[must_use]
    pub fn current(&self) -> ConnectionState {
        *self.tx.borrow()
    }

    /// A receiver observing every subsequent transition.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.tx.subscribe()
    }

    /// Atomically transition `from -> to`.
    ///
    /// # Errors
    ///
    /// Returns the actual live state if it was not `from`. The caller
    /// decides whether that is an [`InvalidState`] to surface or a
    /// benign shutdown race to swallow.
    ///
    /// [`InvalidState`]: crate::error::LinkError::InvalidState
    pub fn transition(
        &self,
        from: ConnectionState,
        to: ConnectionState,
    ) -> Result<(), ConnectionState> {
        debug_assert!(from.may_transition_to(to), "illegal edge {from:?} -> {to:?}");

        let mut moved = false;
        self.tx.send_if_modified(|state| {
            if *state == from {
                *state = to;
                moved = true;
                true
            } else {
                false
            }
        });

        if moved { Ok(()) } else { Err(self.current()) }
    }

    /// Claim [`ConnectionState::Disposing`] from whatever non-disposing
    /// state is live.
    ///
    /// Returns the pre-claim state for the winning caller and `None`
    /// for everyone else, which is what makes dispose idempotent: the
    /// underlying teardown runs exactly once.
    pub fn begin_dispose(&self) -> Option<ConnectionState> {
        let mut previous = None;
        self.tx.send_if_modified(|state| {
            if state.is_disposing() {
                false
            } else {
                previous = Some(*state);
                *state = ConnectionState::Disposing;
                true
            }
        });
        previous
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}

/// Wait until the watched state differs from `from`.
///
/// Returns immediately if it already does. A closed channel (the link
/// was dropped) counts as having left the state.
pub async fn wait_leave(rx: &mut watch::Receiver<ConnectionState>, from: ConnectionState) {
    while *rx.borrow_and_update() == from {
        if rx.changed().await.is_err() {
            return;
        }
    }
}
