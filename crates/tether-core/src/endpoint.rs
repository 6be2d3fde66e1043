//! The concrete session-layer state machine.
//!
//! [`Endpoint`] binds a [`Transport`] to the [`Link`] contract: it
//! owns the live state, the exclusive I/O lock serializing send
//! against disconnect, and the subscriber hub. Decorators stack on top
//! of it through `Box<dyn Link>`; the transport underneath never
//! learns what was stacked.
//!
//! # Locking
//!
//! One `tokio::sync::Mutex` around the transport is the whole story:
//! `send` and `disconnect` hold it for the duration of the call, so a
//! pending send blocks a concurrent disconnect and vice versa, and no
//! half-written message can be torn by teardown. A call queued on the
//! lock watches the state channel and bails out with `InvalidState`
//! the moment the link leaves `Activated`, so disposal never strands a
//! waiter.

use async_trait::async_trait;
use tokio::sync::{Mutex, MutexGuard, watch};

use crate::error::LinkError;
use crate::event::{DisconnectReason, EventSubscriber, MessageSubscriber};
use crate::lifecycle::Machine;
use crate::link::Link;
use crate::state::{ConnectionState, wait_leave};
use crate::transport::{Inbound, Transport};

/// A session-layer connection over a concrete transport.
pub struct Endpoint<T: Transport> {
    machine: Machine<T::Inbound>,
    transport: Mutex<T>,
}

impl<T: Transport> Endpoint<T> {
    /// Construct and validate.
    ///
    /// Runs construction-time validation (the transport must report
    /// connectivity) and rests in `Initialized`.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::Construction`] if the transport is not
    /// connected; validation failure is a construction failure, never
    /// deferred to first use.
    pub fn new(transport: T) -> Result<Self, LinkError> {
        if !transport.is_connected() {
            return Err(LinkError::Construction {
                reason: "transport reports no connectivity".to_string(),
            });
        }

        Ok(Self { machine: Machine::initialized(), transport: Mutex::new(transport) })
    }

    /// Acquire the exclusive I/O lock, bailing out if the link leaves
    /// `Activated` while queued.
    async fn lock_while_activated(
        &self,
        operation: &'static str,
    ) -> Result<MutexGuard<'_, T>, LinkError> {
        let state = self.machine.current();
        if state != ConnectionState::Activated {
            return Err(LinkError::not_activated(operation, state));
        }

        let mut watcher = self.machine.subscribe();
        let guard = tokio::select! {
            guard = self.transport.lock() => guard,
            () = wait_leave(&mut watcher, ConnectionState::Activated) => {
                return Err(LinkError::not_activated(operation, self.machine.current()));
            }
        };

        // The state may have moved between the lock grant and now.
        let state = self.machine.current();
        if state != ConnectionState::Activated {
            return Err(LinkError::not_activated(operation, state));
        }
        Ok(guard)
    }
}

#[async_trait]
impl<T: Transport> Link<T::Outbound, T::Inbound> for Endpoint<T> {
    fn state(&self) -> ConnectionState {
        self.machine.current()
    }

    fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.machine.subscribe()
    }

    fn is_connected(&self) -> bool {
        // The transport lock is only ever held across hook calls, so
        // this query would block behind an in-flight send; answer from
        // the state machine when the lock is contended.
        match self.transport.try_lock() {
            Ok(transport) => transport.is_connected(),
            Err(_) => !self.machine.current().is_terminal(),
        }
    }

    async fn activate(&self) -> Result<(), LinkError> {
        self.machine.require_transition(
            ConnectionState::Initialized,
            ConnectionState::Activating,
            "activate",
        )?;

        let result = {
            let mut transport = self.transport.lock().await;
            let inbound = Inbound::new(self.machine.hub().clone(), self.machine.subscribe());
            transport.activate(inbound).await
        };

        match result {
            Ok(()) => {
                if !self
                    .machine
                    .try_transition(ConnectionState::Activating, ConnectionState::Activated)
                {
                    // Disposed while the hook ran; benign shutdown.
                    tracing::trace!("link disposed during activation");
                }
                Ok(())
            },
            Err(error) => {
                self.machine
                    .try_transition(ConnectionState::Activating, ConnectionState::Initialized);
                Err(error.into())
            },
        }
    }

    async fn send(&self, message: T::Outbound) -> Result<(), LinkError> {
        let mut transport = self.lock_while_activated("send").await?;
        transport.send(message).await.map_err(LinkError::from)
    }

    async fn disconnect(&self) -> Result<(), LinkError> {
        let mut transport = self.lock_while_activated("disconnect").await?;

        self.machine.require_transition(
            ConnectionState::Activated,
            ConnectionState::Disconnecting,
            "disconnect",
        )?;

        // Graceful-teardown delivery is best effort: the transition to
        // Disconnected completes even when the hook fails, so the link
        // never strands in a non-terminal state.
        let result = transport.disconnect().await;

        if self
            .machine
            .try_transition(ConnectionState::Disconnecting, ConnectionState::Disconnected)
        {
            self.machine.raise_disconnected(DisconnectReason::Graceful);
        }

        result.map_err(LinkError::from)
    }

    async fn abandon(&self) {
        if !self.machine.try_transition(ConnectionState::Activated, ConnectionState::Lost) {
            return;
        }
        self.machine.raise_disconnected(DisconnectReason::Lost);

        let mut transport = self.transport.lock().await;
        if let Err(error) = transport.disconnect().await {
            tracing::debug!(%error, "transport disconnect during abandon failed");
        }
    }

    async fn dispose(&self) {
        let Some(_previous) = self.machine.begin_dispose() else {
            return;
        };

        let mut transport = self.transport.lock().await;
        if let Err(error) = transport.dispose().await {
            tracing::warn!(%error, "transport teardown during dispose failed");
        }
        drop(transport);

        self.machine.finish_dispose();
    }

    fn on_message(&self, subscriber: MessageSubscriber<T::Inbound>) {
        self.machine.hub().on_message(subscriber);
    }

    fn on_event(&self, subscriber: EventSubscriber) {
        self.machine.hub().on_event(subscriber);
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::event::LinkEvent;

    /// Minimal transport double for state-machine tests.
    struct StubTransport {
        connected: bool,
        fail_disconnect: bool,
        disposed: Arc<AtomicUsize>,
    }

    impl StubTransport {
        fn new() -> Self {
            Self { connected: true, fail_disconnect: false, disposed: Arc::new(AtomicUsize::new(0)) }
        }
    }

    #[async_trait]
    impl Transport for StubTransport {
        type Outbound = String;
        type Inbound = String;

        async fn activate(&mut self, _inbound: Inbound<String>) -> io::Result<()> {
            Ok(())
        }

        async fn send(&mut self, _message: String) -> io::Result<()> {
            Ok(())
        }

        async fn disconnect(&mut self) -> io::Result<()> {
            if self.fail_disconnect {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer vanished"));
            }
            self.connected = false;
            Ok(())
        }

        async fn dispose(&mut self) -> io::Result<()> {
            self.disposed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn is_connected(&self) -> bool {
            self.connected
        }
    }

    #[tokio::test]
    async fn full_lifecycle() {
        let endpoint = Endpoint::new(StubTransport::new()).unwrap();
        assert_eq!(endpoint.state(), ConnectionState::Initialized);

        endpoint.activate().await.unwrap();
        assert_eq!(endpoint.state(), ConnectionState::Activated);

        endpoint.send("hello".to_string()).await.unwrap();

        endpoint.disconnect().await.unwrap();
        assert_eq!(endpoint.state(), ConnectionState::Disconnected);

        let result = endpoint.send("late".to_string()).await;
        assert!(matches!(result, Err(LinkError::InvalidState { operation: "send", .. })));
    }

    #[tokio::test]
    async fn construction_requires_connectivity() {
        let transport = StubTransport { connected: false, ..StubTransport::new() };
        let result = Endpoint::new(transport);
        assert!(matches!(result, Err(LinkError::Construction { .. })));
    }

    #[tokio::test]
    async fn operations_outside_their_state_fail() {
        let endpoint = Endpoint::new(StubTransport::new()).unwrap();

        // Not yet activated.
        assert!(endpoint.send("x".to_string()).await.unwrap_err().is_invalid_state());
        assert!(endpoint.disconnect().await.unwrap_err().is_invalid_state());

        // Activate twice.
        endpoint.activate().await.unwrap();
        let result = endpoint.activate().await;
        assert!(matches!(
            result,
            Err(LinkError::InvalidState { required: ConnectionState::Initialized, .. })
        ));
    }

    #[tokio::test]
    async fn dispose_is_idempotent_and_tears_down_once() {
        let transport = StubTransport::new();
        let disposed = transport.disposed.clone();
        let endpoint = Endpoint::new(transport).unwrap();
        endpoint.activate().await.unwrap();

        endpoint.dispose().await;
        endpoint.dispose().await;
        endpoint.dispose().await;

        assert_eq!(endpoint.state(), ConnectionState::Disposed);
        assert_eq!(disposed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn dispose_of_a_never_activated_link_is_clean() {
        let endpoint = Endpoint::new(StubTransport::new()).unwrap();
        endpoint.dispose().await;
        assert_eq!(endpoint.state(), ConnectionState::Disposed);
    }

    #[tokio::test]
    async fn disconnect_completes_even_when_the_hook_fails() {
        let transport = StubTransport { fail_disconnect: true, ..StubTransport::new() };
        let endpoint = Endpoint::new(transport).unwrap();
        endpoint.activate().await.unwrap();

        let result = endpoint.disconnect().await;
        assert!(matches!(result, Err(LinkError::Transport(_))));
        assert_eq!(endpoint.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn disconnected_event_is_raised_exactly_once() {
        let endpoint = Endpoint::new(StubTransport::new()).unwrap();
        let disconnects = Arc::new(AtomicUsize::new(0));

        let counter = disconnects.clone();
        endpoint.on_event(Arc::new(move |event| {
            if matches!(event, LinkEvent::Disconnected { .. }) {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        }));

        endpoint.activate().await.unwrap();
        endpoint.disconnect().await.unwrap();
        let _ = endpoint.disconnect().await; // InvalidState, no second event
        endpoint.dispose().await;

        assert_eq!(disconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn abandon_marks_the_link_lost() {
        let endpoint = Endpoint::new(StubTransport::new()).unwrap();
        endpoint.activate().await.unwrap();

        endpoint.abandon().await;
        assert_eq!(endpoint.state(), ConnectionState::Lost);

        // Second abandon is a no-op.
        endpoint.abandon().await;
        assert_eq!(endpoint.state(), ConnectionState::Lost);

        endpoint.dispose().await;
        assert_eq!(endpoint.state(), ConnectionState::Disposed);
    }
}
