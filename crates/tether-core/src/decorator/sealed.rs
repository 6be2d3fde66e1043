//! Encryption decorator.
//!
//! Wraps a byte-oriented link and seals every outbound payload under a
//! [`CryptoSession`], opening inbound payloads before re-raising them.
//! Activation is refused until the handshake completed: composing
//! encryption beneath a link means no application data may flow before
//! both sides derived the session context, and this decorator is where
//! that ordering is enforced.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::watch;
use tether_crypto::{CapabilityToken, CryptoSession, PublicKey};

use crate::decorator::check_wrappable;
use crate::error::LinkError;
use crate::event::{DisconnectReason, EventSubscriber, MessageSubscriber};
use crate::lifecycle::Machine;
use crate::link::Link;
use crate::state::ConnectionState;

fn lock(session: &Mutex<CryptoSession>) -> MutexGuard<'_, CryptoSession> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A link whose payloads are sealed with the session's AEAD context.
pub struct SealedLink {
    inner: Box<dyn Link<Bytes, Bytes>>,
    session: Arc<Mutex<CryptoSession>>,
    machine: Machine<Bytes>,
    /// Set by `into_inner`: silences the inbound transform so a
    /// detached decorator stops interpreting traffic it no longer
    /// owns.
    detached: Arc<AtomicBool>,
}

impl SealedLink {
    /// Wrap `inner`, taking exclusive ownership.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::Construction`] unless the inner link is
    /// connected and not yet activated.
    pub fn new(
        inner: Box<dyn Link<Bytes, Bytes>>,
        session: CryptoSession,
    ) -> Result<Self, LinkError> {
        check_wrappable(inner.as_ref())?;

        let machine = Machine::initialized();
        let session = Arc::new(Mutex::new(session));
        let detached = Arc::new(AtomicBool::new(false));

        // Inbound transform: open, then re-raise on the decorator's
        // own hub. Undecryptable traffic has no caller to fail to, so
        // it is logged and dropped.
        {
            let hub = machine.hub().clone();
            let session = session.clone();
            let detached = detached.clone();
            inner.on_message(Arc::new(move |sealed: &Bytes| {
                if detached.load(Ordering::Relaxed) {
                    return;
                }
                match lock(&session).open(sealed) {
                    Ok(plaintext) => hub.deliver(&Bytes::from(plaintext)),
                    Err(error) => {
                        tracing::warn!(%error, "dropping inbound payload that failed to open");
                    },
                }
            }));
        }

        Ok(Self { inner, session, machine, detached })
    }

    /// The token authorizing export of this session's public key.
    #[must_use]
    pub fn capability(&self) -> CapabilityToken {
        lock(&self.session).capability()
    }

    /// Export the local public key, gated by the capability token.
    ///
    /// # Errors
    ///
    /// Returns [`tether_crypto::SessionError::Unauthorized`] on a
    /// token from a different session.
    pub fn public_key(&self, token: &CapabilityToken) -> Result<PublicKey, LinkError> {
        Ok(lock(&self.session).public_key(token)?)
    }

    /// Complete the handshake with the remote public key. One-shot.
    ///
    /// # Errors
    ///
    /// Returns [`tether_crypto::SessionError::AlreadyEstablished`] on
    /// a second call.
    pub fn start_session(&self, remote: &PublicKey) -> Result<(), LinkError> {
        Ok(lock(&self.session).start_session(remote)?)
    }

    /// Whether the handshake completed.
    #[must_use]
    pub fn is_established(&self) -> bool {
        lock(&self.session).is_established()
    }

    /// Scoped teardown: dismantle only the decorator's own state and
    /// return the inner link with its lifecycle untouched.
    #[must_use]
    pub fn into_inner(self) -> Box<dyn Link<Bytes, Bytes>> {
        self.detached.store(true, Ordering::Relaxed);
        self.inner
    }
}

#[async_trait]
impl Link<Bytes, Bytes> for SealedLink {
    fn state(&self) -> ConnectionState {
        self.machine.current()
    }

    fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.machine.subscribe()
    }

    fn is_connected(&self) -> bool {
        !self.machine.current().is_terminal() && self.inner.is_connected()
    }

    async fn activate(&self) -> Result<(), LinkError> {
        self.machine.require_transition(
            ConnectionState::Initialized,
            ConnectionState::Activating,
            "activate",
        )?;

        if !self.is_established() {
            self.machine
                .try_transition(ConnectionState::Activating, ConnectionState::Initialized);
            return Err(tether_crypto::SessionError::NotEstablished.into());
        }

        match self.inner.activate().await {
            Ok(()) => {
                self.machine.try_transition(ConnectionState::Activating, ConnectionState::Activated);
                Ok(())
            },
            Err(error) => {
                self.machine
                    .try_transition(ConnectionState::Activating, ConnectionState::Initialized);
                Err(error)
            },
        }
    }

    async fn send(&self, plaintext: Bytes) -> Result<(), LinkError> {
        let state = self.machine.current();
        if state != ConnectionState::Activated {
            return Err(LinkError::not_activated("send", state));
        }

        let sealed = lock(&self.session).seal(&plaintext)?;
        self.inner.send(Bytes::from(sealed)).await
    }

    async fn disconnect(&self) -> Result<(), LinkError> {
        self.machine.require_transition(
            ConnectionState::Activated,
            ConnectionState::Disconnecting,
            "disconnect",
        )?;

        let result = self.inner.disconnect().await;

        if self
            .machine
            .try_transition(ConnectionState::Disconnecting, ConnectionState::Disconnected)
        {
            self.machine.raise_disconnected(DisconnectReason::Graceful);
        }

        result
    }

    async fn abandon(&self) {
        if !self.machine.try_transition(ConnectionState::Activated, ConnectionState::Lost) {
            return;
        }
        self.machine.raise_disconnected(DisconnectReason::Lost);
        self.inner.abandon().await;
    }

    async fn dispose(&self) {
        if self.machine.begin_dispose().is_none() {
            return;
        }
        self.inner.dispose().await;
        self.machine.finish_dispose();
    }

    fn on_message(&self, subscriber: MessageSubscriber<Bytes>) {
        self.machine.hub().on_message(subscriber);
    }

    fn on_event(&self, subscriber: EventSubscriber) {
        self.machine.hub().on_event(subscriber);
    }
}
