//! Length-prefix framing decorator.
//!
//! Turns a chunked byte-stream link into a message-per-send link: each
//! outbound payload is prefixed with its big-endian `u32` length, and
//! inbound chunks are buffered until whole frames can be extracted,
//! whatever the split the transport delivered them in.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::sync::watch;

use crate::decorator::check_wrappable;
use crate::error::LinkError;
use crate::event::{DisconnectReason, EventSubscriber, MessageSubscriber};
use crate::lifecycle::Machine;
use crate::link::Link;
use crate::state::ConnectionState;

/// Default upper bound on a single frame.
pub const DEFAULT_MAX_FRAME: usize = 16 * 1024 * 1024;

const LEN_PREFIX: usize = 4;

/// Inbound reassembly state.
struct Reassembly {
    buffer: BytesMut,
    /// A frame header exceeded the bound; the stream offset can no
    /// longer be trusted, so everything after it is discarded.
    poisoned: bool,
}

fn lock(reassembly: &Mutex<Reassembly>) -> MutexGuard<'_, Reassembly> {
    reassembly.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A link that frames outbound payloads and reassembles inbound ones.
pub struct FramedLink {
    inner: Box<dyn Link<Bytes, Bytes>>,
    machine: Machine<Bytes>,
    max_frame: usize,
}

impl FramedLink {
    /// Wrap `inner` with the default frame bound.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::Construction`] unless the inner link is
    /// connected and not yet activated.
    pub fn new(inner: Box<dyn Link<Bytes, Bytes>>) -> Result<Self, LinkError> {
        Self::with_max_frame(inner, DEFAULT_MAX_FRAME)
    }

    /// Wrap `inner` with an explicit frame bound.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::Construction`] unless the inner link is
    /// connected and not yet activated.
    pub fn with_max_frame(
        inner: Box<dyn Link<Bytes, Bytes>>,
        max_frame: usize,
    ) -> Result<Self, LinkError> {
        check_wrappable(inner.as_ref())?;

        let machine = Machine::initialized();
        let reassembly =
            Arc::new(Mutex::new(Reassembly { buffer: BytesMut::new(), poisoned: false }));

        {
            let hub = machine.hub().clone();
            inner.on_message(Arc::new(move |chunk: &Bytes| {
                let mut state = lock(&reassembly);
                if state.poisoned {
                    return;
                }
                state.buffer.extend_from_slice(chunk);

                loop {
                    if state.buffer.len() < LEN_PREFIX {
                        break;
                    }
                    let declared = {
                        let header: &[u8] = &state.buffer[..LEN_PREFIX];
                        u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize
                    };
                    if declared > max_frame {
                        tracing::error!(
                            declared,
                            max_frame,
                            "inbound frame header exceeds bound; discarding stream"
                        );
                        state.poisoned = true;
                        state.buffer.clear();
                        return;
                    }
                    if state.buffer.len() < LEN_PREFIX + declared {
                        break;
                    }
                    state.buffer.advance(LEN_PREFIX);
                    let frame = state.buffer.split_to(declared).freeze();
                    hub.deliver(&frame);
                }
            }));
        }

        Ok(Self { inner, machine, max_frame })
    }

    /// Scoped teardown: return the inner link with its lifecycle
    /// untouched.
    #[must_use]
    pub fn into_inner(self) -> Box<dyn Link<Bytes, Bytes>> {
        self.inner
    }
}

#[async_trait]
impl Link<Bytes, Bytes> for FramedLink {
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

    async fn send(&self, frame: Bytes) -> Result<(), LinkError> {
        let state = self.machine.current();
        if state != ConnectionState::Activated {
            return Err(LinkError::not_activated("send", state));
        }
        if frame.len() > self.max_frame {
            return Err(LinkError::FrameTooLarge { len: frame.len(), max: self.max_frame });
        }

        let mut framed = BytesMut::with_capacity(LEN_PREFIX + frame.len());
        framed.put_u32(frame.len() as u32);
        framed.extend_from_slice(&frame);
        self.inner.send(framed.freeze()).await
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
