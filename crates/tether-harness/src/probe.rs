//! Instrumented transports and an event recorder.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use tether_core::event::LinkEvent;
use tether_core::link::Link;
use tether_core::transport::{Inbound, Transport};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shared view of a [`ProbeTransport`]'s hook invocations.
#[derive(Default)]
pub struct ProbeCalls {
    /// Number of `activate` calls.
    pub activated: AtomicUsize,
    /// Number of `disconnect` calls.
    pub disconnected: AtomicUsize,
    /// Number of `dispose` calls.
    pub disposed: AtomicUsize,
    /// Everything the endpoint sent, in order.
    pub sent: Mutex<Vec<Bytes>>,
    connected: AtomicBool,
}

impl ProbeCalls {
    /// Flip the transport's reported connectivity.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Snapshot of sent payloads.
    pub fn sent(&self) -> Vec<Bytes> {
        lock(&self.sent).clone()
    }
}

/// Transport double that records hook invocations.
pub struct ProbeTransport {
    calls: Arc<ProbeCalls>,
    fail_disconnect: bool,
    inbound: Arc<Mutex<Option<Inbound<Bytes>>>>,
}

impl ProbeTransport {
    /// A connected probe and its call record.
    #[must_use]
    pub fn new() -> (Self, Arc<ProbeCalls>) {
        let calls = Arc::new(ProbeCalls::default());
        calls.set_connected(true);
        let probe = Self {
            calls: calls.clone(),
            fail_disconnect: false,
            inbound: Arc::new(Mutex::new(None)),
        };
        (probe, calls)
    }

    /// A probe whose `disconnect` hook fails with a broken pipe.
    #[must_use]
    pub fn failing_disconnect() -> (Self, Arc<ProbeCalls>) {
        let (mut probe, calls) = Self::new();
        probe.fail_disconnect = true;
        (probe, calls)
    }

    /// Handle for injecting inbound messages once activated.
    #[must_use]
    pub fn inbound_handle(&self) -> Arc<Mutex<Option<Inbound<Bytes>>>> {
        self.inbound.clone()
    }
}

#[async_trait]
impl Transport for ProbeTransport {
    type Outbound = Bytes;
    type Inbound = Bytes;

    async fn activate(&mut self, inbound: Inbound<Bytes>) -> io::Result<()> {
        self.calls.activated.fetch_add(1, Ordering::SeqCst);
        *lock(&self.inbound) = Some(inbound);
        Ok(())
    }

    async fn send(&mut self, message: Bytes) -> io::Result<()> {
        lock(&self.calls.sent).push(message);
        Ok(())
    }

    async fn disconnect(&mut self) -> io::Result<()> {
        self.calls.disconnected.fetch_add(1, Ordering::SeqCst);
        if self.fail_disconnect {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "teardown failed"));
        }
        self.calls.set_connected(false);
        Ok(())
    }

    async fn dispose(&mut self) -> io::Result<()> {
        self.calls.disposed.fetch_add(1, Ordering::SeqCst);
        self.calls.set_connected(false);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.calls.connected.load(Ordering::SeqCst)
    }
}

/// One half of a two-phase write in a [`ShearTransport`] log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WritePhase {
    /// First half of a send.
    Begin(Bytes),
    /// Second half of the same send.
    End(Bytes),
}

/// Transport that writes each message in two phases with scheduling
/// points in between. If two sends ever run concurrently, their
/// phases interleave in the log.
pub struct ShearTransport {
    log: Arc<Mutex<Vec<WritePhase>>>,
}

impl ShearTransport {
    /// A shear transport and its shared write log.
    #[must_use]
    pub fn new() -> (Self, Arc<Mutex<Vec<WritePhase>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        (Self { log: log.clone() }, log)
    }
}

#[async_trait]
impl Transport for ShearTransport {
    type Outbound = Bytes;
    type Inbound = Bytes;

    async fn activate(&mut self, _inbound: Inbound<Bytes>) -> io::Result<()> {
        Ok(())
    }

    async fn send(&mut self, message: Bytes) -> io::Result<()> {
        lock(&self.log).push(WritePhase::Begin(message.clone()));
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(1)).await;
        lock(&self.log).push(WritePhase::End(message));
        Ok(())
    }

    async fn disconnect(&mut self) -> io::Result<()> {
        Ok(())
    }

    async fn dispose(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn is_connected(&self) -> bool {
        true
    }
}

/// Records lifecycle events for later assertion.
#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<LinkEvent>>>,
}

impl EventLog {
    /// An empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe this log to a link's lifecycle events.
    pub fn attach(&self, link: &dyn Link<Bytes, Bytes>) {
        let events = self.events.clone();
        link.on_event(Arc::new(move |event| {
            lock(&events).push(*event);
        }));
    }

    /// Snapshot of recorded events.
    #[must_use]
    pub fn snapshot(&self) -> Vec<LinkEvent> {
        lock(&self.events).clone()
    }

    /// How many recorded events satisfy `predicate`.
    pub fn count(&self, predicate: impl Fn(&LinkEvent) -> bool) -> usize {
        lock(&self.events).iter().filter(|event| predicate(event)).count()
    }
}
