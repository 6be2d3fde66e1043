//! Connection lifecycle integration tests.
//!
//! Full state machine over the in-memory transport pair:
//! - construct -> activate -> exchange -> disconnect
//! - state preconditions on every operation
//! - idempotent dispose
//! - teardown-failure semantics

use std::sync::Arc;

use bytes::Bytes;
use tether_core::{ConnectionState, DisconnectReason, Endpoint, Link, LinkError, LinkEvent};
use tether_harness::{EventLog, MemoryTransport, ProbeTransport};
use tokio::sync::mpsc;

/// Forward a link's inbound messages into a channel the test can await.
fn subscribe(link: &dyn Link<Bytes, Bytes>) -> mpsc::UnboundedReceiver<Bytes> {
    let (tx, rx) = mpsc::unbounded_channel();
    link.on_message(Arc::new(move |message: &Bytes| {
        let _ = tx.send(message.clone());
    }));
    rx
}

#[tokio::test]
async fn end_to_end_hello() {
    let (ta, tb) = MemoryTransport::pair();
    let a = Endpoint::new(ta).unwrap();
    let b = Endpoint::new(tb).unwrap();

    let events = EventLog::new();
    events.attach(&a);
    let mut received = subscribe(&b);

    // Construction-time validation already ran.
    assert_eq!(a.state(), ConnectionState::Initialized);

    a.activate().await.unwrap();
    b.activate().await.unwrap();
    assert_eq!(a.state(), ConnectionState::Activated);

    a.send(Bytes::from_static(b"hello")).await.unwrap();
    assert_eq!(received.recv().await.unwrap(), Bytes::from_static(b"hello"));

    a.disconnect().await.unwrap();
    assert_eq!(a.state(), ConnectionState::Disconnected);

    let late = a.send(Bytes::from_static(b"late")).await;
    assert!(matches!(late, Err(LinkError::InvalidState { operation: "send", .. })));

    // The activation and teardown edges were all observable, and the
    // disconnected notification fired exactly once.
    let snapshot = events.snapshot();
    assert!(snapshot.contains(&LinkEvent::StateChanged {
        from: ConnectionState::Initialized,
        to: ConnectionState::Activating,
    }));
    assert!(snapshot.contains(&LinkEvent::StateChanged {
        from: ConnectionState::Disconnecting,
        to: ConnectionState::Disconnected,
    }));
    assert_eq!(
        events.count(|event| matches!(event, LinkEvent::Disconnected { .. })),
        1
    );
    assert_eq!(
        events.count(|event| matches!(
            event,
            LinkEvent::Disconnected { reason: DisconnectReason::Graceful }
        )),
        1
    );
}

#[tokio::test]
async fn operations_require_their_states() {
    let (ta, _tb) = MemoryTransport::pair();
    let a = Endpoint::new(ta).unwrap();

    // Nothing is legal before activation except activate and dispose.
    assert!(a.send(Bytes::from_static(b"x")).await.unwrap_err().is_invalid_state());
    assert!(a.disconnect().await.unwrap_err().is_invalid_state());

    a.activate().await.unwrap();

    // Activate is only legal from Initialized.
    let again = a.activate().await;
    assert!(matches!(
        again,
        Err(LinkError::InvalidState { required: ConnectionState::Initialized, .. })
    ));
}

#[tokio::test]
async fn dispose_is_idempotent() {
    let (transport, calls) = ProbeTransport::new();
    let link = Endpoint::new(transport).unwrap();
    link.activate().await.unwrap();

    link.dispose().await;
    link.dispose().await;
    link.dispose().await;

    assert_eq!(link.state(), ConnectionState::Disposed);
    assert_eq!(calls.disposed.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[tokio::test]
async fn dispose_before_activation_is_clean() {
    let (transport, calls) = ProbeTransport::new();
    let link = Endpoint::new(transport).unwrap();

    link.dispose().await;

    assert_eq!(link.state(), ConnectionState::Disposed);
    assert_eq!(calls.activated.load(std::sync::atomic::Ordering::SeqCst), 0);
    assert_eq!(calls.disposed.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failed_teardown_still_reaches_disconnected() {
    let (transport, calls) = ProbeTransport::failing_disconnect();
    let link = Endpoint::new(transport).unwrap();
    link.activate().await.unwrap();

    let result = link.disconnect().await;
    assert!(matches!(result, Err(LinkError::Transport(_))));

    // The state machine is never stranded in Disconnecting.
    assert_eq!(link.state(), ConnectionState::Disconnected);
    assert_eq!(calls.disconnected.load(std::sync::atomic::Ordering::SeqCst), 1);

    // Best-effort cleanup of the underlying resource still happens.
    link.dispose().await;
    assert_eq!(calls.disposed.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[tokio::test]
async fn late_inbound_delivery_is_dropped() {
    let (transport, _calls) = ProbeTransport::new();
    let handle = transport.inbound_handle();
    let link = Endpoint::new(transport).unwrap();
    let mut received = subscribe(&link);

    link.activate().await.unwrap();
    let inbound = handle.lock().unwrap().clone().unwrap();

    // Delivery is synchronous with respect to the pushing task.
    inbound.deliver(Bytes::from_static(b"live"));
    assert_eq!(received.try_recv().unwrap(), Bytes::from_static(b"live"));

    link.disconnect().await.unwrap();

    // A transport racing its own teardown pushes into the void.
    inbound.deliver(Bytes::from_static(b"late"));
    assert!(received.try_recv().is_err());
}

#[tokio::test]
async fn failed_activation_leaves_the_link_reactivatable() {
    struct FlakyActivate {
        attempts: usize,
    }

    #[async_trait::async_trait]
    impl tether_core::Transport for FlakyActivate {
        type Outbound = Bytes;
        type Inbound = Bytes;

        async fn activate(
            &mut self,
            _inbound: tether_core::Inbound<Bytes>,
        ) -> std::io::Result<()> {
            self.attempts += 1;
            if self.attempts == 1 {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "first attempt fails",
                ));
            }
            Ok(())
        }

        async fn send(&mut self, _message: Bytes) -> std::io::Result<()> {
            Ok(())
        }

        async fn disconnect(&mut self) -> std::io::Result<()> {
            Ok(())
        }

        async fn dispose(&mut self) -> std::io::Result<()> {
            Ok(())
        }

        fn is_connected(&self) -> bool {
            true
        }
    }

    let link = Endpoint::new(FlakyActivate { attempts: 0 }).unwrap();

    let first = link.activate().await;
    assert!(matches!(first, Err(LinkError::Transport(_))));
    assert_eq!(link.state(), ConnectionState::Initialized);

    link.activate().await.unwrap();
    assert_eq!(link.state(), ConnectionState::Activated);
}
