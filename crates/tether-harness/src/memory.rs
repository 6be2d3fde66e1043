//! Paired in-memory transport.
//!
//! Two halves connected by unbounded channels: what one half sends,
//! the other half's reader task pushes through its inbound handle.
//! Delivery order is channel order, which matches the per-link receive
//! ordering the session layer guarantees.

use std::io;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tether_core::transport::{Inbound, Transport};

/// One half of a paired in-memory transport.
pub struct MemoryTransport {
    to_peer: mpsc::UnboundedSender<Bytes>,
    inbox: Option<mpsc::UnboundedReceiver<Bytes>>,
    reader: Option<JoinHandle<()>>,
    connected: bool,
    /// Outbound payloads are split into chunks of this size before
    /// crossing the channel; `None` sends them whole.
    chunk: Option<usize>,
}

impl MemoryTransport {
    /// A connected pair delivering payloads whole.
    #[must_use]
    pub fn pair() -> (Self, Self) {
        Self::build_pair(None)
    }

    /// A connected pair that splits every outbound payload into
    /// `chunk`-sized pieces, for exercising stream reassembly.
    #[must_use]
    pub fn pair_chunked(chunk: usize) -> (Self, Self) {
        Self::build_pair(Some(chunk))
    }

    fn build_pair(chunk: Option<usize>) -> (Self, Self) {
        let (a_to_b, b_inbox) = mpsc::unbounded_channel();
        let (b_to_a, a_inbox) = mpsc::unbounded_channel();

        let a = Self {
            to_peer: a_to_b,
            inbox: Some(a_inbox),
            reader: None,
            connected: true,
            chunk,
        };
        let b = Self {
            to_peer: b_to_a,
            inbox: Some(b_inbox),
            reader: None,
            connected: true,
            chunk,
        };
        (a, b)
    }

    fn stop_reader(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    type Outbound = Bytes;
    type Inbound = Bytes;

    async fn activate(&mut self, inbound: Inbound<Bytes>) -> io::Result<()> {
        let mut inbox = self
            .inbox
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::AlreadyExists, "already activated"))?;

        self.reader = Some(tokio::spawn(async move {
            while let Some(message) = inbox.recv().await {
                inbound.deliver(message);
            }
        }));
        Ok(())
    }

    async fn send(&mut self, message: Bytes) -> io::Result<()> {
        if !self.connected {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "disconnected"));
        }

        let closed = io::Error::new(io::ErrorKind::BrokenPipe, "peer inbox closed");
        match self.chunk {
            None => self.to_peer.send(message).map_err(|_| closed),
            Some(size) => {
                let mut rest = message;
                while !rest.is_empty() {
                    let piece = rest.split_to(size.min(rest.len()));
                    if self.to_peer.send(piece).is_err() {
                        return Err(closed);
                    }
                }
                Ok(())
            },
        }
    }

    async fn disconnect(&mut self) -> io::Result<()> {
        self.connected = false;
        self.stop_reader();
        Ok(())
    }

    async fn dispose(&mut self) -> io::Result<()> {
        self.connected = false;
        self.stop_reader();
        self.inbox = None;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tether_core::{Endpoint, Link};
    use tokio::sync::mpsc;

    use super::*;

    #[tokio::test]
    async fn pair_exchanges_payloads() {
        let (a, b) = MemoryTransport::pair();
        let a = Endpoint::new(a).unwrap();
        let b = Endpoint::new(b).unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        b.on_message(Arc::new(move |message: &Bytes| {
            let _ = tx.send(message.clone());
        }));

        a.activate().await.unwrap();
        b.activate().await.unwrap();

        a.send(Bytes::from_static(b"over the wire")).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b"over the wire"));
    }

    #[tokio::test]
    async fn chunked_pair_splits_payloads() {
        let (a, b) = MemoryTransport::pair_chunked(4);
        let a = Endpoint::new(a).unwrap();
        let b = Endpoint::new(b).unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        b.on_message(Arc::new(move |message: &Bytes| {
            let _ = tx.send(message.clone());
        }));

        a.activate().await.unwrap();
        b.activate().await.unwrap();

        a.send(Bytes::from_static(b"0123456789")).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b"0123"));
        assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b"4567"));
        assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b"89"));
    }
}
