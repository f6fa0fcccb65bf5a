//! Message transport
//!
//! Framing and delivery belong to the base P2P layer. The discovery core only
//! hands a message and a destination connection to a `PeerTransport`.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use tokio::sync::mpsc;

use crate::error::TransportError;
use crate::types::{NetMessage, PeerId};

/// Sends discovery messages to connected peers
#[async_trait]
pub trait PeerTransport: Send + Sync {
    async fn send(&self, peer: PeerId, message: NetMessage) -> Result<(), TransportError>;
}

/// In-memory transport that records every message
///
/// Used by the simulator and the tests. Peers marked closed fail like a
/// connection torn down mid-send.
#[derive(Default)]
pub struct LoopbackTransport {
    sent: Mutex<Vec<(PeerId, NetMessage)>>,
    closed: Mutex<HashSet<PeerId>>,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make further sends to `peer` fail
    pub fn close(&self, peer: PeerId) {
        self.closed.lock().insert(peer);
    }

    /// Take every recorded message
    pub fn drain(&self) -> Vec<(PeerId, NetMessage)> {
        std::mem::take(&mut *self.sent.lock())
    }

    /// Copy of the recorded messages
    pub fn sent(&self) -> Vec<(PeerId, NetMessage)> {
        self.sent.lock().clone()
    }

    /// Messages of one command sent to `peer`
    pub fn count_to(&self, peer: PeerId, command: &str) -> usize {
        self.sent
            .lock()
            .iter()
            .filter(|(to, msg)| *to == peer && msg.command() == command)
            .count()
    }

    /// Messages of one command across all peers
    pub fn count(&self, command: &str) -> usize {
        self.sent.lock().iter().filter(|(_, msg)| msg.command() == command).count()
    }
}

#[async_trait]
impl PeerTransport for LoopbackTransport {
    async fn send(&self, peer: PeerId, message: NetMessage) -> Result<(), TransportError> {
        if self.closed.lock().contains(&peer) {
            return Err(TransportError::PeerGone(peer));
        }
        self.sent.lock().push((peer, message));
        Ok(())
    }
}

/// Transport that forwards messages to a tokio channel
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<(PeerId, NetMessage)>,
}

impl ChannelTransport {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(PeerId, NetMessage)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl PeerTransport for ChannelTransport {
    async fn send(&self, peer: PeerId, message: NetMessage) -> Result<(), TransportError> {
        self.tx.send((peer, message)).map_err(|_| TransportError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_transport() {
        let (transport, mut rx) = ChannelTransport::new();
        transport.send(PeerId(3), NetMessage::GetAvaAddr).await.unwrap();
        assert_eq!(rx.recv().await, Some((PeerId(3), NetMessage::GetAvaAddr)));

        drop(rx);
        let result = transport.send(PeerId(3), NetMessage::GetAvaAddr).await;
        assert!(matches!(result, Err(TransportError::Closed)));
    }

    #[tokio::test]
    async fn test_loopback_records_messages() {
        let transport = LoopbackTransport::new();
        transport.send(PeerId(1), NetMessage::GetAvaAddr).await.unwrap();
        transport.send(PeerId(2), NetMessage::Addr(vec![])).await.unwrap();

        assert_eq!(transport.count_to(PeerId(1), "getavaaddr"), 1);
        assert_eq!(transport.count("addr"), 1);
        assert_eq!(transport.drain().len(), 2);
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_closed_peer_fails() {
        let transport = LoopbackTransport::new();
        transport.close(PeerId(1));

        let result = transport.send(PeerId(1), NetMessage::GetAvaAddr).await;
        assert!(matches!(result, Err(TransportError::PeerGone(_))));
        assert!(transport.sent().is_empty());
    }
}
