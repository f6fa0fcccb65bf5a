//! In-memory peer registry
//!
//! A single `parking_lot::Mutex` serializes every mutation and snapshot. The
//! lock is never held across an `.await`; callers copy what they need and
//! release it before touching the network.

use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::debug;

use super::{AddrReception, RegistryStats, ThrottleDecision};
use crate::error::DiscoveryError;
use crate::types::{OutboundAsk, PendingAddrResponse, Peer, PeerId, StakeId, Timestamp};

/// Registry of connected peers
#[derive(Default)]
pub struct PeerRegistry {
    peers: Mutex<HashMap<PeerId, Peer>>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection
    pub fn add(&self, peer: Peer) -> Result<(), DiscoveryError> {
        let mut peers = self.peers.lock();
        if peers.contains_key(&peer.id) {
            return Err(DiscoveryError::DuplicatePeer(peer.id));
        }

        debug!(
            "Peer {} connected ({:?}, {}, overlay={})",
            peer.id, peer.kind, peer.address, peer.overlay_capable
        );
        peers.insert(peer.id, peer);
        Ok(())
    }

    /// Drop a connection together with its scores, ask state and queued response
    pub fn remove(&self, id: PeerId) -> Option<Peer> {
        let removed = self.peers.lock().remove(&id);
        if removed.is_some() {
            debug!("Peer {} disconnected", id);
        }
        removed
    }

    pub fn get(&self, id: PeerId) -> Option<Peer> {
        self.peers.lock().get(&id).cloned()
    }

    pub fn contains(&self, id: PeerId) -> bool {
        self.peers.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.peers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of every peer
    pub fn snapshot(&self) -> Vec<Peer> {
        self.snapshot_where(|_| true)
    }

    /// Copy of the peers matching `predicate`. Later mutations are not visible.
    pub fn snapshot_where<F>(&self, predicate: F) -> Vec<Peer>
    where
        F: Fn(&Peer) -> bool,
    {
        let peers = self.peers.lock();
        let mut out: Vec<Peer> = peers.values().filter(|p| predicate(p)).cloned().collect();
        out.sort_by_key(|p| p.id);
        out
    }

    /// Bind a connection to a stake proof. A binding is permanent for the connection.
    pub fn bind_stake(&self, id: PeerId, stake: StakeId) -> Result<(), DiscoveryError> {
        let mut peers = self.peers.lock();
        let peer = peers.get_mut(&id).ok_or(DiscoveryError::UnknownPeer(id))?;

        if !peer.overlay_capable {
            return Err(DiscoveryError::NotOverlayCapable(id));
        }
        if let Some(existing) = peer.stake_id {
            return Err(DiscoveryError::AlreadyBound { peer: id, stake: existing });
        }

        peer.stake_id = Some(stake);
        debug!("Peer {} bound to stake {}", id, stake);
        Ok(())
    }

    // =========================================================================
    // POLL STATISTICS
    // =========================================================================

    /// Count a poll sent to this peer. Returns false if the peer is gone.
    pub fn record_poll(&self, id: PeerId) -> bool {
        match self.peers.lock().get_mut(&id) {
            Some(peer) => {
                peer.polls_sent = peer.polls_sent.saturating_add(1);
                true
            }
            None => false,
        }
    }

    /// Count a poll response from this peer. Returns false if the peer is gone.
    pub fn record_poll_response(&self, id: PeerId) -> bool {
        match self.peers.lock().get_mut(&id) {
            Some(peer) => {
                peer.poll_responses = peer.poll_responses.saturating_add(1);
                true
            }
            None => false,
        }
    }

    /// Copy every peer and reset its poll counters in the same critical section
    ///
    /// The returned peers carry the counters accumulated since the previous call.
    pub fn take_statistics_snapshot(&self) -> Vec<Peer> {
        let mut peers = self.peers.lock();
        let mut out = Vec::with_capacity(peers.len());
        for peer in peers.values_mut() {
            out.push(peer.clone());
            peer.polls_sent = 0;
            peer.poll_responses = 0;
        }
        out.sort_by_key(|p| p.id);
        out
    }

    /// Publish a batch of availability scores. Peers that disconnected since the
    /// snapshot are skipped. Returns the number of scores applied.
    pub fn apply_scores(&self, scores: &HashMap<PeerId, f64>) -> usize {
        let mut peers = self.peers.lock();
        let mut applied = 0;
        for (id, score) in scores {
            if let Some(peer) = peers.get_mut(id) {
                peer.availability_score = *score;
                applied += 1;
            }
        }
        applied
    }

    // =========================================================================
    // INBOUND REQUESTS
    // =========================================================================

    /// Check the cooldown and record the request in one step
    ///
    /// Two concurrent requests from the same peer can never both be accepted.
    /// A rejected request leaves the peer untouched.
    pub fn try_accept_discovery_request(
        &self,
        id: PeerId,
        now: Timestamp,
        cooldown_secs: u64,
    ) -> ThrottleDecision {
        let mut peers = self.peers.lock();
        let Some(peer) = peers.get_mut(&id) else {
            return ThrottleDecision::UnknownPeer;
        };

        if !peer.overlay_capable {
            return ThrottleDecision::NotOverlayCapable;
        }

        if let Some(last) = peer.last_discovery_request_at {
            if now < last.saturating_add(cooldown_secs) {
                return ThrottleDecision::Ignored { last_accepted_at: last };
            }
        }

        peer.last_discovery_request_at = Some(now);
        ThrottleDecision::Accepted
    }

    /// Queue an addr response for a requester
    ///
    /// If a response is already queued its earlier send time is kept.
    pub fn queue_response(&self, id: PeerId, response: PendingAddrResponse) -> bool {
        let mut peers = self.peers.lock();
        let Some(peer) = peers.get_mut(&id) else {
            return false;
        };

        let send_at = match &peer.pending_response {
            Some(existing) => existing.send_at.min(response.send_at),
            None => response.send_at,
        };
        peer.pending_response = Some(PendingAddrResponse {
            entries: response.entries,
            send_at,
        });
        true
    }

    /// Remove and return every queued response whose send time has come
    pub fn take_due_responses(&self, now: Timestamp) -> Vec<(PeerId, PendingAddrResponse)> {
        let mut peers = self.peers.lock();
        let mut due = Vec::new();
        for peer in peers.values_mut() {
            let is_due = peer
                .pending_response
                .as_ref()
                .map(|r| r.send_at <= now)
                .unwrap_or(false);
            if is_due {
                if let Some(response) = peer.pending_response.take() {
                    due.push((peer.id, response));
                }
            }
        }
        due.sort_by_key(|(id, _)| *id);
        due
    }

    // =========================================================================
    // OUTBOUND REQUESTS
    // =========================================================================

    /// Record that we are about to ask this peer for addresses
    pub fn mark_asked(&self, id: PeerId, now: Timestamp) -> bool {
        match self.peers.lock().get_mut(&id) {
            Some(peer) => {
                peer.outbound_ask = OutboundAsk::Asked;
                peer.last_asked_at = Some(now);
                peer.times_asked = peer.times_asked.saturating_add(1);
                true
            }
            None => false,
        }
    }

    /// Record that the request was handed to the transport
    pub fn mark_awaiting_response(&self, id: PeerId) -> bool {
        match self.peers.lock().get_mut(&id) {
            Some(peer) if peer.outbound_ask == OutboundAsk::Asked => {
                peer.outbound_ask = OutboundAsk::AwaitingResponse;
                true
            }
            _ => false,
        }
    }

    /// Match an incoming addr message against our outstanding request
    pub fn record_addr_received(&self, id: PeerId) -> AddrReception {
        let mut peers = self.peers.lock();
        let Some(peer) = peers.get_mut(&id) else {
            return AddrReception::UnknownPeer;
        };

        match peer.outbound_ask {
            OutboundAsk::Asked | OutboundAsk::AwaitingResponse => {
                peer.outbound_ask = OutboundAsk::Answered;
                AddrReception::Solicited
            }
            OutboundAsk::NeverAsked | OutboundAsk::Answered => AddrReception::Unsolicited,
        }
    }

    /// Get registry statistics
    pub fn stats(&self) -> RegistryStats {
        let peers = self.peers.lock();
        let mut stats = RegistryStats {
            total_peers: peers.len(),
            ..Default::default()
        };

        for peer in peers.values() {
            if peer.overlay_capable {
                stats.overlay_peers += 1;
            }
            if peer.is_bound() {
                stats.bound_peers += 1;
            }
            if peer.is_advertisable() {
                stats.responsive_peers += 1;
            }
            if peer.is_outbound_request_target() {
                stats.outbound_targets += 1;
            }
            if peer.pending_response.is_some() {
                stats.pending_responses += 1;
            }
        }

        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ConnectionKind, NODE_AVALANCHE, NODE_NETWORK};
    use std::net::SocketAddr;
    use std::sync::Arc;

    fn create_test_peer(id: u64, kind: ConnectionKind, overlay: bool) -> Peer {
        let services = if overlay { NODE_NETWORK | NODE_AVALANCHE } else { NODE_NETWORK };
        Peer::new(
            PeerId(id),
            SocketAddr::from(([10, 0, 0, id as u8], 8333)),
            kind,
            services,
            0,
        )
    }

    #[test]
    fn test_add_get_remove() {
        let registry = PeerRegistry::new();
        registry.add(create_test_peer(1, ConnectionKind::Inbound, true)).unwrap();

        assert!(registry.contains(PeerId(1)));
        assert!(matches!(
            registry.add(create_test_peer(1, ConnectionKind::Inbound, true)),
            Err(DiscoveryError::DuplicatePeer(_))
        ));

        let removed = registry.remove(PeerId(1)).unwrap();
        assert_eq!(removed.id, PeerId(1));
        assert!(registry.get(PeerId(1)).is_none());
        assert!(registry.remove(PeerId(1)).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_snapshot_is_detached() {
        let registry = PeerRegistry::new();
        registry.add(create_test_peer(1, ConnectionKind::Outbound, true)).unwrap();
        registry.add(create_test_peer(2, ConnectionKind::Inbound, false)).unwrap();

        let overlay = registry.snapshot_where(|p| p.overlay_capable);
        assert_eq!(overlay.len(), 1);

        registry.remove(PeerId(1));
        // The snapshot still holds the removed peer
        assert_eq!(overlay[0].id, PeerId(1));
        assert_eq!(registry.snapshot().len(), 1);
    }

    #[test]
    fn test_bind_stake_once() {
        let registry = PeerRegistry::new();
        registry.add(create_test_peer(1, ConnectionKind::Inbound, true)).unwrap();
        registry.add(create_test_peer(2, ConnectionKind::Inbound, false)).unwrap();

        registry.bind_stake(PeerId(1), StakeId([1; 32])).unwrap();
        assert!(matches!(
            registry.bind_stake(PeerId(1), StakeId([2; 32])),
            Err(DiscoveryError::AlreadyBound { .. })
        ));
        assert!(matches!(
            registry.bind_stake(PeerId(2), StakeId([1; 32])),
            Err(DiscoveryError::NotOverlayCapable(_))
        ));
        assert!(matches!(
            registry.bind_stake(PeerId(3), StakeId([1; 32])),
            Err(DiscoveryError::UnknownPeer(_))
        ));

        assert_eq!(registry.get(PeerId(1)).unwrap().stake_id, Some(StakeId([1; 32])));
    }

    #[test]
    fn test_statistics_snapshot_resets_counters() {
        let registry = PeerRegistry::new();
        registry.add(create_test_peer(1, ConnectionKind::Outbound, true)).unwrap();

        registry.record_poll(PeerId(1));
        registry.record_poll(PeerId(1));
        registry.record_poll_response(PeerId(1));
        assert!(!registry.record_poll(PeerId(9)));

        let snapshot = registry.take_statistics_snapshot();
        assert_eq!(snapshot[0].polls_sent, 2);
        assert_eq!(snapshot[0].poll_responses, 1);

        let again = registry.take_statistics_snapshot();
        assert_eq!(again[0].polls_sent, 0);
        assert_eq!(again[0].poll_responses, 0);
    }

    #[test]
    fn test_apply_scores_skips_removed_peers() {
        let registry = PeerRegistry::new();
        registry.add(create_test_peer(1, ConnectionKind::Outbound, true)).unwrap();
        registry.add(create_test_peer(2, ConnectionKind::Outbound, true)).unwrap();

        let mut scores = HashMap::new();
        scores.insert(PeerId(1), 1.5);
        scores.insert(PeerId(2), -0.5);
        registry.remove(PeerId(2));

        assert_eq!(registry.apply_scores(&scores), 1);
        assert_eq!(registry.get(PeerId(1)).unwrap().availability_score, 1.5);
    }

    #[test]
    fn test_throttle_check_and_mark() {
        let registry = PeerRegistry::new();
        registry.add(create_test_peer(1, ConnectionKind::Inbound, true)).unwrap();
        registry.add(create_test_peer(2, ConnectionKind::Inbound, false)).unwrap();

        assert_eq!(registry.try_accept_discovery_request(PeerId(1), 1000, 120), ThrottleDecision::Accepted);
        assert_eq!(
            registry.try_accept_discovery_request(PeerId(1), 1119, 120),
            ThrottleDecision::Ignored { last_accepted_at: 1000 }
        );
        // Rejection did not move the timestamp
        assert_eq!(registry.get(PeerId(1)).unwrap().last_discovery_request_at, Some(1000));
        assert_eq!(registry.try_accept_discovery_request(PeerId(1), 1120, 120), ThrottleDecision::Accepted);

        assert_eq!(
            registry.try_accept_discovery_request(PeerId(2), 1000, 120),
            ThrottleDecision::NotOverlayCapable
        );
        assert_eq!(
            registry.try_accept_discovery_request(PeerId(3), 1000, 120),
            ThrottleDecision::UnknownPeer
        );
    }

    #[test]
    fn test_concurrent_requests_single_accept() {
        let registry = Arc::new(PeerRegistry::new());
        registry.add(create_test_peer(1, ConnectionKind::Inbound, true)).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    registry.try_accept_discovery_request(PeerId(1), 5000, 120) == ThrottleDecision::Accepted
                })
            })
            .collect();

        let accepted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|accepted| *accepted)
            .count();
        assert_eq!(accepted, 1);
    }

    #[test]
    fn test_pending_responses() {
        let registry = PeerRegistry::new();
        registry.add(create_test_peer(1, ConnectionKind::Inbound, true)).unwrap();
        registry.add(create_test_peer(2, ConnectionKind::Inbound, true)).unwrap();

        let entry = (PeerId(2), SocketAddr::from(([10, 0, 0, 2], 8333)));
        assert!(registry.queue_response(PeerId(1), PendingAddrResponse { entries: vec![entry], send_at: 50 }));
        assert!(registry.queue_response(PeerId(1), PendingAddrResponse { entries: vec![entry], send_at: 80 }));
        assert!(!registry.queue_response(PeerId(7), PendingAddrResponse { entries: vec![], send_at: 0 }));

        assert!(registry.take_due_responses(49).is_empty());
        let due = registry.take_due_responses(50);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].0, PeerId(1));
        assert!(registry.take_due_responses(100).is_empty());
    }

    #[test]
    fn test_outbound_ask_transitions() {
        let registry = PeerRegistry::new();
        registry.add(create_test_peer(1, ConnectionKind::Outbound, true)).unwrap();

        assert_eq!(registry.record_addr_received(PeerId(1)), AddrReception::Unsolicited);
        assert!(!registry.mark_awaiting_response(PeerId(1)));

        assert!(registry.mark_asked(PeerId(1), 10));
        assert!(registry.mark_awaiting_response(PeerId(1)));
        assert_eq!(registry.record_addr_received(PeerId(1)), AddrReception::Solicited);
        assert_eq!(registry.get(PeerId(1)).unwrap().outbound_ask, OutboundAsk::Answered);

        // Asking again after an answer is allowed
        assert!(registry.mark_asked(PeerId(1), 20));
        let peer = registry.get(PeerId(1)).unwrap();
        assert_eq!(peer.outbound_ask, OutboundAsk::Asked);
        assert_eq!(peer.times_asked, 2);
        assert_eq!(peer.last_asked_at, Some(20));

        assert_eq!(registry.record_addr_received(PeerId(5)), AddrReception::UnknownPeer);
        assert!(!registry.mark_asked(PeerId(5), 30));
    }

    #[test]
    fn test_stats() {
        let registry = PeerRegistry::new();
        registry.add(create_test_peer(1, ConnectionKind::Outbound, true)).unwrap();
        registry.add(create_test_peer(2, ConnectionKind::Inbound, true)).unwrap();
        registry.add(create_test_peer(3, ConnectionKind::Manual, false)).unwrap();
        registry.bind_stake(PeerId(1), StakeId([1; 32])).unwrap();

        let mut scores = HashMap::new();
        scores.insert(PeerId(1), 2.0);
        registry.apply_scores(&scores);

        let stats = registry.stats();
        assert_eq!(stats.total_peers, 3);
        assert_eq!(stats.overlay_peers, 2);
        assert_eq!(stats.bound_peers, 1);
        assert_eq!(stats.responsive_peers, 1);
        assert_eq!(stats.outbound_targets, 1);
        assert_eq!(stats.pending_responses, 0);
    }
}
