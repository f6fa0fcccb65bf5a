//! Quorum Monitor
//!
//! Aggregates the stake of connected, bound overlay peers and decides whether
//! enough of the known stake is reachable for polling to start. Recomputed on
//! the statistics tick from the same snapshot the scorer uses.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info};

use crate::stake::StakeResolver;
use crate::types::{Peer, StakeAmount, StakeId};

/// Thresholds that gate the quorum
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuorumThresholds {
    /// Minimum absolute connected stake
    pub min_quorum_stake: StakeAmount,

    /// Minimum connected share of the known stake
    pub min_connected_stake_ratio: f64,
}

/// Derived quorum state
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct QuorumState {
    /// Stake of every proof known to the node
    pub total_known_stake: StakeAmount,

    /// Stake of the proofs with at least one connected overlay peer
    pub connected_stake: StakeAmount,

    /// Connections contributing to `connected_stake`
    pub connected_peers: usize,

    /// Whether polling may run
    pub established: bool,
}

impl QuorumState {
    /// Evaluate a pair of stake sums against the thresholds
    pub fn evaluate(
        total_known_stake: StakeAmount,
        connected_stake: StakeAmount,
        connected_peers: usize,
        thresholds: &QuorumThresholds,
    ) -> Self {
        let established = total_known_stake > 0
            && connected_stake >= thresholds.min_quorum_stake
            && (connected_stake as f64 / total_known_stake as f64) >= thresholds.min_connected_stake_ratio;

        Self {
            total_known_stake,
            connected_stake,
            connected_peers,
            established,
        }
    }

    /// Connected share of the known stake
    pub fn connected_ratio(&self) -> f64 {
        if self.total_known_stake == 0 {
            return 0.0;
        }
        self.connected_stake as f64 / self.total_known_stake as f64
    }
}

/// Tracks the quorum across statistics ticks
pub struct QuorumMonitor {
    thresholds: QuorumThresholds,
    state: RwLock<QuorumState>,
}

impl QuorumMonitor {
    pub fn new(thresholds: QuorumThresholds) -> Self {
        Self {
            thresholds,
            state: RwLock::new(QuorumState::default()),
        }
    }

    pub fn thresholds(&self) -> QuorumThresholds {
        self.thresholds
    }

    /// Recompute the quorum from a peer snapshot
    pub fn update(&self, snapshot: &[Peer], resolver: &dyn StakeResolver) -> QuorumState {
        let mut seen: HashSet<StakeId> = HashSet::new();
        let mut connected_stake: StakeAmount = 0;
        let mut connected_peers = 0;

        for peer in snapshot.iter().filter(|p| p.overlay_capable) {
            let Some(stake_id) = peer.stake_id else {
                continue;
            };
            connected_peers += 1;

            // Stake counts once per proof, however many connections share it
            if seen.insert(stake_id) {
                match resolver.stake_amount(&stake_id) {
                    Some(amount) => connected_stake = connected_stake.saturating_add(amount),
                    None => debug!("Peer {} bound to unknown stake {}", peer.id, stake_id),
                }
            }
        }

        let total_known_stake = resolver.total_known_stake().max(connected_stake);
        let next = QuorumState::evaluate(total_known_stake, connected_stake, connected_peers, &self.thresholds);

        let previous = {
            let mut state = self.state.write();
            std::mem::replace(&mut *state, next)
        };

        if next.established && !previous.established {
            info!(
                "Avalanche quorum established: {} of {} stake connected ({} peers)",
                next.connected_stake, next.total_known_stake, next.connected_peers
            );
        } else if !next.established && previous.established {
            info!(
                "Avalanche quorum lost: {} of {} stake connected",
                next.connected_stake, next.total_known_stake
            );
        }

        next
    }

    pub fn state(&self) -> QuorumState {
        *self.state.read()
    }

    pub fn is_established(&self) -> bool {
        self.state.read().established
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stake::StakeTable;
    use crate::types::{ConnectionKind, PeerId, NODE_AVALANCHE, NODE_NETWORK};
    use std::net::SocketAddr;

    fn create_bound_peer(id: u64, stake: Option<u8>) -> Peer {
        let mut peer = Peer::new(
            PeerId(id),
            SocketAddr::from(([10, 0, 0, id as u8], 8333)),
            ConnectionKind::Outbound,
            NODE_NETWORK | NODE_AVALANCHE,
            0,
        );
        peer.stake_id = stake.map(|s| StakeId([s; 32]));
        peer
    }

    fn thresholds(min_stake: StakeAmount, ratio: f64) -> QuorumThresholds {
        QuorumThresholds {
            min_quorum_stake: min_stake,
            min_connected_stake_ratio: ratio,
        }
    }

    #[test]
    fn test_no_known_stake_never_established() {
        let state = QuorumState::evaluate(0, 0, 0, &thresholds(0, 0.0));
        assert!(!state.established);
        assert_eq!(state.connected_ratio(), 0.0);
    }

    #[test]
    fn test_evaluate_thresholds() {
        assert!(QuorumState::evaluate(100, 80, 2, &thresholds(50, 0.8)).established);
        assert!(!QuorumState::evaluate(100, 79, 2, &thresholds(50, 0.8)).established);
        assert!(!QuorumState::evaluate(100, 80, 2, &thresholds(81, 0.8)).established);
    }

    #[test]
    fn test_stake_counted_once_per_proof() {
        let table = StakeTable::new();
        table.insert(StakeId([1; 32]), 100);
        table.insert(StakeId([2; 32]), 100);
        table.insert(StakeId([3; 32]), 200);

        let monitor = QuorumMonitor::new(thresholds(0, 0.5));
        let snapshot: Vec<Peer> = (0..8)
            .map(|i| create_bound_peer(i, Some(if i < 4 { 1 } else { 2 })))
            .chain(std::iter::once(create_bound_peer(9, None)))
            .collect();

        let state = monitor.update(&snapshot, &table);
        assert_eq!(state.connected_stake, 200);
        assert_eq!(state.total_known_stake, 400);
        assert_eq!(state.connected_peers, 8);
        assert!(state.established);
        assert!(monitor.is_established());
    }

    #[test]
    fn test_quorum_lost_when_peers_leave() {
        let table = StakeTable::new();
        table.insert(StakeId([1; 32]), 100);

        let monitor = QuorumMonitor::new(thresholds(100, 0.8));
        assert!(monitor.update(&[create_bound_peer(1, Some(1))], &table).established);
        assert!(!monitor.update(&[], &table).established);
        assert_eq!(monitor.state().connected_stake, 0);
    }

    #[test]
    fn test_non_overlay_peers_do_not_count() {
        let table = StakeTable::new();
        table.insert(StakeId([1; 32]), 100);

        let mut peer = create_bound_peer(1, Some(1));
        peer.overlay_capable = false;

        let monitor = QuorumMonitor::new(thresholds(1, 0.0));
        let state = monitor.update(&[peer], &table);
        assert_eq!(state.connected_stake, 0);
        assert_eq!(state.connected_peers, 0);
        assert!(!state.established);
    }

    #[test]
    fn test_thresholds_above_available_stake() {
        let table = StakeTable::new();
        table.insert(StakeId([1; 32]), 1_000);

        let monitor = QuorumMonitor::new(thresholds(100_000_000, 0.8));
        let snapshot: Vec<Peer> = (0..16).map(|i| create_bound_peer(i, Some(1))).collect();
        assert!(!monitor.update(&snapshot, &table).established);
    }
}
