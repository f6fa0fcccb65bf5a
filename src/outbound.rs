//! Outbound Address Requests
//!
//! While the quorum is not established, or too few responsive overlay peers
//! are known, the node asks one of its own outbound or manual overlay
//! connections for more addresses on every tick. Connections never asked come
//! first, then the one asked longest ago. Ticks are spaced randomly between
//! the configured bounds so nodes do not ask in lockstep.

use rand::Rng;
use std::time::Duration;
use tracing::debug;

use crate::types::{Peer, PeerId};

/// Result of one outbound tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboundDecision {
    /// Quorum established and enough responsive peers known
    Satisfied,

    /// More addresses needed but no connection can be asked
    NoEligibleTarget,

    /// Ask this connection
    Request(PeerId),
}

/// Decides when and whom to ask for addresses
#[derive(Debug, Clone)]
pub struct OutboundRequester {
    min_responsive_options: usize,
    period_min_secs: u64,
    period_max_secs: u64,
}

impl OutboundRequester {
    pub fn new(min_responsive_options: usize, period_min_secs: u64, period_max_secs: u64) -> Self {
        Self {
            min_responsive_options,
            period_min_secs,
            period_max_secs: period_max_secs.max(period_min_secs),
        }
    }

    /// Randomized delay until the next tick
    pub fn next_period<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        Duration::from_secs(rng.gen_range(self.period_min_secs..=self.period_max_secs))
    }

    /// Whether the node should keep asking for addresses
    pub fn needs_more_addresses(&self, snapshot: &[Peer], quorum_established: bool) -> bool {
        if !quorum_established {
            return true;
        }
        let responsive = snapshot.iter().filter(|p| p.is_advertisable()).count();
        responsive < self.min_responsive_options
    }

    /// Pick the connection to ask: never asked first, then least recently asked
    pub fn choose_target(snapshot: &[Peer]) -> Option<PeerId> {
        snapshot
            .iter()
            .filter(|p| p.is_outbound_request_target())
            .min_by_key(|p| (p.last_asked_at, p.id))
            .map(|p| p.id)
    }

    /// Evaluate one tick against a registry snapshot
    pub fn evaluate(&self, snapshot: &[Peer], quorum_established: bool) -> OutboundDecision {
        if !self.needs_more_addresses(snapshot, quorum_established) {
            return OutboundDecision::Satisfied;
        }

        match Self::choose_target(snapshot) {
            Some(id) => {
                debug!(
                    "Requesting more avalanche addresses from peer {} (quorum established: {})",
                    id, quorum_established
                );
                OutboundDecision::Request(id)
            }
            None => {
                debug!("Need more avalanche addresses but no outbound avalanche peer to ask");
                OutboundDecision::NoEligibleTarget
            }
        }
    }
}
