//! Availability Scoring
//!
//! Recomputes the availability score of every bound overlay peer once per
//! statistics interval, from the polls sent and answered since the last tick.
//! Results are returned as a batch and published by the caller in one step.

pub mod decay;

use std::collections::HashMap;
use tracing::debug;

use crate::types::{Peer, PeerId};

/// Batch availability scorer
#[derive(Debug, Clone)]
pub struct AvailabilityScorer {
    /// Weight of the latest interval
    decay_factor: f64,
}

impl AvailabilityScorer {
    pub fn new(statistics_interval_secs: u64, time_constant_secs: u64) -> Self {
        Self {
            decay_factor: decay::decay_factor(statistics_interval_secs, time_constant_secs),
        }
    }

    pub fn decay_factor(&self) -> f64 {
        self.decay_factor
    }

    /// Whether a peer takes part in scoring
    pub fn is_scored(peer: &Peer) -> bool {
        peer.overlay_capable && peer.is_bound()
    }

    /// Compute new scores for a statistics snapshot
    ///
    /// `snapshot` must carry the poll counters of the interval that just ended.
    /// Unbound and non-overlay peers are left out and keep their score.
    pub fn compute(&self, snapshot: &[Peer]) -> HashMap<PeerId, f64> {
        let mut scores = HashMap::new();

        for peer in snapshot.iter().filter(|p| Self::is_scored(p)) {
            let score = decay::next_score(
                peer.availability_score,
                peer.poll_responses,
                peer.polls_sent,
                self.decay_factor,
            );
            scores.insert(peer.id, score);
        }

        debug!("Computed availability scores for {} peers", scores.len());
        scores
    }
}
