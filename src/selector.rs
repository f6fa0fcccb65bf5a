//! Address Selection
//!
//! Picks the addresses returned for an accepted getavaaddr. Only overlay peers
//! with a strictly positive availability score qualify; among them the choice
//! is uniform, the score only gates eligibility.

use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashSet;
use std::net::SocketAddr;

use crate::types::{Peer, PeerId};

/// Chooses addresses for addr responses
#[derive(Debug, Clone)]
pub struct AddressSelector {
    max_addresses: usize,
}

impl AddressSelector {
    pub fn new(max_addresses: usize) -> Self {
        Self { max_addresses }
    }

    pub fn max_addresses(&self) -> usize {
        self.max_addresses
    }

    /// Select up to `max_addresses` distinct addresses for `requester`
    ///
    /// Returns `None` when no peer qualifies, in which case no message must be
    /// sent at all.
    pub fn select<R: Rng + ?Sized>(
        &self,
        snapshot: &[Peer],
        requester: PeerId,
        rng: &mut R,
    ) -> Option<Vec<(PeerId, SocketAddr)>> {
        let mut seen = HashSet::new();
        let candidates: Vec<(PeerId, SocketAddr)> = snapshot
            .iter()
            .filter(|p| p.id != requester && p.is_advertisable())
            .filter(|p| seen.insert(p.address))
            .map(|p| (p.id, p.address))
            .collect();

        if candidates.is_empty() {
            return None;
        }

        if candidates.len() <= self.max_addresses {
            return Some(candidates);
        }

        Some(
            candidates
                .choose_multiple(rng, self.max_addresses)
                .copied()
                .collect(),
        )
    }
}
