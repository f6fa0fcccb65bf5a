//! Stake resolution
//!
//! Proof validation happens elsewhere. The discovery core only needs to know
//! how much stake a bound proof carries and how much stake is known overall.

use parking_lot::RwLock;
use std::collections::HashMap;

use crate::types::{StakeAmount, StakeId};

/// Supplies stake amounts for bound proofs
pub trait StakeResolver: Send + Sync {
    /// Stake carried by a proof, `None` if the proof is unknown
    fn stake_amount(&self, id: &StakeId) -> Option<StakeAmount>;

    /// Sum of the stake of every proof known to the node
    fn total_known_stake(&self) -> StakeAmount;
}

/// In-memory proof table
#[derive(Default)]
pub struct StakeTable {
    stakes: RwLock<HashMap<StakeId, StakeAmount>>,
}

impl StakeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or update a proof
    pub fn insert(&self, id: StakeId, amount: StakeAmount) {
        self.stakes.write().insert(id, amount);
    }

    /// Forget a proof
    pub fn remove(&self, id: &StakeId) -> Option<StakeAmount> {
        self.stakes.write().remove(id)
    }

    pub fn len(&self) -> usize {
        self.stakes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StakeResolver for StakeTable {
    fn stake_amount(&self, id: &StakeId) -> Option<StakeAmount> {
        self.stakes.read().get(id).copied()
    }

    fn total_known_stake(&self) -> StakeAmount {
        self.stakes
            .read()
            .values()
            .fold(0, |acc: StakeAmount, v| acc.saturating_add(*v))
    }
}
