//! Request Throttle
//!
//! Enforces a minimum interval between accepted getavaaddr requests from the
//! same peer. Repeated requests are not misbehavior: they are dropped with a
//! debug log and the connection is left alone.

use std::sync::Arc;
use tracing::debug;

use crate::metrics::Metrics;
use crate::registry::{PeerRegistry, ThrottleDecision};
use crate::types::{PeerId, Timestamp};

/// Per-peer cooldown for incoming discovery requests
pub struct RequestThrottle {
    registry: Arc<PeerRegistry>,
    metrics: Arc<Metrics>,
    cooldown_secs: u64,
}

impl RequestThrottle {
    pub fn new(registry: Arc<PeerRegistry>, metrics: Arc<Metrics>, cooldown_secs: u64) -> Self {
        Self {
            registry,
            metrics,
            cooldown_secs,
        }
    }

    pub fn cooldown_secs(&self) -> u64 {
        self.cooldown_secs
    }

    /// Decide whether to answer a getavaaddr from `peer_id`
    ///
    /// Acceptance records `now` as the peer's last accepted request atomically
    /// with the decision.
    pub fn should_accept(&self, peer_id: PeerId, now: Timestamp) -> bool {
        match self.registry.try_accept_discovery_request(peer_id, now, self.cooldown_secs) {
            ThrottleDecision::Accepted => {
                self.metrics.inc_requests_accepted();
                true
            }
            ThrottleDecision::Ignored { last_accepted_at } => {
                self.metrics.inc_requests_ignored();
                debug!(
                    "Ignoring repeated getavaaddr from peer {}: repeated request within cooldown ({}s since last accepted)",
                    peer_id,
                    now.saturating_sub(last_accepted_at)
                );
                false
            }
            ThrottleDecision::NotOverlayCapable => {
                self.metrics.inc_requests_ignored();
                debug!("Ignoring getavaaddr from peer {} without overlay support", peer_id);
                false
            }
            ThrottleDecision::UnknownPeer => {
                debug!("Dropping getavaaddr from disconnected peer {}", peer_id);
                false
            }
        }
    }
}
