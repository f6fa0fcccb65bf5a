//! Addr Response Relay
//!
//! Accepted getavaaddr requests are answered after a random delay drawn from
//! an exponential distribution, so response times form a Poisson process and
//! do not reveal when the request arrived. Before sending, every queued address
//! is checked again against the live registry: peers that disconnected or lost
//! their positive score in the meantime are dropped from the response.

use rand::Rng;
use std::collections::HashMap;
use std::net::SocketAddr;

use crate::types::{PendingAddrResponse, Peer, PeerId, Timestamp};

/// Delay in whole seconds until the next event of a Poisson process
pub fn poisson_delay_secs<R: Rng + ?Sized>(average_interval_secs: u64, rng: &mut R) -> u64 {
    // gen::<f64>() is in [0, 1), so the logarithm stays finite
    let u: f64 = rng.gen();
    let delay = -(1.0 - u).ln() * average_interval_secs as f64;
    delay.ceil() as u64
}

/// Schedules and revalidates addr responses
#[derive(Debug, Clone)]
pub struct ResponseRelay {
    average_interval_secs: u64,
}

impl ResponseRelay {
    pub fn new(average_interval_secs: u64) -> Self {
        Self { average_interval_secs }
    }

    /// Build a queued response for the given selection
    pub fn schedule<R: Rng + ?Sized>(
        &self,
        entries: Vec<(PeerId, SocketAddr)>,
        now: Timestamp,
        rng: &mut R,
    ) -> PendingAddrResponse {
        PendingAddrResponse {
            entries,
            send_at: now.saturating_add(poisson_delay_secs(self.average_interval_secs, rng)),
        }
    }

    /// Keep only the addresses whose peer is still connected and advertisable
    pub fn revalidate(response: &PendingAddrResponse, live: &HashMap<PeerId, Peer>) -> Vec<SocketAddr> {
        response
            .entries
            .iter()
            .filter(|(id, address)| {
                live.get(id)
                    .map(|p| p.is_advertisable() && p.address == *address)
                    .unwrap_or(false)
            })
            .map(|(_, address)| *address)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ConnectionKind, NODE_AVALANCHE};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn create_scored_peer(id: u64, score: f64) -> Peer {
        let mut peer = Peer::new(
            PeerId(id),
            SocketAddr::from(([10, 0, 0, id as u8], 8333)),
            ConnectionKind::Outbound,
            NODE_AVALANCHE,
            0,
        );
        peer.availability_score = score;
        peer
    }

    #[test]
    fn test_poisson_delay_average() {
        let mut rng = StdRng::seed_from_u64(42);
        let samples = 20_000;
        let total: u64 = (0..samples).map(|_| poisson_delay_secs(30, &mut rng)).sum();
        let mean = total as f64 / samples as f64;

        // Ceiling adds about half a second on average
        assert!(mean > 28.0 && mean < 33.0, "mean was {}", mean);
    }

    #[test]
    fn test_schedule_in_future() {
        let relay = ResponseRelay::new(30);
        let mut rng = StdRng::seed_from_u64(1);
        let response = relay.schedule(vec![], 1000, &mut rng);
        assert!(response.send_at >= 1000);
    }

    #[test]
    fn test_revalidate_drops_stale_entries() {
        let kept = create_scored_peer(1, 2.0);
        let demoted = create_scored_peer(2, -1.0);
        let gone = create_scored_peer(3, 2.0);

        let response = PendingAddrResponse {
            entries: vec![
                (kept.id, kept.address),
                (demoted.id, demoted.address),
                (gone.id, gone.address),
            ],
            send_at: 0,
        };

        let live: HashMap<PeerId, Peer> = [kept.clone(), demoted]
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        assert_eq!(ResponseRelay::revalidate(&response, &live), vec![kept.address]);
        assert!(ResponseRelay::revalidate(&response, &HashMap::new()).is_empty());
    }
}
