//! Discovery Service
//!
//! Owns every discovery component and wires them to the node's event paths:
//! connection events, incoming getavaaddr/addr messages and poll accounting
//! arrive from I/O tasks, while `run` drives the statistics, outbound and relay
//! timers. The peer registry lock is the only shared peer state and is always
//! released before a message is handed to the transport.

use rand::thread_rng;
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::clock::Clock;
use crate::config::DiscoveryConfig;
use crate::error::DiscoveryError;
use crate::metrics::Metrics;
use crate::outbound::{OutboundDecision, OutboundRequester};
use crate::quorum::{QuorumMonitor, QuorumState, QuorumThresholds};
use crate::registry::{AddrReception, PeerRegistry};
use crate::relay::ResponseRelay;
use crate::scoring::AvailabilityScorer;
use crate::selector::AddressSelector;
use crate::stake::StakeResolver;
use crate::throttle::RequestThrottle;
use crate::transport::PeerTransport;
use crate::types::{NetMessage, Peer, PeerId, StakeId};

/// Overlay address discovery for one node
pub struct DiscoveryService {
    config: Arc<DiscoveryConfig>,
    registry: Arc<PeerRegistry>,
    scorer: AvailabilityScorer,
    quorum: QuorumMonitor,
    throttle: RequestThrottle,
    selector: AddressSelector,
    relay: ResponseRelay,
    outbound: OutboundRequester,
    stakes: Arc<dyn StakeResolver>,
    transport: Arc<dyn PeerTransport>,
    clock: Arc<dyn Clock>,
    metrics: Arc<Metrics>,
}

impl DiscoveryService {
    /// Build the service from a validated configuration
    pub fn new(
        config: DiscoveryConfig,
        stakes: Arc<dyn StakeResolver>,
        transport: Arc<dyn PeerTransport>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, DiscoveryError> {
        config
            .validate()
            .map_err(|e| DiscoveryError::InvalidConfig(e.to_string()))?;

        let config = Arc::new(config);
        let registry = Arc::new(PeerRegistry::new());
        let metrics = Arc::new(Metrics::new());

        Ok(Self {
            scorer: AvailabilityScorer::new(
                config.statistics_interval_secs,
                config.statistics_time_constant_secs,
            ),
            quorum: QuorumMonitor::new(QuorumThresholds {
                min_quorum_stake: config.min_quorum_stake,
                min_connected_stake_ratio: config.min_connected_stake_ratio,
            }),
            throttle: RequestThrottle::new(registry.clone(), metrics.clone(), config.cooldown_interval_secs),
            selector: AddressSelector::new(config.max_addresses_to_send),
            relay: ResponseRelay::new(config.addr_send_average_interval_secs),
            outbound: OutboundRequester::new(
                config.min_responsive_options,
                config.outbound_request_min_secs,
                config.outbound_request_max_secs,
            ),
            config,
            registry,
            stakes,
            transport,
            clock,
            metrics,
        })
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<PeerRegistry> {
        &self.registry
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn quorum_state(&self) -> QuorumState {
        self.quorum.state()
    }

    pub fn is_quorum_established(&self) -> bool {
        self.quorum.is_established()
    }

    // =========================================================================
    // CONNECTION EVENTS
    // =========================================================================

    /// Register a new connection
    ///
    /// Outbound and manual overlay connections are asked for addresses once
    /// right away.
    pub async fn peer_connected(&self, peer: Peer) -> Result<(), DiscoveryError> {
        let id = peer.id;
        let ask_now = peer.is_outbound_request_target();
        self.registry.add(peer)?;

        if ask_now {
            self.request_addresses(id).await;
        }
        Ok(())
    }

    /// Forget a connection along with its score, ask state and queued response
    pub fn peer_disconnected(&self, id: PeerId) -> Option<Peer> {
        self.registry.remove(id)
    }

    /// Bind a connection to a stake proof
    pub fn bind_stake(&self, id: PeerId, stake: StakeId) -> Result<(), DiscoveryError> {
        self.registry.bind_stake(id, stake)
    }

    /// A poll was sent to `id`
    pub fn on_poll_sent(&self, id: PeerId) {
        self.registry.record_poll(id);
    }

    /// `id` answered a poll
    pub fn on_poll_response(&self, id: PeerId) {
        self.registry.record_poll_response(id);
    }

    // =========================================================================
    // MESSAGES
    // =========================================================================

    /// Dispatch a discovery message. Returns the addresses learned, if any.
    pub fn handle_message(&self, from: PeerId, message: NetMessage) -> Vec<SocketAddr> {
        match message {
            NetMessage::GetAvaAddr => {
                self.handle_getavaaddr(from);
                Vec::new()
            }
            NetMessage::Addr(addresses) => self.handle_addr(from, addresses),
        }
    }

    /// Process an incoming getavaaddr
    ///
    /// Returns true if a response was queued. Throttled requests and requests
    /// with nothing to advertise queue nothing and are not errors.
    pub fn handle_getavaaddr(&self, from: PeerId) -> bool {
        self.metrics.inc_requests_received();
        let now = self.clock.now();

        if !self.throttle.should_accept(from, now) {
            return false;
        }

        let candidates = self.registry.snapshot_where(|p| p.is_advertisable());
        let mut rng = thread_rng();

        let Some(entries) = self.selector.select(&candidates, from, &mut rng) else {
            self.metrics.inc_responses_suppressed();
            debug!("No responsive avalanche peer to advertise to peer {}", from);
            return false;
        };

        let count = entries.len();
        let response = self.relay.schedule(entries, now, &mut rng);
        let send_at = response.send_at;

        if !self.registry.queue_response(from, response) {
            // Requester left while we were selecting
            return false;
        }

        self.metrics.inc_responses_queued();
        debug!(
            "Queued {} avalanche addresses for peer {} (send in {}s)",
            count,
            from,
            send_at.saturating_sub(now)
        );
        true
    }

    /// Process an incoming addr message
    ///
    /// Only answers to our own getavaaddr are accepted. The returned addresses
    /// are deduplicated, capped and meant for the node's address book.
    pub fn handle_addr(&self, from: PeerId, addresses: Vec<SocketAddr>) -> Vec<SocketAddr> {
        match self.registry.record_addr_received(from) {
            AddrReception::UnknownPeer => Vec::new(),
            AddrReception::Unsolicited => {
                self.metrics.inc_addr_unsolicited();
                debug!("Ignoring unsolicited addr from peer {}", from);
                Vec::new()
            }
            AddrReception::Solicited => {
                self.metrics.inc_addr_received();
                let received = addresses.len();

                let mut seen = HashSet::new();
                let learned: Vec<SocketAddr> = addresses
                    .into_iter()
                    .filter(|a| seen.insert(*a))
                    .take(self.config.max_addresses_to_send)
                    .collect();

                debug!(
                    "Received {} avalanche addresses from peer {} ({} kept)",
                    received,
                    from,
                    learned.len()
                );
                learned
            }
        }
    }

    // =========================================================================
    // SCHEDULED WORK
    // =========================================================================

    /// Recompute availability scores and the quorum from one snapshot
    pub fn statistics_tick(&self) -> QuorumState {
        let snapshot = self.registry.take_statistics_snapshot();

        let scores = self.scorer.compute(&snapshot);
        let quorum = self.quorum.update(&snapshot, self.stakes.as_ref());
        let applied = self.registry.apply_scores(&scores);

        let stats = self.registry.stats();
        self.metrics.inc_statistics_ticks();
        self.metrics.set_network_state(&stats, &quorum);

        debug!(
            "Statistics tick: {} scores applied, {} responsive peers, {} of {} stake connected, quorum={}",
            applied, stats.responsive_peers, quorum.connected_stake, quorum.total_known_stake, quorum.established
        );
        quorum
    }

    /// Ask one of our connections for addresses if we still need them
    pub async fn outbound_tick(&self) -> OutboundDecision {
        let snapshot = self.registry.snapshot();
        let decision = self.outbound.evaluate(&snapshot, self.quorum.is_established());

        if let OutboundDecision::Request(id) = decision {
            self.request_addresses(id).await;
        }
        decision
    }

    /// Send every queued addr response whose time has come
    ///
    /// Returns the number of responses sent.
    pub async fn flush_responses(&self) -> usize {
        let due = self.registry.take_due_responses(self.clock.now());
        if due.is_empty() {
            return 0;
        }

        let live: HashMap<PeerId, Peer> = self
            .registry
            .snapshot()
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        let mut sent = 0;
        for (requester, response) in due {
            if !live.contains_key(&requester) {
                continue;
            }

            let addresses = ResponseRelay::revalidate(&response, &live);
            if addresses.is_empty() {
                self.metrics.inc_responses_suppressed();
                debug!("Dropping addr response to peer {}: no address left", requester);
                continue;
            }

            let count = addresses.len();
            match self.transport.send(requester, NetMessage::Addr(addresses)).await {
                Ok(()) => {
                    self.metrics.record_response_sent(count);
                    sent += 1;
                }
                Err(e) => debug!("Could not send addr to peer {}: {}", requester, e),
            }
        }
        sent
    }

    async fn request_addresses(&self, id: PeerId) -> bool {
        if !self.registry.mark_asked(id, self.clock.now()) {
            return false;
        }

        match self.transport.send(id, NetMessage::GetAvaAddr).await {
            Ok(()) => {
                self.registry.mark_awaiting_response(id);
                self.metrics.inc_outbound_requests();
                true
            }
            Err(e) => {
                debug!("Could not send getavaaddr to peer {}: {}", id, e);
                false
            }
        }
    }

    /// Drive the periodic work until `shutdown` turns true or its sender is dropped
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(
            "🔭 Overlay discovery started (statistics every {}s, outbound every {}-{}s)",
            self.config.statistics_interval_secs,
            self.config.outbound_request_min_secs,
            self.config.outbound_request_max_secs
        );

        let period = self.config.statistics_interval();
        let mut statistics = tokio::time::interval_at(Instant::now() + period, period);
        statistics.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut relay = tokio::time::interval(self.config.relay_check_interval());
        relay.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let first = self.outbound.next_period(&mut thread_rng());
        let outbound = tokio::time::sleep(first);
        tokio::pin!(outbound);

        loop {
            tokio::select! {
                _ = statistics.tick() => {
                    let quorum = self.statistics_tick();
                    let stats = self.registry.stats();
                    info!(
                        "📊 Status: {} peers, {} responsive, stake {}/{}, quorum {}",
                        stats.total_peers,
                        stats.responsive_peers,
                        quorum.connected_stake,
                        quorum.total_known_stake,
                        if quorum.established { "established" } else { "not established" }
                    );
                }
                _ = &mut outbound => {
                    self.outbound_tick().await;
                    let next = self.outbound.next_period(&mut thread_rng());
                    outbound.as_mut().reset(Instant::now() + next);
                }
                _ = relay.tick() => {
                    self.flush_responses().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Overlay discovery stopped");
    }
}
