//! Metrics Collection
//!
//! Counters and gauges for the discovery subsystem. An unmet quorum or a quiet
//! network only ever shows up here, never as an error.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::quorum::QuorumState;
use crate::registry::RegistryStats;

/// Metrics collector for overlay discovery
#[derive(Default)]
pub struct Metrics {
    /// Start time for uptime calculation
    start_time: Option<Instant>,

    /// getavaaddr received from peers
    pub requests_received: AtomicU64,

    /// getavaaddr that passed the cooldown
    pub requests_accepted: AtomicU64,

    /// getavaaddr dropped by the cooldown or capability check
    pub requests_ignored: AtomicU64,

    /// addr responses queued for sending
    pub responses_queued: AtomicU64,

    /// addr responses sent
    pub responses_sent: AtomicU64,

    /// Accepted requests that produced no response
    pub responses_suppressed: AtomicU64,

    /// Addresses sent across all responses
    pub addresses_sent: AtomicU64,

    /// getavaaddr we sent to our own connections
    pub outbound_requests_sent: AtomicU64,

    /// addr messages received in answer to our requests
    pub addr_received: AtomicU64,

    /// addr messages we did not ask for
    pub addr_unsolicited: AtomicU64,

    /// Completed statistics ticks
    pub statistics_ticks: AtomicU64,

    /// Connected peers
    pub peers: AtomicU64,

    /// Overlay peers with a positive availability score
    pub responsive_peers: AtomicU64,

    /// Stake connected through bound peers
    pub connected_stake: AtomicU64,

    /// Stake known to the node
    pub total_known_stake: AtomicU64,

    /// 1 while the quorum is established
    pub quorum_established: AtomicU64,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> Self {
        Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.map(|t| t.elapsed().as_secs()).unwrap_or(0)
    }

    pub fn inc_requests_received(&self) {
        self.requests_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_requests_accepted(&self) {
        self.requests_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_requests_ignored(&self) {
        self.requests_ignored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_responses_queued(&self) {
        self.responses_queued.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a sent response and its size
    pub fn record_response_sent(&self, addresses: usize) {
        self.responses_sent.fetch_add(1, Ordering::Relaxed);
        self.addresses_sent.fetch_add(addresses as u64, Ordering::Relaxed);
    }

    pub fn inc_responses_suppressed(&self) {
        self.responses_suppressed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_outbound_requests(&self) {
        self.outbound_requests_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_addr_received(&self) {
        self.addr_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_addr_unsolicited(&self) {
        self.addr_unsolicited.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_statistics_ticks(&self) {
        self.statistics_ticks.fetch_add(1, Ordering::Relaxed);
    }

    /// Update the gauges after a statistics tick
    pub fn set_network_state(&self, stats: &RegistryStats, quorum: &QuorumState) {
        self.peers.store(stats.total_peers as u64, Ordering::Relaxed);
        self.responsive_peers.store(stats.responsive_peers as u64, Ordering::Relaxed);
        self.connected_stake.store(quorum.connected_stake, Ordering::Relaxed);
        self.total_known_stake.store(quorum.total_known_stake, Ordering::Relaxed);
        self.quorum_established.store(quorum.established as u64, Ordering::Relaxed);
    }

    /// Export metrics in Prometheus format
    pub fn to_prometheus(&self) -> String {
        let counters = [
            ("getavaaddr_received_total", "getavaaddr requests received", &self.requests_received),
            ("getavaaddr_accepted_total", "getavaaddr requests accepted", &self.requests_accepted),
            ("getavaaddr_ignored_total", "getavaaddr requests ignored", &self.requests_ignored),
            ("addr_responses_queued_total", "addr responses queued", &self.responses_queued),
            ("addr_responses_sent_total", "addr responses sent", &self.responses_sent),
            ("addr_responses_suppressed_total", "Accepted requests without response", &self.responses_suppressed),
            ("addresses_sent_total", "Addresses sent in addr responses", &self.addresses_sent),
            ("getavaaddr_sent_total", "getavaaddr requests sent to our connections", &self.outbound_requests_sent),
            ("addr_received_total", "Solicited addr messages received", &self.addr_received),
            ("addr_unsolicited_total", "Unsolicited addr messages", &self.addr_unsolicited),
            ("statistics_ticks_total", "Availability statistics computations", &self.statistics_ticks),
        ];
        let gauges = [
            ("peers", "Connected peers", &self.peers),
            ("responsive_peers", "Overlay peers with positive availability score", &self.responsive_peers),
            ("connected_stake", "Stake connected through bound peers", &self.connected_stake),
            ("total_known_stake", "Stake known to the node", &self.total_known_stake),
            ("quorum_established", "Whether the avalanche quorum is established", &self.quorum_established),
        ];

        let mut output = String::new();

        output.push_str(&format!(
            "# HELP overlay_discovery_uptime_seconds Uptime in seconds\n\
             # TYPE overlay_discovery_uptime_seconds gauge\n\
             overlay_discovery_uptime_seconds {}\n\n",
            self.uptime_secs()
        ));

        for (kind, entries) in [("counter", &counters[..]), ("gauge", &gauges[..])] {
            for (name, help, value) in entries {
                output.push_str(&format!(
                    "# HELP overlay_discovery_{name} {help}\n\
                     # TYPE overlay_discovery_{name} {kind}\n\
                     overlay_discovery_{name} {}\n\n",
                    value.load(Ordering::Relaxed)
                ));
            }
        }

        output
    }

    /// Export metrics as JSON
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "uptime_secs": self.uptime_secs(),
            "getavaaddr": {
                "received": self.requests_received.load(Ordering::Relaxed),
                "accepted": self.requests_accepted.load(Ordering::Relaxed),
                "ignored": self.requests_ignored.load(Ordering::Relaxed),
                "sent": self.outbound_requests_sent.load(Ordering::Relaxed),
            },
            "addr": {
                "queued": self.responses_queued.load(Ordering::Relaxed),
                "sent": self.responses_sent.load(Ordering::Relaxed),
                "suppressed": self.responses_suppressed.load(Ordering::Relaxed),
                "addresses_sent": self.addresses_sent.load(Ordering::Relaxed),
                "received": self.addr_received.load(Ordering::Relaxed),
                "unsolicited": self.addr_unsolicited.load(Ordering::Relaxed),
            },
            "network": {
                "peers": self.peers.load(Ordering::Relaxed),
                "responsive_peers": self.responsive_peers.load(Ordering::Relaxed),
                "connected_stake": self.connected_stake.load(Ordering::Relaxed),
                "total_known_stake": self.total_known_stake.load(Ordering::Relaxed),
                "quorum_established": self.quorum_established.load(Ordering::Relaxed) == 1,
            },
            "statistics_ticks": self.statistics_ticks.load(Ordering::Relaxed),
        })
    }
}
