//! Peer Registry Module
//!
//! Authoritative map of the node's connections and their overlay metadata.
//! Every mutation goes through one lock; readers work on owned snapshots.

mod peers;

pub use peers::PeerRegistry;

use crate::types::Timestamp;

/// Outcome of an incoming getavaaddr against the per-peer cooldown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleDecision {
    /// Request accepted, timestamp recorded
    Accepted,

    /// Repeated request within the cooldown
    Ignored { last_accepted_at: Timestamp },

    /// Requester does not advertise overlay support
    NotOverlayCapable,

    /// Requester is no longer connected
    UnknownPeer,
}

/// Outcome of an incoming addr message against our own outstanding requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddrReception {
    /// Answer to a getavaaddr we sent
    Solicited,

    /// We never asked, or the peer already answered
    Unsolicited,

    /// Sender is no longer connected
    UnknownPeer,
}

/// Registry counts for logging and metrics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// All connections
    pub total_peers: usize,

    /// Connections advertising overlay support
    pub overlay_peers: usize,

    /// Connections bound to a stake proof
    pub bound_peers: usize,

    /// Overlay connections with a positive availability score
    pub responsive_peers: usize,

    /// Outbound or manual overlay connections
    pub outbound_targets: usize,

    /// Addr responses waiting to be sent
    pub pending_responses: usize,
}
