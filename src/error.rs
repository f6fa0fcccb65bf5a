//! Error types
//!
//! Only caller mistakes are errors here. Throttled requests, empty address
//! selections and an unmet quorum are normal outcomes and never surface as `Err`.

use crate::types::{PeerId, StakeId};

/// Registry and service errors
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("Peer {0} is already registered")]
    DuplicatePeer(PeerId),

    #[error("Unknown peer {0}")]
    UnknownPeer(PeerId),

    #[error("Peer {peer} is already bound to stake {stake}")]
    AlreadyBound { peer: PeerId, stake: StakeId },

    #[error("Peer {0} does not advertise overlay support")]
    NotOverlayCapable(PeerId),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Failures reported by a `PeerTransport`
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Peer {0} is no longer connected")]
    PeerGone(PeerId),

    #[error("Transport channel closed")]
    Closed,
}
