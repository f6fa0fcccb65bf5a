//! Core types for overlay address discovery
//!
//! These types describe the connections known to the node, their overlay
//! metadata, and the two discovery messages exchanged with remote peers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;

// =============================================================================
// PRIMITIVE TYPES
// =============================================================================

/// Stake amount in base units
pub type StakeAmount = u64;

/// Unix timestamp in seconds
pub type Timestamp = u64;

/// Connection identifier, stable for the lifetime of the connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PeerId(pub u64);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a stake proof bound to one or more connections
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StakeId(pub [u8; 32]);

impl StakeId {
    /// Parse a stake id from a 64 character hex string
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Self(bytes))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for StakeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form is enough to tell proofs apart in logs
        write!(f, "{}", hex::encode(&self.0[..8]))
    }
}

// =============================================================================
// SERVICE FLAGS
// =============================================================================

/// Service bits advertised by a peer at connection time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceFlags(pub u64);

/// Full block relay
pub const NODE_NETWORK: ServiceFlags = ServiceFlags(1 << 0);

/// Participation in the avalanche overlay
pub const NODE_AVALANCHE: ServiceFlags = ServiceFlags(1 << 24);

impl ServiceFlags {
    pub fn contains(&self, other: ServiceFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for ServiceFlags {
    type Output = ServiceFlags;

    fn bitor(self, rhs: ServiceFlags) -> ServiceFlags {
        ServiceFlags(self.0 | rhs.0)
    }
}

// =============================================================================
// CONNECTIONS
// =============================================================================

/// How a connection was established
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionKind {
    /// The remote peer connected to us
    Inbound,
    /// We connected to the remote peer automatically
    Outbound,
    /// We connected because an operator added the peer
    Manual,
}

impl ConnectionKind {
    /// Whether connections of this kind may receive our own discovery requests
    pub fn is_outbound_like(&self) -> bool {
        matches!(self, ConnectionKind::Outbound | ConnectionKind::Manual)
    }
}

/// Progress of our own discovery requests towards one connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutboundAsk {
    /// No request was ever sent on this connection
    NeverAsked,
    /// A request was scheduled and is about to be sent
    Asked,
    /// The request was handed to the transport
    AwaitingResponse,
    /// The peer answered with an addr message
    Answered,
}

/// An addr response queued for delayed sending
#[derive(Debug, Clone, PartialEq)]
pub struct PendingAddrResponse {
    /// Selected peers and their addresses at selection time
    pub entries: Vec<(PeerId, SocketAddr)>,

    /// Earliest time the response may be sent
    pub send_at: Timestamp,
}

// =============================================================================
// PEER
// =============================================================================

/// Metadata about a single connection
#[derive(Debug, Clone)]
pub struct Peer {
    /// Connection identifier
    pub id: PeerId,

    /// Network endpoint
    pub address: SocketAddr,

    /// Inbound, outbound or manual
    pub kind: ConnectionKind,

    /// Advertised service bits
    pub services: ServiceFlags,

    /// Derived from `services` at creation, never changes
    pub overlay_capable: bool,

    /// Stake proof this connection is bound to, if any
    pub stake_id: Option<StakeId>,

    /// When the connection was established
    pub connected_at: Timestamp,

    /// Most recently accepted incoming getavaaddr
    pub last_discovery_request_at: Option<Timestamp>,

    /// Responsiveness to overlay polls
    pub availability_score: f64,

    /// Polls sent to this peer since the last statistics tick
    pub polls_sent: u32,

    /// Poll responses received since the last statistics tick
    pub poll_responses: u32,

    /// State of our own discovery requests to this peer
    pub outbound_ask: OutboundAsk,

    /// When we last sent a getavaaddr to this peer
    pub last_asked_at: Option<Timestamp>,

    /// Number of getavaaddr we sent to this peer
    pub times_asked: u32,

    /// Addr response waiting for its send time
    pub pending_response: Option<PendingAddrResponse>,
}

impl Peer {
    /// Create a freshly connected peer
    pub fn new(
        id: PeerId,
        address: SocketAddr,
        kind: ConnectionKind,
        services: ServiceFlags,
        connected_at: Timestamp,
    ) -> Self {
        Self {
            id,
            address,
            kind,
            services,
            overlay_capable: services.contains(NODE_AVALANCHE),
            stake_id: None,
            connected_at,
            last_discovery_request_at: None,
            availability_score: 0.0,
            polls_sent: 0,
            poll_responses: 0,
            outbound_ask: OutboundAsk::NeverAsked,
            last_asked_at: None,
            times_asked: 0,
            pending_response: None,
        }
    }

    /// Bound to a stake proof
    pub fn is_bound(&self) -> bool {
        self.stake_id.is_some()
    }

    /// Eligible to be listed in an addr response
    pub fn is_advertisable(&self) -> bool {
        self.overlay_capable && self.availability_score > 0.0
    }

    /// Eligible to receive our own getavaaddr
    pub fn is_outbound_request_target(&self) -> bool {
        self.overlay_capable && self.kind.is_outbound_like()
    }
}

// =============================================================================
// MESSAGES
// =============================================================================

/// Discovery messages. Framing belongs to the base P2P layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetMessage {
    /// Request for overlay peer addresses, no payload
    GetAvaAddr,
    /// Addresses of responsive overlay peers
    Addr(Vec<SocketAddr>),
}

impl NetMessage {
    pub fn command(&self) -> &'static str {
        match self {
            NetMessage::GetAvaAddr => "getavaaddr",
            NetMessage::Addr(_) => "addr",
        }
    }
}
