//! Overlay Address Discovery
//!
//! Peer address discovery for a stake-weighted avalanche overlay running on top
//! of a general P2P network.
//!
//! ## Overview
//!
//! - Nodes ask each other for the addresses of overlay-capable peers with a
//!   `getavaaddr` message and answer with `addr`
//! - Only peers that keep answering polls, measured by a decaying availability
//!   score, are advertised
//! - Requests are throttled per connection and answers are delayed randomly
//! - A node keeps asking its outbound connections until it sees enough stake
//!   and enough responsive peers
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     DISCOVERY SERVICE                        │
//! ├──────────────────────────────────────────────────────────────┤
//! │  Peer Registry        ←── connections, stake, poll counters  │
//! │  Availability Scorer  ←── statistics tick (every 10m)        │
//! │  Quorum Monitor       ←── connected vs known stake           │
//! │  Request Throttle     ←── one getavaaddr per cooldown        │
//! │  Address Selector     ←── addr payload for a requester       │
//! │  Response Relay       ←── Poisson-delayed addr sends         │
//! │  Outbound Requester   ←── asks for more when under quorum    │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod metrics;
pub mod outbound;
pub mod quorum;
pub mod registry;
pub mod relay;
pub mod scoring;
pub mod selector;
pub mod service;
pub mod stake;
pub mod throttle;
pub mod transport;
pub mod types;

#[cfg(test)]
mod tests;

pub use clock::{Clock, MockClock, SystemClock};
pub use config::DiscoveryConfig;
pub use error::{DiscoveryError, TransportError};
pub use metrics::Metrics;
pub use outbound::{OutboundDecision, OutboundRequester};
pub use quorum::{QuorumMonitor, QuorumState, QuorumThresholds};
pub use registry::{AddrReception, PeerRegistry, RegistryStats, ThrottleDecision};
pub use relay::ResponseRelay;
pub use scoring::AvailabilityScorer;
pub use selector::AddressSelector;
pub use service::DiscoveryService;
pub use stake::{StakeResolver, StakeTable};
pub use throttle::RequestThrottle;
pub use transport::{ChannelTransport, LoopbackTransport, PeerTransport};
pub use types::{
    ConnectionKind, NetMessage, OutboundAsk, Peer, PeerId, PendingAddrResponse, ServiceFlags,
    StakeAmount, StakeId, Timestamp, NODE_AVALANCHE, NODE_NETWORK,
};
