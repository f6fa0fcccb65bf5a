//! Overlay Discovery Node
//!
//! Runs the discovery service against a simulated overlay: a set of local
//! peers that answer polls with varying reliability, send getavaaddr requests
//! and reply to ours with addresses. Useful to observe scoring, throttling and
//! quorum tracking with real timers.

use clap::Parser;
use rand::Rng;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use overlay_discovery::{
    ChannelTransport, ConnectionKind, DiscoveryConfig, DiscoveryService, NetMessage, Peer, PeerId,
    StakeId, StakeTable, SystemClock, NODE_AVALANCHE, NODE_NETWORK,
};

/// Overlay discovery node - avalanche peer address discovery
#[derive(Parser, Debug)]
#[command(name = "overlay-discovery")]
#[command(author = "Overlay Discovery Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Avalanche overlay peer address discovery", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "overlay-discovery.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Maximum number of addresses in one addr response
    #[arg(long)]
    max_addr_to_send: Option<usize>,

    /// Minimum connected stake for the quorum
    #[arg(long)]
    min_quorum_stake: Option<u64>,

    /// Minimum connected share of the known stake for the quorum
    #[arg(long)]
    min_connected_stake_ratio: Option<f64>,

    /// Validate the configuration, print it and exit
    #[arg(long)]
    check_config: bool,

    /// Number of simulated peers
    #[arg(long, default_value = "24")]
    peers: u64,

    /// Number of simulated stake proofs
    #[arg(long, default_value = "4")]
    proofs: u8,

    /// Stop after this many seconds (runs until Ctrl+C if unset)
    #[arg(long)]
    duration_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .init();

    info!("🔭 Overlay Discovery v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = if args.config.exists() {
        DiscoveryConfig::load(&args.config)?
    } else {
        warn!("Config file not found, using defaults");
        DiscoveryConfig::default()
    };

    // Override config with CLI args
    let config = config
        .with_max_addresses_to_send(args.max_addr_to_send)
        .with_min_quorum_stake(args.min_quorum_stake)
        .with_min_connected_stake_ratio(args.min_connected_stake_ratio);

    config.validate()?;

    if args.check_config {
        println!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    info!("⚙️  Configuration:");
    info!("   Max addresses per response: {}", config.max_addresses_to_send);
    info!("   Request cooldown: {}s", config.cooldown_interval_secs);
    info!("   Statistics interval: {}s", config.statistics_interval_secs);
    info!(
        "   Quorum: {} stake, {:.0}% connected",
        config.min_quorum_stake,
        config.min_connected_stake_ratio * 100.0
    );

    let stakes = Arc::new(StakeTable::new());
    let proofs: Vec<StakeId> = (1..=args.proofs.max(1)).map(|n| StakeId([n; 32])).collect();
    for proof in &proofs {
        stakes.insert(*proof, 1_000_000);
    }

    let (transport, outgoing) = ChannelTransport::new();
    let service = Arc::new(DiscoveryService::new(
        config,
        stakes,
        Arc::new(transport),
        Arc::new(SystemClock),
    )?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Simulated peers answer our messages
    let responder_handle = tokio::spawn(run_simulated_peers(service.clone(), outgoing));

    connect_simulated_peers(&service, args.peers, &proofs).await?;

    let poll_handle = tokio::spawn(run_polls(service.clone(), args.peers, shutdown_rx.clone()));
    let discovery_handle = tokio::spawn(service.clone().run(shutdown_rx));

    info!("✅ Discovery started with {} simulated peers", args.peers);
    info!("   Press Ctrl+C to shutdown gracefully");

    match args.duration_secs {
        Some(secs) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("🛑 Shutdown signal received"),
                _ = tokio::time::sleep(Duration::from_secs(secs)) => info!("⏱️  Run duration elapsed"),
            }
        }
        None => {
            tokio::signal::ctrl_c().await?;
            info!("🛑 Shutdown signal received");
        }
    }

    shutdown_tx.send(true)?;
    discovery_handle.await?;
    poll_handle.await?;
    responder_handle.abort();

    info!("📊 Final metrics: {}", service.metrics().to_json());
    info!("👋 Overlay discovery shutting down");
    Ok(())
}

fn simulated_addr(id: u64) -> SocketAddr {
    SocketAddr::from(([10, 1, (id >> 8) as u8, id as u8], 8333))
}

/// Connect the simulated peers: a few outbound, most inbound, and every
/// fifth one without overlay support
async fn connect_simulated_peers(
    service: &DiscoveryService,
    count: u64,
    proofs: &[StakeId],
) -> anyhow::Result<()> {
    let now = chrono::Utc::now().timestamp().max(0) as u64;

    for id in 1..=count {
        let kind = match id % 4 {
            0 => ConnectionKind::Outbound,
            1 if id < 8 => ConnectionKind::Manual,
            _ => ConnectionKind::Inbound,
        };
        let services = if id % 5 == 0 { NODE_NETWORK } else { NODE_NETWORK | NODE_AVALANCHE };
        let peer = Peer::new(PeerId(id), simulated_addr(id), kind, services, now);
        let overlay = peer.overlay_capable;

        service.peer_connected(peer).await?;
        if overlay {
            let proof = proofs[(id as usize) % proofs.len()];
            service.bind_stake(PeerId(id), proof)?;
        }
    }

    Ok(())
}

/// Poll every peer once per second. Reliability varies with the peer id.
async fn run_polls(service: Arc<DiscoveryService>, count: u64, mut shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(Duration::from_secs(1));

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let mut rng = rand::thread_rng();
                for id in 1..=count {
                    service.on_poll_sent(PeerId(id));
                    let reliability = (id % 10) as f64 / 10.0;
                    if rng.gen_bool(reliability) {
                        service.on_poll_response(PeerId(id));
                    }
                }

                // Inbound peers ask for addresses now and then
                let requester = PeerId(rng.gen_range(1..=count.max(1)));
                service.handle_getavaaddr(requester);
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

/// Deliver our messages to the simulated peers and feed their answers back
async fn run_simulated_peers(
    service: Arc<DiscoveryService>,
    mut outgoing: mpsc::UnboundedReceiver<(PeerId, NetMessage)>,
) {
    while let Some((to, message)) = outgoing.recv().await {
        match message {
            NetMessage::GetAvaAddr => {
                let addresses: Vec<SocketAddr> = {
                    let mut rng = rand::thread_rng();
                    (0..rng.gen_range(1..16u64))
                        .map(|_| simulated_addr(rng.gen_range(1_000..2_000)))
                        .collect()
                };
                let learned = service.handle_message(to, NetMessage::Addr(addresses));
                debug!("Learned {} addresses from simulated peer {}", learned.len(), to);
            }
            NetMessage::Addr(addresses) => {
                debug!("Simulated peer {} received {} addresses", to, addresses.len());
            }
        }
    }
}
