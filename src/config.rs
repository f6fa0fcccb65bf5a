//! Discovery Configuration
//!
//! Parameters consumed by the discovery core. The values normally come from the
//! node's own configuration loader; the TOML helpers here serve the CLI.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::types::StakeAmount;

/// Main configuration for overlay address discovery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    // === Responses ===

    /// Maximum addresses in one addr response
    pub max_addresses_to_send: usize,

    /// Minimum time between two accepted getavaaddr from the same peer (seconds)
    pub cooldown_interval_secs: u64,

    /// Mean delay before a queued addr response is sent (seconds)
    /// Delays are drawn from an exponential distribution
    pub addr_send_average_interval_secs: u64,

    /// How often queued addr responses are checked (seconds)
    pub relay_check_interval_secs: u64,

    // === Statistics ===

    /// Interval between availability score computations (seconds)
    pub statistics_interval_secs: u64,

    /// Time constant of the availability score decay (seconds)
    pub statistics_time_constant_secs: u64,

    // === Quorum ===

    /// Minimum connected stake for the quorum
    pub min_quorum_stake: StakeAmount,

    /// Minimum fraction of the known stake that must be connected
    pub min_connected_stake_ratio: f64,

    // === Outbound requests ===

    /// Positively scored overlay peers we want to know before we stop asking
    pub min_responsive_options: usize,

    /// Lower bound of the randomized outbound request period (seconds)
    pub outbound_request_min_secs: u64,

    /// Upper bound of the randomized outbound request period (seconds)
    pub outbound_request_max_secs: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            // Responses
            max_addresses_to_send: 1000,
            cooldown_interval_secs: 120,         // 2 minutes
            addr_send_average_interval_secs: 30,
            relay_check_interval_secs: 1,

            // Statistics
            statistics_interval_secs: 600,       // 10 minutes
            statistics_time_constant_secs: 600,

            // Quorum
            min_quorum_stake: 0,
            min_connected_stake_ratio: 0.8,

            // Outbound requests, every 2 to 5 minutes
            min_responsive_options: 8,
            outbound_request_min_secs: 120,
            outbound_request_max_secs: 300,
        }
    }
}

impl DiscoveryConfig {
    /// Load configuration from TOML file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    // Builder-style methods for CLI overrides

    pub fn with_max_addresses_to_send(mut self, max: Option<usize>) -> Self {
        if let Some(max) = max {
            self.max_addresses_to_send = max;
        }
        self
    }

    pub fn with_min_quorum_stake(mut self, stake: Option<StakeAmount>) -> Self {
        if let Some(stake) = stake {
            self.min_quorum_stake = stake;
        }
        self
    }

    pub fn with_min_connected_stake_ratio(mut self, ratio: Option<f64>) -> Self {
        if let Some(ratio) = ratio {
            self.min_connected_stake_ratio = ratio;
        }
        self
    }

    pub fn with_cooldown_interval_secs(mut self, secs: u64) -> Self {
        self.cooldown_interval_secs = secs;
        self
    }

    pub fn cooldown_interval(&self) -> Duration {
        Duration::from_secs(self.cooldown_interval_secs)
    }

    pub fn statistics_interval(&self) -> Duration {
        Duration::from_secs(self.statistics_interval_secs)
    }

    pub fn relay_check_interval(&self) -> Duration {
        Duration::from_secs(self.relay_check_interval_secs)
    }

    /// Validate configuration values
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_addresses_to_send == 0 {
            anyhow::bail!("max_addresses_to_send must be greater than 0");
        }

        if !(0.0..=1.0).contains(&self.min_connected_stake_ratio) {
            anyhow::bail!(
                "min_connected_stake_ratio ({}) must be within [0, 1]",
                self.min_connected_stake_ratio
            );
        }

        for (name, value) in [
            ("cooldown_interval_secs", self.cooldown_interval_secs),
            ("statistics_interval_secs", self.statistics_interval_secs),
            ("statistics_time_constant_secs", self.statistics_time_constant_secs),
            ("addr_send_average_interval_secs", self.addr_send_average_interval_secs),
            ("relay_check_interval_secs", self.relay_check_interval_secs),
            ("outbound_request_min_secs", self.outbound_request_min_secs),
        ] {
            if value == 0 {
                anyhow::bail!("{} must be greater than 0", name);
            }
        }

        if self.outbound_request_min_secs > self.outbound_request_max_secs {
            anyhow::bail!(
                "outbound_request_min_secs ({}) must not exceed outbound_request_max_secs ({})",
                self.outbound_request_min_secs,
                self.outbound_request_max_secs
            );
        }

        Ok(())
    }
}
