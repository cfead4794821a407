//! Configuration management module

pub mod settings;

pub use settings::{Settings, SettingsStore};

use crate::{ArbError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Main configuration structure for the arbitrage system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path of the persisted settings store
    pub settings_file: PathBuf,
    /// Scanner configuration
    pub scanner: ScannerConfig,
    /// Execution configuration
    pub execution: ExecutionConfig,
    /// Strategy engine configuration
    pub strategy: StrategyConfig,
    /// Rebalancing configuration
    pub rebalancing: RebalancingConfig,
    /// Venue configuration
    pub venues: VenuesConfig,
}

/// Scanner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Detection cycle interval in milliseconds
    pub interval_ms: u64,
    /// Tracked trading pairs in BASE/QUOTE form
    pub pairs: Vec<String>,
    /// Capacity of the recent-opportunity ring kept for UI queries
    pub recent_capacity: usize,
    /// Cooldown after a failed cycle in milliseconds
    pub error_cooldown_ms: u64,
}

/// Execution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// How long both legs may stay non-terminal before the transaction
    /// times out, in seconds
    pub settle_timeout_secs: u64,
    /// Delay between order status polls in milliseconds
    pub poll_interval_ms: u64,
    /// Minimum order size in base asset units
    pub min_order_size: f64,
}

/// Strategy engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Recompute cycle interval in seconds
    pub cycle_interval_secs: u64,
    /// Conservative default threshold (net profit percent) used when no
    /// history exists and as the baseline the step function scales
    pub default_threshold_pct: f64,
}

/// Rebalancing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebalancingConfig {
    /// Absolute normalized skew above which a transfer is proposed
    pub skew_threshold: f64,
    /// Flat transfer fee per asset, in asset units
    pub transfer_fees: HashMap<String, f64>,
    /// Fee as a percentage of the transfer amount above which a proposal
    /// is flagged non-viable
    pub fee_ceiling_pct: f64,
    /// How often the maintenance loop refreshes proposals, in seconds
    pub refresh_interval_secs: u64,
}

/// Venue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenuesConfig {
    /// Enabled venue names
    pub enabled: Vec<String>,
    /// Taker fee assumed for venues without an explicit override
    pub default_taker_fee: f64,
    /// Per-venue taker fee overrides
    #[serde(default)]
    pub taker_fees: HashMap<String, f64>,
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .map_err(|e| ArbError::Config(format!("Failed to read config file: {}", e)))?;

        let config: AppConfig = toml::from_str(&content)
            .map_err(|e| ArbError::Config(format!("Failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.scanner.interval_ms == 0 {
            return Err(ArbError::Config("Scanner interval must be greater than 0".to_string()).into());
        }

        if self.scanner.pairs.is_empty() {
            return Err(ArbError::Config("At least one trading pair is required".to_string()).into());
        }

        for pair in &self.scanner.pairs {
            pair.parse::<crate::venues::TradingPair>()?;
        }

        if self.scanner.recent_capacity == 0 {
            return Err(ArbError::Config("Recent-opportunity capacity must be greater than 0".to_string()).into());
        }

        if self.execution.settle_timeout_secs == 0 {
            return Err(ArbError::Config("Settle timeout must be greater than 0".to_string()).into());
        }

        if self.execution.poll_interval_ms == 0 {
            return Err(ArbError::Config("Poll interval must be greater than 0".to_string()).into());
        }

        if self.strategy.default_threshold_pct <= 0.0 {
            return Err(ArbError::Config("Default threshold must be positive".to_string()).into());
        }

        if !(0.0..=1.0).contains(&self.rebalancing.skew_threshold) {
            return Err(ArbError::Config("Skew threshold must be between 0.0 and 1.0".to_string()).into());
        }

        if self.venues.enabled.len() < 2 {
            return Err(ArbError::Config("At least two venues are required for arbitrage".to_string()).into());
        }

        let mut seen = std::collections::HashSet::new();
        for venue in &self.venues.enabled {
            if !seen.insert(venue) {
                return Err(ArbError::Config(format!("Duplicate venue '{}'", venue)).into());
            }
        }

        Ok(())
    }

    /// Taker fee for a venue, falling back to the default
    pub fn taker_fee_for(&self, venue: &str) -> f64 {
        self.venues
            .taker_fees
            .get(venue)
            .copied()
            .unwrap_or(self.venues.default_taker_fee)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            scanner: ScannerConfig {
                interval_ms: 2_000,
                pairs: vec!["S/USDT".to_string()],
                recent_capacity: 256,
                error_cooldown_ms: 5_000,
            },
            execution: ExecutionConfig {
                settle_timeout_secs: 30,
                poll_interval_ms: 250,
                min_order_size: 0.001,
            },
            strategy: StrategyConfig {
                cycle_interval_secs: 3_600,
                default_threshold_pct: 1.0,
            },
            rebalancing: RebalancingConfig {
                skew_threshold: 0.2,
                transfer_fees: HashMap::new(),
                fee_ceiling_pct: 3.0,
                refresh_interval_secs: 300,
            },
            venues: VenuesConfig {
                enabled: vec!["alpha".to_string(), "beta".to_string()],
                default_taker_fee: 0.001,
                taker_fees: HashMap::new(),
            },
            settings_file: PathBuf::from("data/settings.json"),
        }
    }
}
