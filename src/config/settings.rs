//! Persisted user settings store
//!
//! User toggles read at startup and written back on every control-surface
//! mutation. The file is JSON; writes go through a temp file and rename so
//! a crash mid-write never leaves a truncated store behind.

use crate::{ArbError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

/// User-controlled runtime settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    /// Execute opportunities automatically when they clear the gate
    pub auto_trade_enabled: bool,
    /// Let the strategy engine retune the global threshold
    pub smart_strategy_enabled: bool,
    /// Global net-profit threshold in percent
    pub global_threshold_pct: f64,
    /// Per-pair threshold overrides in percent, keyed by BASE/QUOTE
    pub pair_thresholds: HashMap<String, f64>,
    /// Fraction of the checked balance an execution may commit (< 1.0,
    /// slippage margin)
    pub safe_balance_multiplier: f64,
    /// Realized drawdown in percent at which auto-trade is disabled
    pub max_drawdown_pct: f64,
    /// Consecutive losing transactions at which auto-trade is disabled
    pub max_consecutive_losses: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            auto_trade_enabled: false,
            smart_strategy_enabled: true,
            global_threshold_pct: 1.0,
            pair_thresholds: HashMap::new(),
            safe_balance_multiplier: 0.9,
            max_drawdown_pct: 5.0,
            max_consecutive_losses: 3,
        }
    }
}

impl Settings {
    /// Validate value ranges
    pub fn validate(&self) -> Result<()> {
        if !(0.0..1.0).contains(&self.safe_balance_multiplier) || self.safe_balance_multiplier <= 0.0 {
            return Err(ArbError::Settings(
                "safe_balance_multiplier must be in (0.0, 1.0)".to_string(),
            )
            .into());
        }
        if self.global_threshold_pct <= 0.0 {
            return Err(ArbError::Settings("global_threshold_pct must be positive".to_string()).into());
        }
        for (pair, threshold) in &self.pair_thresholds {
            if *threshold <= 0.0 {
                return Err(
                    ArbError::Settings(format!("threshold for {} must be positive", pair)).into(),
                );
            }
        }
        Ok(())
    }
}

/// File-backed settings store shared across components
pub struct SettingsStore {
    path: PathBuf,
    settings: RwLock<Settings>,
}

impl SettingsStore {
    /// Open the store, reading the file if it exists and seeding defaults
    /// otherwise. Failure here is fatal to startup.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let settings = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .map_err(|e| ArbError::Settings(format!("Failed to read settings: {}", e)))?;
            let settings: Settings = serde_json::from_str(&content)
                .map_err(|e| ArbError::Settings(format!("Failed to parse settings: {}", e)))?;
            settings.validate()?;
            settings
        } else {
            let settings = Settings::default();
            Self::persist(&path, &settings)?;
            settings
        };

        Ok(Self {
            path,
            settings: RwLock::new(settings),
        })
    }

    /// In-memory store for tests; nothing is written to disk until a
    /// mutation happens, and the temp path is caller-owned.
    pub fn with_settings<P: AsRef<Path>>(path: P, settings: Settings) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            settings: RwLock::new(settings),
        }
    }

    /// Snapshot the current settings
    pub async fn get(&self) -> Settings {
        self.settings.read().await.clone()
    }

    /// Apply a mutation and persist the result. The closure sees the
    /// current settings and edits them in place.
    pub async fn update<F>(&self, mutate: F) -> Result<Settings>
    where
        F: FnOnce(&mut Settings),
    {
        let mut guard = self.settings.write().await;
        let mut next = guard.clone();
        mutate(&mut next);
        next.validate()?;
        Self::persist(&self.path, &next)?;
        *guard = next.clone();
        Ok(next)
    }

    fn persist(path: &Path, settings: &Settings) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ArbError::Settings(format!("Failed to create settings dir: {}", e)))?;
            }
        }
        let json = serde_json::to_string_pretty(settings)
            .map_err(|e| ArbError::Settings(format!("Failed to serialize settings: {}", e)))?;

        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .map_err(|e| ArbError::Settings(format!("Failed to write settings: {}", e)))?;
        std::fs::rename(&tmp, path)
            .map_err(|e| ArbError::Settings(format!("Failed to replace settings: {}", e)))?;
        Ok(())
    }
}
