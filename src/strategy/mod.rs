//! Adaptive threshold strategy
//!
//! The engine owns the live profitability threshold; everything else reads
//! it through [`ThresholdHandle`] snapshots.

pub mod engine;

pub use engine::StrategyEngine;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

/// Published result of a strategy recompute
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyUpdate {
    /// Threshold before the update, in percent
    pub previous_threshold_pct: f64,
    /// Threshold after the update, in percent
    pub new_threshold_pct: f64,
    /// Per-pair overrides attached to the update (currently always empty;
    /// overrides are owned by the control surface)
    pub pair_overrides: HashMap<String, f64>,
    /// Human-readable justification
    pub reason: String,
    /// Volatility score that produced the update, in [0, 1]
    pub volatility_score: f64,
    /// Opportunity count of the bucket behind the score
    pub opportunity_count: u64,
    /// Average net spread of the bucket behind the score, in percent
    pub avg_spread_pct: f64,
    /// Update time
    pub timestamp: DateTime<Utc>,
}

/// Live profitability threshold: one writer, many lock-free readers.
///
/// The global value lives in an atomic as f64 bits, so a reader always
/// sees a complete before-or-after value, never a torn one. Per-pair
/// overrides change rarely and sit behind a lock.
pub struct ThresholdHandle {
    global_bits: AtomicU64,
    overrides: RwLock<HashMap<String, f64>>,
}

impl ThresholdHandle {
    /// Create a handle with an initial global threshold in percent
    pub fn new(global_pct: f64) -> Self {
        Self {
            global_bits: AtomicU64::new(global_pct.to_bits()),
            overrides: RwLock::new(HashMap::new()),
        }
    }

    /// Current global threshold in percent
    pub fn global_pct(&self) -> f64 {
        f64::from_bits(self.global_bits.load(Ordering::Acquire))
    }

    /// Replace the global threshold
    pub fn set_global_pct(&self, pct: f64) {
        self.global_bits.store(pct.to_bits(), Ordering::Release);
    }

    /// Effective threshold for a pair: its override if present, the
    /// global value otherwise. `pair_key` is the BASE/QUOTE string.
    pub fn effective_pct(&self, pair_key: &str) -> f64 {
        let overrides = self.overrides.read().expect("threshold overrides poisoned");
        overrides.get(pair_key).copied().unwrap_or_else(|| self.global_pct())
    }

    /// Set or clear a per-pair override
    pub fn set_pair_override(&self, pair_key: &str, pct: Option<f64>) {
        let mut overrides = self.overrides.write().expect("threshold overrides poisoned");
        match pct {
            Some(value) => {
                overrides.insert(pair_key.to_string(), value);
            }
            None => {
                overrides.remove(pair_key);
            }
        }
    }

    /// Snapshot of current per-pair overrides
    pub fn overrides(&self) -> HashMap<String, f64> {
        self.overrides.read().expect("threshold overrides poisoned").clone()
    }
}
