//! Statistics aggregator
//!
//! Fixed-size (pair x weekday x hour) calendar buckets updated
//! incrementally as opportunities and transactions arrive, plus an overall
//! rolling summary. This is the sole input of the strategy engine.

pub mod rebalance;

pub use rebalance::{RebalancePlanner, RebalancingProposal};

use crate::{
    engine::{Transaction, TransactionStatus},
    scanner::Opportunity,
};
use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

/// Detections per bucket-hour at which the frequency term saturates
const FREQUENCY_SATURATION: f64 = 60.0;
/// Average net spread (percent) at which the width term saturates
const SPREAD_SATURATION_PCT: f64 = 2.0;

/// Rolling aggregates for one (pair, weekday, hour) cell
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct BucketStats {
    /// Opportunities recorded in the cell
    pub count: u64,
    /// Streaming average net spread, in percent
    pub avg_net_pct: f64,
    /// Maximum net spread seen, in percent
    pub max_net_pct: f64,
    /// Streaming average executable depth
    pub avg_volume: f64,
    /// Directional bias in [-1, 1]: +1 when flow always buys on the
    /// lexicographically smaller venue, -1 for the reverse
    pub bias: f64,
}

impl BucketStats {
    fn record(&mut self, net_pct: f64, volume: f64, direction: f64) {
        self.count += 1;
        let n = self.count as f64;
        self.avg_net_pct += (net_pct - self.avg_net_pct) / n;
        self.avg_volume += (volume - self.avg_volume) / n;
        self.bias += (direction - self.bias) / n;
        if net_pct > self.max_net_pct {
            self.max_net_pct = net_pct;
        }
    }

    /// Volatility score in [0, 1]: how frequent and how wide the cell's
    /// opportunities have been. Empty cells score 0.
    pub fn volatility_score(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        let frequency = (self.count as f64 / FREQUENCY_SATURATION).min(1.0);
        let width = (self.avg_net_pct.max(0.0) / SPREAD_SATURATION_PCT).min(1.0);
        (0.6 * frequency + 0.4 * width).clamp(0.0, 1.0)
    }

    /// Merge another cell into this one (used for cross-pair views)
    fn merge(&mut self, other: &BucketStats) {
        if other.count == 0 {
            return;
        }
        let total = self.count + other.count;
        let w_self = self.count as f64 / total as f64;
        let w_other = other.count as f64 / total as f64;
        self.avg_net_pct = self.avg_net_pct * w_self + other.avg_net_pct * w_other;
        self.avg_volume = self.avg_volume * w_self + other.avg_volume * w_other;
        self.bias = self.bias * w_self + other.bias * w_other;
        self.max_net_pct = self.max_net_pct.max(other.max_net_pct);
        self.count = total;
    }
}

/// Overall rolling summary across all pairs
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RollingSummary {
    /// Opportunities detected
    pub detected: u64,
    /// Transactions that placed orders
    pub executed: u64,
    /// Transactions completed on both legs
    pub completed: u64,
    /// Transactions that settled with exactly one filled leg
    pub partially_executed: u64,
    /// Transactions that timed out
    pub timed_out: u64,
    /// Transactions rejected
    pub rejected: u64,
    /// Realized profit across settled transactions, in quote units
    pub realized_profit: f64,
    /// Base volume bought across settled transactions
    pub total_volume: f64,
    /// Streaming average net spread of detections, in percent
    pub avg_net_pct: f64,
    /// Widest net spread detected, in percent
    pub max_net_pct: f64,
    /// Time of the last detection
    pub last_detection: Option<DateTime<Utc>>,
}

struct AggState {
    buckets: HashMap<String, Box<[[BucketStats; 24]; 7]>>,
    summary: RollingSummary,
    imbalances: HashMap<String, f64>,
    proposals: Vec<RebalancingProposal>,
}

/// Incrementally maintained statistics store.
///
/// All mutation goes through this type; other components read snapshots.
pub struct StatsAggregator {
    inner: Mutex<AggState>,
}

impl StatsAggregator {
    /// Create an empty aggregator (cold start)
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(AggState {
                buckets: HashMap::new(),
                summary: RollingSummary::default(),
                imbalances: HashMap::new(),
                proposals: Vec::new(),
            }),
        }
    }

    /// Fold a detected opportunity into its calendar bucket and the
    /// rolling summary
    pub fn record_opportunity(&self, opp: &Opportunity) {
        let weekday = opp.timestamp.weekday().num_days_from_monday() as usize;
        let hour = opp.timestamp.hour() as usize;
        let direction = if opp.buy_venue < opp.sell_venue { 1.0 } else { -1.0 };

        let mut state = self.inner.lock().expect("stats state poisoned");
        let grid = state
            .buckets
            .entry(opp.pair.to_string())
            .or_insert_with(|| Box::new([[BucketStats::default(); 24]; 7]));
        grid[weekday][hour].record(opp.net_profit_pct, opp.volume, direction);

        let summary = &mut state.summary;
        summary.detected += 1;
        let n = summary.detected as f64;
        summary.avg_net_pct += (opp.net_profit_pct - summary.avg_net_pct) / n;
        if opp.net_profit_pct > summary.max_net_pct {
            summary.max_net_pct = opp.net_profit_pct;
        }
        summary.last_detection = Some(opp.timestamp);
    }

    /// Fold a settled transaction into the rolling summary; partially
    /// executed transactions also leave an imbalance record for the
    /// rebalancing planner.
    pub fn record_transaction(&self, tx: &Transaction) {
        let mut state = self.inner.lock().expect("stats state poisoned");
        match tx.status {
            TransactionStatus::Completed => {
                state.summary.executed += 1;
                state.summary.completed += 1;
            }
            TransactionStatus::PartiallyExecuted => {
                state.summary.executed += 1;
                state.summary.partially_executed += 1;
                let imbalance = tx.base_imbalance();
                *state.imbalances.entry(tx.pair.base.clone()).or_insert(0.0) += imbalance;
            }
            TransactionStatus::TimedOut => state.summary.timed_out += 1,
            TransactionStatus::Rejected => state.summary.rejected += 1,
            TransactionStatus::Pending | TransactionStatus::BothFilling => return,
        }
        state.summary.realized_profit += tx.realized_profit;
        state.summary.total_volume += tx.buy_leg.as_ref().map(|o| o.executed_qty).unwrap_or(0.0);
    }

    /// Calendar bucket for a specific pair, if it has data
    pub fn bucket(&self, pair_key: &str, weekday: usize, hour: usize) -> Option<BucketStats> {
        let state = self.inner.lock().expect("stats state poisoned");
        state
            .buckets
            .get(pair_key)
            .map(|grid| grid[weekday.min(6)][hour.min(23)])
    }

    /// Calendar bucket for (weekday, hour) merged across all pairs
    pub fn merged_bucket(&self, weekday: usize, hour: usize) -> BucketStats {
        let state = self.inner.lock().expect("stats state poisoned");
        let mut merged = BucketStats::default();
        for grid in state.buckets.values() {
            merged.merge(&grid[weekday.min(6)][hour.min(23)]);
        }
        merged
    }

    /// Merged bucket for the current wall-clock (weekday, hour)
    pub fn current_bucket(&self) -> BucketStats {
        let now = Utc::now();
        self.merged_bucket(
            now.weekday().num_days_from_monday() as usize,
            now.hour() as usize,
        )
    }

    /// Snapshot of the rolling summary
    pub fn summary(&self) -> RollingSummary {
        self.inner.lock().expect("stats state poisoned").summary.clone()
    }

    /// Per-asset base imbalances left by partial executions
    pub fn imbalances(&self) -> HashMap<String, f64> {
        self.inner.lock().expect("stats state poisoned").imbalances.clone()
    }

    /// Replace the cached rebalancing proposals (maintenance loop)
    pub fn set_proposals(&self, proposals: Vec<RebalancingProposal>) {
        self.inner.lock().expect("stats state poisoned").proposals = proposals;
    }

    /// Latest rebalancing proposals computed by the maintenance loop
    pub fn proposals(&self) -> Vec<RebalancingProposal> {
        self.inner.lock().expect("stats state poisoned").proposals.clone()
    }
}

impl Default for StatsAggregator {
    fn default() -> Self {
        Self::new()
    }
}
