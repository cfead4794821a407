//! Adaptive threshold recompute loop
//!
//! Runs on a long cycle plus an on-demand trigger. The trigger is a
//! capacity-1 signal: triggering while one is already pending is a silent
//! no-op, and each pending trigger is consumed by exactly one wake.

use crate::{
    config::StrategyConfig,
    push::{PushEvent, PushHub},
    stats::StatsAggregator,
    strategy::{StrategyUpdate, ThresholdHandle},
    Result, SettingsStore,
};
use chrono::Utc;
use metrics::gauge;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, Notify};
use tracing::{debug, error, info};

/// Cooldown after a failed recompute before the loop continues
const ERROR_COOLDOWN_SECS: u64 = 5;

/// Maps bucket volatility onto the live threshold.
///
/// Owns the threshold value; every other component reads it through the
/// shared [`ThresholdHandle`].
pub struct StrategyEngine {
    config: StrategyConfig,
    stats: Arc<StatsAggregator>,
    thresholds: Arc<ThresholdHandle>,
    settings: Arc<SettingsStore>,
    push: Arc<PushHub>,
    trigger: Notify,
}

impl StrategyEngine {
    /// Create the engine
    pub fn new(
        config: StrategyConfig,
        stats: Arc<StatsAggregator>,
        thresholds: Arc<ThresholdHandle>,
        settings: Arc<SettingsStore>,
        push: Arc<PushHub>,
    ) -> Self {
        Self {
            config,
            stats,
            thresholds,
            settings,
            push,
            trigger: Notify::new(),
        }
    }

    /// Request an out-of-cycle recompute. Duplicate requests before the
    /// loop wakes are absorbed, not queued.
    pub fn trigger_recompute(&self) {
        self.trigger.notify_one();
    }

    /// Run the recompute loop until shutdown
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        info!(interval_secs = self.config.cycle_interval_secs, "strategy engine started");

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("strategy engine stopping");
                    break;
                }
                _ = tokio::time::sleep(std::time::Duration::from_secs(self.config.cycle_interval_secs)) => {}
                _ = self.trigger.notified() => {
                    debug!("manual recompute trigger consumed");
                }
            }

            match self.recompute().await {
                Ok(Some(update)) => {
                    info!(
                        previous_pct = update.previous_threshold_pct,
                        new_pct = update.new_threshold_pct,
                        score = update.volatility_score,
                        reason = %update.reason,
                        "threshold retuned"
                    );
                }
                Ok(None) => debug!("smart strategy disabled, cycle skipped"),
                Err(e) => {
                    error!(error = %e, "strategy recompute failed, cooling down");
                    tokio::time::sleep(std::time::Duration::from_secs(ERROR_COOLDOWN_SECS)).await;
                }
            }
        }
    }

    /// Recompute the global threshold from the current calendar bucket.
    /// Returns `None` when smart strategy is disabled in settings.
    pub async fn recompute(&self) -> Result<Option<StrategyUpdate>> {
        let settings = self.settings.get().await;
        if !settings.smart_strategy_enabled {
            return Ok(None);
        }

        let bucket = self.stats.current_bucket();
        let score = bucket.volatility_score();
        let default_pct = self.config.default_threshold_pct;
        let previous = self.thresholds.global_pct();

        let (new_threshold, reason) = if bucket.count == 0 {
            (
                default_pct,
                format!(
                    "no history for the current time bucket yet, holding the conservative default of {:.2}%",
                    default_pct
                ),
            )
        } else {
            let new_threshold = threshold_for_score(score, default_pct);
            (
                new_threshold,
                format!(
                    "volatility score {:.2} from {} opportunities averaging {:.2}% spread maps to {:.2}% (default {:.2}%)",
                    score, bucket.count, bucket.avg_net_pct, new_threshold, default_pct
                ),
            )
        };

        self.thresholds.set_global_pct(new_threshold);
        gauge!("global_threshold_pct", new_threshold);

        let update = StrategyUpdate {
            previous_threshold_pct: previous,
            new_threshold_pct: new_threshold,
            pair_overrides: HashMap::new(),
            reason,
            volatility_score: score,
            opportunity_count: bucket.count,
            avg_spread_pct: bucket.avg_net_pct,
            timestamp: Utc::now(),
        };

        self.push.publish(PushEvent::StrategyUpdated(update.clone()));
        Ok(Some(update))
    }
}

/// Monotonic step function from volatility score to threshold.
///
/// High volatility means frequent, wide opportunities, so the gate can sit
/// lower; quiet buckets raise it to keep marginal trades out.
pub fn threshold_for_score(score: f64, default_pct: f64) -> f64 {
    match score {
        s if s >= 0.85 => default_pct * 0.6,
        s if s >= 0.7 => default_pct * 0.8,
        s if s >= 0.4 => default_pct,
        s if s >= 0.2 => default_pct * 1.1,
        _ => default_pct * 1.25,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::scanner::Opportunity;
    use crate::venues::TradingPair;
    use tempfile::tempdir;
    use uuid::Uuid;

    fn engine_with(settings: Settings, stats: Arc<StatsAggregator>) -> (StrategyEngine, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let store = SettingsStore::with_settings(dir.path().join("settings.json"), settings);
        let engine = StrategyEngine::new(
            StrategyConfig {
                cycle_interval_secs: 3_600,
                default_threshold_pct: 1.0,
            },
            stats,
            Arc::new(ThresholdHandle::new(1.0)),
            Arc::new(store),
            Arc::new(PushHub::new()),
        );
        (engine, dir)
    }

    fn seed_bucket(stats: &StatsAggregator, detections: usize, net_pct: f64) {
        let now = Utc::now();
        for _ in 0..detections {
            stats.record_opportunity(&Opportunity {
                id: Uuid::new_v4(),
                pair: TradingPair::new("S", "USDT"),
                buy_venue: "alpha".to_string(),
                sell_venue: "beta".to_string(),
                buy_price: 100.0,
                sell_price: 102.0,
                buy_fee: 0.001,
                sell_fee: 0.001,
                net_profit_pct: net_pct,
                gross_profit_pct: net_pct + 0.2,
                volume: 1.0,
                timestamp: now,
                sandbox: true,
            });
        }
    }

    #[test]
    fn test_step_function_bounds() {
        let default = 1.0;
        // High volatility always lands at or below the default
        for score in [0.7, 0.75, 0.85, 0.9, 1.0] {
            assert!(threshold_for_score(score, default) <= default);
        }
        // Quiet buckets always land at or above the default
        for score in [0.0, 0.05, 0.1, 0.19] {
            assert!(threshold_for_score(score, default) >= default);
        }
    }

    #[test]
    fn test_step_function_monotonic() {
        let default = 1.0;
        let mut previous = f64::INFINITY;
        let mut score = 0.0;
        while score <= 1.0 {
            let threshold = threshold_for_score(score, default);
            assert!(threshold <= previous, "threshold must not rise with volatility");
            previous = threshold;
            score += 0.01;
        }
    }

    #[tokio::test]
    async fn test_recompute_disabled_is_noop() {
        let settings = Settings {
            smart_strategy_enabled: false,
            ..Settings::default()
        };
        let (engine, _dir) = engine_with(settings, Arc::new(StatsAggregator::new()));
        assert!(engine.recompute().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_recompute_without_history_holds_default() {
        let (engine, _dir) = engine_with(Settings::default(), Arc::new(StatsAggregator::new()));
        let update = engine.recompute().await.unwrap().unwrap();
        assert_eq!(update.new_threshold_pct, 1.0);
        assert!(update.reason.contains("no history"));
        assert_eq!(update.opportunity_count, 0);
    }

    #[tokio::test]
    async fn test_recompute_lowers_threshold_in_busy_bucket() {
        let stats = Arc::new(StatsAggregator::new());
        seed_bucket(&stats, 100, 3.0);
        let (engine, _dir) = engine_with(Settings::default(), Arc::clone(&stats));

        let update = engine.recompute().await.unwrap().unwrap();
        assert!(update.volatility_score >= 0.7);
        assert!(update.new_threshold_pct <= 1.0);
        assert!(engine.thresholds.global_pct() <= 1.0);
    }

    #[tokio::test]
    async fn test_duplicate_triggers_coalesce() {
        let (engine, _dir) = engine_with(Settings::default(), Arc::new(StatsAggregator::new()));

        // Two triggers before anyone waits: a single permit is stored
        engine.trigger_recompute();
        engine.trigger_recompute();

        // First wait consumes the stored permit immediately
        tokio::time::timeout(std::time::Duration::from_millis(50), engine.trigger.notified())
            .await
            .expect("stored trigger should wake immediately");

        // Second wait finds no permit left
        let second = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            engine.trigger.notified(),
        )
        .await;
        assert!(second.is_err(), "duplicate trigger must not queue a second wake");
    }
}
