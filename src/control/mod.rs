//! Control surface
//!
//! The operations exposed to the API boundary: toggles, threshold
//! changes, manual execution and the manual strategy trigger. Every
//! mutation persists to the settings store before it takes effect on the
//! live handles.

use crate::{
    engine::{ExecutionEngine, ExecutionOutcome},
    push::{PushEvent, PushHub},
    scanner::Opportunity,
    strategy::{StrategyEngine, ThresholdHandle},
    ArbError, Result, SettingsStore,
};
use std::sync::Arc;
use tracing::info;

/// Operations consumed from the API layer
pub struct ControlSurface {
    settings: Arc<SettingsStore>,
    thresholds: Arc<ThresholdHandle>,
    engine: Arc<ExecutionEngine>,
    strategy: Arc<StrategyEngine>,
    push: Arc<PushHub>,
}

impl ControlSurface {
    /// Create the control surface over the live components
    pub fn new(
        settings: Arc<SettingsStore>,
        thresholds: Arc<ThresholdHandle>,
        engine: Arc<ExecutionEngine>,
        strategy: Arc<StrategyEngine>,
        push: Arc<PushHub>,
    ) -> Self {
        Self {
            settings,
            thresholds,
            engine,
            strategy,
            push,
        }
    }

    /// Enable or disable automatic execution
    pub async fn set_auto_trade(&self, enabled: bool) -> Result<()> {
        self.settings.update(|s| s.auto_trade_enabled = enabled).await?;
        info!(enabled, "auto-trade toggled");
        Ok(())
    }

    /// Enable or disable the adaptive threshold strategy
    pub async fn set_smart_strategy(&self, enabled: bool) -> Result<()> {
        self.settings.update(|s| s.smart_strategy_enabled = enabled).await?;
        info!(enabled, "smart strategy toggled");
        Ok(())
    }

    /// Set the global profitability threshold, in percent
    pub async fn set_global_threshold(&self, pct: f64) -> Result<()> {
        if pct <= 0.0 {
            return Err(ArbError::Settings("threshold must be positive".to_string()).into());
        }
        let previous = self.thresholds.global_pct();
        self.settings.update(|s| s.global_threshold_pct = pct).await?;
        self.thresholds.set_global_pct(pct);

        info!(previous_pct = previous, current_pct = pct, "global threshold changed");
        self.push.publish(PushEvent::ThresholdsChanged {
            previous_pct: previous,
            current_pct: pct,
            pair_overrides: self.thresholds.overrides(),
        });
        Ok(())
    }

    /// Set or clear a per-pair threshold override, in percent
    pub async fn set_pair_threshold(&self, pair_key: &str, pct: Option<f64>) -> Result<()> {
        // Validate the key before touching anything
        pair_key.parse::<crate::venues::TradingPair>()?;
        if let Some(value) = pct {
            if value <= 0.0 {
                return Err(ArbError::Settings("threshold must be positive".to_string()).into());
            }
        }

        let previous = self.thresholds.global_pct();
        self.settings
            .update(|s| match pct {
                Some(value) => {
                    s.pair_thresholds.insert(pair_key.to_string(), value);
                }
                None => {
                    s.pair_thresholds.remove(pair_key);
                }
            })
            .await?;
        self.thresholds.set_pair_override(pair_key, pct);

        info!(pair = pair_key, override_pct = ?pct, "pair threshold changed");
        self.push.publish(PushEvent::ThresholdsChanged {
            previous_pct: previous,
            current_pct: previous,
            pair_overrides: self.thresholds.overrides(),
        });
        Ok(())
    }

    /// Execute an opportunity on operator request. Bypasses the
    /// auto-trade gate and the threshold, never the balance and risk
    /// checks.
    pub async fn execute_manually(&self, opportunity: &Opportunity) -> Result<ExecutionOutcome> {
        info!(opportunity = %opportunity.id, "manual execution requested");
        self.engine.try_execute(opportunity, true).await
    }

    /// Request an out-of-cycle strategy recompute; duplicates coalesce
    pub fn trigger_strategy_recompute(&self) {
        info!("manual strategy recompute requested");
        self.strategy.trigger_recompute();
    }

    /// Snapshot of the persisted settings
    pub async fn settings(&self) -> crate::config::Settings {
        self.settings.get().await
    }
}
