//! Paired-order execution engine
//!
//! Consumes opportunities that clear the gate, places both legs
//! concurrently as market orders, polls them to a terminal state and
//! settles the resulting transaction. Mutual exclusion is per asset
//! symbol: two executions touching the same balances never overlap, while
//! different assets proceed fully in parallel.

pub mod order;
pub mod transaction;

pub use order::Order;
pub use transaction::{Transaction, TransactionStatus};

use crate::{
    config::ExecutionConfig,
    push::{PushEvent, PushHub},
    scanner::Opportunity,
    stats::StatsAggregator,
    strategy::ThresholdHandle,
    venues::{Side, VenueAdapter, VenueRegistry},
    ArbError, Result, SettingsStore,
};
use dashmap::DashMap;
use metrics::counter;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Result of a `try_execute` call
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    /// True when the engine accepted the opportunity and placed orders
    pub committed: bool,
    /// The recorded transaction; absent when the call never passed the
    /// auto-trade/threshold gate
    pub transaction: Option<Transaction>,
}

#[derive(Default)]
struct PnlTracker {
    cumulative: f64,
    peak: f64,
}

/// Paired-order execution engine
pub struct ExecutionEngine {
    config: ExecutionConfig,
    registry: Arc<VenueRegistry>,
    settings: Arc<SettingsStore>,
    thresholds: Arc<ThresholdHandle>,
    stats: Arc<StatsAggregator>,
    push: Arc<PushHub>,
    asset_locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
    history: Mutex<Vec<Transaction>>,
    loss_streak: AtomicU32,
    pnl: Mutex<PnlTracker>,
}

impl ExecutionEngine {
    /// Create the engine
    pub fn new(
        config: ExecutionConfig,
        registry: Arc<VenueRegistry>,
        settings: Arc<SettingsStore>,
        thresholds: Arc<ThresholdHandle>,
        stats: Arc<StatsAggregator>,
        push: Arc<PushHub>,
    ) -> Self {
        Self {
            config,
            registry,
            settings,
            thresholds,
            stats,
            push,
            asset_locks: DashMap::new(),
            history: Mutex::new(Vec::new()),
            loss_streak: AtomicU32::new(0),
            pnl: Mutex::new(PnlTracker::default()),
        }
    }

    /// Attempt to execute an opportunity as a coordinated buy/sell pair.
    ///
    /// `manual` marks an explicit operator invocation: it bypasses the
    /// auto-trade gate and the threshold check, never the balance and
    /// risk checks. Exactly one transaction is recorded per accepted
    /// call. A second call for the same base asset while one is in
    /// flight fails fast with `ExecutionInFlight`.
    pub async fn try_execute(&self, opp: &Opportunity, manual: bool) -> Result<ExecutionOutcome> {
        let settings = self.settings.get().await;

        if !manual {
            if !settings.auto_trade_enabled {
                debug!(opportunity = %opp.id, "auto-trade disabled, skipping");
                return Ok(ExecutionOutcome {
                    committed: false,
                    transaction: None,
                });
            }
            let threshold = self.thresholds.effective_pct(&opp.pair.to_string());
            if opp.net_profit_pct < threshold {
                debug!(
                    opportunity = %opp.id,
                    net_pct = opp.net_profit_pct,
                    threshold_pct = threshold,
                    "below threshold, skipping"
                );
                return Ok(ExecutionOutcome {
                    committed: false,
                    transaction: None,
                });
            }
        }

        // Per-asset mutual exclusion; key is the base asset so two
        // executions can never spend the same balances concurrently.
        let lock = self
            .asset_locks
            .entry(opp.pair.base.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        let Ok(_guard) = lock.try_lock() else {
            return Err(ArbError::ExecutionInFlight(opp.pair.base.clone()).into());
        };

        let mut tx = Transaction::pending(opp.id, opp.pair.clone(), &opp.buy_venue, &opp.sell_venue);

        let buy_venue = match self.registry.get(&opp.buy_venue) {
            Some(v) => Arc::clone(v),
            None => {
                return self
                    .reject(tx, format!("unknown buy venue '{}'", opp.buy_venue))
                    .await
            }
        };
        let sell_venue = match self.registry.get(&opp.sell_venue) {
            Some(v) => Arc::clone(v),
            None => {
                return self
                    .reject(tx, format!("unknown sell venue '{}'", opp.sell_venue))
                    .await
            }
        };

        let volume = opp.volume;
        if volume < self.config.min_order_size {
            return self
                .reject(tx, format!("volume {} below minimum order size", volume))
                .await;
        }

        // Balance pre-flight against live venue balances; the cached
        // opportunity never decides. The safety multiplier leaves margin
        // for slippage between check and fill.
        let quote_needed = volume * opp.buy_price * (1.0 + opp.buy_fee);
        let available_quote = match buy_venue.balance(&opp.pair.quote).await {
            Ok(balance) => balance,
            Err(e) => return self.reject(tx, format!("buy venue balance read failed: {}", e)).await,
        };
        let available_base = match sell_venue.balance(&opp.pair.base).await {
            Ok(balance) => balance,
            Err(e) => return self.reject(tx, format!("sell venue balance read failed: {}", e)).await,
        };

        let multiplier = settings.safe_balance_multiplier;
        if quote_needed > available_quote * multiplier {
            counter!("executions_rejected_balance", 1);
            return self
                .reject(
                    tx,
                    format!(
                        "insufficient {} on {}: need {:.8}, usable {:.8}",
                        opp.pair.quote,
                        opp.buy_venue,
                        quote_needed,
                        available_quote * multiplier
                    ),
                )
                .await;
        }
        if volume > available_base * multiplier {
            counter!("executions_rejected_balance", 1);
            return self
                .reject(
                    tx,
                    format!(
                        "insufficient {} on {}: need {:.8}, usable {:.8}",
                        opp.pair.base,
                        opp.sell_venue,
                        volume,
                        available_base * multiplier
                    ),
                )
                .await;
        }

        let mut buy_leg = Order::market(
            &opp.buy_venue,
            buy_venue.native_symbol(&opp.pair),
            Side::Buy,
            volume,
        );
        let mut sell_leg = Order::market(
            &opp.sell_venue,
            sell_venue.native_symbol(&opp.pair),
            Side::Sell,
            volume,
        );

        info!(
            transaction = %tx.id,
            pair = %opp.pair,
            buy_venue = %opp.buy_venue,
            sell_venue = %opp.sell_venue,
            volume,
            "submitting both legs"
        );

        // Both legs go out together; neither waits for the other.
        let (buy_ack, sell_ack) = tokio::join!(
            buy_venue.place_market_buy(&opp.pair, volume),
            sell_venue.place_market_sell(&opp.pair, volume),
        );

        match buy_ack {
            Ok(ack) => buy_leg.accept(ack.order_id, ack.status),
            Err(e) => {
                warn!(transaction = %tx.id, venue = %opp.buy_venue, error = %e, "buy leg submission failed");
                buy_leg.mark_failed();
            }
        }
        match sell_ack {
            Ok(ack) => sell_leg.accept(ack.order_id, ack.status),
            Err(e) => {
                warn!(transaction = %tx.id, venue = %opp.sell_venue, error = %e, "sell leg submission failed");
                sell_leg.mark_failed();
            }
        }

        if buy_leg.venue_order_id.is_none() && sell_leg.venue_order_id.is_none() {
            tx.buy_leg = Some(buy_leg);
            tx.sell_leg = Some(sell_leg);
            return self.reject(tx, "both leg submissions failed".to_string()).await;
        }

        tx.transition(TransactionStatus::BothFilling)?;

        let timed_out = self
            .poll_to_terminal(&buy_venue, &mut buy_leg, &sell_venue, &mut sell_leg)
            .await;

        if timed_out {
            warn!(transaction = %tx.id, "settle timeout, issuing best-effort cancels");
            self.cancel_leg(&buy_venue, &mut buy_leg).await;
            self.cancel_leg(&sell_venue, &mut sell_leg).await;
        }

        let status = Transaction::classify_legs(&buy_leg, &sell_leg, timed_out);
        tx.realized_profit =
            Transaction::realized_profit_from_legs(&buy_leg, &sell_leg, opp.buy_fee, opp.sell_fee);
        tx.buy_leg = Some(buy_leg);
        tx.sell_leg = Some(sell_leg);
        tx.transition(status)?;

        self.settle(&tx).await;

        Ok(ExecutionOutcome {
            committed: true,
            transaction: Some(tx),
        })
    }

    /// Poll both legs until terminal or the settle deadline. Returns true
    /// when the deadline fired with at least one leg still working.
    async fn poll_to_terminal(
        &self,
        buy_venue: &Arc<dyn VenueAdapter>,
        buy_leg: &mut Order,
        sell_venue: &Arc<dyn VenueAdapter>,
        sell_leg: &mut Order,
    ) -> bool {
        let deadline = tokio::time::Instant::now()
            + std::time::Duration::from_secs(self.config.settle_timeout_secs);
        // A leg accepted with a terminal status still needs one poll to
        // pick up its executed quantity.
        let mut buy_synced = buy_leg.venue_order_id.is_none();
        let mut sell_synced = sell_leg.venue_order_id.is_none();

        loop {
            if !buy_synced || !buy_leg.is_terminal() {
                buy_synced = self.poll_leg(buy_venue, buy_leg).await || buy_synced;
            }
            if !sell_synced || !sell_leg.is_terminal() {
                sell_synced = self.poll_leg(sell_venue, sell_leg).await || sell_synced;
            }

            if buy_leg.is_terminal() && sell_leg.is_terminal() && buy_synced && sell_synced {
                return false;
            }
            if tokio::time::Instant::now() >= deadline {
                return !(buy_leg.is_terminal() && sell_leg.is_terminal());
            }
            tokio::time::sleep(std::time::Duration::from_millis(self.config.poll_interval_ms)).await;
        }
    }

    /// One status poll; returns true when a report was applied
    async fn poll_leg(&self, venue: &Arc<dyn VenueAdapter>, leg: &mut Order) -> bool {
        let Some(order_id) = leg.venue_order_id.clone() else {
            return true;
        };
        match venue.order_status(&order_id).await {
            Ok(report) => {
                if let Err(e) = leg.apply_report(&report) {
                    warn!(venue = %leg.venue, order = %order_id, error = %e, "inconsistent venue report dropped");
                }
                true
            }
            Err(e) => {
                warn!(venue = %leg.venue, order = %order_id, error = %e, "status poll failed");
                false
            }
        }
    }

    /// Best-effort cancel of a non-terminal leg, followed by one final
    /// poll to record where it landed
    async fn cancel_leg(&self, venue: &Arc<dyn VenueAdapter>, leg: &mut Order) {
        if leg.is_terminal() {
            return;
        }
        let Some(order_id) = leg.venue_order_id.clone() else {
            return;
        };
        match venue.cancel_order(&order_id).await {
            Ok(accepted) => debug!(venue = %leg.venue, order = %order_id, accepted, "cancel issued"),
            Err(e) => warn!(venue = %leg.venue, order = %order_id, error = %e, "cancel failed"),
        }
        self.poll_leg(venue, leg).await;
    }

    /// Record a pre-flight rejection: exactly one transaction, zero orders
    async fn reject(&self, mut tx: Transaction, reason: String) -> Result<ExecutionOutcome> {
        warn!(transaction = %tx.id, reason = %reason, "execution rejected pre-flight");
        tx.reject_reason = Some(reason);
        tx.transition(TransactionStatus::Rejected)?;
        self.settle(&tx).await;
        Ok(ExecutionOutcome {
            committed: false,
            transaction: Some(tx),
        })
    }

    /// Archive a settled transaction, feed the aggregator, publish the
    /// settlement and apply the kill-switch
    async fn settle(&self, tx: &Transaction) {
        match tx.status {
            TransactionStatus::Completed => counter!("transactions_completed", 1),
            TransactionStatus::PartiallyExecuted => counter!("transactions_partial", 1),
            TransactionStatus::TimedOut => counter!("transactions_timed_out", 1),
            TransactionStatus::Rejected => counter!("transactions_rejected", 1),
            _ => {}
        }

        info!(
            transaction = %tx.id,
            status = %tx.status,
            realized_profit = tx.realized_profit,
            "transaction settled"
        );

        self.stats.record_transaction(tx);
        self.history.lock().expect("history poisoned").push(tx.clone());
        self.push.publish(PushEvent::TransactionSettled(tx.clone()));

        self.apply_kill_switch(tx).await;
    }

    /// Disable auto-trade after too many consecutive losses or when
    /// drawdown breaches the configured ceiling
    async fn apply_kill_switch(&self, tx: &Transaction) {
        let executed = matches!(
            tx.status,
            TransactionStatus::Completed | TransactionStatus::PartiallyExecuted
        );
        if !executed {
            return;
        }

        let losing = tx.status != TransactionStatus::Completed || tx.realized_profit < 0.0;
        let streak = if losing {
            self.loss_streak.fetch_add(1, Ordering::AcqRel) + 1
        } else {
            self.loss_streak.store(0, Ordering::Release);
            0
        };

        let drawdown_pct = {
            let mut pnl = self.pnl.lock().expect("pnl tracker poisoned");
            pnl.cumulative += tx.realized_profit;
            if pnl.cumulative > pnl.peak {
                pnl.peak = pnl.cumulative;
            }
            if pnl.peak > 0.0 {
                (pnl.peak - pnl.cumulative) / pnl.peak * 100.0
            } else {
                0.0
            }
        };

        let settings = self.settings.get().await;
        if !settings.auto_trade_enabled {
            return;
        }

        let streak_breached = streak >= settings.max_consecutive_losses;
        let drawdown_breached = drawdown_pct >= settings.max_drawdown_pct;
        if streak_breached || drawdown_breached {
            warn!(
                loss_streak = streak,
                drawdown_pct,
                "kill-switch tripped, disabling auto-trade"
            );
            if let Err(e) = self.settings.update(|s| s.auto_trade_enabled = false).await {
                warn!(error = %e, "failed to persist kill-switch state");
            }
        }
    }

    /// Settled transactions, oldest first
    pub fn history(&self) -> Vec<Transaction> {
        self.history.lock().expect("history poisoned").clone()
    }
}
