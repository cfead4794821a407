//! Opportunity scanner
//!
//! Fixed-interval detection cycle over every tracked pair: reads best
//! bid/ask and depth from all venues, computes cross-venue spreads net of
//! fees in both directions, and emits opportunities that clear the live
//! threshold. A venue that fails its read is degraded for the cycle only;
//! a failed cycle is retried on the next tick.

use crate::{
    config::ScannerConfig,
    engine::ExecutionEngine,
    market::BookTop,
    push::{PushEvent, PushHub},
    stats::StatsAggregator,
    strategy::ThresholdHandle,
    venues::{ConnectionStatus, TradingPair, VenueRegistry},
    Result, SettingsStore,
};
use chrono::{DateTime, TimeZone, Utc};
use futures_util::future::join_all;
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// A detected, currently-valid cross-venue profitable spread.
/// Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Opportunity {
    /// Generated id
    pub id: Uuid,
    /// Canonical pair
    pub pair: TradingPair,
    /// Venue to buy on
    pub buy_venue: String,
    /// Venue to sell on
    pub sell_venue: String,
    /// Best ask on the buy venue
    pub buy_price: f64,
    /// Best bid on the sell venue
    pub sell_price: f64,
    /// Taker fee rate on the buy venue
    pub buy_fee: f64,
    /// Taker fee rate on the sell venue
    pub sell_fee: f64,
    /// Profit net of both fees, in percent
    pub net_profit_pct: f64,
    /// Profit with fees excluded, in percent
    pub gross_profit_pct: f64,
    /// Executable volume: min of both venues' visible depth
    pub volume: f64,
    /// Detection time, monotonic across cycles
    pub timestamp: DateTime<Utc>,
    /// True when detected against simulated venues
    pub sandbox: bool,
}

/// Profit net of both fees, in percent:
/// `(sell*(1-sellFee) - buy*(1+buyFee)) / (buy*(1+buyFee)) * 100`
pub fn net_profit_pct(buy_price: f64, sell_price: f64, buy_fee: f64, sell_fee: f64) -> f64 {
    let cost = buy_price * (1.0 + buy_fee);
    (sell_price * (1.0 - sell_fee) - cost) / cost * 100.0
}

/// Profit with fees excluded, in percent
pub fn gross_profit_pct(buy_price: f64, sell_price: f64) -> f64 {
    (sell_price - buy_price) / buy_price * 100.0
}

/// One venue's snapshot for a pair, as gathered by a scan cycle
#[derive(Debug, Clone)]
pub struct VenueQuote {
    /// Venue name
    pub venue: String,
    /// Taker fee on this venue
    pub taker_fee: f64,
    /// Best bid/ask snapshot
    pub top: BookTop,
}

/// Pure detection over one pair's venue snapshots.
///
/// Checks every ordered venue pair in both directions and returns the
/// opportunities clearing `threshold_pct`, sorted by net profit
/// descending, then executable volume descending, then lexicographic
/// (buy, sell) venue names — deterministic for the same snapshot.
pub fn detect(
    pair: &TradingPair,
    quotes: &[VenueQuote],
    threshold_pct: f64,
    sandbox: bool,
    timestamp: DateTime<Utc>,
) -> Vec<Opportunity> {
    let mut found = Vec::new();

    for buy in quotes {
        for sell in quotes {
            if buy.venue == sell.venue {
                continue;
            }
            let buy_price = buy.top.ask;
            let sell_price = sell.top.bid;
            if buy_price <= 0.0 || sell_price <= 0.0 {
                continue;
            }

            let volume = buy.top.ask_depth.min(sell.top.bid_depth);
            let net = net_profit_pct(buy_price, sell_price, buy.taker_fee, sell.taker_fee);
            if net >= threshold_pct && volume > 0.0 {
                found.push(Opportunity {
                    id: Uuid::new_v4(),
                    pair: pair.clone(),
                    buy_venue: buy.venue.clone(),
                    sell_venue: sell.venue.clone(),
                    buy_price,
                    sell_price,
                    buy_fee: buy.taker_fee,
                    sell_fee: sell.taker_fee,
                    net_profit_pct: net,
                    gross_profit_pct: gross_profit_pct(buy_price, sell_price),
                    volume,
                    timestamp,
                    sandbox,
                });
            }
        }
    }

    found.sort_by(|a, b| {
        b.net_profit_pct
            .partial_cmp(&a.net_profit_pct)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(
                b.volume
                    .partial_cmp(&a.volume)
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
            .then_with(|| (&a.buy_venue, &a.sell_venue).cmp(&(&b.buy_venue, &b.sell_venue)))
    });

    found
}

/// Background opportunity scanner
pub struct OpportunityScanner {
    config: ScannerConfig,
    pairs: Vec<TradingPair>,
    registry: Arc<VenueRegistry>,
    thresholds: Arc<ThresholdHandle>,
    settings: Arc<SettingsStore>,
    engine: Arc<ExecutionEngine>,
    push: Arc<PushHub>,
    stats: Arc<StatsAggregator>,
    recent: Mutex<VecDeque<Opportunity>>,
    venue_status: Mutex<HashMap<String, ConnectionStatus>>,
    last_ts_ms: AtomicI64,
    sandbox: bool,
}

impl OpportunityScanner {
    /// Create a scanner over the given registry
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: ScannerConfig,
        registry: Arc<VenueRegistry>,
        thresholds: Arc<ThresholdHandle>,
        settings: Arc<SettingsStore>,
        engine: Arc<ExecutionEngine>,
        push: Arc<PushHub>,
        stats: Arc<StatsAggregator>,
        sandbox: bool,
    ) -> Result<Self> {
        let pairs = config
            .pairs
            .iter()
            .map(|p| p.parse())
            .collect::<std::result::Result<Vec<TradingPair>, _>>()?;

        Ok(Self {
            config,
            pairs,
            registry,
            thresholds,
            settings,
            engine,
            push,
            stats,
            recent: Mutex::new(VecDeque::new()),
            venue_status: Mutex::new(HashMap::new()),
            last_ts_ms: AtomicI64::new(0),
            sandbox,
        })
    }

    /// Run the detection loop until shutdown. A failed cycle logs, cools
    /// down and retries; it never terminates the loop.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        info!(interval_ms = self.config.interval_ms, pairs = self.pairs.len(), "scanner started");
        let mut ticker = tokio::time::interval(std::time::Duration::from_millis(self.config.interval_ms));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("scanner stopping");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.scan_cycle().await {
                        error!(error = %e, "scan cycle failed, cooling down");
                        tokio::time::sleep(std::time::Duration::from_millis(self.config.error_cooldown_ms)).await;
                    }
                }
            }
        }
    }

    /// Run one detection cycle over all pairs, returning the emitted
    /// opportunities
    pub async fn scan_cycle(&self) -> Result<Vec<Opportunity>> {
        let auto_trade = self.settings.get().await.auto_trade_enabled;
        let timestamp = self.next_timestamp();
        let mut emitted = Vec::new();

        for pair in &self.pairs {
            let quotes = self.gather_quotes(pair).await;
            if quotes.len() < 2 {
                debug!(pair = %pair, venues = quotes.len(), "not enough venues this cycle");
                continue;
            }

            let threshold = self.thresholds.effective_pct(&pair.to_string());
            let found = detect(pair, &quotes, threshold, self.sandbox, timestamp);

            for opp in found {
                counter!("opportunities_detected", 1);
                info!(
                    pair = %opp.pair,
                    buy_venue = %opp.buy_venue,
                    sell_venue = %opp.sell_venue,
                    net_pct = opp.net_profit_pct,
                    volume = opp.volume,
                    "opportunity detected"
                );

                self.stats.record_opportunity(&opp);
                self.remember(opp.clone());
                self.push.publish(PushEvent::OpportunityDetected(opp.clone()));

                if auto_trade {
                    let engine = Arc::clone(&self.engine);
                    let spawned = opp.clone();
                    tokio::spawn(async move {
                        match engine.try_execute(&spawned, false).await {
                            Ok(outcome) if outcome.committed => {}
                            Ok(_) => debug!(opportunity = %spawned.id, "execution not committed"),
                            Err(e) => warn!(opportunity = %spawned.id, error = %e, "execution failed"),
                        }
                    });
                }

                emitted.push(opp);
            }
        }

        Ok(emitted)
    }

    /// Read the book top from every venue concurrently. Failures degrade
    /// the venue for this cycle only.
    async fn gather_quotes(&self, pair: &TradingPair) -> Vec<VenueQuote> {
        let reads = self.registry.iter().map(|(name, venue)| {
            let name = name.clone();
            let venue = Arc::clone(venue);
            let pair = pair.clone();
            async move { (name, venue.taker_fee(), venue.order_book(&pair).await) }
        });

        let mut quotes = Vec::new();
        for (name, fee, result) in join_all(reads).await {
            match result.as_ref().map(|book| book.top()) {
                Ok(Some(top)) if top.is_valid() => {
                    self.mark_venue(&name, ConnectionStatus::Connected);
                    quotes.push(VenueQuote {
                        venue: name,
                        taker_fee: fee,
                        top,
                    });
                }
                Ok(_) => {
                    debug!(venue = %name, pair = %pair, "empty book, skipping venue this cycle");
                    self.mark_venue(&name, ConnectionStatus::Degraded);
                }
                Err(e) => {
                    warn!(venue = %name, pair = %pair, error = %e, "venue read failed, degrading for this cycle");
                    self.mark_venue(&name, ConnectionStatus::Degraded);
                }
            }
        }
        quotes
    }

    /// Publish a venue status change only on transitions
    fn mark_venue(&self, venue: &str, status: ConnectionStatus) {
        let mut statuses = self.venue_status.lock().expect("venue status poisoned");
        let previous = statuses.insert(venue.to_string(), status);
        if previous != Some(status) {
            self.push.publish(PushEvent::ConnectionStatusChanged {
                venue: venue.to_string(),
                status,
            });
        }
    }

    /// Cycle timestamp, strictly increasing even when the wall clock
    /// stalls between cycles
    fn next_timestamp(&self) -> DateTime<Utc> {
        let now = Utc::now().timestamp_millis();
        let mut last = self.last_ts_ms.load(Ordering::Acquire);
        loop {
            let next = now.max(last + 1);
            match self.last_ts_ms.compare_exchange(last, next, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => {
                    return Utc
                        .timestamp_millis_opt(next)
                        .single()
                        .unwrap_or_else(Utc::now)
                }
                Err(actual) => last = actual,
            }
        }
    }

    fn remember(&self, opp: Opportunity) {
        let mut recent = self.recent.lock().expect("recent ring poisoned");
        if recent.len() == self.config.recent_capacity {
            recent.pop_front();
        }
        recent.push_back(opp);
    }

    /// Most recent opportunities, newest last, bounded by the configured
    /// capacity
    pub fn recent(&self) -> Vec<Opportunity> {
        self.recent.lock().expect("recent ring poisoned").iter().cloned().collect()
    }
}
