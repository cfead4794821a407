//! Process wiring
//!
//! Builds the component graph once at startup and runs the background
//! loops as explicit tokio tasks joined on a shutdown signal. No loop
//! outlives the signal; no loop dies to a single bad cycle.

use crate::{
    config::AppConfig,
    control::ControlSurface,
    engine::ExecutionEngine,
    push::PushHub,
    scanner::OpportunityScanner,
    stats::{RebalancePlanner, StatsAggregator},
    strategy::{StrategyEngine, ThresholdHandle},
    venues::{TradingPair, VenueRegistry},
    ArbError, Result, SettingsStore,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// The fully wired component graph
pub struct App {
    /// Loaded configuration
    pub config: AppConfig,
    /// Persisted settings store
    pub settings: Arc<SettingsStore>,
    /// Venue registry
    pub registry: Arc<VenueRegistry>,
    /// Push hub for UI subscribers
    pub push: Arc<PushHub>,
    /// Statistics aggregator
    pub stats: Arc<StatsAggregator>,
    /// Live threshold handle
    pub thresholds: Arc<ThresholdHandle>,
    /// Execution engine
    pub engine: Arc<ExecutionEngine>,
    /// Opportunity scanner
    pub scanner: Arc<OpportunityScanner>,
    /// Strategy engine
    pub strategy: Arc<StrategyEngine>,
    /// Control surface
    pub control: Arc<ControlSurface>,
}

impl App {
    /// Build the component graph. Fails fast on invalid configuration or
    /// an unreadable settings store; nothing else here is fatal.
    pub async fn build(config: AppConfig, registry: Arc<VenueRegistry>, sandbox: bool) -> Result<Self> {
        config.validate()?;
        if registry.len() < 2 {
            return Err(ArbError::Config(format!(
                "arbitrage needs at least two venues, registry has {}",
                registry.len()
            ))
            .into());
        }

        let settings = Arc::new(SettingsStore::open(&config.settings_file)?);
        let initial = settings.get().await;

        let thresholds = Arc::new(ThresholdHandle::new(initial.global_threshold_pct));
        for (pair, pct) in &initial.pair_thresholds {
            thresholds.set_pair_override(pair, Some(*pct));
        }

        let push = Arc::new(PushHub::new());
        let stats = Arc::new(StatsAggregator::new());

        let engine = Arc::new(ExecutionEngine::new(
            config.execution.clone(),
            Arc::clone(&registry),
            Arc::clone(&settings),
            Arc::clone(&thresholds),
            Arc::clone(&stats),
            Arc::clone(&push),
        ));

        let scanner = Arc::new(OpportunityScanner::new(
            config.scanner.clone(),
            Arc::clone(&registry),
            Arc::clone(&thresholds),
            Arc::clone(&settings),
            Arc::clone(&engine),
            Arc::clone(&push),
            Arc::clone(&stats),
            sandbox,
        )?);

        let strategy = Arc::new(StrategyEngine::new(
            config.strategy.clone(),
            Arc::clone(&stats),
            Arc::clone(&thresholds),
            Arc::clone(&settings),
            Arc::clone(&push),
        ));

        let control = Arc::new(ControlSurface::new(
            Arc::clone(&settings),
            Arc::clone(&thresholds),
            Arc::clone(&engine),
            Arc::clone(&strategy),
            Arc::clone(&push),
        ));

        info!(
            venues = registry.len(),
            pairs = config.scanner.pairs.len(),
            auto_trade = initial.auto_trade_enabled,
            smart_strategy = initial.smart_strategy_enabled,
            sandbox,
            "application wired"
        );

        Ok(Self {
            config,
            settings,
            registry,
            push,
            stats,
            thresholds,
            engine,
            scanner,
            strategy,
            control,
        })
    }
}

/// Running background loops plus the shutdown signal that stops them
pub struct Daemon {
    shutdown_tx: broadcast::Sender<()>,
    handles: Vec<JoinHandle<()>>,
}

impl Daemon {
    /// Spawn the scanner, strategy and aggregator-maintenance loops
    pub fn spawn(app: &App) -> Self {
        let (shutdown_tx, _) = broadcast::channel(4);

        let mut handles = Vec::new();
        handles.push(tokio::spawn(
            Arc::clone(&app.scanner).run(shutdown_tx.subscribe()),
        ));
        handles.push(tokio::spawn(
            Arc::clone(&app.strategy).run(shutdown_tx.subscribe()),
        ));
        handles.push(tokio::spawn(maintenance_loop(
            app.config.clone(),
            Arc::clone(&app.registry),
            Arc::clone(&app.stats),
            shutdown_tx.subscribe(),
        )));

        Self {
            shutdown_tx,
            handles,
        }
    }

    /// A sender that external signal handlers can use to stop the daemon
    pub fn shutdown_sender(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Signal every loop and wait for all of them to finish their current
    /// iteration and exit
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        for handle in self.handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "background task ended abnormally");
            }
        }
        info!("all background loops stopped");
    }
}

/// Periodically refresh rebalancing proposals from live venue balances
async fn maintenance_loop(
    config: AppConfig,
    registry: Arc<VenueRegistry>,
    stats: Arc<StatsAggregator>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let planner = RebalancePlanner::new(config.rebalancing.clone());
    let interval = std::time::Duration::from_secs(config.rebalancing.refresh_interval_secs);
    info!(interval_secs = config.rebalancing.refresh_interval_secs, "aggregator maintenance started");

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                info!("aggregator maintenance stopping");
                break;
            }
            _ = tokio::time::sleep(interval) => {
                // Base assets of every tracked pair, plus anything a
                // partial execution left imbalanced
                let mut assets: BTreeSet<String> = config
                    .scanner
                    .pairs
                    .iter()
                    .filter_map(|p| p.parse::<TradingPair>().ok())
                    .map(|p| p.base)
                    .collect();
                assets.extend(stats.imbalances().into_keys());

                let assets: Vec<String> = assets.into_iter().collect();
                let proposals = planner.plan(&registry, &assets).await;
                for proposal in &proposals {
                    info!(
                        asset = %proposal.asset,
                        from = %proposal.from_venue,
                        to = %proposal.to_venue,
                        amount = proposal.amount,
                        viable = proposal.viable,
                        "rebalancing proposal"
                    );
                }
                stats.set_proposals(proposals);
            }
        }
    }
}
