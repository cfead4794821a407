//! Integration tests: the full pipeline against simulated venues

mod test_execution;
mod test_pipeline;
mod test_strategy;

use cross_venue_arbitrage::{
    config::{AppConfig, Settings},
    runtime::App,
    venues::{SimVenue, TradingPair, VenueAdapter, VenueRegistry},
};
use std::sync::Arc;

/// Everything a scenario needs: the wired app plus handles to script the
/// simulated venues
pub struct Fixture {
    pub app: App,
    pub alpha: Arc<SimVenue>,
    pub beta: Arc<SimVenue>,
    _dir: tempfile::TempDir,
}

/// Canonical pair used across scenarios
pub fn pair() -> TradingPair {
    TradingPair::new("S", "USDT")
}

/// Test configuration: fast cycles, short settle timeout, temp settings
pub fn test_config(dir: &tempfile::TempDir) -> AppConfig {
    let mut config = AppConfig::default();
    config.settings_file = dir.path().join("settings.json");
    config.scanner.interval_ms = 50;
    config.scanner.error_cooldown_ms = 50;
    config.execution.settle_timeout_secs = 1;
    config.execution.poll_interval_ms = 20;
    config.rebalancing.refresh_interval_secs = 1;
    config
}

/// Two simulated venues with a ~1.80% net spread on S/USDT:
/// alpha asks 100.0, beta bids 102.0, both charging 0.1%.
pub async fn fixture(settings: Settings) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);

    let alpha = Arc::new(SimVenue::new("alpha", 0.001));
    let beta = Arc::new(SimVenue::new("beta", 0.001).with_separator("-"));
    alpha.set_book(&pair(), 99.5, 100.0, 5.0, 5.0);
    beta.set_book(&pair(), 102.0, 102.5, 5.0, 5.0);
    for venue in [&alpha, &beta] {
        venue.set_balance("S", 50.0);
        venue.set_balance("USDT", 50_000.0);
    }

    let mut registry = VenueRegistry::new();
    registry.register(alpha.clone() as Arc<dyn VenueAdapter>);
    registry.register(beta.clone() as Arc<dyn VenueAdapter>);

    let app = App::build(config, Arc::new(registry), true).await.unwrap();
    app.settings
        .update(|s| *s = settings)
        .await
        .expect("seeding test settings");

    Fixture {
        app,
        alpha,
        beta,
        _dir: dir,
    }
}
