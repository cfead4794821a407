use clap::{Parser, Subcommand};
use cross_venue_arbitrage::{
    config::AppConfig,
    runtime::{App, Daemon},
    utils::logger,
    venues::{SimVenue, TradingPair, VenueRegistry},
    ArbError, Result,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

/// Book price jitter applied by the sandbox driver each cycle
const SANDBOX_JITTER_PCT: f64 = 0.01;

#[derive(Parser)]
#[command(name = "arbd")]
#[command(about = "Cross-venue arbitrage daemon")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config/arbd.toml")]
    config: PathBuf,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Log file path
    #[arg(long, default_value = "logs/arbd.log")]
    log_file: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the detection/execution pipeline
    Run {
        /// Use simulated venues with jittered prices instead of real ones
        #[arg(long)]
        sandbox: bool,
    },
    /// Validate configuration
    Validate,
    /// Show persisted settings
    Settings,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    logger::init(&cli.log_level, &cli.log_file)?;

    info!("Starting {} v{}", cross_venue_arbitrage::APP_NAME, cross_venue_arbitrage::VERSION);

    let config = AppConfig::from_file(&cli.config)?;
    info!("Configuration loaded from: {}", cli.config.display());

    match cli.command {
        Commands::Run { sandbox } => run(config, sandbox).await,
        Commands::Validate => validate(config).await,
        Commands::Settings => show_settings(config).await,
    }
}

async fn run(config: AppConfig, sandbox: bool) -> Result<()> {
    let (registry, sims) = if sandbox {
        info!("Running against simulated venues");
        build_sandbox_registry(&config)?
    } else {
        // Live venue clients plug in behind the VenueAdapter trait from
        // the embedding integration; the daemon itself ships none.
        return Err(ArbError::Config(
            "no live venue adapters are configured; use --sandbox or embed the crate with real adapters"
                .to_string(),
        )
        .into());
    };

    let app = App::build(config, registry, sandbox).await?;
    let daemon = Daemon::spawn(&app);

    if !sims.is_empty() {
        spawn_sandbox_driver(sims, app.config.scanner.interval_ms, &daemon);
    }

    info!("Pipeline running, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    daemon.shutdown().await;

    let summary = app.stats.summary();
    info!(
        detected = summary.detected,
        executed = summary.executed,
        completed = summary.completed,
        partially_executed = summary.partially_executed,
        realized_profit = summary.realized_profit,
        "final summary"
    );

    Ok(())
}

/// One simulated venue per configured venue name, books seeded slightly
/// apart so jitter opens and closes real spreads
fn build_sandbox_registry(config: &AppConfig) -> Result<(Arc<VenueRegistry>, Vec<Arc<SimVenue>>)> {
    let pairs = config
        .scanner
        .pairs
        .iter()
        .map(|p| p.parse())
        .collect::<std::result::Result<Vec<TradingPair>, _>>()?;

    let mut registry = VenueRegistry::new();
    let mut sims = Vec::new();

    for (index, name) in config.venues.enabled.iter().enumerate() {
        let venue = Arc::new(SimVenue::new(name, config.taker_fee_for(name)));
        let mid = 100.0 * (1.0 + 0.002 * index as f64);
        for pair in &pairs {
            venue.set_book(pair, mid * 0.999, mid * 1.001, 5.0, 5.0);
            venue.set_balance(&pair.base, 100.0);
            venue.set_balance(&pair.quote, 100_000.0);
        }
        registry.register(venue.clone() as Arc<dyn cross_venue_arbitrage::VenueAdapter>);
        sims.push(venue);
    }

    Ok((Arc::new(registry), sims))
}

/// Keep sandbox prices moving until shutdown
fn spawn_sandbox_driver(sims: Vec<Arc<SimVenue>>, interval_ms: u64, daemon: &Daemon) {
    let mut shutdown = daemon.shutdown_sender().subscribe();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_millis(interval_ms));
        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = ticker.tick() => {
                    for venue in &sims {
                        venue.jitter_books(SANDBOX_JITTER_PCT);
                    }
                }
            }
        }
    });
}

async fn validate(config: AppConfig) -> Result<()> {
    info!("Validating configuration...");

    match config.validate() {
        Ok(_) => {
            info!("Configuration is valid");
            println!("Configuration validation passed!");
        }
        Err(e) => {
            error!("Configuration validation failed: {}", e);
            return Err(e);
        }
    }

    Ok(())
}

async fn show_settings(config: AppConfig) -> Result<()> {
    let store = cross_venue_arbitrage::SettingsStore::open(&config.settings_file)?;
    let settings = store.get().await;
    println!("{}", serde_json::to_string_pretty(&settings)?);
    Ok(())
}
