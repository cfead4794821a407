//! Cross-Venue Arbitrage Pipeline
//!
//! Watches prices for the same asset across multiple independent trading
//! venues, detects spreads that are profitable net of fees, executes both
//! legs as a coordinated pair, and retunes its own profitability threshold
//! from rolling detection history.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod control;
pub mod engine;
pub mod market;
pub mod push;
pub mod runtime;
pub mod scanner;
pub mod stats;
pub mod strategy;
pub mod utils;
pub mod venues;

// Re-export commonly used types
pub use config::{AppConfig, SettingsStore};
pub use engine::{ExecutionEngine, ExecutionOutcome, Transaction, TransactionStatus};
pub use market::BookTop;
pub use push::{PushEvent, PushHub};
pub use scanner::{Opportunity, OpportunityScanner};
pub use stats::{RebalancingProposal, StatsAggregator};
pub use strategy::{StrategyEngine, StrategyUpdate, ThresholdHandle};
pub use venues::{TradingPair, VenueAdapter, VenueRegistry};

/// Result type used throughout the application
pub type Result<T> = anyhow::Result<T>;

/// Common error types for the arbitrage system
#[derive(thiserror::Error, Debug)]
pub enum ArbError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Persisted settings store error
    #[error("Settings error: {0}")]
    Settings(String),

    /// Venue could not be reached or timed out mid-call
    #[error("Venue unavailable: {0}")]
    VenueUnavailable(String),

    /// Pre-flight balance check failed, no orders were placed
    #[error("Insufficient balance: {0}")]
    InsufficientBalance(String),

    /// Order rejected by the venue
    #[error("Venue rejected order: {0}")]
    VenueRejected(String),

    /// Legs never reached a terminal state within the window
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Another execution is already in flight for the same asset
    #[error("Execution in flight: {0}")]
    ExecutionInFlight(String),

    /// Execution error
    #[error("Execution error: {0}")]
    Execution(String),
}

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_info() {
        assert!(!VERSION.is_empty());
        assert!(!APP_NAME.is_empty());
    }

    #[test]
    fn test_error_display() {
        let err = ArbError::InsufficientBalance("USDT on alpha".to_string());
        assert!(err.to_string().contains("Insufficient balance"));
    }
}
