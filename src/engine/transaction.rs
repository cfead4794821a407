//! Paired-leg transaction and its settlement state machine

use crate::{
    engine::order::Order,
    venues::{TradingPair, VenueOrderStatus},
    ArbError, Result,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Overall transaction status, derived from both legs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionStatus {
    /// Created, pre-flight checks not yet passed
    Pending,
    /// Both legs submitted, waiting for terminal leg statuses
    BothFilling,
    /// Both legs filled
    Completed,
    /// Exactly one leg filled, the other ended without filling
    PartiallyExecuted,
    /// Legs never reached a terminal state within the window
    TimedOut,
    /// Pre-flight check failed or no leg filled; no position change
    Rejected,
}

impl TransactionStatus {
    /// True for settled statuses
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Completed
                | TransactionStatus::PartiallyExecuted
                | TransactionStatus::TimedOut
                | TransactionStatus::Rejected
        )
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionStatus::Pending => write!(f, "PENDING"),
            TransactionStatus::BothFilling => write!(f, "BOTH_FILLING"),
            TransactionStatus::Completed => write!(f, "COMPLETED"),
            TransactionStatus::PartiallyExecuted => write!(f, "PARTIALLY_EXECUTED"),
            TransactionStatus::TimedOut => write!(f, "TIMED_OUT"),
            TransactionStatus::Rejected => write!(f, "REJECTED"),
        }
    }
}

/// Exactly two legs paired against one opportunity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    /// Transaction id
    pub id: Uuid,
    /// Opportunity this transaction executes
    pub opportunity_id: Uuid,
    /// Canonical pair
    pub pair: TradingPair,
    /// Venue of the buy leg
    pub buy_venue: String,
    /// Venue of the sell leg
    pub sell_venue: String,
    /// Current status
    pub status: TransactionStatus,
    /// Buy leg; absent when the transaction was rejected pre-flight
    pub buy_leg: Option<Order>,
    /// Sell leg; absent when the transaction was rejected pre-flight
    pub sell_leg: Option<Order>,
    /// Profit realized from actual fills, in quote units. Zero until
    /// settled.
    pub realized_profit: f64,
    /// Why a rejected transaction was rejected
    pub reject_reason: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Settlement time
    pub settled_at: Option<DateTime<Utc>>,
}

impl Transaction {
    /// Create a pending transaction for an opportunity
    pub fn pending(
        opportunity_id: Uuid,
        pair: TradingPair,
        buy_venue: impl Into<String>,
        sell_venue: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            opportunity_id,
            pair,
            buy_venue: buy_venue.into(),
            sell_venue: sell_venue.into(),
            status: TransactionStatus::Pending,
            buy_leg: None,
            sell_leg: None,
            realized_profit: 0.0,
            reject_reason: None,
            created_at: Utc::now(),
            settled_at: None,
        }
    }

    /// Move the transaction to a new status, enforcing the legal
    /// transitions: `Pending -> {BothFilling, Rejected}` and
    /// `BothFilling -> {Completed, PartiallyExecuted, TimedOut, Rejected}`.
    pub fn transition(&mut self, next: TransactionStatus) -> Result<()> {
        let legal = match (self.status, next) {
            (TransactionStatus::Pending, TransactionStatus::BothFilling) => true,
            (TransactionStatus::Pending, TransactionStatus::Rejected) => true,
            (TransactionStatus::BothFilling, s) if s.is_terminal() => true,
            _ => false,
        };
        if !legal {
            return Err(ArbError::Execution(format!(
                "illegal transaction transition {} -> {}",
                self.status, next
            ))
            .into());
        }
        self.status = next;
        if next.is_terminal() {
            self.settled_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Classify the terminal status implied by the two legs once polling
    /// stopped. `timed_out` is set when the deadline fired with at least
    /// one leg still non-terminal.
    pub fn classify_legs(buy: &Order, sell: &Order, timed_out: bool) -> TransactionStatus {
        let buy_filled = buy.status == VenueOrderStatus::Filled;
        let sell_filled = sell.status == VenueOrderStatus::Filled;

        match (buy_filled, sell_filled) {
            (true, true) => TransactionStatus::Completed,
            (true, false) | (false, true) => TransactionStatus::PartiallyExecuted,
            (false, false) if timed_out => TransactionStatus::TimedOut,
            (false, false) => TransactionStatus::Rejected,
        }
    }

    /// Profit realized from actual executed quantities and prices, fees
    /// included, in quote units. Quoted opportunity prices are not used.
    pub fn realized_profit_from_legs(buy: &Order, sell: &Order, buy_fee: f64, sell_fee: f64) -> f64 {
        let bought = buy.executed_qty * buy.average_price.unwrap_or(0.0) * (1.0 + buy_fee);
        let sold = sell.executed_qty * sell.average_price.unwrap_or(0.0) * (1.0 - sell_fee);
        sold - bought
    }

    /// Net base-asset imbalance left behind by the fills: positive means
    /// the buy venue acquired more than the sell venue shed.
    pub fn base_imbalance(&self) -> f64 {
        let bought = self.buy_leg.as_ref().map(|o| o.executed_qty).unwrap_or(0.0);
        let sold = self.sell_leg.as_ref().map(|o| o.executed_qty).unwrap_or(0.0);
        bought - sold
    }
}
