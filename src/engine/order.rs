//! Per-leg order model
//!
//! An `Order` is created when the execution engine submits a leg and is
//! mutated only by status polls against the owning venue.

use crate::{
    venues::{OrderReport, OrderType, Side, VenueOrderStatus},
    ArbError, Result,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One leg of a paired arbitrage trade
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// Internal order id
    pub id: Uuid,
    /// Venue the leg was placed on
    pub venue: String,
    /// Native venue symbol
    pub symbol: String,
    /// Buy or sell
    pub side: Side,
    /// Market or limit
    pub order_type: OrderType,
    /// Requested limit price, for limit orders
    pub limit_price: Option<f64>,
    /// Venue-assigned order id, present once the venue accepted the order
    pub venue_order_id: Option<String>,
    /// Current status
    pub status: VenueOrderStatus,
    /// Originally requested quantity
    pub original_qty: f64,
    /// Quantity executed so far
    pub executed_qty: f64,
    /// Average fill price reported by the venue
    pub average_price: Option<f64>,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Create a market order leg, not yet submitted
    pub fn market(venue: impl Into<String>, symbol: impl Into<String>, side: Side, qty: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            venue: venue.into(),
            symbol: symbol.into(),
            side,
            order_type: OrderType::Market,
            limit_price: None,
            venue_order_id: None,
            status: VenueOrderStatus::Pending,
            original_qty: qty,
            executed_qty: 0.0,
            average_price: None,
            created_at: Utc::now(),
        }
    }

    /// Remaining quantity, never negative
    pub fn remaining_qty(&self) -> f64 {
        (self.original_qty - self.executed_qty).max(0.0)
    }

    /// True once the venue will no longer move this order
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Fold a venue status report into the leg.
    ///
    /// Executed quantity may only grow and never past the original; a
    /// venue report violating either is rejected rather than applied.
    pub fn apply_report(&mut self, report: &OrderReport) -> Result<()> {
        if report.executed_qty < self.executed_qty {
            return Err(ArbError::Execution(format!(
                "venue {} shrank executed qty on order {} ({} -> {})",
                self.venue, self.id, self.executed_qty, report.executed_qty
            ))
            .into());
        }
        if report.executed_qty > self.original_qty + f64::EPSILON {
            return Err(ArbError::Execution(format!(
                "venue {} overfilled order {} ({} > {})",
                self.venue, self.id, report.executed_qty, self.original_qty
            ))
            .into());
        }
        self.executed_qty = report.executed_qty.min(self.original_qty);
        self.status = report.status;
        if report.average_price.is_some() {
            self.average_price = report.average_price;
        }
        Ok(())
    }

    /// Mark the leg failed before or during submission
    pub fn mark_failed(&mut self) {
        self.status = VenueOrderStatus::Failed;
    }

    /// Record the venue's acceptance of the order
    pub fn accept(&mut self, venue_order_id: impl Into<String>, status: VenueOrderStatus) {
        self.venue_order_id = Some(venue_order_id.into());
        self.status = status;
    }
}
