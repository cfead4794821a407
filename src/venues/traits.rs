//! Venue capability contract and common order types

use crate::{market::OrderBook, ArbError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Order side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    /// Buy order
    Buy,
    /// Sell order
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Order type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    /// Market order
    Market,
    /// Limit order
    Limit,
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderType::Market => write!(f, "MARKET"),
            OrderType::Limit => write!(f, "LIMIT"),
        }
    }
}

/// Venue-side order status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VenueOrderStatus {
    /// Accepted, nothing executed yet
    Pending,
    /// Partially executed, still working
    PartiallyFilled,
    /// Fully executed
    Filled,
    /// Cancelled before completion
    Cancelled,
    /// Rejected by the venue
    Rejected,
    /// Failed venue-side after acceptance
    Failed,
}

impl VenueOrderStatus {
    /// True for statuses the venue will never move away from
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            VenueOrderStatus::Filled
                | VenueOrderStatus::Cancelled
                | VenueOrderStatus::Rejected
                | VenueOrderStatus::Failed
        )
    }
}

impl fmt::Display for VenueOrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VenueOrderStatus::Pending => write!(f, "PENDING"),
            VenueOrderStatus::PartiallyFilled => write!(f, "PARTIALLY_FILLED"),
            VenueOrderStatus::Filled => write!(f, "FILLED"),
            VenueOrderStatus::Cancelled => write!(f, "CANCELLED"),
            VenueOrderStatus::Rejected => write!(f, "REJECTED"),
            VenueOrderStatus::Failed => write!(f, "FAILED"),
        }
    }
}

/// Acknowledgement returned when an order is submitted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderAck {
    /// Venue-assigned order id
    pub order_id: String,
    /// Status at acceptance time
    pub status: VenueOrderStatus,
}

/// Point-in-time order state returned by a status poll
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OrderReport {
    /// Current status
    pub status: VenueOrderStatus,
    /// Quantity executed so far
    pub executed_qty: f64,
    /// Originally requested quantity
    pub original_qty: f64,
    /// Average fill price, when the venue reports one
    pub average_price: Option<f64>,
}

/// Canonical trading pair, independent of any venue's native symbol format
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TradingPair {
    /// Base asset (the one being arbitraged)
    pub base: String,
    /// Quote asset (the one prices are denominated in)
    pub quote: String,
}

impl TradingPair {
    /// Create a pair from base and quote assets
    pub fn new(base: impl Into<String>, quote: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            quote: quote.into(),
        }
    }
}

impl fmt::Display for TradingPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

impl std::str::FromStr for TradingPair {
    type Err = ArbError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (base, quote) = s
            .split_once('/')
            .ok_or_else(|| ArbError::Config(format!("Invalid pair '{}', expected BASE/QUOTE", s)))?;
        if base.is_empty() || quote.is_empty() {
            return Err(ArbError::Config(format!("Invalid pair '{}'", s)));
        }
        Ok(TradingPair::new(base, quote))
    }
}

/// Uniform venue capability contract.
///
/// One implementation per venue; real HTTP/WebSocket clients live outside
/// this crate and plug in behind this trait.
#[async_trait]
pub trait VenueAdapter: Send + Sync {
    /// Venue name, unique within the registry
    fn name(&self) -> &str;

    /// Map a canonical pair to this venue's native symbol format
    fn native_symbol(&self, pair: &TradingPair) -> String {
        format!("{}{}", pair.base, pair.quote)
    }

    /// Taker fee rate applied to market orders (e.g. 0.001 = 0.1%)
    fn taker_fee(&self) -> f64;

    /// Current order book snapshot for a pair
    async fn order_book(&self, pair: &TradingPair) -> Result<OrderBook>;

    /// Submit a market buy for `qty` of the base asset
    async fn place_market_buy(&self, pair: &TradingPair, qty: f64) -> Result<OrderAck>;

    /// Submit a market sell for `qty` of the base asset
    async fn place_market_sell(&self, pair: &TradingPair, qty: f64) -> Result<OrderAck>;

    /// Submit a limit buy at `price`
    async fn place_limit_buy(&self, pair: &TradingPair, qty: f64, price: f64) -> Result<OrderAck>;

    /// Submit a limit sell at `price`
    async fn place_limit_sell(&self, pair: &TradingPair, qty: f64, price: f64) -> Result<OrderAck>;

    /// Poll the current state of an order
    async fn order_status(&self, order_id: &str) -> Result<OrderReport>;

    /// Best-effort cancel; `true` when the venue accepted the cancel
    async fn cancel_order(&self, order_id: &str) -> Result<bool>;

    /// Free balance of an asset on this venue
    async fn balance(&self, asset: &str) -> Result<f64>;
}
