//! Market data types shared by the scanner and the execution engine

use serde::{Deserialize, Serialize};

/// A single price level in an order book
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Level {
    /// Price of the level
    pub price: f64,
    /// Visible quantity at the level
    pub quantity: f64,
}

/// Best bid/ask snapshot with visible depth, as returned by a venue
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BookTop {
    /// Best bid price
    pub bid: f64,
    /// Best ask price
    pub ask: f64,
    /// Visible quantity at the best bid
    pub bid_depth: f64,
    /// Visible quantity at the best ask
    pub ask_depth: f64,
    /// Snapshot timestamp (unix millis, venue clock)
    pub timestamp_ms: i64,
}

impl BookTop {
    /// Mid price of the snapshot
    pub fn mid(&self) -> f64 {
        (self.bid + self.ask) / 2.0
    }

    /// True when both sides carry a positive price and quantity
    pub fn is_valid(&self) -> bool {
        self.bid > 0.0 && self.ask > 0.0 && self.bid_depth > 0.0 && self.ask_depth > 0.0
    }
}

/// Order book snapshot for one symbol on one venue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderBook {
    /// Native venue symbol
    pub symbol: String,
    /// Venue name
    pub venue: String,
    /// Bid levels, best (highest) first
    bids: Vec<Level>,
    /// Ask levels, best (lowest) first
    asks: Vec<Level>,
    /// Snapshot timestamp (unix millis)
    pub timestamp_ms: i64,
}

impl OrderBook {
    /// Create an empty order book
    pub fn new(symbol: impl Into<String>, venue: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            venue: venue.into(),
            bids: Vec::new(),
            asks: Vec::new(),
            timestamp_ms: 0,
        }
    }

    /// Insert or replace a bid level, keeping best-first ordering.
    /// A zero quantity removes the level.
    pub fn update_bid(&mut self, price: f64, quantity: f64) {
        Self::update_side(&mut self.bids, price, quantity);
        self.bids
            .sort_by(|a, b| b.price.partial_cmp(&a.price).unwrap_or(std::cmp::Ordering::Equal));
    }

    /// Insert or replace an ask level, keeping best-first ordering.
    /// A zero quantity removes the level.
    pub fn update_ask(&mut self, price: f64, quantity: f64) {
        Self::update_side(&mut self.asks, price, quantity);
        self.asks
            .sort_by(|a, b| a.price.partial_cmp(&b.price).unwrap_or(std::cmp::Ordering::Equal));
    }

    fn update_side(side: &mut Vec<Level>, price: f64, quantity: f64) {
        if let Some(level) = side.iter_mut().find(|l| l.price == price) {
            level.quantity = quantity;
        } else if quantity > 0.0 {
            side.push(Level { price, quantity });
        }
        side.retain(|l| l.quantity > 0.0);
    }

    /// Best bid price, if any
    pub fn best_bid(&self) -> Option<f64> {
        self.bids.first().map(|l| l.price)
    }

    /// Best ask price, if any
    pub fn best_ask(&self) -> Option<f64> {
        self.asks.first().map(|l| l.price)
    }

    /// Quantity at the best bid, if any
    pub fn best_bid_quantity(&self) -> Option<f64> {
        self.bids.first().map(|l| l.quantity)
    }

    /// Quantity at the best ask, if any
    pub fn best_ask_quantity(&self) -> Option<f64> {
        self.asks.first().map(|l| l.quantity)
    }

    /// Set the snapshot timestamp
    pub fn set_timestamp(&mut self, timestamp_ms: i64) {
        self.timestamp_ms = timestamp_ms;
    }

    /// Collapse the book into a best bid/ask snapshot.
    /// Returns `None` when either side is empty.
    pub fn top(&self) -> Option<BookTop> {
        let (bid, ask) = (self.bids.first()?, self.asks.first()?);
        Some(BookTop {
            bid: bid.price,
            ask: ask.price,
            bid_depth: bid.quantity,
            ask_depth: ask.quantity,
            timestamp_ms: self.timestamp_ms,
        })
    }
}
