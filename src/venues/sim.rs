//! Deterministic in-process venue used by sandbox mode and the test suite
//!
//! Books, balances and fill behavior are scripted by the caller, so a test
//! can stage any settlement outcome (full fill, rejection, partial fill,
//! never-terminal) without touching the network.

use crate::{
    market::{BookTop, OrderBook},
    venues::{OrderAck, OrderReport, Side, TradingPair, VenueAdapter, VenueOrderStatus},
    ArbError, Result,
};
use async_trait::async_trait;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Mutex;

/// How the venue settles submitted orders
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FillBehavior {
    /// Every order fills completely at the current book price
    Fill,
    /// Every order is rejected at acceptance
    Reject,
    /// Orders fill `fraction` of the requested quantity, then cancel
    PartialFill {
        /// Fraction of the requested quantity that executes (0.0..1.0)
        fraction: f64,
    },
    /// Orders are accepted but never reach a terminal state
    Hang,
}

#[derive(Debug, Clone)]
struct SimOrder {
    side: Side,
    pair: TradingPair,
    original_qty: f64,
    executed_qty: f64,
    fill_price: f64,
    status: VenueOrderStatus,
    polls: u32,
}

#[derive(Default)]
struct SimState {
    books: HashMap<String, BookTop>,
    balances: HashMap<String, f64>,
    orders: HashMap<String, SimOrder>,
    behavior: Option<FillBehavior>,
    unreachable: bool,
    next_order: u64,
}

/// Scripted venue adapter
pub struct SimVenue {
    name: String,
    taker_fee: f64,
    symbol_separator: String,
    state: Mutex<SimState>,
}

impl SimVenue {
    /// Create a venue that fills every order at the scripted book price
    pub fn new(name: impl Into<String>, taker_fee: f64) -> Self {
        Self {
            name: name.into(),
            taker_fee,
            symbol_separator: String::new(),
            state: Mutex::new(SimState {
                behavior: Some(FillBehavior::Fill),
                ..SimState::default()
            }),
        }
    }

    /// Use a separator in native symbols (e.g. "-" for `S-USDT`)
    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.symbol_separator = separator.into();
        self
    }

    /// Script the best bid/ask snapshot for a pair
    pub fn set_book(&self, pair: &TradingPair, bid: f64, ask: f64, bid_depth: f64, ask_depth: f64) {
        let mut state = self.state.lock().expect("sim state poisoned");
        state.books.insert(
            pair.to_string(),
            BookTop {
                bid,
                ask,
                bid_depth,
                ask_depth,
                timestamp_ms: chrono::Utc::now().timestamp_millis(),
            },
        );
    }

    /// Script the free balance of an asset
    pub fn set_balance(&self, asset: &str, amount: f64) {
        let mut state = self.state.lock().expect("sim state poisoned");
        state.balances.insert(asset.to_string(), amount);
    }

    /// Change how subsequent orders settle
    pub fn set_fill_behavior(&self, behavior: FillBehavior) {
        let mut state = self.state.lock().expect("sim state poisoned");
        state.behavior = Some(behavior);
    }

    /// Make every call fail with `VenueUnavailable` until re-enabled
    pub fn set_unreachable(&self, unreachable: bool) {
        let mut state = self.state.lock().expect("sim state poisoned");
        state.unreachable = unreachable;
    }

    /// Randomly nudge every scripted book by up to `pct` in either
    /// direction. Sandbox mode calls this between scanner cycles to keep
    /// spreads moving.
    pub fn jitter_books(&self, pct: f64) {
        let mut rng = rand::thread_rng();
        let mut state = self.state.lock().expect("sim state poisoned");
        let now = chrono::Utc::now().timestamp_millis();
        for book in state.books.values_mut() {
            let shift = 1.0 + rng.gen_range(-pct..pct);
            book.bid *= shift;
            book.ask *= shift;
            book.timestamp_ms = now;
        }
    }

    fn check_reachable(state: &SimState, name: &str) -> Result<()> {
        if state.unreachable {
            return Err(ArbError::VenueUnavailable(format!("{} is offline", name)).into());
        }
        Ok(())
    }

    fn submit(&self, pair: &TradingPair, side: Side, qty: f64, limit_price: Option<f64>) -> Result<OrderAck> {
        let mut state = self.state.lock().expect("sim state poisoned");
        Self::check_reachable(&state, &self.name)?;

        let book = state
            .books
            .get(&pair.to_string())
            .copied()
            .ok_or_else(|| ArbError::VenueUnavailable(format!("{}: no book for {}", self.name, pair)))?;
        let market_price = match side {
            Side::Buy => book.ask,
            Side::Sell => book.bid,
        };
        let fill_price = limit_price.unwrap_or(market_price);

        state.next_order += 1;
        let order_id = format!("{}-{}", self.name, state.next_order);
        let behavior = state.behavior.unwrap_or(FillBehavior::Fill);

        let (status, executed_qty) = match behavior {
            FillBehavior::Fill => (VenueOrderStatus::Filled, qty),
            FillBehavior::Reject => (VenueOrderStatus::Rejected, 0.0),
            FillBehavior::PartialFill { fraction } => {
                (VenueOrderStatus::PartiallyFilled, qty * fraction.clamp(0.0, 1.0))
            }
            FillBehavior::Hang => (VenueOrderStatus::Pending, 0.0),
        };

        if executed_qty > 0.0 {
            Self::apply_fill(&mut state, pair, side, executed_qty, fill_price, self.taker_fee);
        }

        state.orders.insert(
            order_id.clone(),
            SimOrder {
                side,
                pair: pair.clone(),
                original_qty: qty,
                executed_qty,
                fill_price,
                status,
                polls: 0,
            },
        );

        Ok(OrderAck { order_id, status })
    }

    fn apply_fill(state: &mut SimState, pair: &TradingPair, side: Side, qty: f64, price: f64, fee: f64) {
        match side {
            Side::Buy => {
                *state.balances.entry(pair.quote.clone()).or_insert(0.0) -= qty * price * (1.0 + fee);
                *state.balances.entry(pair.base.clone()).or_insert(0.0) += qty;
            }
            Side::Sell => {
                *state.balances.entry(pair.base.clone()).or_insert(0.0) -= qty;
                *state.balances.entry(pair.quote.clone()).or_insert(0.0) += qty * price * (1.0 - fee);
            }
        }
    }

    /// Orders submitted so far (test helper)
    pub fn order_count(&self) -> usize {
        self.state.lock().expect("sim state poisoned").orders.len()
    }
}

#[async_trait]
impl VenueAdapter for SimVenue {
    fn name(&self) -> &str {
        &self.name
    }

    fn native_symbol(&self, pair: &TradingPair) -> String {
        format!("{}{}{}", pair.base, self.symbol_separator, pair.quote)
    }

    fn taker_fee(&self) -> f64 {
        self.taker_fee
    }

    async fn order_book(&self, pair: &TradingPair) -> Result<OrderBook> {
        let state = self.state.lock().expect("sim state poisoned");
        Self::check_reachable(&state, &self.name)?;
        let top = state
            .books
            .get(&pair.to_string())
            .copied()
            .ok_or_else(|| ArbError::VenueUnavailable(format!("{}: no book for {}", self.name, pair)))?;

        let mut book = OrderBook::new(self.native_symbol(pair), self.name.clone());
        book.update_bid(top.bid, top.bid_depth);
        book.update_ask(top.ask, top.ask_depth);
        book.set_timestamp(top.timestamp_ms);
        Ok(book)
    }

    async fn place_market_buy(&self, pair: &TradingPair, qty: f64) -> Result<OrderAck> {
        self.submit(pair, Side::Buy, qty, None)
    }

    async fn place_market_sell(&self, pair: &TradingPair, qty: f64) -> Result<OrderAck> {
        self.submit(pair, Side::Sell, qty, None)
    }

    async fn place_limit_buy(&self, pair: &TradingPair, qty: f64, price: f64) -> Result<OrderAck> {
        self.submit(pair, Side::Buy, qty, Some(price))
    }

    async fn place_limit_sell(&self, pair: &TradingPair, qty: f64, price: f64) -> Result<OrderAck> {
        self.submit(pair, Side::Sell, qty, Some(price))
    }

    async fn order_status(&self, order_id: &str) -> Result<OrderReport> {
        let mut state = self.state.lock().expect("sim state poisoned");
        Self::check_reachable(&state, &self.name)?;
        let order = state
            .orders
            .get_mut(order_id)
            .ok_or_else(|| ArbError::VenueRejected(format!("{}: unknown order {}", self.name, order_id)))?;

        order.polls += 1;
        // A partially filled order cancels its remainder on the second poll,
        // so settlement tests observe both the working and terminal states.
        if order.status == VenueOrderStatus::PartiallyFilled && order.polls >= 2 {
            order.status = VenueOrderStatus::Cancelled;
        }

        Ok(OrderReport {
            status: order.status,
            executed_qty: order.executed_qty,
            original_qty: order.original_qty,
            average_price: (order.executed_qty > 0.0).then_some(order.fill_price),
        })
    }

    async fn cancel_order(&self, order_id: &str) -> Result<bool> {
        let mut state = self.state.lock().expect("sim state poisoned");
        Self::check_reachable(&state, &self.name)?;
        let Some(order) = state.orders.get_mut(order_id) else {
            return Ok(false);
        };
        if order.status.is_terminal() {
            return Ok(false);
        }
        order.status = VenueOrderStatus::Cancelled;
        Ok(true)
    }

    async fn balance(&self, asset: &str) -> Result<f64> {
        let state = self.state.lock().expect("sim state poisoned");
        Self::check_reachable(&state, &self.name)?;
        Ok(state.balances.get(asset).copied().unwrap_or(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> TradingPair {
        TradingPair::new("S", "USDT")
    }

    #[tokio::test]
    async fn test_market_buy_fills_and_moves_balances() {
        let venue = SimVenue::new("alpha", 0.001);
        venue.set_book(&pair(), 99.0, 100.0, 5.0, 5.0);
        venue.set_balance("USDT", 1_000.0);

        let ack = venue.place_market_buy(&pair(), 2.0).await.unwrap();
        assert_eq!(ack.status, VenueOrderStatus::Filled);

        let report = venue.order_status(&ack.order_id).await.unwrap();
        assert_eq!(report.executed_qty, 2.0);
        assert_eq!(report.average_price, Some(100.0));

        // 2 * 100 * 1.001 = 200.2 debited
        let usdt = venue.balance("USDT").await.unwrap();
        assert!((usdt - 799.8).abs() < 1e-9);
        assert_eq!(venue.balance("S").await.unwrap(), 2.0);
    }

    #[tokio::test]
    async fn test_reject_behavior() {
        let venue = SimVenue::new("alpha", 0.001);
        venue.set_book(&pair(), 99.0, 100.0, 5.0, 5.0);
        venue.set_fill_behavior(FillBehavior::Reject);

        let ack = venue.place_market_sell(&pair(), 1.0).await.unwrap();
        assert_eq!(ack.status, VenueOrderStatus::Rejected);
        let report = venue.order_status(&ack.order_id).await.unwrap();
        assert_eq!(report.executed_qty, 0.0);
    }

    #[tokio::test]
    async fn test_partial_fill_cancels_on_second_poll() {
        let venue = SimVenue::new("alpha", 0.0);
        venue.set_book(&pair(), 99.0, 100.0, 5.0, 5.0);
        venue.set_fill_behavior(FillBehavior::PartialFill { fraction: 0.6 });

        let ack = venue.place_market_buy(&pair(), 1.0).await.unwrap();
        let first = venue.order_status(&ack.order_id).await.unwrap();
        assert_eq!(first.status, VenueOrderStatus::PartiallyFilled);
        assert!((first.executed_qty - 0.6).abs() < 1e-9);

        let second = venue.order_status(&ack.order_id).await.unwrap();
        assert_eq!(second.status, VenueOrderStatus::Cancelled);
        assert!((second.executed_qty - 0.6).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_hang_then_cancel() {
        let venue = SimVenue::new("alpha", 0.001);
        venue.set_book(&pair(), 99.0, 100.0, 5.0, 5.0);
        venue.set_fill_behavior(FillBehavior::Hang);

        let ack = venue.place_market_buy(&pair(), 1.0).await.unwrap();
        assert_eq!(ack.status, VenueOrderStatus::Pending);
        assert!(venue.cancel_order(&ack.order_id).await.unwrap());
        let report = venue.order_status(&ack.order_id).await.unwrap();
        assert_eq!(report.status, VenueOrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_unreachable_venue() {
        let venue = SimVenue::new("alpha", 0.001);
        venue.set_book(&pair(), 99.0, 100.0, 5.0, 5.0);
        venue.set_unreachable(true);
        assert!(venue.order_book(&pair()).await.is_err());
        venue.set_unreachable(false);
        assert!(venue.order_book(&pair()).await.is_ok());
    }

    #[test]
    fn test_native_symbol_mapping() {
        let plain = SimVenue::new("alpha", 0.001);
        let dashed = SimVenue::new("beta", 0.001).with_separator("-");
        assert_eq!(plain.native_symbol(&pair()), "SUSDT");
        assert_eq!(dashed.native_symbol(&pair()), "S-USDT");
    }
}
