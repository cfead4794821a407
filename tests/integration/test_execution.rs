//! Execution engine settlement scenarios

use crate::{fixture, pair, Fixture};
use chrono::Utc;
use cross_venue_arbitrage::{
    config::Settings,
    scanner::net_profit_pct,
    venues::{FillBehavior, VenueOrderStatus},
    ArbError, Opportunity, TransactionStatus,
};
use std::sync::Arc;
use uuid::Uuid;

fn auto_trade() -> Settings {
    Settings {
        auto_trade_enabled: true,
        ..Settings::default()
    }
}

fn opportunity(volume: f64) -> Opportunity {
    Opportunity {
        id: Uuid::new_v4(),
        pair: pair(),
        buy_venue: "alpha".to_string(),
        sell_venue: "beta".to_string(),
        buy_price: 100.0,
        sell_price: 102.0,
        buy_fee: 0.001,
        sell_fee: 0.001,
        net_profit_pct: net_profit_pct(100.0, 102.0, 0.001, 0.001),
        gross_profit_pct: 2.0,
        volume,
        timestamp: Utc::now(),
        sandbox: true,
    }
}

#[tokio::test]
async fn test_partial_fill_leaves_correct_remaining() {
    let f = fixture(auto_trade()).await;
    // Buy leg fills 0.6 of 1.0 then cancels; sell leg fills fully
    f.alpha.set_fill_behavior(FillBehavior::PartialFill { fraction: 0.6 });

    let outcome = f.app.engine.try_execute(&opportunity(1.0), false).await.unwrap();
    let tx = outcome.transaction.unwrap();

    let buy = tx.buy_leg.as_ref().unwrap();
    assert_eq!(buy.status, VenueOrderStatus::Cancelled);
    assert!((buy.original_qty - 1.0).abs() < 1e-12);
    assert!((buy.executed_qty - 0.6).abs() < 1e-12);
    assert!((buy.remaining_qty() - 0.4).abs() < 1e-12);

    // Sell filled, buy did not: exactly one filled leg
    assert_eq!(tx.status, TransactionStatus::PartiallyExecuted);
    assert!((tx.base_imbalance() - (0.6 - 1.0)).abs() < 1e-12);
}

#[tokio::test]
async fn test_rejected_sell_leg_never_unwinds_buy() {
    let f = fixture(auto_trade()).await;
    f.beta.set_fill_behavior(FillBehavior::Reject);

    let outcome = f.app.engine.try_execute(&opportunity(1.0), false).await.unwrap();
    let tx = outcome.transaction.unwrap();

    assert_eq!(tx.status, TransactionStatus::PartiallyExecuted);
    assert_eq!(tx.buy_leg.as_ref().unwrap().status, VenueOrderStatus::Filled);
    assert_eq!(tx.sell_leg.as_ref().unwrap().status, VenueOrderStatus::Rejected);

    // No automatic unwind order: one order on each venue, nothing more
    assert_eq!(f.alpha.order_count(), 1);
    assert_eq!(f.beta.order_count(), 1);

    // The filled leg's imbalance reaches the rebalancing aggregator
    let imbalances = f.app.stats.imbalances();
    assert!((imbalances.get("S").copied().unwrap() - 1.0).abs() < 1e-12);
}

#[tokio::test]
async fn test_insufficient_balance_rejects_without_orders() {
    let f = fixture(auto_trade()).await;
    f.alpha.set_balance("USDT", 50.0); // cannot cover 1.0 * 100 quote

    let outcome = f.app.engine.try_execute(&opportunity(1.0), false).await.unwrap();
    assert!(!outcome.committed);

    let tx = outcome.transaction.unwrap();
    assert_eq!(tx.status, TransactionStatus::Rejected);
    assert!(tx.buy_leg.is_none() && tx.sell_leg.is_none());

    assert_eq!(f.alpha.order_count(), 0);
    assert_eq!(f.beta.order_count(), 0);
}

#[tokio::test]
async fn test_safety_multiplier_reserves_margin() {
    let f = fixture(auto_trade()).await;
    // Exactly enough quote for the order, but the 0.9 multiplier
    // reserves slippage margin, so the check fails
    f.alpha.set_balance("USDT", 101.0);

    let outcome = f.app.engine.try_execute(&opportunity(1.0), false).await.unwrap();
    assert!(!outcome.committed);

    // With real headroom it passes
    f.alpha.set_balance("USDT", 120.0);
    let outcome = f.app.engine.try_execute(&opportunity(1.0), false).await.unwrap();
    assert!(outcome.committed);
}

#[tokio::test]
async fn test_same_asset_mutual_exclusion() {
    let f = fixture(auto_trade()).await;
    f.alpha.set_fill_behavior(FillBehavior::Hang);
    f.beta.set_fill_behavior(FillBehavior::Hang);

    let engine = Arc::clone(&f.app.engine);
    let first = tokio::spawn(async move { engine.try_execute(&opportunity(1.0), false).await });
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    let second = f.app.engine.try_execute(&opportunity(1.0), false).await;
    assert!(matches!(
        second.unwrap_err().downcast_ref::<ArbError>(),
        Some(ArbError::ExecutionInFlight(asset)) if asset == "S"
    ));

    // The hung execution settles as timed out after best-effort cancels
    let tx = first.await.unwrap().unwrap().transaction.unwrap();
    assert_eq!(tx.status, TransactionStatus::TimedOut);
}

#[tokio::test]
async fn test_manual_execution_through_control_surface() {
    let f = fixture(Settings::default()).await; // auto-trade off
    f.app.thresholds.set_global_pct(5.0); // far above the ~1.8% net

    let outcome = f.app.control.execute_manually(&opportunity(1.0)).await.unwrap();
    assert!(outcome.committed);
    assert_eq!(
        outcome.transaction.unwrap().status,
        TransactionStatus::Completed
    );
}

/// Scenario sweep: settlement status is a pure function of the leg
/// outcomes
#[tokio::test]
async fn test_settlement_matrix() {
    for (buy_behavior, sell_behavior, expected) in [
        (FillBehavior::Fill, FillBehavior::Fill, TransactionStatus::Completed),
        (FillBehavior::Fill, FillBehavior::Reject, TransactionStatus::PartiallyExecuted),
        (FillBehavior::Reject, FillBehavior::Fill, TransactionStatus::PartiallyExecuted),
        (FillBehavior::Reject, FillBehavior::Reject, TransactionStatus::Rejected),
        (FillBehavior::Hang, FillBehavior::Hang, TransactionStatus::TimedOut),
        (FillBehavior::Fill, FillBehavior::Hang, TransactionStatus::PartiallyExecuted),
    ] {
        let f: Fixture = fixture(auto_trade()).await;
        f.alpha.set_fill_behavior(buy_behavior);
        f.beta.set_fill_behavior(sell_behavior);

        let outcome = f.app.engine.try_execute(&opportunity(1.0), false).await.unwrap();
        let tx = outcome.transaction.unwrap();
        assert_eq!(
            tx.status, expected,
            "buy={:?} sell={:?}",
            buy_behavior, sell_behavior
        );
    }
}
