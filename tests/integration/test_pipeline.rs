//! Detection-to-settlement pipeline scenarios

use crate::{fixture, pair};
use cross_venue_arbitrage::{
    config::Settings,
    push::PushEvent,
    venues::ConnectionStatus,
    TransactionStatus,
};
use std::time::Duration;

#[tokio::test]
async fn test_detection_respects_threshold() {
    // alpha ask 100.0, beta bid 102.0, 0.1% fees: net ~= 1.80%
    let f = fixture(Settings::default()).await;

    f.app.control.set_global_threshold(1.5).await.unwrap();
    let emitted = f.app.scanner.scan_cycle().await.unwrap();
    assert_eq!(emitted.len(), 1);
    let opp = &emitted[0];
    assert_eq!(opp.buy_venue, "alpha");
    assert_eq!(opp.sell_venue, "beta");
    assert!((opp.net_profit_pct - 1.7962).abs() < 1e-3);
    assert!((opp.gross_profit_pct - 2.0).abs() < 1e-9);
    assert_eq!(opp.volume, 5.0);

    f.app.control.set_global_threshold(2.0).await.unwrap();
    let emitted = f.app.scanner.scan_cycle().await.unwrap();
    assert!(emitted.is_empty());
}

#[tokio::test]
async fn test_auto_trade_pipeline_settles_transaction() {
    let f = fixture(Settings {
        auto_trade_enabled: true,
        ..Settings::default()
    })
    .await;

    let mut sub = f.app.push.subscribe();
    let emitted = f.app.scanner.scan_cycle().await.unwrap();
    assert_eq!(emitted.len(), 1);

    // The execution runs on a spawned task; wait for it to settle
    let mut settled = None;
    for _ in 0..100 {
        let history = f.app.engine.history();
        if let Some(tx) = history.first() {
            settled = Some(tx.clone());
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let tx = settled.expect("transaction should settle");
    assert_eq!(tx.status, TransactionStatus::Completed);
    assert_eq!(tx.opportunity_id, emitted[0].id);
    // Realized from fills: 5 * (102*0.999 - 100*1.001) = 8.99
    assert!((tx.realized_profit - 8.99).abs() < 1e-6);

    let summary = f.app.stats.summary();
    assert_eq!(summary.detected, 1);
    assert_eq!(summary.completed, 1);

    // Both the detection and the settlement reached the push channel
    let mut saw_opportunity = false;
    let mut saw_settlement = false;
    while let Ok(Ok(event)) =
        tokio::time::timeout(Duration::from_millis(200), sub.receiver.recv()).await
    {
        match event {
            PushEvent::OpportunityDetected(o) => saw_opportunity = o.id == emitted[0].id,
            PushEvent::TransactionSettled(t) => saw_settlement = t.id == tx.id,
            _ => {}
        }
        if saw_opportunity && saw_settlement {
            break;
        }
    }
    assert!(saw_opportunity && saw_settlement);
}

#[tokio::test]
async fn test_failed_venue_degrades_cycle_only() {
    let f = fixture(Settings::default()).await;
    let mut sub = f.app.push.subscribe();

    f.alpha.set_unreachable(true);
    let emitted = f.app.scanner.scan_cycle().await.unwrap();
    assert!(emitted.is_empty(), "one-venue cycle cannot arbitrage");

    match tokio::time::timeout(Duration::from_millis(200), sub.receiver.recv())
        .await
        .unwrap()
        .unwrap()
    {
        PushEvent::ConnectionStatusChanged { venue, status } => {
            assert_eq!(venue, "alpha");
            assert_eq!(status, ConnectionStatus::Degraded);
        }
        other => panic!("unexpected event: {:?}", other),
    }

    // Next tick the venue is back and detection resumes
    f.alpha.set_unreachable(false);
    let emitted = f.app.scanner.scan_cycle().await.unwrap();
    assert_eq!(emitted.len(), 1);
}

#[tokio::test]
async fn test_recent_ring_is_bounded() {
    let f = fixture(Settings::default()).await;

    for _ in 0..5 {
        f.app.scanner.scan_cycle().await.unwrap();
    }
    let recent = f.app.scanner.recent();
    assert_eq!(recent.len(), 5);

    // Timestamps are strictly increasing across cycles
    for window in recent.windows(2) {
        assert!(window[0].timestamp < window[1].timestamp);
    }
}

#[tokio::test]
async fn test_pair_override_gates_detection() {
    let f = fixture(Settings::default()).await;

    f.app
        .control
        .set_pair_threshold(&pair().to_string(), Some(3.0))
        .await
        .unwrap();
    assert!(f.app.scanner.scan_cycle().await.unwrap().is_empty());

    f.app
        .control
        .set_pair_threshold(&pair().to_string(), None)
        .await
        .unwrap();
    assert_eq!(f.app.scanner.scan_cycle().await.unwrap().len(), 1);
}
