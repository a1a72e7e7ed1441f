use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal_macros::dec;
use smm_core::{
    AppConfig, BarConfig, BarKind, BarSourceConfig, BrokerPosition, MarketDataSource, MarketEvent,
    Side, SignalEvent, SignalFilters, SymbolConfig, Tick,
};
use smm_execution::{MemoryAccountStore, PaperBroker};
use smm_orchestrator::{
    spawn_trader, DispatchOutcome, DispatchRejection, ExecutionVenue, TraderEvent, TraderState,
};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

struct ReplayFeed {
    events: VecDeque<MarketEvent>,
}

#[async_trait]
impl MarketDataSource for ReplayFeed {
    async fn next_event(&mut self) -> Result<Option<MarketEvent>> {
        Ok(self.events.pop_front())
    }
}

struct BrokenFeed;

#[async_trait]
impl MarketDataSource for BrokenFeed {
    async fn next_event(&mut self) -> Result<Option<MarketEvent>> {
        anyhow::bail!("connection reset")
    }
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 3, 14, 30, 0).unwrap()
}

fn config() -> AppConfig {
    AppConfig {
        symbol: SymbolConfig {
            contract: Some("NQH5".to_string()),
            ..SymbolConfig::default()
        },
        bars: BarConfig {
            sources: vec![BarSourceConfig {
                name: "1m".to_string(),
                kind: BarKind::Ticks { count: 10 },
            }],
        },
        ..AppConfig::default()
    }
}

/// Thirty ten-print bars, each one point above the last, 70% lifting the ask.
fn rising_tape() -> VecDeque<MarketEvent> {
    let mut events = VecDeque::new();
    for i in 0..30i64 {
        for k in 0..10 {
            let price = if i == 0 {
                99.0 + f64::from(k) / 9.0
            } else {
                99.0 + i as f64 + f64::from(k + 1) / 10.0
            };
            let (bid, ask) = if k < 7 { (None, Some(price)) } else { (Some(price), None) };
            events.push_back(MarketEvent::Tick(Tick {
                symbol: "NQH5".to_string(),
                price,
                size: 10.0,
                timestamp: t0() + Duration::seconds((i * 10 + i64::from(k)) * 6),
                bid,
                ask,
            }));
        }
    }
    events
}

fn external(side: Side, secs: i64) -> SignalEvent {
    SignalEvent {
        symbol: "NQH5".to_string(),
        side,
        price: 20_000.0,
        signal_price: Some(20_000.0),
        confidence: 0.7,
        atr: 8.0,
        reason: "webhook".to_string(),
        source: "external".to_string(),
        timestamp: t0() + Duration::seconds(secs),
    }
}

#[tokio::test]
async fn test_rising_tape_trades_healthy_account_only() {
    let broker = Arc::new(PaperBroker::new());
    broker.reject_account("B", "insufficient margin");
    let store = Arc::new(MemoryAccountStore::new());
    let (handle, task) =
        spawn_trader(&config(), ExecutionVenue::Paper(broker.clone()), store.clone()).unwrap();
    let mut events = handle.subscribe();

    handle.add_account("A", true).await.unwrap();
    handle.add_account("B", true).await.unwrap();
    let forwarded = handle
        .run_feed(ReplayFeed {
            events: rising_tape(),
        })
        .await
        .unwrap();
    assert_eq!(forwarded, 300);

    let status = handle.get_status().await.unwrap();
    assert_eq!(status.symbol, "NQH5");
    assert_eq!(status.pipeline.ticks, 300);
    assert_eq!(status.pipeline.sources[0].bars, 30);
    assert!(status.dispatch.total_processed >= 1);
    assert_eq!(status.sync.status_counts.get("error"), Some(&1));
    assert_eq!(status.accounts.len(), 2);

    let submitted = broker.submitted();
    assert!(!submitted.is_empty());
    assert!(submitted.iter().all(|o| o.account_id == "A"));
    assert!(submitted.iter().all(|o| o.side == Side::Buy));

    let mut first_dispatch = None;
    while let Ok(event) = events.try_recv() {
        if let TraderEvent::SignalDispatched { results, .. } = event {
            first_dispatch.get_or_insert(results);
        }
    }
    assert_eq!(
        first_dispatch,
        Some(BTreeMap::from([
            ("A".to_string(), true),
            ("B".to_string(), false),
        ]))
    );

    // accounts were written through to the store
    assert_eq!(store.snapshot().accounts.len(), 2);

    handle.shutdown().await.unwrap();
    task.await.unwrap();
    assert_eq!(handle.latest_status().state, TraderState::Stopped);
}

#[tokio::test]
async fn test_external_signals_respect_filters_and_kill_switch() {
    let broker = Arc::new(PaperBroker::new());
    let (handle, _task) = spawn_trader(
        &config(),
        ExecutionVenue::Paper(broker.clone()),
        Arc::new(MemoryAccountStore::new()),
    )
    .unwrap();
    handle.add_account("A", true).await.unwrap();

    handle
        .set_filters(SignalFilters {
            long_enabled: true,
            short_enabled: false,
        })
        .await
        .unwrap();
    assert_eq!(
        handle.submit_signal(external(Side::Sell, 0)).await.unwrap(),
        DispatchOutcome::Rejected(DispatchRejection::ShortDisabled)
    );

    let outcome = handle.submit_signal(external(Side::Buy, 10)).await.unwrap();
    assert_eq!(outcome.placed(), 1);
    let order = &broker.submitted()[0];
    // |20_000 × 1.5 - 20_000| / 0.25
    assert_eq!(order.target_ticks, 40_000);
    assert_eq!(order.stop_ticks, 16_000);

    handle
        .update_pnl("A", Some(dec!(-300)), None)
        .await
        .unwrap();
    let status = handle.get_status().await.unwrap();
    assert!(status.accounts[0].kill_switch);

    let outcome = handle.submit_signal(external(Side::Buy, 20)).await.unwrap();
    assert_eq!(
        outcome,
        DispatchOutcome::Dispatched(BTreeMap::from([("A".to_string(), false)]))
    );
    assert_eq!(broker.submitted().len(), 1);

    handle.reset_kill_switch("A").await.unwrap();
    let outcome = handle.submit_signal(external(Side::Buy, 30)).await.unwrap();
    assert_eq!(outcome.placed(), 1);
}

#[tokio::test]
async fn test_reconcile_adopts_broker_positions() {
    let broker = Arc::new(PaperBroker::new());
    let (handle, _task) = spawn_trader(
        &config(),
        ExecutionVenue::Paper(broker.clone()),
        Arc::new(MemoryAccountStore::new()),
    )
    .unwrap();
    handle.add_account("A", true).await.unwrap();
    handle.add_account("B", true).await.unwrap();

    broker.set_positions(vec![BrokerPosition {
        account_id: "A".to_string(),
        symbol: "NQH5".to_string(),
        net_qty: -3,
    }]);
    let report = handle.reconcile().await.unwrap();
    assert_eq!(report.accounts, 2);
    assert_eq!(report.orders, 0);

    let status = handle.get_status().await.unwrap();
    let a = status.accounts.iter().find(|a| a.account_id == "A").unwrap();
    assert_eq!(a.position, -3);
    let b = status.accounts.iter().find(|a| a.account_id == "B").unwrap();
    assert_eq!(b.position, 0);
}

#[tokio::test]
async fn test_feed_failure_surfaces() {
    let (handle, _task) = spawn_trader(
        &config(),
        ExecutionVenue::paper(),
        Arc::new(MemoryAccountStore::new()),
    )
    .unwrap();
    let err = handle.run_feed(BrokenFeed).await.unwrap_err();
    assert!(format!("{err:#}").contains("connection reset"));
}

#[tokio::test]
async fn test_invalid_config_refused() {
    let mut config = config();
    config.bars.sources.clear();
    assert!(spawn_trader(
        &config,
        ExecutionVenue::paper(),
        Arc::new(MemoryAccountStore::new())
    )
    .is_err());
}

#[tokio::test]
async fn test_failed_account_returns_after_sync_reset() {
    let broker = Arc::new(PaperBroker::new());
    broker.reject_account("A", "gateway timeout");
    let (handle, _task) = spawn_trader(
        &config(),
        ExecutionVenue::Paper(broker.clone()),
        Arc::new(MemoryAccountStore::new()),
    )
    .unwrap();
    handle.add_account("A", true).await.unwrap();

    assert_eq!(
        handle.submit_signal(external(Side::Buy, 0)).await.unwrap(),
        DispatchOutcome::Dispatched(BTreeMap::from([("A".to_string(), false)]))
    );

    // broker recovers, but the account stays parked until an operator resets it
    broker.accept_account("A");
    assert_eq!(
        handle.submit_signal(external(Side::Buy, 3_600)).await.unwrap(),
        DispatchOutcome::Rejected(DispatchRejection::NoReadyAccounts)
    );
    assert!(broker.submitted().is_empty());

    handle.reset_sync_status(Some("A")).await.unwrap();
    let status = handle.get_status().await.unwrap();
    assert_eq!(status.sync.status_counts.get("error"), None);

    let outcome = handle.submit_signal(external(Side::Buy, 3_700)).await.unwrap();
    assert_eq!(outcome.placed(), 1);
    assert_eq!(broker.submitted().len(), 1);
    assert_eq!(status.dispatch.rejections["no_ready_accounts"], 1);
}
