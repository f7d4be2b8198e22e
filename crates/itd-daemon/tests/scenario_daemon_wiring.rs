//! The wired paper desk runs cycles end to end against files on disk.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use itd_config::DeskConfig;
use itd_daemon::wiring::build_desk;
use itd_runtime::SymbolOutcome;
use itd_schemas::{AlertHandle, FixedClock};

fn paper_config(dir: &std::path::Path) -> DeskConfig {
    let mut cfg = DeskConfig::default();
    cfg.model.path = None;
    cfg.market_data.snapshot_path = dir.join("snapshot.json").display().to_string();
    cfg.audit.path = dir.join("logs").join("trades.jsonl").display().to_string();
    cfg.exclusions.path = dir.join("excluded_stocks.json").display().to_string();
    cfg
}

fn clock() -> Arc<FixedClock> {
    // 10:00 IST
    Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2025, 3, 3, 4, 30, 0).unwrap()))
}

#[tokio::test]
async fn missing_snapshot_is_a_cycle_fault_not_a_crash() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = Arc::new(paper_config(dir.path()));
    let (alerts, mut rx) = AlertHandle::channel(32);

    let desk = build_desk(cfg, &Default::default(), alerts, clock()).unwrap();
    assert!(desk.orchestrator.tick().await.is_none());

    let st = desk.orchestrator.status();
    let st = st.read().await;
    assert_eq!(st.cycles, 1);
    assert_eq!(st.cycle_faults, 1);

    let mut messages = Vec::new();
    while let Ok(a) = rx.try_recv() {
        messages.push(a.message);
    }
    assert!(messages.iter().any(|m| m.starts_with("Cycle error: market data unavailable")), "{messages:?}");
}

#[tokio::test]
async fn neutral_rsi_holds_without_touching_the_broker() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("snapshot.json"),
        r#"{
          "ticks": {"TCS": {"symbol": "TCS", "open": 1, "high": 2, "low": 0.5, "close": 1.5, "volume": 1000, "rsi": 50}},
          "context": {"volatility_index": 12, "reference_change": 0.001,
                      "foreign_futures_changes": {"S&P 500": 0.001},
                      "asian_markets_changes": {"Nikkei": 0.001},
                      "currency_change": 0.0,
                      "sector_strength": {"NIFTY IT": 0.01}}
        }"#,
    )
    .unwrap();
    let cfg = Arc::new(paper_config(dir.path()));

    let desk = build_desk(cfg, &Default::default(), AlertHandle::disabled(), clock()).unwrap();
    let report = desk.orchestrator.tick().await.unwrap();
    assert_eq!(report.outcome("TCS"), Some(&SymbolOutcome::Held));

    let st = desk.orchestrator.status();
    assert_eq!(st.read().await.api_calls, 0);
}
