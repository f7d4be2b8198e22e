//! Risk gate: every condition denies with its own reason, conditions are
//! evaluated in order (first failure wins), the confidence floor never
//! touches the broker and account faults fail closed.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use itd_config::DeskConfig;
use itd_execution::{BrokerError, PositionSource};
use itd_risk::{ReasonCode, RiskGate, RiskPolicy};
use itd_schemas::{FixedClock, GlobalContext, Position, Side, SignalOrigin, TradeSignal};

struct ScriptedPositions {
    rows: Mutex<Result<Vec<Position>, BrokerError>>,
    reads: AtomicUsize,
}

impl ScriptedPositions {
    fn ok(rows: Vec<Position>) -> Arc<Self> {
        Arc::new(Self {
            rows: Mutex::new(Ok(rows)),
            reads: AtomicUsize::new(0),
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            rows: Mutex::new(Err(BrokerError::Transport("connection reset".into()))),
            reads: AtomicUsize::new(0),
        })
    }

    fn set(&self, rows: Vec<Position>) {
        *self.rows.lock().unwrap() = Ok(rows);
    }
}

#[async_trait]
impl PositionSource for ScriptedPositions {
    async fn positions(&self) -> Result<Vec<Position>, BrokerError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.rows.lock().unwrap().clone()
    }
}

/// 11:00 IST on a weekday.
fn in_hours() -> Arc<FixedClock> {
    Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2026, 3, 2, 5, 30, 0).unwrap()))
}

fn leading_context() -> GlobalContext {
    let ctx = GlobalContext {
        volatility_index: 14.0,
        reference_change: 0.001,
        foreign_futures_changes: BTreeMap::from([
            ("S&P 500".to_string(), 0.002),
            ("Nasdaq".to_string(), 0.004),
            ("Dow".to_string(), -0.001),
        ]),
        asian_markets_changes: BTreeMap::from([
            ("Nikkei".to_string(), 0.003),
            ("Hang Seng".to_string(), -0.002),
        ]),
        currency_change: 0.001,
        ..GlobalContext::empty()
    };
    ctx.with_sector_strength(
        BTreeMap::from([
            ("NIFTY IT".to_string(), 0.015),
            ("NIFTY BANK".to_string(), 0.010),
            ("NIFTY ENERGY".to_string(), 0.008),
            ("NIFTY FMCG".to_string(), -0.004),
        ]),
        3,
    )
}

fn gate(positions: Arc<ScriptedPositions>) -> RiskGate {
    let cfg = DeskConfig::default();
    RiskGate::new(
        RiskPolicy::from_desk(&cfg),
        cfg.risk.historical_high_pnl,
        positions,
        in_hours(),
    )
}

fn signal(symbol: &str, confidence: f64) -> TradeSignal {
    TradeSignal::new(symbol, Side::Buy, 0.5, confidence, SignalOrigin::Model)
}

#[tokio::test]
async fn clean_signal_is_allowed() {
    let d = gate(ScriptedPositions::ok(vec![])).evaluate(&signal("TCS", 0.8), &leading_context()).await;
    assert!(d.allowed, "{d:?}");
    assert_eq!(d.reason, ReasonCode::Allowed);
    assert_eq!(d.pnl, Some(0.0));
}

#[tokio::test]
async fn low_confidence_denies_without_touching_broker() {
    let pos = ScriptedPositions::failing();
    let mut ctx = leading_context();
    ctx.volatility_index = 99.0;
    let d = gate(pos.clone()).evaluate(&signal("TCS", 0.59), &ctx).await;
    assert!(!d.allowed);
    assert_eq!(d.reason, ReasonCode::ConfidenceBelowFloor);
    assert_eq!(d.detail, "Low confidence: 0.59 < 0.60");
    assert_eq!(pos.reads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn outside_hours_denies() {
    let cfg = DeskConfig::default();
    // 15:30 IST
    let late = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap()));
    let g = RiskGate::new(RiskPolicy::from_desk(&cfg), 0.0, ScriptedPositions::ok(vec![]), late);
    let d = g.evaluate(&signal("TCS", 0.9), &leading_context()).await;
    assert_eq!(d.reason, ReasonCode::OutsideTradingHours);
}

#[tokio::test]
async fn account_fault_fails_closed() {
    let d = gate(ScriptedPositions::failing()).evaluate(&signal("TCS", 0.9), &leading_context()).await;
    assert!(!d.allowed);
    assert_eq!(d.reason, ReasonCode::EvaluationFault);
    assert!(d.detail.contains("connection reset"));
}

#[tokio::test]
async fn position_limit_uses_absolute_net_quantity() {
    let pos = ScriptedPositions::ok(vec![
        Position::new("TCS", -800),
        Position::new("TCS", -300),
    ]);
    let d = gate(pos).evaluate(&signal("TCS", 0.9), &leading_context()).await;
    assert_eq!(d.reason, ReasonCode::PositionLimitExceeded);
}

/// Risk settings with no capital base, so drawdown is taken on raw pnl.
fn pnl_only_config() -> DeskConfig {
    let mut cfg = DeskConfig::default();
    cfg.risk.capital = 0.0;
    cfg
}

#[tokio::test]
async fn drawdown_denial_is_monotonic_in_falling_pnl() {
    // H = 1000 seeded; max drawdown 5% => deny once pnl < 950
    let cfg = pnl_only_config();
    let pos = ScriptedPositions::ok(vec![]);
    let g = RiskGate::new(RiskPolicy::from_desk(&cfg), 1000.0, pos.clone(), in_hours());

    let mut denied_at = None;
    for step in 0..20 {
        let pnl = 1000.0 - step as f64 * 10.0;
        pos.set(vec![Position::new("INFY", 1).with_pnl(pnl, 0.0)]);
        let d = g.evaluate(&signal("TCS", 0.9), &leading_context()).await;
        let is_dd = d.reason == ReasonCode::MaxDrawdownExceeded;
        if let Some(first) = denied_at {
            assert!(is_dd, "denial must persist as pnl keeps falling (step {step}, first {first})");
        } else if is_dd {
            denied_at = Some(step);
        }
    }
    // 940 is the first value strictly below 950
    assert_eq!(denied_at, Some(6));
}

#[tokio::test]
async fn high_water_mark_follows_new_peaks() {
    let cfg = pnl_only_config();
    let pos = ScriptedPositions::ok(vec![Position::new("INFY", 1).with_pnl(2000.0, 0.0)]);
    let g = RiskGate::new(RiskPolicy::from_desk(&cfg), 1000.0, pos.clone(), in_hours());

    assert!(g.evaluate(&signal("TCS", 0.9), &leading_context()).await.allowed);
    assert_eq!(g.high_water_mark(), 2000.0);

    // 1850 is 7.5% off the new peak even though it is far above the seed
    pos.set(vec![Position::new("INFY", 1).with_pnl(1850.0, 0.0)]);
    let d = g.evaluate(&signal("TCS", 0.9), &leading_context()).await;
    assert_eq!(d.reason, ReasonCode::MaxDrawdownExceeded);
}

#[tokio::test]
async fn context_conditions_each_have_their_reason() {
    let g = gate(ScriptedPositions::ok(vec![]));
    let s = signal("TCS", 0.9);

    let mut ctx = leading_context();
    ctx.volatility_index = 25.0;
    assert_eq!(g.evaluate(&s, &ctx).await.reason, ReasonCode::VolatilityTooHigh);

    let mut ctx = leading_context();
    ctx.reference_change = -0.015;
    assert_eq!(g.evaluate(&s, &ctx).await.reason, ReasonCode::ReferenceGapDown);

    let mut ctx = leading_context();
    ctx.foreign_futures_changes.insert("Nasdaq".into(), -0.02);
    assert_eq!(
        g.evaluate(&s, &ctx).await.reason,
        ReasonCode::ForeignFuturesGapDown { index: "Nasdaq".into() }
    );

    let mut ctx = leading_context();
    ctx.asian_markets_changes.insert("Hang Seng".into(), -0.03);
    assert_eq!(
        g.evaluate(&s, &ctx).await.reason,
        ReasonCode::AsianMarketGapDown { index: "Hang Seng".into() }
    );

    let mut ctx = leading_context();
    ctx.currency_change = 0.01;
    assert_eq!(g.evaluate(&s, &ctx).await.reason, ReasonCode::CurrencyMoveTooLarge);

    let ctx = leading_context();
    assert_eq!(
        g.evaluate(&signal("ADANIENT", 0.9), &ctx).await.reason,
        ReasonCode::NoSectorMapping
    );
    assert_eq!(
        g.evaluate(&signal("HINDUNILVR", 0.9), &ctx).await.reason,
        ReasonCode::SectorNotLeading
    );
}

#[tokio::test]
async fn first_failing_condition_wins() {
    // VIX, currency and sector all fail; VIX comes first
    let mut ctx = leading_context();
    ctx.volatility_index = 30.0;
    ctx.currency_change = 0.05;
    let d = gate(ScriptedPositions::ok(vec![])).evaluate(&signal("HINDUNILVR", 0.9), &ctx).await;
    assert_eq!(d.reason, ReasonCode::VolatilityTooHigh);
    assert_eq!(d.detail, "VIX too high: 30.00 > 20.00");
}

#[tokio::test]
async fn unwatched_index_is_ignored() {
    let mut ctx = leading_context();
    ctx.foreign_futures_changes.insert("FTSE".into(), -0.05);
    let d = gate(ScriptedPositions::ok(vec![])).evaluate(&signal("TCS", 0.9), &ctx).await;
    assert!(d.allowed, "{d:?}");
}

#[tokio::test]
async fn default_desk_stops_a_loss_from_a_flat_start() {
    // 5% of the default 1,000,000 capital
    let pos = ScriptedPositions::ok(vec![Position::new("INFY", 10).with_pnl(-20_000.0, -10_000.0)]);
    let g = gate(pos.clone());
    assert!(g.evaluate(&signal("TCS", 0.9), &leading_context()).await.allowed);

    pos.set(vec![Position::new("INFY", 10).with_pnl(-500_000.0, 0.0)]);
    let d = g.evaluate(&signal("TCS", 0.9), &leading_context()).await;
    assert_eq!(d.reason, ReasonCode::MaxDrawdownExceeded);
    assert_eq!(d.detail, "Max drawdown exceeded: 50.00% > 5.00%");
    assert_eq!(d.pnl, Some(-500_000.0));
}

#[tokio::test]
async fn small_dip_after_small_peak_is_noise() {
    let pos = ScriptedPositions::ok(vec![Position::new("INFY", 1).with_pnl(20.0, 0.0)]);
    let g = gate(pos.clone());
    assert!(g.evaluate(&signal("TCS", 0.9), &leading_context()).await.allowed);
    assert_eq!(g.high_water_mark(), 1_000_020.0);

    pos.set(vec![Position::new("INFY", 1).with_pnl(18.0, 0.0)]);
    let d = g.evaluate(&signal("TCS", 0.9), &leading_context()).await;
    assert!(d.allowed, "{d:?}");
}
