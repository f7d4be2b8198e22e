use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono_tz::Tz;
use itd_config::{DeskConfig, GlobalContextLimits, TradingHours};
use itd_execution::PositionSource;
use itd_schemas::{net_quantity, total_pnl, Clock, GlobalContext, TradeSignal};
use tracing::debug;

use crate::{ReasonCode, RiskDecision};

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq)]
pub struct RiskPolicy {
    pub confidence_threshold: f64,
    pub trading_hours: TradingHours,
    pub timezone: Tz,
    pub max_drawdown: f64,
    /// Equity base added to total pnl before drawdown is measured.
    pub capital: f64,
    pub max_position_size: i64,
    pub limits: GlobalContextLimits,
    /// symbol -> sector
    pub sectors: BTreeMap<String, String>,
}

impl RiskPolicy {
    pub fn from_desk(cfg: &DeskConfig) -> Self {
        Self {
            confidence_threshold: cfg.risk.confidence_threshold,
            trading_hours: cfg.risk.trading_hours,
            timezone: cfg.timezone(),
            max_drawdown: cfg.risk.max_drawdown,
            capital: cfg.risk.capital,
            max_position_size: cfg.risk.max_position_size,
            limits: cfg.risk.global_context.clone(),
            sectors: cfg.sectors.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Drawdown
// ---------------------------------------------------------------------------

/// Fractional drawdown of `pnl` from the high-water mark `high`.
///
/// Zero when `high <= 0` (no meaningful peak yet) and never negative.
pub fn drawdown(high: f64, pnl: f64) -> f64 {
    if !(high > 0.0) || !pnl.is_finite() {
        return 0.0;
    }
    ((high - pnl) / high).max(0.0)
}

/// Highest equity (capital + total pnl) observed, seeded from configuration.
/// Only ratchets up.
#[derive(Debug)]
pub struct HighWaterMark(Mutex<f64>);

impl HighWaterMark {
    pub fn new(initial: f64) -> Self {
        Self(Mutex::new(initial))
    }

    /// Fold in a new observation and return the (possibly raised) mark.
    pub fn observe(&self, pnl: f64) -> f64 {
        let mut h = self.0.lock().unwrap_or_else(|e| e.into_inner());
        if pnl.is_finite() && pnl > *h {
            *h = pnl;
        }
        *h
    }

    pub fn current(&self) -> f64 {
        *self.0.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ---------------------------------------------------------------------------
// Pure market-condition checks (5..11)
// ---------------------------------------------------------------------------

/// Context and sector conditions, in gate order. `None` = all passed.
pub fn check_market_conditions(
    policy: &RiskPolicy,
    signal: &TradeSignal,
    ctx: &GlobalContext,
) -> Option<RiskDecision> {
    let lim = &policy.limits;

    if ctx.volatility_index > lim.vix_threshold {
        return Some(RiskDecision::deny(
            ReasonCode::VolatilityTooHigh,
            format!("VIX too high: {:.2} > {:.2}", ctx.volatility_index, lim.vix_threshold),
        ));
    }

    if ctx.reference_change < -lim.reference_gap {
        return Some(RiskDecision::deny(
            ReasonCode::ReferenceGapDown,
            format!(
                "Reference index gap-down: {:.2}% < -{:.2}%",
                ctx.reference_change * 100.0,
                lim.reference_gap * 100.0
            ),
        ));
    }

    if let Some((index, change)) = first_gap_down(&ctx.foreign_futures_changes, &lim.foreign_futures, lim.foreign_futures_gap) {
        return Some(RiskDecision::deny(
            ReasonCode::ForeignFuturesGapDown { index: index.clone() },
            format!("{index} gap-down: {:.2}%", change * 100.0),
        ));
    }

    if let Some((index, change)) = first_gap_down(&ctx.asian_markets_changes, &lim.asian_markets, lim.asian_markets_gap) {
        return Some(RiskDecision::deny(
            ReasonCode::AsianMarketGapDown { index: index.clone() },
            format!("{index} gap-down: {:.2}%", change * 100.0),
        ));
    }

    if ctx.currency_change > lim.currency_change {
        return Some(RiskDecision::deny(
            ReasonCode::CurrencyMoveTooLarge,
            format!(
                "Currency move too large: {:.2}% > {:.2}%",
                ctx.currency_change * 100.0,
                lim.currency_change * 100.0
            ),
        ));
    }

    let Some(sector) = policy.sectors.get(&signal.symbol) else {
        return Some(RiskDecision::deny(
            ReasonCode::NoSectorMapping,
            format!("No sector mapping for {}", signal.symbol),
        ));
    };

    if !ctx.is_top_sector(sector) {
        return Some(RiskDecision::deny(
            ReasonCode::SectorNotLeading,
            format!("Sector {sector} not in top sectors"),
        ));
    }

    None
}

/// First index (configured order, or name order when unconfigured) whose
/// change is below `-gap`.
fn first_gap_down(
    changes: &BTreeMap<String, f64>,
    watched: &[String],
    gap: f64,
) -> Option<(String, f64)> {
    let breached = |(name, change): (&String, &f64)| (*change < -gap).then(|| (name.clone(), *change));
    if watched.is_empty() {
        changes.iter().find_map(breached)
    } else {
        watched
            .iter()
            .filter_map(|name| changes.get_key_value(name))
            .find_map(breached)
    }
}

// ---------------------------------------------------------------------------
// Gate
// ---------------------------------------------------------------------------

pub struct RiskGate {
    policy: RiskPolicy,
    positions: Arc<dyn PositionSource>,
    clock: Arc<dyn Clock>,
    high_water: HighWaterMark,
}

impl RiskGate {
    /// The high-water mark starts at `capital + historical_high_pnl`.
    pub fn new(
        policy: RiskPolicy,
        historical_high_pnl: f64,
        positions: Arc<dyn PositionSource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let seed = policy.capital + historical_high_pnl;
        Self {
            policy,
            positions,
            clock,
            high_water: HighWaterMark::new(seed),
        }
    }

    pub fn policy(&self) -> &RiskPolicy {
        &self.policy
    }

    pub fn high_water_mark(&self) -> f64 {
        self.high_water.current()
    }

    /// Run every condition in order. Never errors: faults deny.
    pub async fn evaluate(&self, signal: &TradeSignal, ctx: &GlobalContext) -> RiskDecision {
        let p = &self.policy;

        // 1: before any IO
        if signal.confidence < p.confidence_threshold {
            return RiskDecision::deny(
                ReasonCode::ConfidenceBelowFloor,
                format!("Low confidence: {:.2} < {:.2}", signal.confidence, p.confidence_threshold),
            );
        }

        // 2
        let local = self.clock.now().with_timezone(&p.timezone).time();
        if !p.trading_hours.contains(local) {
            return RiskDecision::deny(
                ReasonCode::OutsideTradingHours,
                format!(
                    "Outside trading hours: {} not in {}-{}",
                    local.format("%H:%M:%S"),
                    p.trading_hours.start.format("%H:%M"),
                    p.trading_hours.end.format("%H:%M")
                ),
            );
        }

        // 3 + 4 share one read
        let positions = match self.positions.positions().await {
            Ok(v) => v,
            Err(e) => {
                return RiskDecision::deny(
                    ReasonCode::EvaluationFault,
                    format!("Risk check error: {e}"),
                );
            }
        };

        let pnl = total_pnl(&positions);
        let equity = p.capital + pnl;
        let high = self.high_water.observe(equity);
        let dd = drawdown(high, equity);
        debug!(symbol = %signal.symbol, pnl, equity, high, drawdown = dd, "risk: drawdown");
        if dd > p.max_drawdown {
            return RiskDecision::deny(
                ReasonCode::MaxDrawdownExceeded,
                format!("Max drawdown exceeded: {:.2}% > {:.2}%", dd * 100.0, p.max_drawdown * 100.0),
            )
            .with_pnl(Some(pnl));
        }

        let held = net_quantity(&positions, &signal.symbol).abs();
        if held > p.max_position_size {
            return RiskDecision::deny(
                ReasonCode::PositionLimitExceeded,
                format!("Position size exceeded for {}: {held} > {}", signal.symbol, p.max_position_size),
            )
            .with_pnl(Some(pnl));
        }

        // 5..11
        if let Some(deny) = check_market_conditions(p, signal, ctx) {
            return deny.with_pnl(Some(pnl));
        }

        RiskDecision::allow(Some(pnl))
    }
}
