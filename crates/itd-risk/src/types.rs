use std::fmt;

use serde::Serialize;

/// Why the gate allowed or denied. Stable codes, safe to log and assert on.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "code", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    Allowed,
    ConfidenceBelowFloor,
    OutsideTradingHours,
    MaxDrawdownExceeded,
    PositionLimitExceeded,
    VolatilityTooHigh,
    ReferenceGapDown,
    ForeignFuturesGapDown { index: String },
    AsianMarketGapDown { index: String },
    CurrencyMoveTooLarge,
    NoSectorMapping,
    SectorNotLeading,
    /// Portfolio state could not be read; fail closed.
    EvaluationFault,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::Allowed => "ALLOWED",
            ReasonCode::ConfidenceBelowFloor => "CONFIDENCE_BELOW_FLOOR",
            ReasonCode::OutsideTradingHours => "OUTSIDE_TRADING_HOURS",
            ReasonCode::MaxDrawdownExceeded => "MAX_DRAWDOWN_EXCEEDED",
            ReasonCode::PositionLimitExceeded => "POSITION_LIMIT_EXCEEDED",
            ReasonCode::VolatilityTooHigh => "VOLATILITY_TOO_HIGH",
            ReasonCode::ReferenceGapDown => "REFERENCE_GAP_DOWN",
            ReasonCode::ForeignFuturesGapDown { .. } => "FOREIGN_FUTURES_GAP_DOWN",
            ReasonCode::AsianMarketGapDown { .. } => "ASIAN_MARKET_GAP_DOWN",
            ReasonCode::CurrencyMoveTooLarge => "CURRENCY_MOVE_TOO_LARGE",
            ReasonCode::NoSectorMapping => "NO_SECTOR_MAPPING",
            ReasonCode::SectorNotLeading => "SECTOR_NOT_LEADING",
            ReasonCode::EvaluationFault => "EVALUATION_FAULT",
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RiskDecision {
    pub allowed: bool,
    pub reason: ReasonCode,
    /// Human-readable explanation with the offending values.
    pub detail: String,
    /// Total pnl observed while evaluating, if the account was read.
    pub pnl: Option<f64>,
}

impl RiskDecision {
    pub fn allow(pnl: Option<f64>) -> Self {
        Self {
            allowed: true,
            reason: ReasonCode::Allowed,
            detail: "Risk check passed".to_string(),
            pnl,
        }
    }

    pub fn deny(reason: ReasonCode, detail: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason,
            detail: detail.into(),
            pnl: None,
        }
    }

    pub(crate) fn with_pnl(mut self, pnl: Option<f64>) -> Self {
        self.pnl = pnl;
        self
    }
}
