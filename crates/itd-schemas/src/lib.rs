//! itd-schemas
//!
//! Shared value types that cross crate boundaries: market snapshots, the
//! feature vector, trade signals and broker positions, plus the two pieces
//! of plumbing every stage needs (alert handle, clock).
//!
//! Value types are immutable snapshots once constructed. No IO.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

mod alerts;
mod clock;
mod features;

pub use alerts::{Alert, AlertHandle, Severity};
pub use clock::{Clock, FixedClock, SystemClock};
pub use features::{FeatureVector, FEATURE_COUNT, FEATURE_NAMES};

// ---------------------------------------------------------------------------
// MarketTick
// ---------------------------------------------------------------------------

/// Technical indicators attached to a tick. Any of them may be unavailable
/// (e.g. not enough history yet); callers read them as `0.0` in that case.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Indicators {
    #[serde(default)]
    pub ema_fast: Option<f64>,
    #[serde(default)]
    pub ema_slow: Option<f64>,
    #[serde(default)]
    pub macd: Option<f64>,
    #[serde(default)]
    pub rsi: Option<f64>,
    #[serde(default)]
    pub atr: Option<f64>,
}

impl Indicators {
    pub fn ema_fast(&self) -> f64 {
        self.ema_fast.unwrap_or(0.0)
    }

    pub fn ema_slow(&self) -> f64 {
        self.ema_slow.unwrap_or(0.0)
    }

    pub fn macd(&self) -> f64 {
        self.macd.unwrap_or(0.0)
    }

    pub fn rsi(&self) -> f64 {
        self.rsi.unwrap_or(0.0)
    }

    pub fn atr(&self) -> f64 {
        self.atr.unwrap_or(0.0)
    }
}

/// One per-symbol observation produced once per tick cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketTick {
    pub symbol: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    #[serde(default, flatten)]
    pub indicators: Indicators,
}

impl MarketTick {
    /// OHLCV with no indicators attached.
    pub fn new(symbol: impl Into<String>, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            symbol: symbol.into(),
            open,
            high,
            low,
            close,
            volume,
            indicators: Indicators::default(),
        }
    }

    pub fn with_indicators(mut self, indicators: Indicators) -> Self {
        self.indicators = indicators;
        self
    }

    /// True when every OHLCV field is finite and non-negative.
    pub fn ohlcv_is_sane(&self) -> bool {
        [self.open, self.high, self.low, self.close, self.volume]
            .iter()
            .all(|v| v.is_finite() && *v >= 0.0)
    }
}

// ---------------------------------------------------------------------------
// GlobalContext
// ---------------------------------------------------------------------------

/// Market-wide context shared read-only by every symbol in one cycle.
///
/// All `*_change` values are fractional returns (`-0.01` = down 1%).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalContext {
    /// Domestic volatility index level (e.g. India VIX).
    pub volatility_index: f64,
    /// Overnight change of the reference index (e.g. GIFT Nifty).
    pub reference_change: f64,
    /// Named foreign index futures changes (S&P 500, Nasdaq, Dow, ...).
    #[serde(default)]
    pub foreign_futures_changes: BTreeMap<String, f64>,
    /// Named Asian market changes (Nikkei, Hang Seng, ...).
    #[serde(default)]
    pub asian_markets_changes: BTreeMap<String, f64>,
    /// Change of the home currency pair (e.g. USD/INR).
    pub currency_change: f64,
    /// Sector name -> daily return.
    #[serde(default)]
    pub sector_strength: BTreeMap<String, f64>,
    /// Strongest sectors, strongest first.
    #[serde(default)]
    pub top_sectors: Vec<String>,
}

impl GlobalContext {
    /// The neutral context a provider falls back to when its upstream is down.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Replace the sector table and derive `top_sectors` from it.
    ///
    /// Ties are broken by sector name so the ranking is deterministic.
    pub fn with_sector_strength(mut self, strength: BTreeMap<String, f64>, top_n: usize) -> Self {
        let mut ranked: Vec<(&String, &f64)> = strength.iter().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(a.1).then_with(|| a.0.cmp(b.0)));
        self.top_sectors = ranked.into_iter().take(top_n).map(|(k, _)| k.clone()).collect();
        self.sector_strength = strength;
        self
    }

    pub fn strength_of(&self, sector: &str) -> Option<f64> {
        self.sector_strength.get(sector).copied()
    }

    pub fn is_top_sector(&self, sector: &str) -> bool {
        self.top_sectors.iter().any(|s| s == sector)
    }
}

// ---------------------------------------------------------------------------
// Signals
// ---------------------------------------------------------------------------

/// Trade intent direction. Discriminants match the model's action classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Hold,
    Buy,
    Sell,
}

impl Side {
    /// Map a model action class (0 = hold, 1 = buy, 2 = sell).
    pub fn from_class(class: usize) -> Option<Self> {
        match class {
            0 => Some(Side::Hold),
            1 => Some(Side::Buy),
            2 => Some(Side::Sell),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Hold => "hold",
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which strategy produced a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalOrigin {
    Model,
    Rule,
}

/// Output of the decision model for one symbol in one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeSignal {
    pub symbol: String,
    pub side: Side,
    /// Fraction of the base lot, in `[0, 1]`.
    pub size: f64,
    /// In `[0, 1]`.
    pub confidence: f64,
    pub origin: SignalOrigin,
}

impl TradeSignal {
    /// Builds a signal, clamping size and confidence into `[0, 1]`.
    pub fn new(symbol: impl Into<String>, side: Side, size: f64, confidence: f64, origin: SignalOrigin) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            size: clamp_unit(size),
            confidence: clamp_unit(confidence),
            origin,
        }
    }

    pub fn is_actionable(&self) -> bool {
        self.side != Side::Hold
    }
}

fn clamp_unit(v: f64) -> f64 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 1.0)
    }
}

// ---------------------------------------------------------------------------
// Broker-side
// ---------------------------------------------------------------------------

/// Open position as reported by the broker account. Signed qty: +long, -short.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub quantity: i64,
    #[serde(default)]
    pub realized_pnl: f64,
    #[serde(default)]
    pub unrealized_pnl: f64,
}

impl Position {
    pub fn new(symbol: impl Into<String>, quantity: i64) -> Self {
        Self {
            symbol: symbol.into(),
            quantity,
            realized_pnl: 0.0,
            unrealized_pnl: 0.0,
        }
    }

    pub fn with_pnl(mut self, realized: f64, unrealized: f64) -> Self {
        self.realized_pnl = realized;
        self.unrealized_pnl = unrealized;
        self
    }

    pub fn pnl(&self) -> f64 {
        self.realized_pnl + self.unrealized_pnl
    }

    pub fn is_open(&self) -> bool {
        self.quantity != 0
    }
}

/// Sum of pnl across all positions.
pub fn total_pnl(positions: &[Position]) -> f64 {
    positions.iter().map(Position::pnl).sum()
}

/// Net signed quantity held in `symbol` across all position rows.
pub fn net_quantity(positions: &[Position], symbol: &str) -> i64 {
    positions
        .iter()
        .filter(|p| p.symbol == symbol)
        .map(|p| p.quantity)
        .sum()
}

/// Direction of a market order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderDirection {
    Buy,
    Sell,
}

impl OrderDirection {
    /// Direction that flattens a position of the given signed quantity.
    pub fn offsetting(quantity: i64) -> Self {
        if quantity > 0 {
            OrderDirection::Sell
        } else {
            OrderDirection::Buy
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderDirection::Buy => "BUY",
            OrderDirection::Sell => "SELL",
        }
    }
}

impl fmt::Display for OrderDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
