use serde::{Deserialize, Serialize};

/// Number of features in a [`FeatureVector`].
pub const FEATURE_COUNT: usize = 12;

/// Positional layout of the feature vector. Consumers index by position, so
/// this order is part of the model contract and must not change.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "ema_fast",
    "ema_slow",
    "macd",
    "rsi",
    "volume",
    "volatility_index",
    "sector_strength",
    "reference_change",
    "atr",
    "currency_change",
    "foreign_futures_mean",
    "asian_markets_mean",
];

/// Fixed-order numeric features for one symbol in one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector([f64; FEATURE_COUNT]);

impl FeatureVector {
    pub const EMA_FAST: usize = 0;
    pub const EMA_SLOW: usize = 1;
    pub const MACD: usize = 2;
    pub const RSI: usize = 3;
    pub const VOLUME: usize = 4;
    pub const VOLATILITY_INDEX: usize = 5;
    pub const SECTOR_STRENGTH: usize = 6;
    pub const REFERENCE_CHANGE: usize = 7;
    pub const ATR: usize = 8;
    pub const CURRENCY_CHANGE: usize = 9;
    pub const FOREIGN_FUTURES_MEAN: usize = 10;
    pub const ASIAN_MARKETS_MEAN: usize = 11;

    pub fn new(values: [f64; FEATURE_COUNT]) -> Self {
        Self(values)
    }

    pub fn get(&self, idx: usize) -> Option<f64> {
        self.0.get(idx).copied()
    }

    pub fn rsi(&self) -> f64 {
        self.0[Self::RSI]
    }

    pub fn macd(&self) -> f64 {
        self.0[Self::MACD]
    }

    pub fn volatility_index(&self) -> f64 {
        self.0[Self::VOLATILITY_INDEX]
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    /// Index of the first non-finite value, if any.
    pub fn first_non_finite(&self) -> Option<usize> {
        self.0.iter().position(|v| !v.is_finite())
    }
}
