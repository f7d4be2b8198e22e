use std::collections::BTreeMap;

use itd_schemas::{FeatureVector, GlobalContext, MarketTick, FEATURE_COUNT, FEATURE_NAMES};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FeatureError {
    #[error("{symbol}: OHLCV contains a negative or non-finite value")]
    BadOhlcv { symbol: String },
    #[error("{symbol}: no foreign futures changes in context")]
    MissingForeignFutures { symbol: String },
    #[error("{symbol}: no asian market changes in context")]
    MissingAsianMarkets { symbol: String },
    #[error("{symbol}: feature '{feature}' is not finite")]
    NonFinite { symbol: String, feature: &'static str },
}

/// Build the feature vector for `tick` under `ctx`.
///
/// The symbol's sector strength comes from `sectors` (symbol -> sector);
/// an unmapped symbol contributes 0.0 and is left for the risk gate to deny.
pub fn assemble_features(
    tick: &MarketTick,
    ctx: &GlobalContext,
    sectors: &BTreeMap<String, String>,
) -> Result<FeatureVector, FeatureError> {
    let symbol = || tick.symbol.clone();

    if !tick.ohlcv_is_sane() {
        return Err(FeatureError::BadOhlcv { symbol: symbol() });
    }
    let foreign = mean(ctx.foreign_futures_changes.values())
        .ok_or_else(|| FeatureError::MissingForeignFutures { symbol: symbol() })?;
    let asian = mean(ctx.asian_markets_changes.values())
        .ok_or_else(|| FeatureError::MissingAsianMarkets { symbol: symbol() })?;

    let sector_strength = sectors
        .get(&tick.symbol)
        .and_then(|sector| ctx.strength_of(sector))
        .unwrap_or(0.0);

    let ind = &tick.indicators;
    let values: [f64; FEATURE_COUNT] = [
        ind.ema_fast(),
        ind.ema_slow(),
        ind.macd(),
        ind.rsi(),
        tick.volume,
        ctx.volatility_index,
        sector_strength,
        ctx.reference_change,
        ind.atr(),
        ctx.currency_change,
        foreign,
        asian,
    ];

    let fv = FeatureVector::new(values);
    if let Some(idx) = fv.first_non_finite() {
        return Err(FeatureError::NonFinite {
            symbol: symbol(),
            feature: FEATURE_NAMES[idx],
        });
    }
    Ok(fv)
}

fn mean<'a>(values: impl Iterator<Item = &'a f64>) -> Option<f64> {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        None
    } else {
        Some(sum / n as f64)
    }
}
