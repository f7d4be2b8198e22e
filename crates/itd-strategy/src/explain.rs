use itd_schemas::{FeatureVector, Side, TradeSignal};

/// One-line human rationale for a signal.
///
/// `pnl` is the account's total pnl, `None` when it could not be read.
pub fn explain(signal: &TradeSignal, features: &FeatureVector, pnl: Option<f64>) -> String {
    let pnl = match pnl {
        Some(v) => format!("{v:.2}"),
        None => "n/a".to_string(),
    };
    match signal.side {
        Side::Hold => format!("AI HOLD: No edge | RSI: {:.1}, P&L: {pnl}", features.rsi()),
        side => format!(
            "AI {}: {:.2} | RSI: {:.1}, MACD: {:.2}, VIX: {:.1}, P&L: {pnl}",
            side.as_str().to_ascii_uppercase(),
            signal.confidence,
            features.rsi(),
            features.macd(),
            features.volatility_index(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use itd_schemas::{SignalOrigin, FEATURE_COUNT};

    fn features() -> FeatureVector {
        let mut v = [0.0; FEATURE_COUNT];
        v[FeatureVector::RSI] = 75.0;
        v[FeatureVector::MACD] = 2.0;
        v[FeatureVector::VOLATILITY_INDEX] = 14.0;
        FeatureVector::new(v)
    }

    #[test]
    fn actionable_signal_lists_indicators() {
        let s = TradeSignal::new("X", Side::Sell, 0.8, 0.8, SignalOrigin::Model);
        assert_eq!(
            explain(&s, &features(), Some(0.0)),
            "AI SELL: 0.80 | RSI: 75.0, MACD: 2.00, VIX: 14.0, P&L: 0.00"
        );
    }

    #[test]
    fn hold_is_short_and_pnl_may_be_missing() {
        let s = TradeSignal::new("X", Side::Hold, 0.0, 0.5, SignalOrigin::Rule);
        assert_eq!(explain(&s, &features(), None), "AI HOLD: No edge | RSI: 75.0, P&L: n/a");
    }
}
