use itd_schemas::{FeatureVector, Side, SignalOrigin, TradeSignal};

const RSI_OVERBOUGHT: f64 = 70.0;
const RSI_OVERSOLD: f64 = 30.0;

/// Deterministic RSI rule used whenever the model is unavailable.
///
/// Strictly above 70 sells, strictly below 30 buys; the boundaries hold.
pub fn rule_decision(features: &FeatureVector, symbol: &str) -> TradeSignal {
    let rsi = features.rsi();
    let (side, confidence, size) = if rsi > RSI_OVERBOUGHT {
        (Side::Sell, 0.7, 0.5)
    } else if rsi < RSI_OVERSOLD {
        (Side::Buy, 0.7, 0.5)
    } else {
        (Side::Hold, 0.5, 0.0)
    };
    TradeSignal::new(symbol, side, size, confidence, SignalOrigin::Rule)
}

#[cfg(test)]
mod tests {
    use super::*;
    use itd_schemas::FEATURE_COUNT;

    fn with_rsi(rsi: f64) -> FeatureVector {
        let mut v = [0.0; FEATURE_COUNT];
        v[FeatureVector::RSI] = rsi;
        FeatureVector::new(v)
    }

    #[test]
    fn overbought_sells() {
        let s = rule_decision(&with_rsi(75.0), "X");
        assert_eq!((s.side, s.confidence, s.size), (Side::Sell, 0.7, 0.5));
        assert_eq!(s.origin, SignalOrigin::Rule);
    }

    #[test]
    fn oversold_buys() {
        let s = rule_decision(&with_rsi(25.0), "X");
        assert_eq!((s.side, s.confidence, s.size), (Side::Buy, 0.7, 0.5));
    }

    #[test]
    fn boundaries_hold() {
        for rsi in [70.0, 30.0, 50.0] {
            let s = rule_decision(&with_rsi(rsi), "X");
            assert_eq!((s.side, s.confidence, s.size), (Side::Hold, 0.5, 0.0), "rsi={rsi}");
        }
    }
}
