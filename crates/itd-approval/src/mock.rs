use itd_schemas::TradeSignal;

use crate::Judgement;

/// Deterministic last-resort judge: deny weak or low-confidence signals.
pub fn mock_judgement(signal: &TradeSignal, explanation: &str, min_confidence: f64) -> Judgement {
    if signal.confidence < min_confidence || explanation.to_lowercase().contains("weak") {
        Judgement {
            approved: false,
            reason: "Low confidence or weak signal".to_string(),
        }
    } else {
        Judgement {
            approved: true,
            reason: "Trade aligns with strategy".to_string(),
        }
    }
}
