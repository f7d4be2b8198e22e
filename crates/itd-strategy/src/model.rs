use async_trait::async_trait;
use itd_schemas::{FeatureVector, Side, SignalOrigin, TradeSignal};
use thiserror::Error;

/// Raw output of an inference backend: the chosen class and the
/// probability of every class.
#[derive(Debug, Clone, PartialEq)]
pub struct Inference {
    pub action_class: usize,
    pub probabilities: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum InferenceError {
    #[error("action class {0} is outside 0..=2")]
    InvalidClass(usize),
    #[error("invalid model output: {0}")]
    InvalidOutput(String),
    #[error("inference backend failed: {0}")]
    Backend(String),
}

/// Opaque primary decision capability.
#[async_trait]
pub trait InferenceModel: Send + Sync {
    fn name(&self) -> &str;

    async fn infer(&self, features: &FeatureVector) -> Result<Inference, InferenceError>;
}

/// Map a model inference onto a signal.
///
/// confidence = max probability, size = min(1, confidence).
pub fn signal_from_inference(inf: &Inference, symbol: &str) -> Result<TradeSignal, InferenceError> {
    let side = Side::from_class(inf.action_class).ok_or(InferenceError::InvalidClass(inf.action_class))?;
    if inf.probabilities.is_empty() {
        return Err(InferenceError::InvalidOutput("no probabilities".into()));
    }
    if inf.probabilities.iter().any(|p| !p.is_finite()) {
        return Err(InferenceError::InvalidOutput("non-finite probability".into()));
    }
    let confidence = inf
        .probabilities
        .iter()
        .copied()
        .fold(f64::NEG_INFINITY, f64::max);
    Ok(TradeSignal::new(
        symbol,
        side,
        confidence.min(1.0),
        confidence,
        SignalOrigin::Model,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_probability_is_confidence_and_size() {
        let inf = Inference {
            action_class: 2,
            probabilities: vec![0.1, 0.1, 0.8],
        };
        let s = signal_from_inference(&inf, "SBIN").unwrap();
        assert_eq!(s.side, Side::Sell);
        assert_eq!(s.confidence, 0.8);
        assert_eq!(s.size, 0.8);
        assert_eq!(s.origin, SignalOrigin::Model);
    }

    #[test]
    fn out_of_range_class_is_a_fault() {
        let inf = Inference {
            action_class: 7,
            probabilities: vec![1.0],
        };
        assert_eq!(signal_from_inference(&inf, "SBIN"), Err(InferenceError::InvalidClass(7)));
    }

    #[test]
    fn nan_probability_is_a_fault() {
        let inf = Inference {
            action_class: 0,
            probabilities: vec![f64::NAN, 0.5, 0.5],
        };
        assert!(matches!(
            signal_from_inference(&inf, "SBIN"),
            Err(InferenceError::InvalidOutput(_))
        ));
    }
}
