use std::sync::Arc;
use std::time::Duration;

use itd_schemas::{AlertHandle, FeatureVector, TradeSignal};
use tracing::{debug, warn};

use crate::model::{signal_from_inference, InferenceModel};
use crate::rule::rule_decision;

const ALERT_SOURCE: &str = "decision_model";

/// Primary model with rule fallback.
pub struct DecisionModel {
    model: Option<Arc<dyn InferenceModel>>,
    timeout: Duration,
    alerts: AlertHandle,
}

impl DecisionModel {
    /// `model = None` means the model failed to load; every decision then
    /// comes from the rule. That degradation is announced once, here.
    pub fn new(model: Option<Arc<dyn InferenceModel>>, timeout: Duration, alerts: AlertHandle) -> Self {
        if model.is_none() {
            warn!("no inference model loaded; decisions use the RSI rule");
            alerts.warning(ALERT_SOURCE, "No inference model loaded, using rule-based fallback");
        }
        Self { model, timeout, alerts }
    }

    pub fn rule_only(alerts: AlertHandle) -> Self {
        Self::new(None, Duration::from_millis(1), alerts)
    }

    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }

    /// Never fails: any model fault or timeout falls back to the rule.
    pub async fn decide(&self, features: &FeatureVector, symbol: &str) -> TradeSignal {
        let Some(model) = &self.model else {
            return rule_decision(features, symbol);
        };

        let fault = match tokio::time::timeout(self.timeout, model.infer(features)).await {
            Ok(Ok(inf)) => match signal_from_inference(&inf, symbol) {
                Ok(sig) => {
                    debug!(symbol, side = %sig.side, confidence = sig.confidence, "model decision");
                    return sig;
                }
                Err(e) => e.to_string(),
            },
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("inference timed out after {}ms", self.timeout.as_millis()),
        };

        warn!(symbol, model = model.name(), error = %fault, "inference failed; using rule fallback");
        self.alerts
            .warning(ALERT_SOURCE, format!("{symbol}: inference error ({fault}), using fallback"));
        rule_decision(features, symbol)
    }
}
