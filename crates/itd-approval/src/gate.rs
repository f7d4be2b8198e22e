use std::sync::Arc;
use std::time::Duration;

use itd_config::ApprovalSettings;
use itd_schemas::{AlertHandle, TradeSignal};
use serde::Serialize;
use tracing::{info, warn};

use crate::mock::mock_judgement;
use crate::{ApprovalError, ApprovalProvider, Judgement};

const ALERT_SOURCE: &str = "approval";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Judge {
    Primary,
    Secondary,
    Mock,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApprovalOutcome {
    pub approved: bool,
    pub reason: String,
    pub judge: Judge,
}

pub struct ApprovalGate {
    primary: Option<Arc<dyn ApprovalProvider>>,
    secondary: Option<Arc<dyn ApprovalProvider>>,
    primary_min_confidence: f64,
    mock_min_confidence: f64,
    timeout: Duration,
    alerts: AlertHandle,
}

impl ApprovalGate {
    pub fn new(
        primary: Option<Arc<dyn ApprovalProvider>>,
        secondary: Option<Arc<dyn ApprovalProvider>>,
        settings: &ApprovalSettings,
        alerts: AlertHandle,
    ) -> Self {
        Self {
            primary,
            secondary,
            primary_min_confidence: settings.primary_min_confidence,
            mock_min_confidence: settings.mock_min_confidence,
            timeout: settings.timeout(),
            alerts,
        }
    }

    /// Mock-only gate (no external providers).
    pub fn mock_only(settings: &ApprovalSettings, alerts: AlertHandle) -> Self {
        Self::new(None, None, settings, alerts)
    }

    fn select(&self, signal: &TradeSignal) -> Option<(Judge, &Arc<dyn ApprovalProvider>)> {
        if signal.confidence >= self.primary_min_confidence {
            if let Some(p) = &self.primary {
                return Some((Judge::Primary, p));
            }
        }
        self.secondary.as_ref().map(|p| (Judge::Secondary, p))
    }

    async fn ask(&self, provider: &dyn ApprovalProvider, signal: &TradeSignal, explanation: &str) -> Result<Judgement, ApprovalError> {
        match tokio::time::timeout(self.timeout, provider.judge(signal, explanation)).await {
            Ok(r) => r,
            Err(_) => Err(ApprovalError::Timeout {
                provider: provider.name().to_string(),
                after: self.timeout,
            }),
        }
    }

    /// Always yields a verdict within the provider timeout.
    pub async fn approve(&self, signal: &TradeSignal, explanation: &str) -> ApprovalOutcome {
        let result = match self.select(signal) {
            Some((judge, provider)) => self
                .ask(provider.as_ref(), signal, explanation)
                .await
                .map(|j| (judge, provider.name().to_string(), j)),
            None => Err(ApprovalError::NoProvider),
        };

        match result {
            Ok((judge, name, j)) => {
                if !j.approved {
                    info!(provider = %name, symbol = %signal.symbol, reason = %j.reason, "trade vetoed");
                }
                ApprovalOutcome {
                    approved: j.approved,
                    reason: j.reason,
                    judge,
                }
            }
            Err(e) => {
                warn!(symbol = %signal.symbol, error = %e, "approval provider failed; using mock judge");
                self.alerts
                    .warning(ALERT_SOURCE, format!("Approval error for {}: {e}", signal.symbol));
                let j = mock_judgement(signal, explanation, self.mock_min_confidence);
                ApprovalOutcome {
                    approved: j.approved,
                    reason: j.reason,
                    judge: Judge::Mock,
                }
            }
        }
    }
}
