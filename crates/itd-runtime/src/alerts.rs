//! Alert delivery. Producers hold an [`AlertHandle`]; a single dispatcher
//! task drains the channel and fans each alert out to every sink.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use itd_schemas::{Alert, Severity};
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

#[async_trait]
pub trait AlertSink: Send + Sync {
    fn name(&self) -> &str;
    async fn deliver(&self, alert: &Alert) -> Result<()>;
}

/// Writes alerts to the tracing log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAlertSink;

#[async_trait]
impl AlertSink for LogAlertSink {
    fn name(&self) -> &str {
        "log"
    }

    async fn deliver(&self, alert: &Alert) -> Result<()> {
        match alert.severity {
            Severity::Info => info!(source = %alert.source, "ALERT {}", alert.message),
            Severity::Warning => warn!(source = %alert.source, "ALERT {}", alert.message),
            Severity::Critical => error!(source = %alert.source, "ALERT {}", alert.message),
        }
        Ok(())
    }
}

/// Operator-facing text. Non-info alerts carry an error prefix.
pub fn render_alert(alert: &Alert) -> String {
    match alert.severity {
        Severity::Info => alert.message.clone(),
        Severity::Warning | Severity::Critical => format!("Error Alert: {}", alert.message),
    }
}

/// POSTs `{"text", "severity", "source"}` JSON to a chat webhook.
pub struct WebhookAlertSink {
    http: reqwest::Client,
    url: String,
}

impl std::fmt::Debug for WebhookAlertSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // webhook URLs embed their credential
        f.debug_struct("WebhookAlertSink").field("url", &"<REDACTED>").finish()
    }
}

impl WebhookAlertSink {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("build webhook http client")?;
        Ok(Self { http, url: url.into() })
    }
}

#[async_trait]
impl AlertSink for WebhookAlertSink {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn deliver(&self, alert: &Alert) -> Result<()> {
        let body = json!({
            "text": render_alert(alert),
            "severity": alert.severity.to_string(),
            "source": alert.source,
        });
        let resp = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .context("webhook request failed")?;
        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("webhook returned HTTP {status}");
        }
        Ok(())
    }
}

/// Drain `rx` until every sender is gone. A failing sink is logged and
/// never retried; it does not affect the other sinks.
pub fn spawn_alert_dispatcher(mut rx: mpsc::Receiver<Alert>, sinks: Vec<Arc<dyn AlertSink>>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(alert) = rx.recv().await {
            for sink in &sinks {
                if let Err(e) = sink.deliver(&alert).await {
                    error!(sink = sink.name(), error = %e, "alert delivery failed");
                }
            }
        }
        info!("alert dispatcher stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_prefix_only_for_non_info() {
        assert_eq!(render_alert(&Alert::new(Severity::Info, "p", "BUY Signal: x")), "BUY Signal: x");
        assert_eq!(
            render_alert(&Alert::new(Severity::Critical, "exec", "Trade execution error")),
            "Error Alert: Trade execution error"
        );
    }

    #[test]
    fn webhook_debug_hides_url() {
        let s = WebhookAlertSink::new("https://hooks.example/secret-token", Duration::from_secs(1)).unwrap();
        assert!(!format!("{s:?}").contains("secret-token"));
    }
}
