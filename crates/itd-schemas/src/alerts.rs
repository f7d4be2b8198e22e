//! Operator alerts.
//!
//! Producers hold a cloneable [`AlertHandle`]; delivery happens elsewhere on
//! a dedicated task draining the receiver. `send` never blocks: a full queue
//! drops the alert with a log line.

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Critical => "CRITICAL",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub severity: Severity,
    /// Component that raised the alert (`risk`, `approval`, ...).
    pub source: String,
    pub message: String,
}

impl Alert {
    pub fn new(severity: Severity, source: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity,
            source: source.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity, self.source, self.message)
    }
}

/// Non-blocking producer side of the alert queue.
#[derive(Debug, Clone)]
pub struct AlertHandle {
    tx: Option<mpsc::Sender<Alert>>,
}

impl AlertHandle {
    /// Bounded queue. Capacity 0 is bumped to 1.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Alert>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx: Some(tx) }, rx)
    }

    /// A handle that discards everything.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn send(&self, alert: Alert) {
        let Some(tx) = &self.tx else { return };
        match tx.try_send(alert) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(a)) => {
                tracing::warn!(source = %a.source, "alert queue full; dropping alert: {}", a.message);
            }
            Err(mpsc::error::TrySendError::Closed(a)) => {
                tracing::debug!(source = %a.source, "alert queue closed; dropping alert");
            }
        }
    }

    pub fn info(&self, source: &str, message: impl Into<String>) {
        self.send(Alert::new(Severity::Info, source, message));
    }

    pub fn warning(&self, source: &str, message: impl Into<String>) {
        self.send(Alert::new(Severity::Warning, source, message));
    }

    pub fn critical(&self, source: &str, message: impl Into<String>) {
        self.send(Alert::new(Severity::Critical, source, message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_queue_drops_without_blocking() {
        let (h, mut rx) = AlertHandle::channel(1);
        h.info("test", "first");
        h.info("test", "second");
        assert_eq!(rx.try_recv().unwrap().message, "first");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn disabled_handle_is_silent() {
        AlertHandle::disabled().critical("test", "nobody listens");
    }

    #[test]
    fn display_includes_severity_and_source() {
        let a = Alert::new(Severity::Warning, "risk", "account query failed");
        assert_eq!(a.to_string(), "[WARNING] risk: account query failed");
    }
}
