use std::sync::atomic::{AtomicU64, Ordering};

use itd_schemas::AlertHandle;
use tracing::warn;

/// Counts broker API calls and raises a warning every `warn_every` calls.
#[derive(Debug)]
pub struct ApiCallCounter {
    count: AtomicU64,
    warn_every: u64,
    alerts: AlertHandle,
}

impl ApiCallCounter {
    pub fn new(warn_every: u64, alerts: AlertHandle) -> Self {
        Self {
            count: AtomicU64::new(0),
            warn_every,
            alerts,
        }
    }

    /// Record one call and return the new total.
    pub fn record(&self, op: &str) -> u64 {
        let n = self.count.fetch_add(1, Ordering::Relaxed) + 1;
        if self.warn_every > 0 && n % self.warn_every == 0 {
            warn!(calls = n, op, "broker API call volume");
            self.alerts
                .warning("execution", format!("Broker API calls reached {n}"));
        }
        n
    }

    pub fn total(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}
