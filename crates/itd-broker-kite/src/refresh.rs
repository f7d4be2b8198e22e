use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use itd_execution::{BrokerError, SessionRefresher};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::SessionToken;

/// Re-reads the access token from a dotenv file.
///
/// Token generation is interactive (browser login), so it happens out of
/// band; this only picks up the new value. Refreshes are serialized. A
/// caller whose rejected token was already replaced by a concurrent refresh
/// succeeds without touching the file. Otherwise an unchanged token is a
/// failed refresh, which stops the retry instead of burning a second call.
#[derive(Debug, Clone)]
pub struct EnvFileRefresher {
    path: PathBuf,
    var: String,
    token: SessionToken,
    gate: Arc<Mutex<()>>,
}

impl EnvFileRefresher {
    pub fn new(path: impl Into<PathBuf>, var: impl Into<String>, token: SessionToken) -> Self {
        Self {
            path: path.into(),
            var: var.into(),
            token,
            gate: Arc::new(Mutex::new(())),
        }
    }

    fn read_token(&self) -> Result<String, BrokerError> {
        let iter = dotenvy::from_path_iter(&self.path)
            .map_err(|e| BrokerError::RefreshFailed(format!("{}: {e}", self.path.display())))?;
        for item in iter {
            let (k, v) = item.map_err(|e| BrokerError::RefreshFailed(format!("{}: {e}", self.path.display())))?;
            if k == self.var {
                let v = v.trim().to_string();
                if v.is_empty() {
                    break;
                }
                return Ok(v);
            }
        }
        Err(BrokerError::RefreshFailed(format!(
            "{} not set in {}",
            self.var,
            self.path.display()
        )))
    }
}

#[async_trait]
impl SessionRefresher for EnvFileRefresher {
    async fn refresh(&self) -> Result<(), BrokerError> {
        let _serial = self.gate.lock().await;
        if self.token.replaced_since_rejection() {
            debug!(var = %self.var, "broker access token already refreshed");
            return Ok(());
        }
        let fresh = self.read_token()?;
        if fresh == self.token.get() {
            return Err(BrokerError::RefreshFailed(format!(
                "{} in {} is unchanged; regenerate the session token",
                self.var,
                self.path.display()
            )));
        }
        self.token.set(fresh);
        info!(var = %self.var, "broker access token refreshed");
        Ok(())
    }
}
