use std::time::Duration;

use async_trait::async_trait;
use itd_schemas::TradeSignal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Judgement {
    pub approved: bool,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ApprovalError {
    #[error("no approval provider available")]
    NoProvider,
    #[error("{provider} transport error: {message}")]
    Transport { provider: String, message: String },
    #[error("{provider} http error status={status}: {body}")]
    Http { provider: String, status: u16, body: String },
    #[error("{provider} response parse error: {message}")]
    Parse { provider: String, message: String },
    #[error("{provider} timed out after {}ms", .after.as_millis())]
    Timeout { provider: String, after: Duration },
}

/// One external judge.
#[async_trait]
pub trait ApprovalProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn judge(&self, signal: &TradeSignal, explanation: &str) -> Result<Judgement, ApprovalError>;
}
