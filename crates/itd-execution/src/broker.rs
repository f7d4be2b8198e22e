use std::time::Duration;

use async_trait::async_trait;
use itd_schemas::{OrderDirection, Position};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BrokerError {
    /// Auth token no longer valid. The only error that triggers a refresh.
    #[error("broker session expired: {0}")]
    SessionExpired(String),
    #[error("order rejected: {0}")]
    Rejected(String),
    #[error("broker transport error: {0}")]
    Transport(String),
    #[error("broker {op} timed out after {}ms", .after.as_millis())]
    Timeout { op: &'static str, after: Duration },
    #[error("session refresh failed: {0}")]
    RefreshFailed(String),
}

impl BrokerError {
    pub fn is_session_expired(&self) -> bool {
        matches!(self, BrokerError::SessionExpired(_))
    }
}

// ---------------------------------------------------------------------------
// Requests / acks
// ---------------------------------------------------------------------------

/// Market order for `quantity` units. Venue details (exchange, product) are
/// adapter configuration, not part of the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub direction: OrderDirection,
    pub quantity: u64,
}

impl OrderRequest {
    pub fn market(symbol: impl Into<String>, direction: OrderDirection, quantity: u64) -> Self {
        Self {
            symbol: symbol.into(),
            direction,
            quantity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderAck {
    pub order_id: String,
    pub symbol: String,
    pub direction: OrderDirection,
    pub quantity: u64,
}

// ---------------------------------------------------------------------------
// Adapter traits
// ---------------------------------------------------------------------------

/// Broker account adapter.
#[async_trait]
pub trait BrokerAccount: Send + Sync {
    fn name(&self) -> &str;

    /// Fresh snapshot of open positions. Never cached by callers.
    async fn positions(&self) -> Result<Vec<Position>, BrokerError>;

    async fn place_order(&self, req: &OrderRequest) -> Result<OrderAck, BrokerError>;
}

/// Re-establishes an expired broker session.
#[async_trait]
pub trait SessionRefresher: Send + Sync {
    async fn refresh(&self) -> Result<(), BrokerError>;
}

/// For brokers without sessions. Refresh always "succeeds", so an expired
/// session error still gets its single retry.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRefresher;

#[async_trait]
impl SessionRefresher for NoopRefresher {
    async fn refresh(&self) -> Result<(), BrokerError> {
        Ok(())
    }
}

/// Read-only view of account positions, as consumed by the risk gate.
#[async_trait]
pub trait PositionSource: Send + Sync {
    async fn positions(&self) -> Result<Vec<Position>, BrokerError>;
}
