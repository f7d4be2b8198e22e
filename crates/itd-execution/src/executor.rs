use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use itd_schemas::{OrderDirection, Position, Side, TradeSignal};
use serde::Serialize;
use tracing::{error, info};

use crate::broker::{BrokerAccount, BrokerError, OrderAck, OrderRequest, PositionSource, SessionRefresher};
use crate::counter::ApiCallCounter;
use crate::session::with_session_retry;

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorSettings {
    /// Units per full-size (1.0) signal.
    pub lot_size: u32,
    pub order_timeout: Duration,
    pub account_timeout: Duration,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            lot_size: 100,
            order_timeout: Duration::from_secs(5),
            account_timeout: Duration::from_secs(5),
        }
    }
}

/// Units to trade for a signal of `size` (fraction of a lot).
pub fn order_quantity(size: f64, lot_size: u32) -> u64 {
    if !size.is_finite() || size <= 0.0 {
        return 0;
    }
    (size * f64::from(lot_size)).round() as u64
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Skipped { reason: &'static str },
    Placed(OrderAck),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExitLeg {
    pub symbol: String,
    pub direction: OrderDirection,
    pub quantity: u64,
    pub order_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExitFailure {
    pub symbol: String,
    pub quantity: i64,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExitReport {
    pub closed: Vec<ExitLeg>,
    pub failed: Vec<ExitFailure>,
}

impl ExitReport {
    pub fn had_open_positions(&self) -> bool {
        !self.closed.is_empty() || !self.failed.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

/// Single path from the pipeline to the broker.
pub struct Executor {
    broker: Arc<dyn BrokerAccount>,
    refresher: Arc<dyn SessionRefresher>,
    counter: Arc<ApiCallCounter>,
    settings: ExecutorSettings,
}

impl Executor {
    pub fn new(
        broker: Arc<dyn BrokerAccount>,
        refresher: Arc<dyn SessionRefresher>,
        counter: Arc<ApiCallCounter>,
        settings: ExecutorSettings,
    ) -> Self {
        Self {
            broker,
            refresher,
            counter,
            settings,
        }
    }

    pub fn broker_name(&self) -> &str {
        self.broker.name()
    }

    pub fn api_calls(&self) -> u64 {
        self.counter.total()
    }

    async fn call<T>(
        &self,
        op: &'static str,
        limit: Duration,
        fut: impl Future<Output = Result<T, BrokerError>>,
    ) -> Result<T, BrokerError> {
        self.counter.record(op);
        match tokio::time::timeout(limit, fut).await {
            Ok(r) => r,
            Err(_) => Err(BrokerError::Timeout { op, after: limit }),
        }
    }

    /// Fresh positions, with timeout and one session-refresh retry.
    pub async fn positions(&self) -> Result<Vec<Position>, BrokerError> {
        let this = self;
        with_session_retry(self.refresher.as_ref(), "positions", move || {
            this.call("positions", this.settings.account_timeout, this.broker.positions())
        })
        .await
    }

    async fn place(&self, req: &OrderRequest) -> Result<OrderAck, BrokerError> {
        let this = self;
        with_session_retry(self.refresher.as_ref(), "place_order", move || {
            this.call("place_order", this.settings.order_timeout, this.broker.place_order(req))
        })
        .await
    }

    /// Place the market order a signal asks for. Hold and zero-quantity
    /// signals are skipped without touching the broker.
    pub async fn execute(&self, signal: &TradeSignal) -> Result<ExecutionOutcome, BrokerError> {
        let direction = match signal.side {
            Side::Hold => return Ok(ExecutionOutcome::Skipped { reason: "hold" }),
            Side::Buy => OrderDirection::Buy,
            Side::Sell => OrderDirection::Sell,
        };
        let quantity = order_quantity(signal.size, self.settings.lot_size);
        if quantity == 0 {
            return Ok(ExecutionOutcome::Skipped { reason: "zero quantity" });
        }

        let req = OrderRequest::market(&signal.symbol, direction, quantity);
        let ack = self.place(&req).await?;
        info!(
            symbol = %ack.symbol,
            direction = %ack.direction,
            quantity = ack.quantity,
            order_id = %ack.order_id,
            "order placed"
        );
        Ok(ExecutionOutcome::Placed(ack))
    }

    /// Flatten every open position. A failing leg does not stop the others.
    ///
    /// Errors only when the position snapshot itself cannot be read.
    pub async fn force_exit_all(&self) -> Result<ExitReport, BrokerError> {
        let positions = self.positions().await?;

        let mut net: BTreeMap<String, i64> = BTreeMap::new();
        for p in positions.iter().filter(|p| p.is_open()) {
            *net.entry(p.symbol.clone()).or_default() += p.quantity;
        }

        let mut report = ExitReport::default();
        for (symbol, qty) in net.into_iter().filter(|(_, q)| *q != 0) {
            let direction = OrderDirection::offsetting(qty);
            let req = OrderRequest::market(&symbol, direction, qty.unsigned_abs());
            match self.place(&req).await {
                Ok(ack) => {
                    info!(symbol = %symbol, %direction, quantity = req.quantity, "force exit leg closed");
                    report.closed.push(ExitLeg {
                        symbol,
                        direction,
                        quantity: req.quantity,
                        order_id: ack.order_id,
                    });
                }
                Err(e) => {
                    error!(symbol = %symbol, quantity = qty, error = %e, "force exit leg failed");
                    report.failed.push(ExitFailure {
                        symbol,
                        quantity: qty,
                        error: e.to_string(),
                    });
                }
            }
        }

        if !report.had_open_positions() {
            info!("no open positions to force exit");
        }
        Ok(report)
    }
}

#[async_trait]
impl PositionSource for Executor {
    async fn positions(&self) -> Result<Vec<Position>, BrokerError> {
        Executor::positions(self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantity_rounds_half_away_from_zero() {
        assert_eq!(order_quantity(0.5, 100), 50);
        assert_eq!(order_quantity(0.125, 100), 13);
        assert_eq!(order_quantity(0.004, 100), 0);
        assert_eq!(order_quantity(1.0, 100), 100);
    }

    #[test]
    fn degenerate_sizes_are_zero() {
        assert_eq!(order_quantity(0.0, 100), 0);
        assert_eq!(order_quantity(-0.3, 100), 0);
        assert_eq!(order_quantity(f64::NAN, 100), 0);
    }
}
