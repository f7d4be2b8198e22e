//! Deterministic in-memory "paper" broker.
//!
//! - Market orders fill immediately at no price; the signed position is
//!   updated so a later `positions()` sees the fill, which makes a
//!   second force exit a no-op.
//! - Order ids are `paper-{seq}` with a per-broker counter. No randomness.
//! - PnL per symbol is whatever the test or operator set with
//!   [`PaperBroker::set_pnl`]; the broker does not mark to market.
//! - Faults can be queued with [`PaperBroker::fail_next`] to exercise the
//!   retry and alert paths.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use itd_execution::{BrokerAccount, BrokerError, OrderAck, OrderRequest};
use itd_schemas::{OrderDirection, Position};
use tracing::debug;

#[derive(Debug, Default, Clone, PartialEq)]
struct Holding {
    quantity: i64,
    realized_pnl: f64,
    unrealized_pnl: f64,
}

#[derive(Debug, Default)]
struct Book {
    holdings: BTreeMap<String, Holding>,
    orders: Vec<OrderAck>,
    pending_faults: VecDeque<BrokerError>,
    seq: u64,
}

#[derive(Debug, Default)]
pub struct PaperBroker {
    book: Mutex<Book>,
}

impl PaperBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn book(&self) -> std::sync::MutexGuard<'_, Book> {
        self.book.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Set a position for scenario setup.
    pub fn set_position(&self, symbol: impl Into<String>, quantity: i64) {
        self.book().holdings.entry(symbol.into()).or_default().quantity = quantity;
    }

    pub fn set_pnl(&self, symbol: impl Into<String>, realized: f64, unrealized: f64) {
        let mut book = self.book();
        let h = book.holdings.entry(symbol.into()).or_default();
        h.realized_pnl = realized;
        h.unrealized_pnl = unrealized;
    }

    /// The next broker call (positions or order) fails with `err`.
    pub fn fail_next(&self, err: BrokerError) {
        self.book().pending_faults.push_back(err);
    }

    /// Every order acknowledged so far, oldest first.
    pub fn orders(&self) -> Vec<OrderAck> {
        self.book().orders.clone()
    }

    pub fn quantity(&self, symbol: &str) -> i64 {
        self.book().holdings.get(symbol).map(|h| h.quantity).unwrap_or(0)
    }
}

#[async_trait]
impl BrokerAccount for PaperBroker {
    fn name(&self) -> &str {
        "paper"
    }

    async fn positions(&self) -> Result<Vec<Position>, BrokerError> {
        let mut book = self.book();
        if let Some(err) = book.pending_faults.pop_front() {
            return Err(err);
        }
        Ok(book
            .holdings
            .iter()
            .map(|(symbol, h)| {
                Position::new(symbol.clone(), h.quantity).with_pnl(h.realized_pnl, h.unrealized_pnl)
            })
            .collect())
    }

    async fn place_order(&self, req: &OrderRequest) -> Result<OrderAck, BrokerError> {
        let mut book = self.book();
        if let Some(err) = book.pending_faults.pop_front() {
            return Err(err);
        }
        if req.quantity == 0 {
            return Err(BrokerError::Rejected("quantity must be positive".to_string()));
        }
        let qty = i64::try_from(req.quantity)
            .map_err(|_| BrokerError::Rejected(format!("quantity {} out of range", req.quantity)))?;

        book.seq += 1;
        let ack = OrderAck {
            order_id: format!("paper-{}", book.seq),
            symbol: req.symbol.clone(),
            direction: req.direction,
            quantity: req.quantity,
        };

        let h = book.holdings.entry(req.symbol.clone()).or_default();
        match req.direction {
            OrderDirection::Buy => h.quantity += qty,
            OrderDirection::Sell => h.quantity -= qty,
        }
        debug!(order_id = %ack.order_id, symbol = %ack.symbol, net = h.quantity, "paper fill");

        book.orders.push(ack.clone());
        Ok(ack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fills_update_positions() {
        let b = PaperBroker::new();
        b.place_order(&OrderRequest::market("TCS", OrderDirection::Buy, 30)).await.unwrap();
        b.place_order(&OrderRequest::market("TCS", OrderDirection::Sell, 50)).await.unwrap();
        assert_eq!(b.quantity("TCS"), -20);

        let pos = b.positions().await.unwrap();
        assert_eq!(pos, vec![Position::new("TCS", -20)]);
    }

    #[tokio::test]
    async fn order_ids_are_sequential() {
        let b = PaperBroker::new();
        let a1 = b.place_order(&OrderRequest::market("A", OrderDirection::Buy, 1)).await.unwrap();
        let a2 = b.place_order(&OrderRequest::market("B", OrderDirection::Buy, 1)).await.unwrap();
        assert_eq!((a1.order_id.as_str(), a2.order_id.as_str()), ("paper-1", "paper-2"));
    }

    #[tokio::test]
    async fn queued_fault_is_returned_once() {
        let b = PaperBroker::new();
        b.fail_next(BrokerError::SessionExpired("Invalid access token".into()));
        assert!(b.positions().await.unwrap_err().is_session_expired());
        assert!(b.positions().await.is_ok());
    }

    #[tokio::test]
    async fn pnl_is_reported_per_symbol() {
        let b = PaperBroker::new();
        b.set_position("SBIN", 10);
        b.set_pnl("SBIN", 120.0, -20.0);
        let pos = b.positions().await.unwrap();
        assert_eq!(pos[0].pnl(), 100.0);
    }
}
