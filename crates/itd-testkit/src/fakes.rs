use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use itd_approval::{ApprovalError, ApprovalProvider, Judgement};
use itd_audit::TradeRecorder;
use itd_broker_paper::PaperBroker;
use itd_execution::{BrokerAccount, BrokerError, OrderAck, OrderRequest, SessionRefresher};
use itd_md::{MarketDataProvider, ProviderError};
use itd_schemas::{FeatureVector, GlobalContext, MarketTick, Position, TradeSignal};
use itd_strategy::{Inference, InferenceError, InferenceModel};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

// ---------------------------------------------------------------------------
// Market data
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct ScriptedMarketData {
    ticks: Mutex<BTreeMap<String, MarketTick>>,
    context: Mutex<GlobalContext>,
    faults: Mutex<VecDeque<ProviderError>>,
    requests: Mutex<Vec<Vec<String>>>,
}

impl ScriptedMarketData {
    pub fn new(ticks: Vec<MarketTick>, context: GlobalContext) -> Self {
        let md = Self::default();
        md.set_ticks(ticks);
        md.set_context(context);
        md
    }

    pub fn set_ticks(&self, ticks: Vec<MarketTick>) {
        *lock(&self.ticks) = ticks.into_iter().map(|t| (t.symbol.clone(), t)).collect();
    }

    pub fn set_context(&self, context: GlobalContext) {
        *lock(&self.context) = context;
    }

    /// The next `fetch_ticks` fails with `err`.
    pub fn fail_next(&self, err: ProviderError) {
        lock(&self.faults).push_back(err);
    }

    /// Symbol lists passed to `fetch_ticks`, oldest first.
    pub fn requests(&self) -> Vec<Vec<String>> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl MarketDataProvider for ScriptedMarketData {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn fetch_ticks(&self, symbols: &[String]) -> Result<BTreeMap<String, MarketTick>, ProviderError> {
        lock(&self.requests).push(symbols.to_vec());
        if let Some(err) = lock(&self.faults).pop_front() {
            return Err(err);
        }
        let ticks = lock(&self.ticks);
        Ok(symbols
            .iter()
            .filter_map(|s| ticks.get(s).map(|t| (s.clone(), t.clone())))
            .collect())
    }

    async fn fetch_context(&self) -> Result<GlobalContext, ProviderError> {
        Ok(lock(&self.context).clone())
    }
}

// ---------------------------------------------------------------------------
// Inference model
// ---------------------------------------------------------------------------

/// Returns the same inference for every symbol, optionally after a delay.
/// A tick whose RSI equals `panic_on_rsi` makes the model panic.
pub struct ScriptedModel {
    response: Result<Inference, InferenceError>,
    delay: Option<Duration>,
    panic_on_rsi: Option<f64>,
    calls: AtomicUsize,
}

impl ScriptedModel {
    pub fn returning(inference: Inference) -> Self {
        Self {
            response: Ok(inference),
            delay: None,
            panic_on_rsi: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(err: InferenceError) -> Self {
        Self {
            response: Err(err),
            delay: None,
            panic_on_rsi: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn panic_on_rsi(mut self, rsi: f64) -> Self {
        self.panic_on_rsi = Some(rsi);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InferenceModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn infer(&self, features: &FeatureVector) -> Result<Inference, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.panic_on_rsi == Some(features.rsi()) {
            panic!("scripted model panic at rsi {}", features.rsi());
        }
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        self.response.clone()
    }
}

// ---------------------------------------------------------------------------
// Approval provider
// ---------------------------------------------------------------------------

pub struct ScriptedApprover {
    name: String,
    verdict: Result<Judgement, ApprovalError>,
    calls: AtomicUsize,
}

impl ScriptedApprover {
    pub fn approving(name: &str) -> Self {
        Self::with(name, Ok(Judgement {
            approved: true,
            reason: "looks fine".to_string(),
        }))
    }

    pub fn rejecting(name: &str, reason: &str) -> Self {
        Self::with(name, Ok(Judgement {
            approved: false,
            reason: reason.to_string(),
        }))
    }

    pub fn failing(name: &str) -> Self {
        Self::with(name, Err(ApprovalError::Transport {
            provider: name.to_string(),
            message: "connection refused".to_string(),
        }))
    }

    fn with(name: &str, verdict: Result<Judgement, ApprovalError>) -> Self {
        Self {
            name: name.to_string(),
            verdict,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ApprovalProvider for ScriptedApprover {
    fn name(&self) -> &str {
        &self.name
    }

    async fn judge(&self, _signal: &TradeSignal, _explanation: &str) -> Result<Judgement, ApprovalError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.verdict.clone()
    }
}

// ---------------------------------------------------------------------------
// Broker
// ---------------------------------------------------------------------------

/// Wraps a [`PaperBroker`], adds latency, order-only fault injection and
/// concurrency tracking.
pub struct TrackingBroker {
    inner: Arc<PaperBroker>,
    delay: Duration,
    order_faults: Mutex<VecDeque<BrokerError>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    position_calls: AtomicUsize,
    order_calls: AtomicUsize,
}

impl TrackingBroker {
    pub fn new(inner: Arc<PaperBroker>, delay: Duration) -> Self {
        Self {
            inner,
            delay,
            order_faults: Mutex::new(VecDeque::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            position_calls: AtomicUsize::new(0),
            order_calls: AtomicUsize::new(0),
        }
    }

    /// The next `place_order` fails with `err` (positions are unaffected).
    pub fn fail_next_order(&self, err: BrokerError) {
        lock(&self.order_faults).push_back(err);
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn position_calls(&self) -> usize {
        self.position_calls.load(Ordering::SeqCst)
    }

    pub fn order_calls(&self) -> usize {
        self.order_calls.load(Ordering::SeqCst)
    }

    async fn tracked<T>(&self, fut: impl std::future::Future<Output = T>) -> T {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let out = fut.await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        out
    }
}

#[async_trait]
impl BrokerAccount for TrackingBroker {
    fn name(&self) -> &str {
        "tracking-paper"
    }

    async fn positions(&self) -> Result<Vec<Position>, BrokerError> {
        self.position_calls.fetch_add(1, Ordering::SeqCst);
        self.tracked(self.inner.positions()).await
    }

    async fn place_order(&self, req: &OrderRequest) -> Result<OrderAck, BrokerError> {
        self.order_calls.fetch_add(1, Ordering::SeqCst);
        let fault = lock(&self.order_faults).pop_front();
        self.tracked(async {
            match fault {
                Some(err) => Err(err),
                None => self.inner.place_order(req).await,
            }
        })
        .await
    }
}

#[derive(Default)]
pub struct CountingRefresher {
    calls: AtomicUsize,
    fail: bool,
}

impl CountingRefresher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: true,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionRefresher for CountingRefresher {
    async fn refresh(&self) -> Result<(), BrokerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(BrokerError::RefreshFailed("token unchanged".to_string()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Trade recorder
// ---------------------------------------------------------------------------

/// Keeps every recorded trade in memory and optionally forwards to a real
/// recorder (e.g. the audit log).
#[derive(Default)]
pub struct MemoryRecorder {
    trades: Mutex<Vec<(TradeSignal, String)>>,
    forward: Option<Arc<dyn TradeRecorder>>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn forwarding(inner: Arc<dyn TradeRecorder>) -> Self {
        Self {
            trades: Mutex::new(Vec::new()),
            forward: Some(inner),
        }
    }

    pub fn trades(&self) -> Vec<(TradeSignal, String)> {
        lock(&self.trades).clone()
    }
}

impl TradeRecorder for MemoryRecorder {
    fn record_trade(&self, signal: &TradeSignal, explanation: &str) -> Result<()> {
        lock(&self.trades).push((signal.clone(), explanation.to_string()));
        if let Some(inner) = &self.forward {
            inner.record_trade(signal, explanation)?;
        }
        Ok(())
    }
}
