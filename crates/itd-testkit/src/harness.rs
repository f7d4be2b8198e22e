//! Builds a real [`Pipeline`] and [`Orchestrator`] around scripted
//! collaborators and a paper broker.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use itd_approval::{ApprovalGate, ApprovalProvider};
use itd_audit::TradeRecorder;
use itd_broker_paper::PaperBroker;
use itd_config::DeskConfig;
use itd_execution::{ApiCallCounter, Executor, ExecutorSettings, SessionRefresher};
use itd_risk::{RiskGate, RiskPolicy};
use itd_runtime::{ExclusionSet, MemoryExclusionStore, Orchestrator, Pipeline, PipelineParts};
use itd_schemas::{Alert, AlertHandle, FixedClock, GlobalContext, MarketTick};
use itd_strategy::{DecisionModel, InferenceModel};
use tokio::sync::mpsc;

use crate::fakes::{CountingRefresher, MemoryRecorder, ScriptedMarketData, TrackingBroker};
use crate::fixtures::desk_config;

pub struct HarnessBuilder {
    cfg: DeskConfig,
    now: DateTime<Utc>,
    ticks: Vec<MarketTick>,
    context: GlobalContext,
    model: Option<Arc<dyn InferenceModel>>,
    primary: Option<Arc<dyn ApprovalProvider>>,
    secondary: Option<Arc<dyn ApprovalProvider>>,
    broker_delay: Duration,
    refresher: Arc<CountingRefresher>,
    recorder: Option<Arc<dyn TradeRecorder>>,
    excluded: BTreeSet<String>,
}

impl HarnessBuilder {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            cfg: desk_config(),
            now,
            ticks: Vec::new(),
            context: GlobalContext::empty(),
            model: None,
            primary: None,
            secondary: None,
            broker_delay: Duration::ZERO,
            refresher: Arc::new(CountingRefresher::new()),
            recorder: None,
            excluded: BTreeSet::new(),
        }
    }

    pub fn config(mut self, f: impl FnOnce(&mut DeskConfig)) -> Self {
        f(&mut self.cfg);
        self
    }

    pub fn market(mut self, ticks: Vec<MarketTick>, context: GlobalContext) -> Self {
        self.ticks = ticks;
        self.context = context;
        self
    }

    pub fn model(mut self, model: Arc<dyn InferenceModel>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn primary(mut self, judge: Arc<dyn ApprovalProvider>) -> Self {
        self.primary = Some(judge);
        self
    }

    pub fn secondary(mut self, judge: Arc<dyn ApprovalProvider>) -> Self {
        self.secondary = Some(judge);
        self
    }

    pub fn broker_delay(mut self, delay: Duration) -> Self {
        self.broker_delay = delay;
        self
    }

    pub fn refresher(mut self, refresher: Arc<CountingRefresher>) -> Self {
        self.refresher = refresher;
        self
    }

    /// Forward recorded trades to `inner` as well as keeping them in memory.
    pub fn recorder(mut self, inner: Arc<dyn TradeRecorder>) -> Self {
        self.recorder = Some(inner);
        self
    }

    pub fn excluded(mut self, symbols: &[&str]) -> Self {
        self.excluded = symbols.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn build(self) -> Harness {
        let cfg = Arc::new(self.cfg);
        let (alerts, rx) = AlertHandle::channel(1024);
        let clock = Arc::new(FixedClock::new(self.now));

        let paper = Arc::new(PaperBroker::new());
        let broker = Arc::new(TrackingBroker::new(Arc::clone(&paper), self.broker_delay));
        let counter = Arc::new(ApiCallCounter::new(cfg.broker.api_call_warn_every, alerts.clone()));
        let executor = Arc::new(Executor::new(
            broker.clone(),
            self.refresher.clone() as Arc<dyn SessionRefresher>,
            counter,
            ExecutorSettings {
                lot_size: cfg.broker.lot_size,
                order_timeout: cfg.pipeline.order_timeout(),
                account_timeout: cfg.pipeline.account_timeout(),
            },
        ));

        let market_data = Arc::new(ScriptedMarketData::new(self.ticks, self.context));
        let recorder = Arc::new(match self.recorder {
            Some(inner) => MemoryRecorder::forwarding(inner),
            None => MemoryRecorder::new(),
        });
        let exclusion_store = Arc::new(MemoryExclusionStore::new(self.excluded));
        let exclusions = Arc::new(ExclusionSet::load(&cfg.universe, exclusion_store, alerts.clone()));

        let parts = PipelineParts {
            market_data: market_data.clone(),
            decision: DecisionModel::new(self.model, cfg.pipeline.inference_timeout(), alerts.clone()),
            risk: RiskGate::new(
                RiskPolicy::from_desk(&cfg),
                cfg.risk.historical_high_pnl,
                executor.clone(),
                clock.clone(),
            ),
            approval: ApprovalGate::new(self.primary, self.secondary, &cfg.approval, alerts.clone()),
            executor,
            recorder: recorder.clone(),
            exclusions,
            alerts,
        };
        let pipeline = Arc::new(Pipeline::new(Arc::clone(&cfg), parts));
        let orchestrator = Arc::new(Orchestrator::new(Arc::clone(&pipeline), clock.clone()));

        Harness {
            pipeline,
            orchestrator,
            clock,
            paper,
            broker,
            market_data,
            recorder,
            refresher: self.refresher,
            alerts_rx: Mutex::new(rx),
        }
    }
}

/// A wired desk plus handles on every fake for assertions.
pub struct Harness {
    pub pipeline: Arc<Pipeline>,
    pub orchestrator: Arc<Orchestrator>,
    pub clock: Arc<FixedClock>,
    pub paper: Arc<PaperBroker>,
    pub broker: Arc<TrackingBroker>,
    pub market_data: Arc<ScriptedMarketData>,
    pub recorder: Arc<MemoryRecorder>,
    pub refresher: Arc<CountingRefresher>,
    alerts_rx: Mutex<mpsc::Receiver<Alert>>,
}

impl Harness {
    /// Every alert queued since the last drain, oldest first.
    pub fn drain_alerts(&self) -> Vec<Alert> {
        let mut rx = self.alerts_rx.lock().unwrap_or_else(|e| e.into_inner());
        let mut out = Vec::new();
        while let Ok(a) = rx.try_recv() {
            out.push(a);
        }
        out
    }

    pub fn alert_messages(&self) -> Vec<String> {
        self.drain_alerts().into_iter().map(|a| a.message).collect()
    }
}
