//! One tick cycle: fetch, fan out over a bounded pool, run each symbol
//! through features, decision, risk, approval and execution.

use std::sync::Arc;

use itd_approval::{ApprovalGate, Judge};
use itd_audit::TradeRecorder;
use itd_config::DeskConfig;
use itd_execution::{BrokerError, ExecutionOutcome, Executor, OrderAck};
use itd_md::{select_universe, MarketDataProvider, ProviderError};
use itd_risk::{ReasonCode, RiskGate};
use itd_schemas::{AlertHandle, GlobalContext, MarketTick};
use itd_strategy::{assemble_features, explain, DecisionModel, FeatureError};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::exclusions::ExclusionSet;

const ALERT_SOURCE: &str = "pipeline";

// ---------------------------------------------------------------------------
// Faults and outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum PipelineFault {
    /// Market data could not be fetched; the whole cycle is skipped.
    #[error("market data unavailable: {0}")]
    MarketData(#[from] ProviderError),
    #[error("data unavailable: {0}")]
    DataUnavailable(#[from] FeatureError),
    #[error("risk check fault: {0}")]
    Risk(String),
    #[error("execution fault: {0}")]
    Execution(#[from] BrokerError),
    #[error("trade log fault: {0}")]
    Record(String),
    #[error("worker for {symbol} panicked")]
    WorkerPanicked { symbol: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum SymbolOutcome {
    DataUnavailable { reason: String },
    Held,
    RiskDenied { reason: ReasonCode, detail: String },
    Vetoed { judge: Judge, reason: String },
    Executed { order: OrderAck },
    ExecutionFailed { error: String },
    /// The worker panicked; nothing is known about how far it got.
    Faulted,
}

impl SymbolOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            SymbolOutcome::DataUnavailable { .. } => "data_unavailable",
            SymbolOutcome::Held => "held",
            SymbolOutcome::RiskDenied { .. } => "risk_denied",
            SymbolOutcome::Vetoed { .. } => "vetoed",
            SymbolOutcome::Executed { .. } => "executed",
            SymbolOutcome::ExecutionFailed { .. } => "execution_failed",
            SymbolOutcome::Faulted => "faulted",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    /// `(symbol, outcome)` in completion order.
    pub outcomes: Vec<(String, SymbolOutcome)>,
}

impl CycleReport {
    pub fn outcome(&self, symbol: &str) -> Option<&SymbolOutcome> {
        self.outcomes.iter().find(|(s, _)| s == symbol).map(|(_, o)| o)
    }

    pub fn executed(&self) -> impl Iterator<Item = &OrderAck> {
        self.outcomes.iter().filter_map(|(_, o)| match o {
            SymbolOutcome::Executed { order } => Some(order),
            _ => None,
        })
    }

    pub fn summary(&self) -> CycleSummary {
        let mut s = CycleSummary {
            symbols: self.outcomes.len(),
            ..CycleSummary::default()
        };
        for (_, o) in &self.outcomes {
            match o {
                SymbolOutcome::DataUnavailable { .. } => s.data_unavailable += 1,
                SymbolOutcome::Held => s.held += 1,
                SymbolOutcome::RiskDenied { .. } => s.risk_denied += 1,
                SymbolOutcome::Vetoed { .. } => s.vetoed += 1,
                SymbolOutcome::Executed { .. } => s.executed += 1,
                SymbolOutcome::ExecutionFailed { .. } | SymbolOutcome::Faulted => s.failed += 1,
            }
        }
        s
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CycleSummary {
    pub symbols: usize,
    pub executed: usize,
    pub held: usize,
    pub risk_denied: usize,
    pub vetoed: usize,
    pub data_unavailable: usize,
    pub failed: usize,
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Collaborators of one pipeline.
pub struct PipelineParts {
    pub market_data: Arc<dyn MarketDataProvider>,
    pub decision: DecisionModel,
    pub risk: RiskGate,
    pub approval: ApprovalGate,
    pub executor: Arc<Executor>,
    pub recorder: Arc<dyn TradeRecorder>,
    pub exclusions: Arc<ExclusionSet>,
    pub alerts: AlertHandle,
}

pub struct Pipeline {
    cfg: Arc<DeskConfig>,
    market_data: Arc<dyn MarketDataProvider>,
    decision: DecisionModel,
    risk: RiskGate,
    approval: ApprovalGate,
    executor: Arc<Executor>,
    recorder: Arc<dyn TradeRecorder>,
    exclusions: Arc<ExclusionSet>,
    alerts: AlertHandle,
    workers: Arc<Semaphore>,
}

impl Pipeline {
    pub fn new(cfg: Arc<DeskConfig>, parts: PipelineParts) -> Self {
        let workers = Arc::new(Semaphore::new(cfg.pipeline.worker_count.max(1)));
        Self {
            cfg,
            market_data: parts.market_data,
            decision: parts.decision,
            risk: parts.risk,
            approval: parts.approval,
            executor: parts.executor,
            recorder: parts.recorder,
            exclusions: parts.exclusions,
            alerts: parts.alerts,
            workers,
        }
    }

    pub fn config(&self) -> &DeskConfig {
        &self.cfg
    }

    pub fn executor(&self) -> &Arc<Executor> {
        &self.executor
    }

    pub fn exclusions(&self) -> &Arc<ExclusionSet> {
        &self.exclusions
    }

    pub fn alerts(&self) -> &AlertHandle {
        &self.alerts
    }

    /// Run one symbol through every stage. Never fails; each fault ends the
    /// symbol's run with an outcome describing it.
    ///
    /// A hold signal ends as [`SymbolOutcome::Held`] right after the decision.
    /// It skips the risk gate and approval rather than passing through them
    /// and becoming a no-op at execution. Either way no order is placed, and
    /// stopping early spares the account read and the approval call.
    pub async fn process_symbol(&self, tick: &MarketTick, ctx: &GlobalContext) -> SymbolOutcome {
        let symbol = tick.symbol.as_str();

        let features = match assemble_features(tick, ctx, &self.cfg.sectors) {
            Ok(f) => f,
            Err(e) => {
                let fault = PipelineFault::from(e);
                warn!(symbol, error = %fault, "skipping symbol");
                self.alerts.warning(ALERT_SOURCE, format!("Error for {symbol}: {fault}"));
                return SymbolOutcome::DataUnavailable {
                    reason: fault.to_string(),
                };
            }
        };

        let signal = self.decision.decide(&features, symbol).await;
        if !signal.is_actionable() {
            debug!(symbol, origin = ?signal.origin, "hold");
            return SymbolOutcome::Held;
        }

        let decision = self.risk.evaluate(&signal, ctx).await;
        if !decision.allowed {
            if decision.reason == ReasonCode::EvaluationFault {
                let fault = PipelineFault::Risk(decision.detail.clone());
                error!(symbol, error = %fault, "risk gate failed closed");
                self.alerts.critical("risk", format!("Risk check error for {symbol}: {}", decision.detail));
            } else {
                info!(symbol, reason = %decision.reason, detail = %decision.detail, "risk denied");
            }
            return SymbolOutcome::RiskDenied {
                reason: decision.reason,
                detail: decision.detail,
            };
        }

        let explanation = explain(&signal, &features, decision.pnl);
        let verdict = self.approval.approve(&signal, &explanation).await;
        if !verdict.approved {
            return SymbolOutcome::Vetoed {
                judge: verdict.judge,
                reason: verdict.reason,
            };
        }

        let order = match self.executor.execute(&signal).await {
            Ok(ExecutionOutcome::Placed(ack)) => ack,
            Ok(ExecutionOutcome::Skipped { reason }) => {
                debug!(symbol, reason, "execution skipped");
                return SymbolOutcome::Held;
            }
            Err(e) => {
                let fault = PipelineFault::from(e);
                error!(symbol, error = %fault, "trade execution failed");
                self.alerts
                    .critical("execution", format!("Trade execution error for {symbol}: {fault}"));
                return SymbolOutcome::ExecutionFailed {
                    error: fault.to_string(),
                };
            }
        };

        // The order is live at this point; a logging failure must not hide it.
        if let Err(e) = self.recorder.record_trade(&signal, &explanation) {
            let fault = PipelineFault::Record(format!("{e:#}"));
            error!(symbol, error = %fault, "trade not recorded");
            self.alerts.critical("audit", format!("Trade log error for {symbol}: {fault}"));
        }
        self.alerts.info(
            ALERT_SOURCE,
            format!("{} Signal: {explanation}", signal.side.as_str().to_uppercase()),
        );
        SymbolOutcome::Executed { order }
    }

    /// Fetch fresh data for the current universe and process every symbol
    /// on the worker pool. Waits for all workers before returning.
    pub async fn run_cycle(self: &Arc<Self>) -> Result<CycleReport, PipelineFault> {
        let universe = select_universe(&self.cfg.universe, &self.exclusions.snapshot());
        if universe.is_empty() {
            debug!("universe empty after exclusions");
            return Ok(CycleReport::default());
        }

        let ticks = self.market_data.fetch_ticks(&universe).await?;
        if ticks.is_empty() {
            return Ok(CycleReport::default());
        }
        let ctx = Arc::new(self.market_data.fetch_context().await?);

        let mut set = JoinSet::new();
        for (symbol, tick) in ticks {
            let this = Arc::clone(self);
            let ctx = Arc::clone(&ctx);
            set.spawn(async move {
                // Inner task isolates panics so the symbol is still known.
                let worker = {
                    let this = Arc::clone(&this);
                    tokio::spawn(async move {
                        let _permit = match Arc::clone(&this.workers).acquire_owned().await {
                            Ok(p) => p,
                            Err(_) => return SymbolOutcome::Faulted,
                        };
                        this.process_symbol(&tick, &ctx).await
                    })
                };
                match worker.await {
                    Ok(outcome) => (symbol, outcome),
                    Err(e) => {
                        let fault = PipelineFault::WorkerPanicked { symbol: symbol.clone() };
                        error!(symbol = %symbol, error = %e, "{fault}");
                        this.alerts.critical(ALERT_SOURCE, format!("Error for {symbol}: {fault}"));
                        (symbol, SymbolOutcome::Faulted)
                    }
                }
            });
        }

        let mut report = CycleReport::default();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(entry) => report.outcomes.push(entry),
                Err(e) => error!(error = %e, "cycle task failed"),
            }
        }
        Ok(report)
    }
}
