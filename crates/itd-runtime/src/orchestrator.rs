//! Drives the pipeline: a tick loop running one cycle per interval and an
//! independent exit timer that flattens the book once per day at the cutoff.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use itd_execution::{ExitReport, ExitSchedule};
use itd_schemas::Clock;
use serde::Serialize;
use tokio::sync::{watch, RwLock};
use tokio::time::MissedTickBehavior;
use tracing::{error, info, info_span, Instrument};

use crate::pipeline::{CycleReport, CycleSummary, Pipeline};

const ALERT_SOURCE: &str = "orchestrator";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    #[default]
    Idle,
    Running,
    Stopped,
}

/// Point-in-time view of the runtime, served by the daemon.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RuntimeStatus {
    pub state: RunState,
    pub cycles: u64,
    pub cycle_faults: u64,
    pub last_cycle_at: Option<DateTime<Utc>>,
    pub last_cycle: Option<CycleSummary>,
    pub last_exit_date: Option<NaiveDate>,
    pub last_exit: Option<ExitReport>,
    pub api_calls: u64,
}

pub type StatusBoard = Arc<RwLock<RuntimeStatus>>;

pub struct Orchestrator {
    pipeline: Arc<Pipeline>,
    schedule: ExitSchedule,
    clock: Arc<dyn Clock>,
    tick_interval: Duration,
    exit_check_interval: Duration,
    cycles: AtomicU64,
    status: StatusBoard,
}

impl Orchestrator {
    pub fn new(pipeline: Arc<Pipeline>, clock: Arc<dyn Clock>) -> Self {
        let sched = &pipeline.config().schedule;
        let schedule = ExitSchedule::new(sched.cutoff, sched.timezone);
        let tick_interval = sched.tick_interval();
        let exit_check_interval = sched.exit_check_interval();
        Self {
            pipeline,
            schedule,
            clock,
            tick_interval,
            exit_check_interval,
            cycles: AtomicU64::new(0),
            status: Arc::new(RwLock::new(RuntimeStatus::default())),
        }
    }

    pub fn status(&self) -> StatusBoard {
        Arc::clone(&self.status)
    }

    pub fn schedule(&self) -> &ExitSchedule {
        &self.schedule
    }

    /// Run one cycle. A cycle fault is logged and alerted, never returned.
    pub async fn tick(&self) -> Option<CycleReport> {
        let n = self.cycles.fetch_add(1, Ordering::Relaxed) + 1;
        let result = self.pipeline.run_cycle().instrument(info_span!("cycle", n)).await;

        let mut st = self.status.write().await;
        st.cycles = n;
        st.last_cycle_at = Some(self.clock.now());
        st.api_calls = self.pipeline.executor().api_calls();
        match result {
            Ok(report) => {
                let summary = report.summary();
                if summary.symbols > 0 {
                    info!(cycle = n, ?summary, "cycle complete");
                }
                st.last_cycle = Some(summary);
                Some(report)
            }
            Err(e) => {
                st.cycle_faults += 1;
                drop(st);
                error!(cycle = n, error = %e, "cycle failed");
                self.pipeline.alerts().critical(ALERT_SOURCE, format!("Cycle error: {e}"));
                None
            }
        }
    }

    /// Fire the daily force exit if it is due. Returns the report when the
    /// exit ran.
    pub async fn check_exit(&self) -> Option<ExitReport> {
        let now = self.clock.now();
        let date = self.schedule.try_fire(now)?;
        let alerts = self.pipeline.alerts();
        let cfg = &self.pipeline.config().schedule;
        info!(%date, cutoff = %self.schedule.cutoff(), "force exit due");

        let report = match self.pipeline.executor().force_exit_all().await {
            Ok(r) => r,
            Err(e) => {
                // positions unreadable: nothing was attempted, try again next check
                self.schedule.release(date);
                error!(%date, error = %e, "force exit could not start");
                alerts.critical(ALERT_SOURCE, format!("Force exit error: {e}"));
                return None;
            }
        };

        if !report.had_open_positions() {
            let local = now.with_timezone(&cfg.timezone);
            alerts.info(
                ALERT_SOURCE,
                format!(
                    "No open positions to force exit at {} {}",
                    self.schedule.cutoff().format("%H:%M"),
                    local.format("%Z")
                ),
            );
        }
        for leg in &report.closed {
            alerts.info(
                ALERT_SOURCE,
                format!("Force exited {} for {}, quantity: {}", leg.direction, leg.symbol, leg.quantity),
            );
        }
        for f in &report.failed {
            alerts.critical(ALERT_SOURCE, format!("Force exit error for {}: {}", f.symbol, f.error));
        }

        let mut st = self.status.write().await;
        st.last_exit_date = Some(date);
        st.last_exit = Some(report.clone());
        st.api_calls = self.pipeline.executor().api_calls();
        Some(report)
    }

    /// Run the tick loop and the exit timer until `shutdown` flips to true
    /// (or its sender is dropped). An in-flight cycle always completes.
    pub async fn run(self: Arc<Self>, shutdown: watch::Receiver<bool>) {
        self.status.write().await.state = RunState::Running;
        info!(
            tick_ms = self.tick_interval.as_millis() as u64,
            exit_check_ms = self.exit_check_interval.as_millis() as u64,
            cutoff = %self.schedule.cutoff(),
            "orchestrator started"
        );

        let exit_timer = {
            let this = Arc::clone(&self);
            let mut shutdown = shutdown.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(this.exit_check_interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            this.check_exit().await;
                        }
                        changed = shutdown.changed() => {
                            if changed.is_err() || *shutdown.borrow() {
                                break;
                            }
                        }
                    }
                }
            })
        };

        let mut shutdown = shutdown;
        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        if let Err(e) = exit_timer.await {
            error!(error = %e, "exit timer task failed");
        }
        self.status.write().await.state = RunState::Stopped;
        info!(cycles = self.cycles.load(Ordering::Relaxed), "orchestrator stopped");
    }
}
