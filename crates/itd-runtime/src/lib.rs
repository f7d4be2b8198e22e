//! itd-runtime
//!
//! Wires the stages into a running desk.
//!
//! - [`Pipeline`]: one tick cycle over the current universe on a bounded
//!   worker pool.
//! - [`Orchestrator`]: tick loop, daily exit timer, status board.
//! - [`ExclusionSet`]: operator exclusions, persisted through a store.
//! - Alert sinks and the dispatcher that drains the alert queue.

mod alerts;
mod exclusions;
mod orchestrator;
mod pipeline;

pub use alerts::{render_alert, spawn_alert_dispatcher, AlertSink, LogAlertSink, WebhookAlertSink};
pub use exclusions::{ExclusionError, ExclusionSet, ExclusionStore, JsonExclusionStore, MemoryExclusionStore};
pub use orchestrator::{Orchestrator, RunState, RuntimeStatus, StatusBoard};
pub use pipeline::{CycleReport, CycleSummary, Pipeline, PipelineFault, PipelineParts, SymbolOutcome};
