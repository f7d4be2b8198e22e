//! itd-testkit
//!
//! Scripted fakes for every pipeline collaborator, fixtures, and a
//! [`Harness`] that wires them into a real [`itd_runtime::Pipeline`] and
//! [`itd_runtime::Orchestrator`]. No network, no model files.

mod fakes;
mod fixtures;
mod harness;

pub use fakes::{
    CountingRefresher, MemoryRecorder, ScriptedApprover, ScriptedMarketData, ScriptedModel, TrackingBroker,
};
pub use fixtures::{calm_context, desk_config, ist, sell_inference, tick, universe_of};
pub use harness::{Harness, HarnessBuilder};
