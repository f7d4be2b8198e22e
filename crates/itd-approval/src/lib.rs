//! itd-approval
//!
//! Second-opinion veto on trades that passed the risk gate.
//!
//! Provider choice: a confident signal (>= `primary_min_confidence`) goes to
//! the primary provider when one is configured; otherwise the secondary is
//! asked. Any provider fault (unconfigured, transport, bad payload, timeout)
//! degrades to a deterministic mock judge, so [`ApprovalGate::approve`]
//! always returns a verdict.

mod chat;
mod gate;
mod mock;
mod provider;

pub use chat::{build_prompt, parse_verdict, ChatCompletionsProvider};
pub use gate::{ApprovalGate, ApprovalOutcome, Judge};
pub use mock::mock_judgement;
pub use provider::{ApprovalError, ApprovalProvider, Judgement};
