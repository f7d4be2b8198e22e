//! itd-risk
//!
//! Ordered, short-circuit risk gate. The first failing condition decides;
//! later conditions are not evaluated. Any internal fault denies.
//!
//! Order: confidence floor, trading hours, drawdown, position size,
//! volatility index, reference gap, foreign futures gap, Asian markets gap,
//! currency move, sector mapping, sector leadership.

mod engine;
mod types;

pub use engine::{check_market_conditions, drawdown, HighWaterMark, RiskGate, RiskPolicy};
pub use types::{ReasonCode, RiskDecision};
