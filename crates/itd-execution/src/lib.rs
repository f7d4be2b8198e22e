//! itd-execution
//!
//! Order placement and end-of-day liquidation against an abstract broker
//! account.
//!
//! - [`BrokerAccount`] is the adapter boundary (paper, Kite, test fakes).
//! - [`Executor`] is the only path the pipeline uses to reach the broker:
//!   every call is counted, bounded by a timeout and retried exactly once
//!   after a session refresh when the broker reports an expired session.
//! - [`ExitSchedule`] latches the daily force-exit so it fires once per
//!   local date.

mod broker;
mod counter;
mod executor;
mod schedule;
mod session;

pub use broker::{BrokerAccount, BrokerError, NoopRefresher, OrderAck, OrderRequest, PositionSource, SessionRefresher};
pub use counter::ApiCallCounter;
pub use executor::{order_quantity, ExecutionOutcome, Executor, ExecutorSettings, ExitFailure, ExitLeg, ExitReport};
pub use schedule::ExitSchedule;
pub use session::with_session_retry;
