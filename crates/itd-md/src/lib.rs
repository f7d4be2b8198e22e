//! itd-md
//!
//! Market-data boundary: per-symbol ticks plus the shared global context,
//! fetched fresh every cycle.

mod provider;
mod snapshot;

pub use provider::{select_universe, MarketDataProvider, ProviderError};
pub use snapshot::{MarketSnapshot, SnapshotFileProvider};
