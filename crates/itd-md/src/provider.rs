use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use async_trait::async_trait;
use itd_schemas::{GlobalContext, MarketTick};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// Source could not be reached or read.
    Transport(String),
    /// Payload could not be decoded.
    Decode(String),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::Transport(msg) => write!(f, "market data transport error: {msg}"),
            ProviderError::Decode(msg) => write!(f, "market data decode error: {msg}"),
        }
    }
}

impl std::error::Error for ProviderError {}

// ---------------------------------------------------------------------------
// Provider trait
// ---------------------------------------------------------------------------

/// Source of per-cycle market observations.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Latest tick for each requested symbol that has one. Symbols without
    /// data are simply absent; an empty map means nothing to do this cycle.
    async fn fetch_ticks(&self, symbols: &[String]) -> Result<BTreeMap<String, MarketTick>, ProviderError>;

    async fn fetch_context(&self) -> Result<GlobalContext, ProviderError>;
}

/// Configured universe minus exclusions, in configured order, deduplicated.
pub fn select_universe(configured: &[String], excluded: &BTreeSet<String>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    configured
        .iter()
        .filter(|s| !excluded.contains(*s))
        .filter(|s| seen.insert(s.as_str()))
        .cloned()
        .collect()
}
