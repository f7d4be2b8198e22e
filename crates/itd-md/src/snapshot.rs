//! File-backed provider. An upstream collector (or an operator) rewrites a
//! JSON snapshot; the desk re-reads it every cycle.
//!
//! One read serves a whole cycle: `fetch_ticks` parses the file and parks
//! the snapshot's context for the `fetch_context` call that follows, so a
//! rewrite between the two calls cannot mix snapshots.
//!
//! ```json
//! {
//!   "ticks": { "TCS": { "symbol": "TCS", "open": 1, "high": 2, "low": 0.5,
//!                       "close": 1.5, "volume": 1000, "rsi": 64.2 } },
//!   "context": { "volatility_index": 14.2, "reference_change": 0.003,
//!                "foreign_futures_changes": { "S&P 500": 0.002 },
//!                "asian_markets_changes": { "Nikkei": -0.001 },
//!                "currency_change": 0.0005,
//!                "sector_strength": { "NIFTY IT": 0.012 } }
//! }
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use itd_schemas::{GlobalContext, MarketTick};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{MarketDataProvider, ProviderError};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    #[serde(default)]
    pub ticks: BTreeMap<String, MarketTick>,
    #[serde(default)]
    pub context: Option<GlobalContext>,
}

#[derive(Debug)]
pub struct SnapshotFileProvider {
    path: PathBuf,
    top_sectors: usize,
    /// Context of the snapshot the last `fetch_ticks` read, not yet taken.
    pending_context: Mutex<Option<Option<GlobalContext>>>,
}

impl SnapshotFileProvider {
    pub fn new(path: impl Into<PathBuf>, top_sectors: usize) -> Self {
        Self {
            path: path.into(),
            top_sectors,
            pending_context: Mutex::new(None),
        }
    }

    fn park_context(&self, ctx: Option<Option<GlobalContext>>) {
        *self.pending_context.lock().unwrap_or_else(|e| e.into_inner()) = ctx;
    }

    fn take_parked_context(&self) -> Option<Option<GlobalContext>> {
        self.pending_context.lock().unwrap_or_else(|e| e.into_inner()).take()
    }

    async fn read(&self) -> Result<MarketSnapshot, ProviderError> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| ProviderError::Transport(format!("{}: {e}", self.path.display())))?;
        serde_json::from_str(&raw).map_err(|e| ProviderError::Decode(format!("{}: {e}", self.path.display())))
    }
}

#[async_trait]
impl MarketDataProvider for SnapshotFileProvider {
    fn name(&self) -> &str {
        "snapshot_file"
    }

    async fn fetch_ticks(&self, symbols: &[String]) -> Result<BTreeMap<String, MarketTick>, ProviderError> {
        let mut snap = match self.read().await {
            Ok(s) => s,
            Err(e) => {
                self.park_context(None);
                return Err(e);
            }
        };
        self.park_context(Some(snap.context.take()));
        Ok(symbols
            .iter()
            .filter_map(|s| snap.ticks.remove(s).map(|t| (s.clone(), t)))
            .collect())
    }

    /// Context of the snapshot the preceding `fetch_ticks` read, or a fresh
    /// read when there is none. A snapshot without a context section yields
    /// the empty context.
    async fn fetch_context(&self) -> Result<GlobalContext, ProviderError> {
        let context = match self.take_parked_context() {
            Some(parked) => parked,
            None => self.read().await?.context,
        };
        let Some(ctx) = context else {
            warn!(path = %self.path.display(), "snapshot has no context; using empty context");
            return Ok(GlobalContext::empty());
        };
        if ctx.top_sectors.is_empty() && !ctx.sector_strength.is_empty() {
            let strength = ctx.sector_strength.clone();
            return Ok(ctx.with_sector_strength(strength, self.top_sectors));
        }
        Ok(ctx)
    }
}
