//! Shared state for itd-daemon handlers.

use std::sync::Arc;

use itd_config::DeskConfig;
use itd_runtime::{ExclusionSet, StatusBoard};

/// Static build metadata included in health responses.
#[derive(Clone, Debug)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

/// Handlers receive `State<Arc<AppState>>`.
#[derive(Clone)]
pub struct AppState {
    pub build: BuildInfo,
    pub cfg: Arc<DeskConfig>,
    pub config_hash: String,
    /// Written by the orchestrator, read by `/v1/status`.
    pub status: StatusBoard,
    pub exclusions: Arc<ExclusionSet>,
}

impl AppState {
    pub fn new(cfg: Arc<DeskConfig>, config_hash: String, status: StatusBoard, exclusions: Arc<ExclusionSet>) -> Self {
        Self {
            build: BuildInfo {
                service: "itd-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
            cfg,
            config_hash,
            status,
            exclusions,
        }
    }
}

/// Seconds since first call (process lifetime).
pub fn uptime_secs() -> u64 {
    static START: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();
    START.get_or_init(std::time::Instant::now).elapsed().as_secs()
}
