//! Request and response types for the itd-daemon HTTP endpoints.
//!
//! No business logic lives here.

use itd_config::BrokerKind;
use itd_runtime::RuntimeStatus;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// /v1/health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: String,
    pub version: String,
}

// ---------------------------------------------------------------------------
// /v1/status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub daemon_uptime_secs: u64,
    pub config_hash: String,
    pub broker: BrokerKind,
    pub universe: usize,
    pub excluded: usize,
    pub runtime: RuntimeStatus,
}

// ---------------------------------------------------------------------------
// /v1/exclusions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolsRequest {
    pub symbols: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExclusionsResponse {
    /// Symbols touched by this request (empty for GET).
    #[serde(default)]
    pub changed: Vec<String>,
    pub excluded: Vec<String>,
}

/// Body of every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    /// Symbols that caused a 400, when applicable.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub invalid: Vec<String>,
}
