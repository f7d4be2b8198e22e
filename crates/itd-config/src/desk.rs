//! Typed desk configuration.
//!
//! Every section has serde defaults so a minimal YAML file (or none at all)
//! yields a runnable paper configuration. `validate` is the single place that
//! rejects nonsensical values; callers never re-check thresholds.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{bail, Result};
use chrono::NaiveTime;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Root
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeskConfig {
    pub risk: RiskSettings,
    pub schedule: ScheduleSettings,
    pub pipeline: PipelineSettings,
    /// Symbol -> sector name. Symbols absent here are never traded.
    pub sectors: BTreeMap<String, String>,
    /// Tradable universe before exclusions.
    pub universe: Vec<String>,
    pub model: ModelSettings,
    pub approval: ApprovalSettings,
    pub broker: BrokerSettings,
    pub market_data: MarketDataSettings,
    pub alerts: AlertSettings,
    pub audit: AuditSettings,
    pub exclusions: ExclusionSettings,
    pub daemon: DaemonSettings,
}

impl Default for DeskConfig {
    fn default() -> Self {
        let sectors: BTreeMap<String, String> = [
            ("RELIANCE", "NIFTY ENERGY"),
            ("TCS", "NIFTY IT"),
            ("HDFCBANK", "NIFTY BANK"),
            ("INFY", "NIFTY IT"),
            ("HINDUNILVR", "NIFTY FMCG"),
            ("ICICIBANK", "NIFTY BANK"),
            ("SBIN", "NIFTY BANK"),
        ]
        .into_iter()
        .map(|(s, sec)| (s.to_string(), sec.to_string()))
        .collect();
        let universe = sectors.keys().cloned().collect();

        Self {
            risk: RiskSettings::default(),
            schedule: ScheduleSettings::default(),
            pipeline: PipelineSettings::default(),
            sectors,
            universe,
            model: ModelSettings::default(),
            approval: ApprovalSettings::default(),
            broker: BrokerSettings::default(),
            market_data: MarketDataSettings::default(),
            alerts: AlertSettings::default(),
            audit: AuditSettings::default(),
            exclusions: ExclusionSettings::default(),
            daemon: DaemonSettings::default(),
        }
    }
}

impl DeskConfig {
    pub fn sector_of(&self, symbol: &str) -> Option<&str> {
        self.sectors.get(symbol).map(String::as_str)
    }

    pub fn timezone(&self) -> Tz {
        self.schedule.timezone
    }

    /// Reject values the pipeline cannot operate with.
    pub fn validate(&self) -> Result<()> {
        let r = &self.risk;
        unit_interval("risk.confidence_threshold", r.confidence_threshold)?;
        unit_interval("risk.max_drawdown", r.max_drawdown)?;
        if r.max_position_size < 0 {
            bail!("CONFIG_INVALID risk.max_position_size must be >= 0");
        }
        non_negative("risk.capital", r.capital)?;
        if !r.historical_high_pnl.is_finite() {
            bail!("CONFIG_INVALID risk.historical_high_pnl must be finite");
        }
        if r.capital + r.historical_high_pnl <= 0.0 {
            bail!(
                "CONFIG_INVALID risk.capital + risk.historical_high_pnl must be > 0, got {}",
                r.capital + r.historical_high_pnl
            );
        }
        if r.trading_hours.start >= r.trading_hours.end {
            bail!(
                "CONFIG_INVALID risk.trading_hours start {} must be before end {}",
                r.trading_hours.start.format("%H:%M"),
                r.trading_hours.end.format("%H:%M")
            );
        }
        if r.trading_hours.end > self.schedule.cutoff {
            bail!(
                "CONFIG_INVALID risk.trading_hours end {} is after schedule.cutoff {}",
                r.trading_hours.end.format("%H:%M"),
                self.schedule.cutoff.format("%H:%M")
            );
        }
        let g = &r.global_context;
        non_negative("risk.global_context.vix_threshold", g.vix_threshold)?;
        non_negative("risk.global_context.reference_gap", g.reference_gap)?;
        non_negative("risk.global_context.foreign_futures_gap", g.foreign_futures_gap)?;
        non_negative("risk.global_context.asian_markets_gap", g.asian_markets_gap)?;
        non_negative("risk.global_context.currency_change", g.currency_change)?;

        if self.schedule.tick_interval_ms == 0 {
            bail!("CONFIG_INVALID schedule.tick_interval_ms must be > 0");
        }
        if self.schedule.exit_check_interval_ms == 0 {
            bail!("CONFIG_INVALID schedule.exit_check_interval_ms must be > 0");
        }

        let p = &self.pipeline;
        if p.worker_count == 0 {
            bail!("CONFIG_INVALID pipeline.worker_count must be >= 1");
        }
        for (name, ms) in [
            ("pipeline.inference_timeout_ms", p.inference_timeout_ms),
            ("pipeline.order_timeout_ms", p.order_timeout_ms),
            ("pipeline.account_timeout_ms", p.account_timeout_ms),
            ("approval.timeout_ms", self.approval.timeout_ms),
        ] {
            if ms == 0 {
                bail!("CONFIG_INVALID {name} must be > 0");
            }
        }

        unit_interval("approval.primary_min_confidence", self.approval.primary_min_confidence)?;
        unit_interval("approval.mock_min_confidence", self.approval.mock_min_confidence)?;

        if self.universe.is_empty() {
            bail!("CONFIG_INVALID universe must list at least one symbol");
        }
        if self.broker.lot_size == 0 {
            bail!("CONFIG_INVALID broker.lot_size must be > 0");
        }
        Ok(())
    }
}

fn unit_interval(name: &str, v: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&v) {
        bail!("CONFIG_INVALID {name} must be within [0, 1], got {v}");
    }
    Ok(())
}

fn non_negative(name: &str, v: f64) -> Result<()> {
    if !v.is_finite() || v < 0.0 {
        bail!("CONFIG_INVALID {name} must be a non-negative number, got {v}");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Risk
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskSettings {
    pub confidence_threshold: f64,
    pub trading_hours: TradingHours,
    /// Fractional drawdown from the high-water mark that blocks new trades.
    pub max_drawdown: f64,
    /// Max absolute net quantity per symbol.
    pub max_position_size: i64,
    /// Account equity the day's pnl is measured against. Drawdown is taken
    /// on `capital + pnl`, so a zero capital means raw pnl.
    pub capital: f64,
    /// Initial high-water mark for portfolio pnl, on top of `capital`.
    pub historical_high_pnl: f64,
    pub global_context: GlobalContextLimits,
}

impl Default for RiskSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.6,
            trading_hours: TradingHours::default(),
            max_drawdown: 0.05,
            max_position_size: 1_000,
            capital: 1_000_000.0,
            historical_high_pnl: 0.0,
            global_context: GlobalContextLimits::default(),
        }
    }
}

/// Inclusive local-time window in which new entries are permitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradingHours {
    #[serde(with = "hhmm")]
    pub start: NaiveTime,
    #[serde(with = "hhmm")]
    pub end: NaiveTime,
}

impl TradingHours {
    pub fn contains(&self, t: NaiveTime) -> bool {
        self.start <= t && t <= self.end
    }
}

impl Default for TradingHours {
    fn default() -> Self {
        Self {
            start: NaiveTime::from_hms_opt(9, 15, 0).unwrap_or(NaiveTime::MIN),
            end: NaiveTime::from_hms_opt(15, 10, 0).unwrap_or(NaiveTime::MIN),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalContextLimits {
    pub vix_threshold: f64,
    /// Max tolerated gap-down of the reference index (fraction).
    pub reference_gap: f64,
    pub foreign_futures_gap: f64,
    /// Names checked for `foreign_futures_gap`. Empty = every index in the context.
    pub foreign_futures: Vec<String>,
    pub asian_markets_gap: f64,
    /// Names checked for `asian_markets_gap`. Empty = every index in the context.
    pub asian_markets: Vec<String>,
    /// Max tolerated rise of the currency pair (fraction).
    pub currency_change: f64,
}

impl Default for GlobalContextLimits {
    fn default() -> Self {
        Self {
            vix_threshold: 20.0,
            reference_gap: 0.01,
            foreign_futures_gap: 0.01,
            foreign_futures: vec!["S&P 500".into(), "Nasdaq".into(), "Dow".into()],
            asian_markets_gap: 0.01,
            asian_markets: vec!["Nikkei".into(), "Hang Seng".into()],
            currency_change: 0.005,
        }
    }
}

// ---------------------------------------------------------------------------
// Schedule / pipeline
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleSettings {
    /// Exchange-local timezone used for trading hours and the cutoff.
    pub timezone: Tz,
    /// Daily force-exit time (local).
    #[serde(with = "hhmm")]
    pub cutoff: NaiveTime,
    pub tick_interval_ms: u64,
    pub exit_check_interval_ms: u64,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            timezone: chrono_tz::Asia::Kolkata,
            cutoff: NaiveTime::from_hms_opt(15, 15, 0).unwrap_or(NaiveTime::MIN),
            tick_interval_ms: 1_000,
            exit_check_interval_ms: 30_000,
        }
    }
}

impl ScheduleSettings {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn exit_check_interval(&self) -> Duration {
        Duration::from_millis(self.exit_check_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Concurrent per-symbol workers per cycle.
    pub worker_count: usize,
    pub inference_timeout_ms: u64,
    pub order_timeout_ms: u64,
    pub account_timeout_ms: u64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            worker_count: 3,
            inference_timeout_ms: 500,
            order_timeout_ms: 5_000,
            account_timeout_ms: 5_000,
        }
    }
}

impl PipelineSettings {
    pub fn inference_timeout(&self) -> Duration {
        Duration::from_millis(self.inference_timeout_ms)
    }

    pub fn order_timeout(&self) -> Duration {
        Duration::from_millis(self.order_timeout_ms)
    }

    pub fn account_timeout(&self) -> Duration {
        Duration::from_millis(self.account_timeout_ms)
    }
}

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    /// JSON weights for the linear policy. `None` = rule-only.
    pub path: Option<String>,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            path: Some("models/policy.json".to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApprovalSettings {
    pub primary: Option<ProviderSettings>,
    pub secondary: Option<ProviderSettings>,
    /// Minimum signal confidence for the primary provider to be chosen.
    pub primary_min_confidence: f64,
    /// Mock judge denies below this confidence.
    pub mock_min_confidence: f64,
    pub timeout_ms: u64,
}

impl Default for ApprovalSettings {
    fn default() -> Self {
        Self {
            primary: Some(ProviderSettings {
                name: "xai".to_string(),
                base_url: "https://api.x.ai/v1".to_string(),
                model: "grok-3".to_string(),
                api_key_env: "XAI_API_KEY".to_string(),
                max_tokens: 200,
                temperature: 0.7,
            }),
            secondary: Some(ProviderSettings {
                name: "openai".to_string(),
                base_url: "https://api.openai.com/v1".to_string(),
                model: "gpt-4o".to_string(),
                api_key_env: "OPENAI_API_KEY".to_string(),
                max_tokens: 200,
                temperature: 0.7,
            }),
            primary_min_confidence: 0.7,
            mock_min_confidence: 0.6,
            timeout_ms: 10_000,
        }
    }
}

impl ApprovalSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// One chat-completions style judgement provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSettings {
    pub name: String,
    pub base_url: String,
    pub model: String,
    /// NAME of the env var holding the API key.
    pub api_key_env: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
}

fn default_max_tokens() -> u32 {
    200
}

fn default_temperature() -> f64 {
    0.7
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrokerKind {
    Paper,
    Kite,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerSettings {
    pub kind: BrokerKind,
    pub base_url: String,
    pub api_key_env: String,
    pub access_token_env: String,
    /// Dotenv file re-read when the session token expires.
    pub env_file: String,
    pub exchange: String,
    pub product: String,
    /// Units per full-size signal (`qty = round(size * lot_size)`).
    pub lot_size: u32,
    /// Warn every N broker calls.
    pub api_call_warn_every: u64,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            kind: BrokerKind::Paper,
            base_url: "https://api.kite.trade".to_string(),
            api_key_env: "KITE_API_KEY".to_string(),
            access_token_env: "KITE_ACCESS_TOKEN".to_string(),
            env_file: ".env".to_string(),
            exchange: "NSE".to_string(),
            product: "MIS".to_string(),
            lot_size: 100,
            api_call_warn_every: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketDataSettings {
    /// JSON snapshot re-read every cycle by the file provider.
    pub snapshot_path: String,
    pub top_sectors: usize,
}

impl Default for MarketDataSettings {
    fn default() -> Self {
        Self {
            snapshot_path: "data/snapshot.json".to_string(),
            top_sectors: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertSettings {
    /// NAME of the env var holding the webhook URL. Unset = log-only alerts.
    pub webhook_env: Option<String>,
    pub queue_capacity: usize,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            webhook_env: Some("ITD_ALERT_WEBHOOK".to_string()),
            queue_capacity: 256,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditSettings {
    pub path: String,
    pub hash_chain: bool,
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self {
            path: "logs/trades.jsonl".to_string(),
            hash_chain: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExclusionSettings {
    pub path: String,
}

impl Default for ExclusionSettings {
    fn default() -> Self {
        Self {
            path: "data/excluded_stocks.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonSettings {
    pub addr: String,
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8899".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// HH:MM
// ---------------------------------------------------------------------------

/// Parse `HH:MM` (or `HH:MM:SS`) into a local wall-clock time.
pub fn parse_hhmm(raw: &str) -> Result<NaiveTime> {
    let t = raw.trim();
    NaiveTime::parse_from_str(t, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(t, "%H:%M:%S"))
        .map_err(|_| anyhow::anyhow!("invalid time '{t}', expected HH:MM"))
}

mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(t: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&t.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_hhmm(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        DeskConfig::default().validate().unwrap();
    }

    #[test]
    fn trading_hours_are_inclusive() {
        let h = TradingHours::default();
        assert!(h.contains(NaiveTime::from_hms_opt(9, 15, 0).unwrap()));
        assert!(h.contains(NaiveTime::from_hms_opt(15, 10, 0).unwrap()));
        assert!(!h.contains(NaiveTime::from_hms_opt(15, 10, 1).unwrap()));
    }

    #[test]
    fn hhmm_accepts_seconds_and_rejects_garbage() {
        assert_eq!(parse_hhmm("15:15").unwrap(), NaiveTime::from_hms_opt(15, 15, 0).unwrap());
        assert_eq!(parse_hhmm(" 09:30:15 ").unwrap(), NaiveTime::from_hms_opt(9, 30, 15).unwrap());
        assert!(parse_hhmm("25:00").is_err());
        assert!(parse_hhmm("noon").is_err());
    }

    #[test]
    fn zero_workers_rejected() {
        let mut cfg = DeskConfig::default();
        cfg.pipeline.worker_count = 0;
        let err = cfg.validate().unwrap_err().to_string();
        assert!(err.contains("worker_count"), "{err}");
    }

    #[test]
    fn inverted_trading_hours_rejected() {
        let mut cfg = DeskConfig::default();
        cfg.risk.trading_hours = TradingHours {
            start: NaiveTime::from_hms_opt(15, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn entries_may_not_outlive_the_cutoff() {
        let mut cfg = DeskConfig::default();
        cfg.risk.trading_hours.end = NaiveTime::from_hms_opt(15, 20, 0).unwrap();
        let err = cfg.validate().unwrap_err().to_string();
        assert!(err.contains("schedule.cutoff"), "{err}");

        cfg.risk.trading_hours.end = cfg.schedule.cutoff;
        cfg.validate().unwrap();
    }

    #[test]
    fn drawdown_needs_a_positive_mark() {
        let mut cfg = DeskConfig::default();
        cfg.risk.capital = 0.0;
        cfg.risk.historical_high_pnl = 0.0;
        let err = cfg.validate().unwrap_err().to_string();
        assert!(err.contains("historical_high_pnl"), "{err}");

        cfg.risk.historical_high_pnl = 50_000.0;
        cfg.validate().unwrap();

        cfg.risk.capital = -1.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn sector_lookup() {
        let cfg = DeskConfig::default();
        assert_eq!(cfg.sector_of("TCS"), Some("NIFTY IT"));
        assert_eq!(cfg.sector_of("ADANIENT"), None);
    }
}
