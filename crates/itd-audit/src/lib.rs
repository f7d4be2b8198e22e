//! itd-audit
//!
//! Append-only trade log. One JSON object per line, keys sorted, each line
//! optionally chained to the previous one by SHA-256 so edits and deletions
//! are detectable after the fact.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use itd_schemas::TradeSignal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::info;
use uuid::Uuid;

/// Namespace for deterministic event ids.
const EVENT_ID_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2a5e_93d4_4b70_8e21_5c0a_d7b3_e419);

// ---------------------------------------------------------------------------
// TradeRecorder
// ---------------------------------------------------------------------------

/// Sink for executed trades. Called once per placed order.
pub trait TradeRecorder: Send + Sync {
    fn record_trade(&self, signal: &TradeSignal, explanation: &str) -> Result<()>;
}

// ---------------------------------------------------------------------------
// AuditWriter
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: Uuid,
    pub run_id: Uuid,
    pub seq: u64,
    pub ts_utc: DateTime<Utc>,
    pub topic: String,
    pub event_type: String,
    pub payload: Value,
    pub hash_prev: Option<String>,
    pub hash_self: Option<String>,
}

/// Writes JSON Lines to a single file. Reopening an existing log resumes its
/// sequence and hash chain.
#[derive(Debug)]
pub struct AuditWriter {
    path: PathBuf,
    run_id: Uuid,
    hash_chain: bool,
    last_hash: Option<String>,
    seq: u64,
}

impl AuditWriter {
    /// Opens (or creates) the log at `path`, creating parent dirs.
    pub fn open(path: impl AsRef<Path>, hash_chain: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).with_context(|| format!("create_dir_all {parent:?}"))?;
        }

        let (seq, last_hash) = match fs::read_to_string(&path) {
            Ok(content) => resume_state(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => (0, None),
            Err(e) => return Err(e).with_context(|| format!("read audit log {path:?}")),
        };

        Ok(Self {
            path,
            run_id: Uuid::new_v4(),
            hash_chain,
            last_hash,
            seq,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn last_hash(&self) -> Option<&str> {
        self.last_hash.as_deref()
    }

    /// Number of events in the log, including those from earlier runs.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn append(&mut self, topic: &str, event_type: &str, payload: Value) -> Result<AuditEvent> {
        let event_id = derive_event_id(self.last_hash.as_deref(), &payload, self.seq)?;

        let mut ev = AuditEvent {
            event_id,
            run_id: self.run_id,
            seq: self.seq,
            ts_utc: Utc::now(),
            topic: topic.to_string(),
            event_type: event_type.to_string(),
            payload,
            hash_prev: None,
            hash_self: None,
        };

        if self.hash_chain {
            ev.hash_prev = self.last_hash.clone();
            ev.hash_self = Some(compute_event_hash(&ev)?);
        }

        append_line(&self.path, &canonical_json_line(&ev)?)?;

        // Only advance once the line is on disk.
        self.seq += 1;
        if self.hash_chain {
            self.last_hash = ev.hash_self.clone();
        }
        Ok(ev)
    }
}

/// Non-blank lines of a log, parsed, with their 1-based line numbers.
fn parsed_events(content: &str) -> impl Iterator<Item = Result<(usize, AuditEvent)>> + '_ {
    content
        .lines()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty())
        .map(|(i, l)| {
            serde_json::from_str::<AuditEvent>(l.trim())
                .map(|ev| (i + 1, ev))
                .with_context(|| format!("parse audit event at line {}", i + 1))
        })
}

fn resume_state(content: &str) -> Result<(u64, Option<String>)> {
    let mut state = (0, None);
    for entry in parsed_events(content) {
        let (_, ev) = entry?;
        state = (ev.seq + 1, ev.hash_self);
    }
    Ok(state)
}

fn derive_event_id(prev_hash: Option<&str>, payload: &Value, seq: u64) -> Result<Uuid> {
    let body = canonical_json_line(payload)?;
    let name = format!("{}|{}|{}", prev_hash.unwrap_or("-"), seq, body);
    Ok(Uuid::new_v5(&EVENT_ID_NAMESPACE, name.as_bytes()))
}

fn append_line(path: &Path, line: &str) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open audit log {path:?}"))?;
    writeln!(file, "{line}").with_context(|| format!("append to audit log {path:?}"))
}

fn canonical_json_line<T: Serialize>(v: &T) -> Result<String> {
    let value = serde_json::to_value(v).context("audit event is not representable as json")?;
    serde_json::to_string(&sorted(value)).context("audit event json encode")
}

/// Recursively re-inserts object keys in lexical order.
fn sorted(v: Value) -> Value {
    match v {
        Value::Object(map) => {
            let ordered: BTreeMap<String, Value> = map.into_iter().map(|(k, v)| (k, sorted(v))).collect();
            Value::Object(ordered.into_iter().collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sorted).collect()),
        other => other,
    }
}

/// SHA-256 (hex) of the canonical event with `hash_self` cleared.
pub fn compute_event_hash(ev: &AuditEvent) -> Result<String> {
    let unsealed = AuditEvent {
        hash_self: None,
        ..ev.clone()
    };
    let digest = Sha256::digest(canonical_json_line(&unsealed)?.as_bytes());
    Ok(hex::encode(digest))
}

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyResult {
    /// Every line links to its predecessor and hashes to its own seal.
    Valid { lines: usize },
    /// First line (1-based) where the chain does not hold.
    Broken { line: usize, reason: String },
}

pub fn verify_hash_chain(path: impl AsRef<Path>) -> Result<VerifyResult> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).with_context(|| format!("read audit log {path:?}"))?;
    verify_hash_chain_str(&content)
}

pub fn verify_hash_chain_str(content: &str) -> Result<VerifyResult> {
    let mut expected_prev: Option<String> = None;
    let mut checked = 0usize;

    for entry in parsed_events(content) {
        let (line, ev) = entry?;
        checked += 1;

        if ev.hash_prev != expected_prev {
            let reason = format!("hash_prev mismatch: expected {expected_prev:?}, got {:?}", ev.hash_prev);
            return Ok(VerifyResult::Broken { line, reason });
        }
        if let Some(sealed) = ev.hash_self.as_deref() {
            let actual = compute_event_hash(&ev)?;
            if sealed != actual {
                let reason = format!("hash_self mismatch: sealed {sealed}, recomputed {actual}");
                return Ok(VerifyResult::Broken { line, reason });
            }
        }
        expected_prev = ev.hash_self;
    }

    Ok(VerifyResult::Valid { lines: checked })
}

// ---------------------------------------------------------------------------
// AuditTradeLog
// ---------------------------------------------------------------------------

pub const TRADE_TOPIC: &str = "TRADE";
pub const TRADE_EXECUTED: &str = "TRADE_EXECUTED";

/// [`TradeRecorder`] backed by an [`AuditWriter`].
#[derive(Debug)]
pub struct AuditTradeLog {
    writer: Mutex<AuditWriter>,
}

impl AuditTradeLog {
    pub fn open(path: impl AsRef<Path>, hash_chain: bool) -> Result<Self> {
        Ok(Self {
            writer: Mutex::new(AuditWriter::open(path, hash_chain)?),
        })
    }

    pub fn entries(&self) -> u64 {
        self.writer.lock().map(|w| w.seq()).unwrap_or(0)
    }
}

impl TradeRecorder for AuditTradeLog {
    fn record_trade(&self, signal: &TradeSignal, explanation: &str) -> Result<()> {
        let payload = json!({
            "symbol": signal.symbol,
            "side": signal.side,
            "size": signal.size,
            "confidence": signal.confidence,
            "origin": signal.origin,
            "explanation": explanation,
        });
        let mut w = self
            .writer
            .lock()
            .map_err(|_| anyhow!("audit writer lock poisoned"))?;
        let ev = w.append(TRADE_TOPIC, TRADE_EXECUTED, payload)?;
        info!(symbol = %signal.symbol, seq = ev.seq, "trade recorded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_id_depends_on_chain_position() {
        let p = json!({"a": 1});
        let a = derive_event_id(None, &p, 0).unwrap();
        let b = derive_event_id(None, &p, 1).unwrap();
        let c = derive_event_id(Some("abc"), &p, 0).unwrap();
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a, derive_event_id(None, &p, 0).unwrap());
    }

    #[test]
    fn canonical_line_sorts_nested_keys() {
        let line = canonical_json_line(&json!({"b": {"z": 1, "a": 2}, "a": [ {"y": 0, "x": 1} ]})).unwrap();
        assert_eq!(line, r#"{"a":[{"x":1,"y":0}],"b":{"a":2,"z":1}}"#);
    }
}
