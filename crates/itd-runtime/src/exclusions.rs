//! Operator-managed exclusion list.
//!
//! The set lives in memory behind a mutex and is written through to a store
//! on every change. A change is committed in memory only after the store
//! accepted it.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use itd_schemas::AlertHandle;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExclusionError {
    #[error("symbols not in the configured universe: {}", .0.join(", "))]
    UnknownSymbols(Vec<String>),
    #[error("no symbols given")]
    Empty,
    #[error("exclusion store error: {0}")]
    Store(String),
}

pub trait ExclusionStore: Send + Sync {
    fn load(&self) -> Result<BTreeSet<String>, ExclusionError>;
    fn save(&self, excluded: &BTreeSet<String>) -> Result<(), ExclusionError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct ExclusionFile {
    #[serde(default)]
    excluded_stocks: Vec<String>,
}

/// `{"excluded_stocks": [...]}` on disk. A missing file is an empty set.
#[derive(Debug, Clone)]
pub struct JsonExclusionStore {
    path: PathBuf,
}

impl JsonExclusionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ExclusionStore for JsonExclusionStore {
    fn load(&self) -> Result<BTreeSet<String>, ExclusionError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeSet::new()),
            Err(e) => return Err(ExclusionError::Store(format!("{}: {e}", self.path.display()))),
        };
        let file: ExclusionFile = serde_json::from_str(&raw)
            .map_err(|e| ExclusionError::Store(format!("{}: {e}", self.path.display())))?;
        Ok(file.excluded_stocks.into_iter().collect())
    }

    fn save(&self, excluded: &BTreeSet<String>) -> Result<(), ExclusionError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| ExclusionError::Store(format!("{}: {e}", parent.display())))?;
        }
        let body = serde_json::to_string_pretty(&ExclusionFile {
            excluded_stocks: excluded.iter().cloned().collect(),
        })
        .map_err(|e| ExclusionError::Store(e.to_string()))?;

        // tmp + rename: readers see the old file or the new one
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, body).map_err(|e| ExclusionError::Store(format!("{}: {e}", tmp.display())))?;
        fs::rename(&tmp, &self.path).map_err(|e| ExclusionError::Store(format!("{}: {e}", self.path.display())))
    }
}

#[derive(Debug, Default)]
pub struct MemoryExclusionStore {
    saved: Mutex<BTreeSet<String>>,
}

impl MemoryExclusionStore {
    pub fn new(initial: BTreeSet<String>) -> Self {
        Self {
            saved: Mutex::new(initial),
        }
    }

    pub fn saved(&self) -> BTreeSet<String> {
        self.saved.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl ExclusionStore for MemoryExclusionStore {
    fn load(&self) -> Result<BTreeSet<String>, ExclusionError> {
        self.saved
            .lock()
            .map(|s| s.clone())
            .map_err(|_| ExclusionError::Store("memory store poisoned".into()))
    }

    fn save(&self, excluded: &BTreeSet<String>) -> Result<(), ExclusionError> {
        let mut saved = self
            .saved
            .lock()
            .map_err(|_| ExclusionError::Store("memory store poisoned".into()))?;
        *saved = excluded.clone();
        Ok(())
    }
}

pub struct ExclusionSet {
    universe: BTreeSet<String>,
    excluded: Mutex<BTreeSet<String>>,
    store: Arc<dyn ExclusionStore>,
    alerts: AlertHandle,
}

impl ExclusionSet {
    /// Load the persisted set. An unreadable store starts empty and alerts.
    pub fn load(universe: &[String], store: Arc<dyn ExclusionStore>, alerts: AlertHandle) -> Self {
        let excluded = match store.load() {
            Ok(set) => set,
            Err(e) => {
                error!(error = %e, "failed to load excluded stocks; starting empty");
                alerts.critical("exclusions", format!("Error loading excluded stocks: {e}"));
                BTreeSet::new()
            }
        };
        Self {
            universe: universe.iter().cloned().collect(),
            excluded: Mutex::new(excluded),
            store,
            alerts,
        }
    }

    fn guard(&self) -> MutexGuard<'_, BTreeSet<String>> {
        self.excluded.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn snapshot(&self) -> BTreeSet<String> {
        self.guard().clone()
    }

    pub fn is_excluded(&self, symbol: &str) -> bool {
        self.guard().contains(symbol)
    }

    /// Add symbols. Every symbol must be in the universe; otherwise nothing
    /// changes and the offending symbols are reported.
    pub fn exclude(&self, symbols: &[String]) -> Result<BTreeSet<String>, ExclusionError> {
        let wanted = normalise(symbols)?;
        let unknown: Vec<String> = wanted.iter().filter(|s| !self.universe.contains(*s)).cloned().collect();
        if !unknown.is_empty() {
            return Err(ExclusionError::UnknownSymbols(unknown));
        }
        self.update(|set| set.extend(wanted.iter().cloned()))?;
        info!(symbols = ?wanted, "excluded stocks");
        Ok(wanted)
    }

    /// Remove symbols. Symbols that were not excluded are ignored.
    pub fn include(&self, symbols: &[String]) -> Result<BTreeSet<String>, ExclusionError> {
        let wanted = normalise(symbols)?;
        self.update(|set| set.retain(|s| !wanted.contains(s)))?;
        info!(symbols = ?wanted, "included stocks");
        Ok(wanted)
    }

    fn update(&self, apply: impl FnOnce(&mut BTreeSet<String>)) -> Result<(), ExclusionError> {
        let mut current = self.guard();
        let mut next = current.clone();
        apply(&mut next);
        if let Err(e) = self.store.save(&next) {
            error!(error = %e, "failed to save excluded stocks");
            self.alerts.critical("exclusions", format!("Error saving excluded stocks: {e}"));
            return Err(e);
        }
        *current = next;
        Ok(())
    }
}

fn normalise(symbols: &[String]) -> Result<BTreeSet<String>, ExclusionError> {
    let set: BTreeSet<String> = symbols
        .iter()
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect();
    if set.is_empty() {
        return Err(ExclusionError::Empty);
    }
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn universe() -> Vec<String> {
        ["RELIANCE", "TCS", "INFY"].iter().map(|s| s.to_string()).collect()
    }

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    struct BrokenStore;

    impl ExclusionStore for BrokenStore {
        fn load(&self) -> Result<BTreeSet<String>, ExclusionError> {
            Err(ExclusionError::Store("disk on fire".into()))
        }
        fn save(&self, _: &BTreeSet<String>) -> Result<(), ExclusionError> {
            Err(ExclusionError::Store("disk on fire".into()))
        }
    }

    #[test]
    fn exclude_persists_and_include_reverts() {
        let store = Arc::new(MemoryExclusionStore::default());
        let set = ExclusionSet::load(&universe(), store.clone(), AlertHandle::disabled());

        set.exclude(&names(&["tcs", " INFY "])).unwrap();
        assert!(set.is_excluded("TCS"));
        assert_eq!(store.saved(), BTreeSet::from(["INFY".to_string(), "TCS".to_string()]));

        set.include(&names(&["TCS", "SBIN"])).unwrap();
        assert_eq!(set.snapshot(), BTreeSet::from(["INFY".to_string()]));
        assert_eq!(store.saved(), set.snapshot());
    }

    #[test]
    fn unknown_symbols_reject_the_whole_request() {
        let set = ExclusionSet::load(&universe(), Arc::new(MemoryExclusionStore::default()), AlertHandle::disabled());
        let err = set.exclude(&names(&["TCS", "FOO", "BAR"])).unwrap_err();
        assert_eq!(err, ExclusionError::UnknownSymbols(names(&["BAR", "FOO"])));
        assert_eq!(err.to_string(), "symbols not in the configured universe: BAR, FOO");
        assert!(set.snapshot().is_empty());
    }

    #[test]
    fn failed_save_leaves_memory_unchanged_and_alerts() {
        let (alerts, mut rx) = AlertHandle::channel(8);
        let set = ExclusionSet::load(&universe(), Arc::new(BrokenStore), alerts);
        assert!(rx.try_recv().unwrap().message.starts_with("Error loading excluded stocks"));

        assert!(matches!(set.exclude(&names(&["TCS"])), Err(ExclusionError::Store(_))));
        assert!(!set.is_excluded("TCS"));
        assert!(rx.try_recv().unwrap().message.starts_with("Error saving excluded stocks"));
    }

    #[test]
    fn empty_request_is_rejected() {
        let set = ExclusionSet::load(&universe(), Arc::new(MemoryExclusionStore::default()), AlertHandle::disabled());
        assert_eq!(set.exclude(&names(&["  "])), Err(ExclusionError::Empty));
    }

    #[test]
    fn json_store_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonExclusionStore::new(dir.path().join("data").join("excluded_stocks.json"));
        assert!(store.load().unwrap().is_empty());

        store.save(&BTreeSet::from(["SBIN".to_string()])).unwrap();
        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains("\"excluded_stocks\""));
        assert_eq!(store.load().unwrap(), BTreeSet::from(["SBIN".to_string()]));
    }
}
