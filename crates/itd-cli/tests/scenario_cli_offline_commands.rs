use std::io::Write;
use std::process::Command;

use assert_cmd::prelude::*;
use itd_audit::{AuditTradeLog, TradeRecorder};
use itd_config::load_layered_yaml_from_strings;
use predicates::prelude::*;

const BASE: &str = "risk:\n  confidence_threshold: 0.65\nuniverse: [TCS]\nsectors:\n  TCS: \"NIFTY IT\"\n";

#[test]
fn config_hash_matches_the_library() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("desk.yaml");
    std::fs::write(&path, BASE)?;
    let expected = load_layered_yaml_from_strings(&[BASE])?.config_hash;

    Command::cargo_bin("itd")?
        .args(["config-hash", path.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("config_hash={expected}")));
    Ok(())
}

#[test]
fn config_hash_rejects_an_invalid_desk() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("bad.yaml");
    std::fs::write(&path, "pipeline:\n  worker_count: 0\n")?;

    Command::cargo_bin("itd")?
        .args(["config-hash", path.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("worker_count"));
    Ok(())
}

#[test]
fn audit_verify_reports_valid_and_tampered_logs() -> anyhow::Result<()> {
    use itd_schemas::{Side, SignalOrigin, TradeSignal};

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("trades.jsonl");
    let log = AuditTradeLog::open(&path, true)?;
    for sym in ["TCS", "INFY"] {
        let sig = TradeSignal::new(sym, Side::Sell, 0.8, 0.8, SignalOrigin::Model);
        log.record_trade(&sig, "AI SELL: 0.80")?;
    }
    drop(log);

    Command::cargo_bin("itd")?
        .args(["audit", "verify", path.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("chain=valid lines=2"));

    let content = std::fs::read_to_string(&path)?.replace("INFY", "WIPRO");
    let mut f = std::fs::File::create(&path)?;
    f.write_all(content.as_bytes())?;

    Command::cargo_bin("itd")?
        .args(["audit", "verify", path.to_str().unwrap()])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("chain=broken line=2"));
    Ok(())
}
