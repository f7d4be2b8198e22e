//! Typed desk config: defaults fill gaps, HH:MM times and timezone names
//! parse, and invalid values are rejected before anything starts.

use std::io::Write;

use chrono::NaiveTime;
use itd_config::{load_desk_config, load_layered_yaml_from_strings, BrokerKind};

const DESK_YAML: &str = r#"
risk:
  confidence_threshold: 0.65
  trading_hours:
    start: "09:20"
    end: "15:00"
  global_context:
    vix_threshold: 18.5
schedule:
  timezone: "Asia/Kolkata"
  cutoff: "15:15"
pipeline:
  worker_count: 5
sectors:
  TCS: "NIFTY IT"
universe: ["TCS"]
broker:
  kind: "kite"
"#;

#[test]
fn yaml_overrides_merge_onto_defaults() {
    let desk = load_layered_yaml_from_strings(&[DESK_YAML]).unwrap().desk().unwrap();

    assert_eq!(desk.risk.confidence_threshold, 0.65);
    assert_eq!(desk.risk.trading_hours.start, NaiveTime::from_hms_opt(9, 20, 0).unwrap());
    assert_eq!(desk.risk.global_context.vix_threshold, 18.5);
    // untouched sibling keeps its default
    assert_eq!(desk.risk.global_context.reference_gap, 0.01);
    assert_eq!(desk.schedule.cutoff, NaiveTime::from_hms_opt(15, 15, 0).unwrap());
    assert_eq!(desk.timezone(), chrono_tz::Asia::Kolkata);
    assert_eq!(desk.pipeline.worker_count, 5);
    assert_eq!(desk.broker.kind, BrokerKind::Kite);
    assert_eq!(desk.universe, vec!["TCS".to_string()]);
    assert_eq!(desk.sector_of("TCS"), Some("NIFTY IT"));
    assert_eq!(desk.sector_of("SBIN"), None);
}

#[test]
fn empty_config_yields_runnable_defaults() {
    let desk = load_layered_yaml_from_strings(&[""]).unwrap().desk().unwrap();
    assert_eq!(desk.pipeline.worker_count, 3);
    assert_eq!(desk.universe.len(), 7);
    assert_eq!(desk.broker.kind, BrokerKind::Paper);
}

#[test]
fn out_of_range_threshold_is_rejected() {
    let doc = "risk:\n  confidence_threshold: 1.5\n";
    let err = load_layered_yaml_from_strings(&[doc]).unwrap().desk().unwrap_err();
    assert!(err.to_string().contains("confidence_threshold"), "{err}");
}

#[test]
fn malformed_time_is_rejected() {
    let doc = "schedule:\n  cutoff: \"quarter past three\"\n";
    assert!(load_layered_yaml_from_strings(&[doc]).unwrap().desk().is_err());
}

#[test]
fn unknown_timezone_is_rejected() {
    let doc = "schedule:\n  timezone: \"Mars/Olympus\"\n";
    assert!(load_layered_yaml_from_strings(&[doc]).unwrap().desk().is_err());
}

#[test]
fn loads_from_files_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("base.yaml");
    let overlay = dir.path().join("overlay.yaml");
    std::fs::File::create(&base).unwrap().write_all(DESK_YAML.as_bytes()).unwrap();
    std::fs::File::create(&overlay)
        .unwrap()
        .write_all(b"pipeline:\n  worker_count: 2\n")
        .unwrap();

    let (desk, hash) =
        load_desk_config(&[base.to_str().unwrap(), overlay.to_str().unwrap()]).unwrap();
    assert_eq!(desk.pipeline.worker_count, 2);
    assert_eq!(desk.risk.confidence_threshold, 0.65);
    assert_eq!(hash.len(), 64);
}
