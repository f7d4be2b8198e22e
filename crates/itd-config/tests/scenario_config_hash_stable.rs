//! Config hash stability.
//!
//! GREEN when:
//! - identical inputs hash identically across calls
//! - key order inside a YAML document does not affect the hash
//! - a changed value changes the hash

use itd_config::load_layered_yaml_from_strings;

const BASE_YAML: &str = r#"
risk:
  confidence_threshold: 0.6
  max_drawdown: 0.05
broker:
  kind: "paper"
  api_key_env: "KITE_API_KEY"
"#;

const BASE_YAML_REORDERED: &str = r#"
broker:
  api_key_env: "KITE_API_KEY"
  kind: "paper"
risk:
  max_drawdown: 0.05
  confidence_threshold: 0.6
"#;

const OVERLAY_YAML: &str = r#"
risk:
  max_drawdown: 0.02
"#;

#[test]
fn same_input_same_hash() {
    let a = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let b = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    assert_eq!(a.config_hash, b.config_hash);
    assert_eq!(a.config_hash.len(), 64);
}

#[test]
fn key_order_does_not_change_hash() {
    let a = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let b = load_layered_yaml_from_strings(&[BASE_YAML_REORDERED]).unwrap();
    assert_eq!(a.config_hash, b.config_hash);
    assert_eq!(a.canonical_json, b.canonical_json);
}

#[test]
fn overlay_changes_hash() {
    let base = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let merged = load_layered_yaml_from_strings(&[BASE_YAML, OVERLAY_YAML]).unwrap();
    assert_ne!(base.config_hash, merged.config_hash);

    let desk = merged.desk().unwrap();
    assert_eq!(desk.risk.max_drawdown, 0.02);
    assert_eq!(desk.risk.confidence_threshold, 0.6);
}
