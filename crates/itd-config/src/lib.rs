//! itd-config
//!
//! Layered YAML configuration for the desk.
//!
//! Loading is two-phase:
//! 1. YAML documents are deep-merged in order (later overrides earlier),
//!    checked for literal secrets and hashed (SHA-256 of canonical JSON).
//! 2. The merged JSON is deserialised into a typed [`DeskConfig`] and
//!    validated. The result is immutable for the life of the process.
//!
//! YAML never stores secret values, only the NAMES of env vars that hold
//! them. See [`secrets`].

use anyhow::{bail, Context, Result};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;

mod desk;
pub mod secrets;

pub use desk::*;
pub use secrets::{resolve_secrets, resolve_secrets_from_env, ResolvedSecrets};

/// Known secret-like prefixes. Any leaf string in the merged config starting
/// with one of these aborts the load with CONFIG_SECRET_DETECTED.
const SECRET_PREFIXES: &[&str] = &[
    "sk-",        // OpenAI style
    "xai-",       // xAI
    "AKIA",       // AWS access key ID
    "-----BEGIN", // PEM private keys
    "ghp_",       // GitHub PAT
    "xoxb-",      // Slack bot token
    "xoxp-",      // Slack user token
];

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config_hash: String,
    pub canonical_json: String,
    pub config_json: Value,
}

impl LoadedConfig {
    /// Deserialise and validate the typed desk configuration.
    pub fn desk(&self) -> Result<DeskConfig> {
        let cfg: DeskConfig = serde_json::from_value(self.config_json.clone())
            .context("config does not match the desk schema")?;
        cfg.validate()?;
        Ok(cfg)
    }
}

pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let mut docs: Vec<String> = Vec::new();
    for p in paths {
        let raw =
            fs::read_to_string(p).with_context(|| format!("failed to read yaml path: {p}"))?;
        docs.push(raw);
    }

    let doc_refs: Vec<&str> = docs.iter().map(|s| s.as_str()).collect();
    load_layered_yaml_from_strings(&doc_refs)
}

pub fn load_layered_yaml_from_strings(yaml_docs: &[&str]) -> Result<LoadedConfig> {
    let mut merged = serde_json::json!({});
    for raw in yaml_docs {
        let v_yaml: serde_yaml::Value = serde_yaml::from_str(raw).context("invalid yaml")?;
        // An empty document parses as null; treat it as an empty overlay.
        if v_yaml.is_null() {
            continue;
        }
        let v_json = serde_json::to_value(v_yaml).context("yaml->json conversion failed")?;
        merged = deep_merge(merged, v_json);
    }

    enforce_no_secret_literals(&merged)?;

    let canonical_json = serde_json::to_string(&merged).context("canonical json serialize failed")?;
    let config_hash = sha256_hex(canonical_json.as_bytes());
    Ok(LoadedConfig {
        config_hash,
        canonical_json,
        config_json: merged,
    })
}

/// Load, merge and validate in one step.
pub fn load_desk_config(paths: &[&str]) -> Result<(DeskConfig, String)> {
    let loaded = load_layered_yaml(paths)?;
    let desk = loaded.desk()?;
    Ok((desk, loaded.config_hash))
}

fn deep_merge(a: Value, b: Value) -> Value {
    match (a, b) {
        (Value::Object(mut a_map), Value::Object(b_map)) => {
            for (k, b_val) in b_map {
                let a_val = a_map.remove(&k).unwrap_or(Value::Null);
                a_map.insert(k, deep_merge(a_val, b_val));
            }
            Value::Object(a_map)
        }
        (_, b_other) => b_other,
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn enforce_no_secret_literals(v: &Value) -> Result<()> {
    let mut leaves = Vec::new();
    collect_string_leaves(v, "", &mut leaves);
    for (ptr, s) in leaves {
        if looks_like_secret(s) {
            bail!("CONFIG_SECRET_DETECTED leaf={} value=REDACTED", ptr);
        }
    }
    Ok(())
}

fn collect_string_leaves<'a>(v: &'a Value, prefix: &str, out: &mut Vec<(String, &'a str)>) {
    match v {
        Value::Object(map) => {
            for (k, vv) in map {
                let next = format!("{}/{}", prefix, k.replace('~', "~0").replace('/', "~1"));
                collect_string_leaves(vv, &next, out);
            }
        }
        Value::Array(arr) => {
            for (i, vv) in arr.iter().enumerate() {
                collect_string_leaves(vv, &format!("{prefix}/{i}"), out);
            }
        }
        Value::String(s) => out.push((prefix.to_string(), s.as_str())),
        _ => {}
    }
}

fn looks_like_secret(s: &str) -> bool {
    let t = s.trim();
    if t.len() < 8 {
        return false;
    }
    SECRET_PREFIXES.iter().any(|p| t.starts_with(p))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_layer_overrides_nested_key_only() {
        let base = "risk:\n  max_drawdown: 0.05\n  confidence_threshold: 0.6\n";
        let overlay = "risk:\n  max_drawdown: 0.02\n";
        let loaded = load_layered_yaml_from_strings(&[base, overlay]).unwrap();
        assert_eq!(loaded.config_json["risk"]["max_drawdown"], 0.02);
        assert_eq!(loaded.config_json["risk"]["confidence_threshold"], 0.6);
    }

    #[test]
    fn literal_secret_is_rejected() {
        let doc = "approval:\n  primary:\n    api_key_env: \"sk-abcdefghijklmnop\"\n";
        let err = load_layered_yaml_from_strings(&[doc]).unwrap_err();
        assert!(err.to_string().contains("CONFIG_SECRET_DETECTED"));
        assert!(!err.to_string().contains("abcdefgh"));
    }

    #[test]
    fn empty_overlay_is_ignored() {
        let a = load_layered_yaml_from_strings(&["a: 1\n"]).unwrap();
        let b = load_layered_yaml_from_strings(&["a: 1\n", ""]).unwrap();
        assert_eq!(a.config_hash, b.config_hash);
    }
}
