//! Runtime secret resolution.
//!
//! YAML stores only env var NAMES (e.g. `XAI_API_KEY`). `resolve_secrets`
//! is called once at startup and the result is handed to constructors, so
//! `std::env::var` is never scattered across crates. `Debug` redacts every
//! value and errors mention the variable NAME only.
//!
//! | Broker kind | Required                               |
//! |-------------|----------------------------------------|
//! | kite        | broker api key, broker access token    |
//! | paper       | nothing                                |
//!
//! Approval provider keys and the alert webhook are always optional: a
//! provider without a key is skipped in favour of the next one in the chain.

use anyhow::{bail, Result};

use crate::{BrokerKind, DeskConfig};

#[derive(Clone, Default)]
pub struct ResolvedSecrets {
    pub primary_approval_key: Option<String>,
    pub secondary_approval_key: Option<String>,
    pub broker_api_key: Option<String>,
    pub broker_access_token: Option<String>,
    pub alert_webhook: Option<String>,
}

impl std::fmt::Debug for ResolvedSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn redact(v: &Option<String>) -> Option<&'static str> {
            v.as_ref().map(|_| "<REDACTED>")
        }
        f.debug_struct("ResolvedSecrets")
            .field("primary_approval_key", &redact(&self.primary_approval_key))
            .field("secondary_approval_key", &redact(&self.secondary_approval_key))
            .field("broker_api_key", &redact(&self.broker_api_key))
            .field("broker_access_token", &redact(&self.broker_access_token))
            .field("alert_webhook", &redact(&self.alert_webhook))
            .finish()
    }
}

/// Resolve every secret named by `cfg` through `lookup`.
///
/// `lookup` returns the raw value of an env var; blank values count as unset.
pub fn resolve_secrets<F>(cfg: &DeskConfig, lookup: F) -> Result<ResolvedSecrets>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |name: &str| -> Option<String> {
        lookup(name).and_then(|v| {
            let t = v.trim();
            if t.is_empty() {
                None
            } else {
                Some(t.to_string())
            }
        })
    };

    let broker_api_key = get(&cfg.broker.api_key_env);
    let broker_access_token = get(&cfg.broker.access_token_env);

    if cfg.broker.kind == BrokerKind::Kite {
        if broker_api_key.is_none() {
            bail!(
                "SECRETS_MISSING broker=kite: required env var '{}' (api key) is not set or empty",
                cfg.broker.api_key_env
            );
        }
        if broker_access_token.is_none() {
            bail!(
                "SECRETS_MISSING broker=kite: required env var '{}' (access token) is not set or empty",
                cfg.broker.access_token_env
            );
        }
    }

    Ok(ResolvedSecrets {
        primary_approval_key: cfg.approval.primary.as_ref().and_then(|p| get(&p.api_key_env)),
        secondary_approval_key: cfg
            .approval
            .secondary
            .as_ref()
            .and_then(|p| get(&p.api_key_env)),
        broker_api_key,
        broker_access_token,
        alert_webhook: cfg.alerts.webhook_env.as_deref().and_then(get),
    })
}

/// [`resolve_secrets`] against the process environment.
pub fn resolve_secrets_from_env(cfg: &DeskConfig) -> Result<ResolvedSecrets> {
    resolve_secrets(cfg, |name| std::env::var(name).ok())
}
