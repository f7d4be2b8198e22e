//! itd-cli
//!
//! Operator commands. Offline ones (config hash, trade-log verification)
//! read files directly; exclusion commands go through a running daemon so
//! its in-memory set and the store never diverge.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use itd_daemon::api_types::{ErrorResponse, ExclusionsResponse, SymbolsRequest};
use reqwest::StatusCode;

pub const DEFAULT_DAEMON_URL: &str = "http://127.0.0.1:8899";

/// Thin client for the daemon's `/v1/exclusions` endpoints.
#[derive(Debug, Clone)]
pub struct DaemonClient {
    base_url: String,
    http: reqwest::Client,
}

impl DaemonClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("build http client")?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    pub async fn list_exclusions(&self) -> Result<ExclusionsResponse> {
        let url = format!("{}/v1/exclusions", self.base_url);
        let resp = self.http.get(&url).send().await.with_context(|| format!("GET {url}"))?;
        decode(resp).await
    }

    pub async fn exclude(&self, symbols: &[String]) -> Result<ExclusionsResponse> {
        self.post_symbols("exclude", symbols).await
    }

    pub async fn include(&self, symbols: &[String]) -> Result<ExclusionsResponse> {
        self.post_symbols("include", symbols).await
    }

    async fn post_symbols(&self, action: &str, symbols: &[String]) -> Result<ExclusionsResponse> {
        let url = format!("{}/v1/exclusions/{action}", self.base_url);
        let body = SymbolsRequest {
            symbols: symbols.to_vec(),
        };
        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("POST {url}"))?;
        decode(resp).await
    }
}

async fn decode(resp: reqwest::Response) -> Result<ExclusionsResponse> {
    let status = resp.status();
    if status.is_success() {
        return resp.json().await.context("decode exclusions response");
    }
    let text = resp.text().await.unwrap_or_default();
    match serde_json::from_str::<ErrorResponse>(&text) {
        Ok(err) if status == StatusCode::BAD_REQUEST && !err.invalid.is_empty() => {
            bail!("{} (invalid: {})", err.error, err.invalid.join(", "))
        }
        Ok(err) => bail!("daemon returned {status}: {}", err.error),
        Err(_) => bail!("daemon returned {status}: {text}"),
    }
}

/// `changed` and `excluded` as two `key=a,b` lines.
pub fn render_exclusions(resp: &ExclusionsResponse) -> String {
    format!("changed={}\nexcluded={}", resp.changed.join(","), resp.excluded.join(","))
}
