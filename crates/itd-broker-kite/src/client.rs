use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use itd_config::BrokerSettings;
use itd_execution::{BrokerAccount, BrokerError, OrderAck, OrderRequest};
use itd_schemas::Position;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

#[derive(Default)]
struct TokenState {
    current: String,
    /// Last token the broker answered with a session error.
    rejected: Option<String>,
}

/// Shared, swappable access token.
#[derive(Clone, Default)]
pub struct SessionToken(Arc<RwLock<TokenState>>);

impl SessionToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Arc::new(RwLock::new(TokenState {
            current: token.into(),
            rejected: None,
        })))
    }

    pub fn get(&self) -> String {
        self.0.read().unwrap_or_else(|e| e.into_inner()).current.clone()
    }

    pub fn set(&self, token: impl Into<String>) {
        self.0.write().unwrap_or_else(|e| e.into_inner()).current = token.into();
    }

    /// Record that a request sent with `token` came back as a session error.
    pub fn mark_rejected(&self, token: &str) {
        self.0.write().unwrap_or_else(|e| e.into_inner()).rejected = Some(token.to_string());
    }

    /// True once the current token differs from the last rejected one,
    /// i.e. a concurrent refresh already replaced it.
    pub fn replaced_since_rejection(&self) -> bool {
        let st = self.0.read().unwrap_or_else(|e| e.into_inner());
        st.rejected.as_deref().is_some_and(|r| r != st.current)
    }
}

impl std::fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionToken(<REDACTED>)")
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Envelope {
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error_type: Option<String>,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Deserialize)]
struct PositionsData {
    #[serde(default)]
    net: Vec<KitePosition>,
}

#[derive(Debug, Deserialize)]
struct KitePosition {
    tradingsymbol: String,
    #[serde(default)]
    exchange: String,
    quantity: i64,
    #[serde(default)]
    realised: f64,
    #[serde(default)]
    unrealised: f64,
}

#[derive(Debug, Deserialize)]
struct OrderData {
    order_id: String,
}

fn is_session_error(status: u16, env: Option<&Envelope>) -> bool {
    let token_exc = env
        .and_then(|e| e.error_type.as_deref())
        .is_some_and(|t| t == "TokenException");
    let msg_says_token = env
        .and_then(|e| e.message.as_deref())
        .is_some_and(|m| m.to_lowercase().contains("access token") || m.contains("access_token"));
    token_exc || (status == 403 && msg_says_token)
}

// ---------------------------------------------------------------------------
// Broker
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct KiteBroker {
    base_url: String,
    api_key: String,
    token: SessionToken,
    exchange: String,
    product: String,
    http: reqwest::Client,
}

impl KiteBroker {
    pub fn new(settings: &BrokerSettings, api_key: String, token: SessionToken) -> Self {
        Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key,
            token,
            exchange: settings.exchange.clone(),
            product: settings.product.clone(),
            http: reqwest::Client::new(),
        }
    }

    pub fn session(&self) -> SessionToken {
        self.token.clone()
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> Result<Value, BrokerError> {
        let token = self.token.get();
        let resp = req
            .header("X-Kite-Version", "3")
            .header("Authorization", format!("token {}:{}", self.api_key, token))
            .send()
            .await
            .map_err(|e| BrokerError::Transport(e.to_string()))?;

        let status = resp.status().as_u16();
        let body = resp
            .text()
            .await
            .map_err(|e| BrokerError::Transport(e.to_string()))?;
        let env: Option<Envelope> = serde_json::from_str(&body).ok();

        if is_session_error(status, env.as_ref()) {
            let msg = env
                .as_ref()
                .and_then(|e| e.message.clone())
                .unwrap_or_else(|| "Invalid access token".to_string());
            self.token.mark_rejected(&token);
            return Err(BrokerError::SessionExpired(msg));
        }

        match env {
            Some(e) if e.status == "success" && (200..300).contains(&status) => Ok(e.data),
            Some(e) => {
                let msg = e.message.unwrap_or_else(|| format!("status {status}"));
                if status >= 500 {
                    Err(BrokerError::Transport(msg))
                } else {
                    Err(BrokerError::Rejected(msg))
                }
            }
            None => Err(BrokerError::Transport(format!(
                "unexpected response status={status}: {}",
                body.chars().take(200).collect::<String>()
            ))),
        }
    }
}

#[async_trait]
impl BrokerAccount for KiteBroker {
    fn name(&self) -> &str {
        "kite"
    }

    async fn positions(&self) -> Result<Vec<Position>, BrokerError> {
        let data = self
            .send(self.http.get(format!("{}/portfolio/positions", self.base_url)))
            .await?;
        let parsed: PositionsData =
            serde_json::from_value(data).map_err(|e| BrokerError::Transport(format!("positions decode: {e}")))?;
        Ok(parsed
            .net
            .into_iter()
            .filter(|p| p.exchange.is_empty() || p.exchange == self.exchange)
            .map(|p| Position::new(p.tradingsymbol, p.quantity).with_pnl(p.realised, p.unrealised))
            .collect())
    }

    async fn place_order(&self, req: &OrderRequest) -> Result<OrderAck, BrokerError> {
        let quantity = req.quantity.to_string();
        let form = [
            ("tradingsymbol", req.symbol.as_str()),
            ("exchange", self.exchange.as_str()),
            ("transaction_type", req.direction.as_str()),
            ("order_type", "MARKET"),
            ("quantity", quantity.as_str()),
            ("product", self.product.as_str()),
            ("validity", "DAY"),
        ];
        let data = self
            .send(self.http.post(format!("{}/orders/regular", self.base_url)).form(&form))
            .await?;
        let parsed: OrderData =
            serde_json::from_value(data).map_err(|e| BrokerError::Transport(format!("order decode: {e}")))?;
        debug!(order_id = %parsed.order_id, symbol = %req.symbol, "kite order accepted");
        Ok(OrderAck {
            order_id: parsed.order_id,
            symbol: req.symbol.clone(),
            direction: req.direction,
            quantity: req.quantity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(error_type: Option<&str>, message: Option<&str>) -> Envelope {
        Envelope {
            status: "error".into(),
            message: message.map(String::from),
            error_type: error_type.map(String::from),
            data: Value::Null,
        }
    }

    #[test]
    fn token_exception_is_session_error() {
        assert!(is_session_error(403, Some(&env(Some("TokenException"), None))));
        assert!(is_session_error(403, Some(&env(None, Some("Invalid access token")))));
        assert!(!is_session_error(400, Some(&env(Some("InputException"), Some("bad qty")))));
        assert!(!is_session_error(403, None));
    }

    #[test]
    fn replacement_is_seen_only_after_a_rejection() {
        let t = SessionToken::new("stale");
        assert!(!t.replaced_since_rejection());
        t.mark_rejected("stale");
        assert!(!t.replaced_since_rejection());
        t.set("fresh");
        assert!(t.replaced_since_rejection());
    }

    #[test]
    fn token_debug_is_redacted() {
        assert_eq!(format!("{:?}", SessionToken::new("abc")), "SessionToken(<REDACTED>)");
    }
}
