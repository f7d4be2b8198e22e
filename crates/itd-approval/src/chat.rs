//! Chat-completions judge (xAI and OpenAI share the wire shape).

use async_trait::async_trait;
use itd_config::ProviderSettings;
use itd_schemas::TradeSignal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::{ApprovalError, ApprovalProvider, Judgement};

/// The review prompt sent to every provider.
pub fn build_prompt(signal: &TradeSignal, explanation: &str) -> String {
    format!(
        "Review the following trade signal and explanation:\n\
         Signal: {} (Confidence: {:.2}, Size: {:.2})\n\
         Explanation: {}\n\
         Is this trade reasonable based on the signal and market conditions? \
         Return a JSON object with 'approved' (boolean) and 'reason' (string).",
        signal.side, signal.confidence, signal.size, explanation
    )
}

/// Interpret a provider's reply text.
///
/// - JSON object with `approved` (bool) and `reason` (string): taken as is.
/// - JSON of any other shape: parse fault.
/// - Not JSON but mentions "approve": approved.
/// - Anything else: a structured rejection.
pub fn parse_verdict(provider: &str, content: &str) -> Result<Judgement, ApprovalError> {
    let text = content.trim();
    match serde_json::from_str::<Value>(text) {
        Ok(v) => {
            let approved = v.get("approved").and_then(Value::as_bool);
            let reason = v.get("reason").and_then(Value::as_str);
            match (approved, reason) {
                (Some(approved), Some(reason)) => Ok(Judgement {
                    approved,
                    reason: reason.to_string(),
                }),
                _ => Err(ApprovalError::Parse {
                    provider: provider.to_string(),
                    message: "expected 'approved' (bool) and 'reason' (string)".to_string(),
                }),
            }
        }
        Err(_) if text.to_lowercase().contains("approve") => Ok(Judgement {
            approved: true,
            reason: format!("Trade approved by {provider}"),
        }),
        Err(_) => Ok(Judgement {
            approved: false,
            reason: format!("Invalid {provider} response format"),
        }),
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f64,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: String,
}

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

/// API key is resolved by the caller and never logged.
#[derive(Clone)]
pub struct ChatCompletionsProvider {
    name: String,
    base_url: String,
    model: String,
    api_key: String,
    max_tokens: u32,
    temperature: f64,
    http: reqwest::Client,
}

impl std::fmt::Debug for ChatCompletionsProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatCompletionsProvider")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &"<REDACTED>")
            .finish()
    }
}

impl ChatCompletionsProvider {
    pub fn new(settings: &ProviderSettings, api_key: String) -> Self {
        Self {
            name: settings.name.clone(),
            base_url: settings.base_url.clone(),
            model: settings.model.clone(),
            api_key,
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
            http: reqwest::Client::new(),
        }
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn err_transport(&self, e: impl std::fmt::Display) -> ApprovalError {
        ApprovalError::Transport {
            provider: self.name.clone(),
            message: e.to_string(),
        }
    }
}

#[async_trait]
impl ApprovalProvider for ChatCompletionsProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn judge(&self, signal: &TradeSignal, explanation: &str) -> Result<Judgement, ApprovalError> {
        let prompt = build_prompt(signal, explanation);
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: &prompt,
            }],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let resp = self
            .http
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.err_transport(e))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ApprovalError::Http {
                provider: self.name.clone(),
                status: status.as_u16(),
                body: text.chars().take(200).collect(),
            });
        }

        let parsed: ChatResponse = resp.json().await.map_err(|e| ApprovalError::Parse {
            provider: self.name.clone(),
            message: e.to_string(),
        })?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ApprovalError::Parse {
                provider: self.name.clone(),
                message: "response has no choices".to_string(),
            })?;

        debug!(provider = %self.name, symbol = %signal.symbol, "approval reply received");
        parse_verdict(&self.name, &content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use itd_schemas::{Side, SignalOrigin};

    #[test]
    fn prompt_carries_signal_and_explanation() {
        let s = TradeSignal::new("TCS", Side::Sell, 0.8, 0.8, SignalOrigin::Model);
        let p = build_prompt(&s, "AI SELL: 0.80 | RSI: 75.0");
        assert!(p.contains("Signal: sell (Confidence: 0.80, Size: 0.80)"));
        assert!(p.contains("Explanation: AI SELL: 0.80 | RSI: 75.0"));
        assert!(p.ends_with("'approved' (boolean) and 'reason' (string)."));
    }

    #[test]
    fn well_formed_json_is_taken_verbatim() {
        let j = parse_verdict("xai", r#"{"approved": false, "reason": "VIX rising"}"#).unwrap();
        assert_eq!(
            j,
            Judgement {
                approved: false,
                reason: "VIX rising".into()
            }
        );
    }

    #[test]
    fn json_missing_fields_is_a_parse_fault() {
        let err = parse_verdict("xai", r#"{"approved": true}"#).unwrap_err();
        assert!(matches!(err, ApprovalError::Parse { .. }));
    }

    #[test]
    fn free_text_mentioning_approve_is_approval() {
        let j = parse_verdict("openai", "I would APPROVE this trade.").unwrap();
        assert!(j.approved);
        assert_eq!(j.reason, "Trade approved by openai");
    }

    #[test]
    fn other_free_text_is_a_rejection() {
        let j = parse_verdict("openai", "Hard to say.").unwrap();
        assert!(!j.approved);
        assert_eq!(j.reason, "Invalid openai response format");
    }

    #[test]
    fn debug_hides_key() {
        let settings = ProviderSettings {
            name: "xai".into(),
            base_url: "http://localhost".into(),
            model: "grok-3".into(),
            api_key_env: "XAI_API_KEY".into(),
            max_tokens: 200,
            temperature: 0.7,
        };
        let p = ChatCompletionsProvider::new(&settings, "xai-supersecret".into());
        assert!(!format!("{p:?}").contains("supersecret"));
    }
}
