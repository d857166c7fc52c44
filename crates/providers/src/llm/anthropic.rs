//! Anthropic-native adapter.
//!
//! Implements the Messages API for the single-turn analysis call. The
//! system prompt goes in the top-level `system` field per the Anthropic
//! message structure.

use serde_json::Value;

use cs_domain::config::LlmConfig;
use cs_domain::error::{Error, Result};

use crate::util::{from_reqwest, key_from_env};

use super::{AnalysisRequest, AnalysisResponse, LlmProvider, Usage};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// An LLM provider adapter for the Anthropic Messages API.
pub struct AnthropicProvider {
    base_url: String,
    api_key: String,
    default_model: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    /// Create a provider from config. The API key env var is read here,
    /// once.
    pub fn from_config(cfg: &LlmConfig) -> Result<Self> {
        let api_key = key_from_env(&cfg.api_key_env)?;
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(from_reqwest)?;
        Ok(Self {
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key,
            default_model: cfg.model.clone(),
            client,
        })
    }

    fn authed_post(&self, url: &str) -> reqwest::RequestBuilder {
        self.client
            .post(url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
    }
}

#[async_trait::async_trait]
impl LlmProvider for AnthropicProvider {
    async fn analyze(&self, req: AnalysisRequest) -> Result<AnalysisResponse> {
        let model = req.model.unwrap_or_else(|| self.default_model.clone());
        let body = serde_json::json!({
            "model": model,
            "max_tokens": req.max_tokens,
            "system": req.system,
            "messages": [{ "role": "user", "content": req.user }],
        });

        let url = format!("{}/v1/messages", self.base_url);
        let resp = self
            .authed_post(&url)
            .json(&body)
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Provider {
                provider: "anthropic".into(),
                message: format!("messages call failed with {status}: {body}"),
            });
        }

        let body: Value = resp.json().await.map_err(from_reqwest)?;
        let content = body
            .get("content")
            .and_then(Value::as_array)
            .map(|blocks| {
                blocks
                    .iter()
                    .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
                    .filter_map(|b| b.get("text").and_then(Value::as_str))
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        let usage = Usage {
            input_tokens: body
                .pointer("/usage/input_tokens")
                .and_then(Value::as_u64)
                .unwrap_or(0),
            output_tokens: body
                .pointer("/usage/output_tokens")
                .and_then(Value::as_u64)
                .unwrap_or(0),
        };

        let model = body
            .get("model")
            .and_then(Value::as_str)
            .unwrap_or(&model)
            .to_string();

        Ok(AnalysisResponse {
            content,
            usage,
            model,
        })
    }

    fn provider_id(&self) -> &str {
        "anthropic"
    }
}
