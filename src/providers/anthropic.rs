//! Anthropic messages adapter.

use std::time::Duration;

use async_trait::async_trait;

use super::{AnalysisProvider, Completion, CompletionRequest, ProviderError, REQUEST_TIMEOUT_SECS};

/// [`AnalysisProvider`] backed by the Anthropic messages API.
///
/// Reports no token usage; callers fall back to their word-count estimate,
/// which keeps cost records deterministic across reruns.
pub struct AnthropicProvider {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(api_key: String) -> Self {
        Self::with_base_url(api_key, "https://api.anthropic.com".to_string())
    }

    /// Point the adapter at a different endpoint (tests, proxies).
    pub fn with_base_url(api_key: String, base_url: String) -> Self {
        Self {
            api_key,
            base_url,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl AnalysisProvider for AnthropicProvider {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    async fn complete(&self, req: &CompletionRequest) -> Result<Completion, ProviderError> {
        let mut payload = serde_json::json!({
            "model": req.model,
            "max_tokens": req.max_tokens,
            "temperature": req.temperature,
            "messages": [{ "role": "user", "content": req.prompt }],
        });
        if let Some(ref system) = req.system {
            payload["system"] = serde_json::Value::String(system.clone());
        }

        let resp = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&payload)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Api { status, body });
        }

        let body: serde_json::Value = resp.json().await?;
        let text = body["content"][0]["text"]
            .as_str()
            .ok_or_else(|| ProviderError::Malformed("missing content[0].text".into()))?
            .to_string();

        Ok(Completion {
            text,
            total_tokens: None,
        })
    }
}
