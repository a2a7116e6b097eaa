//! OpenAI chat-completions adapter.

use std::time::Duration;

use async_trait::async_trait;

use super::{AnalysisProvider, Completion, CompletionRequest, ProviderError, REQUEST_TIMEOUT_SECS};

/// [`AnalysisProvider`] backed by the OpenAI chat completions API.
pub struct OpenAiProvider {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAiProvider {
    pub fn new(api_key: String) -> Self {
        Self::with_base_url(api_key, "https://api.openai.com".to_string())
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
impl AnalysisProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn complete(&self, req: &CompletionRequest) -> Result<Completion, ProviderError> {
        let mut messages = Vec::new();
        if let Some(ref system) = req.system {
            messages.push(serde_json::json!({ "role": "system", "content": system }));
        }
        messages.push(serde_json::json!({ "role": "user", "content": req.prompt }));

        let payload = serde_json::json!({
            "model": req.model,
            "messages": messages,
            "temperature": req.temperature,
            "max_tokens": req.max_tokens,
        });

        let resp = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
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
        let text = body["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| ProviderError::Malformed("missing choices[0].message.content".into()))?
            .to_string();
        let total_tokens = body["usage"]["total_tokens"].as_u64();

        Ok(Completion { text, total_tokens })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn parses_text_and_usage() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{ "message": { "content": "looks fine" } }],
                "usage": { "total_tokens": 321 }
            })))
            .mount(&server)
            .await;

        let provider = OpenAiProvider::with_base_url("test-key".into(), server.uri());
        let completion = provider
            .complete(&CompletionRequest {
                system: Some("reviewer".into()),
                prompt: "review this".into(),
                model: "gpt-4o".into(),
                max_tokens: 100,
                temperature: 0.2,
            })
            .await
            .unwrap();

        assert_eq!(completion.text, "looks fine");
        assert_eq!(completion.total_tokens, Some(321));
    }

    #[tokio::test]
    async fn non_success_status_is_an_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("quota exceeded"))
            .mount(&server)
            .await;

        let provider = OpenAiProvider::with_base_url("test-key".into(), server.uri());
        let err = provider
            .complete(&CompletionRequest {
                system: None,
                prompt: "hi".into(),
                model: "gpt-4o-mini".into(),
                max_tokens: 10,
                temperature: 0.0,
            })
            .await
            .unwrap_err();

        match err {
            ProviderError::Api { status, body } => {
                assert_eq!(status, 429);
                assert_eq!(body, "quota exceeded");
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_content_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": []
            })))
            .mount(&server)
            .await;

        let provider = OpenAiProvider::with_base_url("test-key".into(), server.uri());
        let err = provider
            .complete(&CompletionRequest {
                system: None,
                prompt: "hi".into(),
                model: "gpt-4o-mini".into(),
                max_tokens: 10,
                temperature: 0.0,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::Malformed(_)));
    }
}
