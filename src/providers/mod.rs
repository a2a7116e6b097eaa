//! LLM provider contracts and adapters.
//!
//! Each analysis stage is bound to exactly one [`AnalysisProvider`]. The
//! contract is deliberately small: one prompt in, one completion out, with
//! token usage when the provider reports it. Failures are typed so callers
//! can log them usefully, but every failure is recoverable the same way —
//! the stage degrades and the review continues.

mod anthropic;
mod openai;

pub use anthropic::AnthropicProvider;
pub use openai::OpenAiProvider;

use async_trait::async_trait;

/// Per-request timeout applied by every adapter.
pub(crate) const REQUEST_TIMEOUT_SECS: u64 = 120;

// ── Contract ─────────────────────────────────────────────────────

/// A single completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Optional system prompt.
    pub system: Option<String>,
    /// User prompt.
    pub prompt: String,
    /// Model identifier.
    pub model: String,
    /// Output token ceiling.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
}

/// A completed response.
#[derive(Debug, Clone)]
pub struct Completion {
    /// Response text.
    pub text: String,
    /// Total tokens consumed, when the provider reports usage.
    pub total_tokens: Option<u64>,
}

/// Failure modes of a provider call.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Connection failure or request timeout.
    #[error("provider request failed: {0}")]
    Transport(#[from] reqwest::Error),
    /// Non-success HTTP status from the provider API.
    #[error("provider returned {status}: {body}")]
    Api { status: u16, body: String },
    /// Response arrived but did not have the expected shape.
    #[error("malformed provider response: {0}")]
    Malformed(String),
}

/// One LLM vendor endpoint.
#[async_trait]
pub trait AnalysisProvider: Send + Sync {
    /// Provider name used in logs and cost records (e.g. "openai").
    fn name(&self) -> &'static str;

    /// Run one completion.
    async fn complete(&self, req: &CompletionRequest) -> Result<Completion, ProviderError>;
}

// ── Test double ──────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::VecDeque;

    /// Scripted provider for stage and pipeline tests: pops pre-loaded
    /// responses in order, falling back to a fixed success when the
    /// script runs dry.
    pub struct ScriptedProvider {
        name: &'static str,
        script: parking_lot::Mutex<VecDeque<Result<Completion, String>>>,
    }

    impl ScriptedProvider {
        pub fn new(name: &'static str) -> Self {
            Self {
                name,
                script: parking_lot::Mutex::new(VecDeque::new()),
            }
        }

        pub fn push_ok(&self, text: &str, total_tokens: Option<u64>) {
            self.script.lock().push_back(Ok(Completion {
                text: text.to_string(),
                total_tokens,
            }));
        }

        pub fn push_err(&self, message: &str) {
            self.script.lock().push_back(Err(message.to_string()));
        }
    }

    #[async_trait]
    impl AnalysisProvider for ScriptedProvider {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn complete(&self, _req: &CompletionRequest) -> Result<Completion, ProviderError> {
            match self.script.lock().pop_front() {
                Some(Ok(completion)) => Ok(completion),
                Some(Err(message)) => Err(ProviderError::Api {
                    status: 500,
                    body: message,
                }),
                None => Ok(Completion {
                    text: "scripted analysis".to_string(),
                    total_tokens: Some(42),
                }),
            }
        }
    }
}
