//! The five analysis stages of a review.
//!
//! Each stage wraps exactly one provider call and never fails outward:
//! any internal error (transport, quota, malformed response, timeout) is
//! folded into a [`StageResult`] carrying the error text and a degraded
//! fallback output, so the pipeline always has something to carry forward.
//!
//! Token accounting is provider-exact when usage is reported and a
//! whitespace word-count estimate over prompt + output otherwise.

mod architect;
mod guardian;
mod scout;
mod stylist;
mod synthesizer;

pub use architect::ArchitectStage;
pub use guardian::GuardianStage;
pub use scout::ScoutStage;
pub use stylist::StylistStage;
pub use synthesizer::{SynthesisContext, SynthesizerStage};

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::providers::{AnalysisProvider, CompletionRequest};

/// Ceiling on diff text embedded into a prompt, in bytes.
pub(crate) const DIFF_PROMPT_LIMIT: usize = 50_000;

// ── Stage result ─────────────────────────────────────────────────

/// Output of one analysis stage, produced exactly once and immutable
/// thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageResult {
    /// Stage name ("scout", "guardian", ...).
    pub stage: String,
    /// Analysis output, or the stage's degraded fallback.
    pub output: String,
    /// Tokens consumed (exact or estimated).
    pub tokens_used: u64,
    /// Model that performed the analysis.
    pub model: String,
    /// Wall-clock seconds spent in the stage.
    pub elapsed_secs: f64,
    /// Error text when the stage degraded.
    pub error: Option<String>,
}

impl StageResult {
    /// Whether the primary computation failed and `output` is the
    /// fallback.
    pub fn is_degraded(&self) -> bool {
        self.error.is_some()
    }

    /// Build a degraded result directly, for failures that happen outside
    /// the stage body (e.g. a crashed execution unit).
    pub fn degraded(stage: &str, model: &str, output: String, error: String) -> Self {
        Self {
            stage: stage.to_string(),
            output,
            tokens_used: 0,
            model: model.to_string(),
            elapsed_secs: 0.0,
            error: Some(error),
        }
    }
}

// ── Review context ───────────────────────────────────────────────

/// Run context threaded through the diff-consuming stages.
#[derive(Debug, Clone)]
pub struct ReviewContext {
    /// Repository full name.
    pub repository: String,
    /// Pull request number.
    pub number: u64,
    /// Detected dominant language, used only to phrase style guidance.
    pub language: String,
}

// ── Shared helpers ───────────────────────────────────────────────

/// Deterministic token estimate for providers that report no usage.
pub(crate) fn estimate_tokens(prompt: &str, output: &str) -> u64 {
    (prompt.split_whitespace().count() + output.split_whitespace().count()) as u64
}

/// Clip diff text to [`DIFF_PROMPT_LIMIT`] on a char boundary.
pub(crate) fn clip_for_prompt(diff: &str) -> &str {
    if diff.len() <= DIFF_PROMPT_LIMIT {
        return diff;
    }
    let mut cut = DIFF_PROMPT_LIMIT;
    while cut > 0 && !diff.is_char_boundary(cut) {
        cut -= 1;
    }
    &diff[..cut]
}

/// Run one provider call and fold the outcome into a [`StageResult`].
pub(crate) async fn run_stage(
    stage: &'static str,
    provider: &dyn AnalysisProvider,
    model: &str,
    system: Option<&str>,
    prompt: String,
    max_tokens: u32,
    temperature: f32,
    fallback: impl FnOnce() -> String,
) -> StageResult {
    let start = Instant::now();
    let req = CompletionRequest {
        system: system.map(str::to_string),
        prompt,
        model: model.to_string(),
        max_tokens,
        temperature,
    };

    match provider.complete(&req).await {
        Ok(completion) => {
            let tokens_used = completion
                .total_tokens
                .unwrap_or_else(|| estimate_tokens(&req.prompt, &completion.text));
            let elapsed_secs = start.elapsed().as_secs_f64();
            tracing::info!(
                stage,
                provider = provider.name(),
                model,
                tokens_used,
                elapsed_secs,
                "Stage completed"
            );
            StageResult {
                stage: stage.to_string(),
                output: completion.text,
                tokens_used,
                model: model.to_string(),
                elapsed_secs,
                error: None,
            }
        }
        Err(e) => {
            let elapsed_secs = start.elapsed().as_secs_f64();
            tracing::error!(stage, provider = provider.name(), error = %e, "Stage failed, degrading");
            StageResult {
                stage: stage.to_string(),
                output: fallback(),
                tokens_used: 0,
                model: model.to_string(),
                elapsed_secs,
                error: Some(e.to_string()),
            }
        }
    }
}
