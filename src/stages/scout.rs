//! Scout: reduces a diff to its review-relevant changes.

use std::sync::Arc;

use crate::providers::AnalysisProvider;

use super::{clip_for_prompt, run_stage, ReviewContext, StageResult};

const SYSTEM_PROMPT: &str =
    "You are a code review assistant that filters Git diffs to show only relevant changes.";

/// Noise-reduction stage. On failure the input diff passes through
/// unchanged, so downstream stages always see a reviewable diff.
pub struct ScoutStage {
    provider: Arc<dyn AnalysisProvider>,
    model: String,
}

impl ScoutStage {
    pub fn new(provider: Arc<dyn AnalysisProvider>, model: String) -> Self {
        Self { provider, model }
    }

    pub async fn analyze(&self, diff: &str, ctx: &ReviewContext) -> StageResult {
        tracing::debug!(repository = %ctx.repository, number = ctx.number, "Scout starting");
        let prompt = build_prompt(diff);
        run_stage(
            "scout",
            self.provider.as_ref(),
            &self.model,
            Some(SYSTEM_PROMPT),
            prompt,
            8000,
            0.1,
            || diff.to_string(),
        )
        .await
    }
}

fn build_prompt(diff: &str) -> String {
    format!(
        r#"You are a code review assistant. Your task is to filter a Git diff and identify the most relevant code changes for review.

Focus on:
- Functional code changes (not comments, whitespace-only changes, or formatting)
- Logic modifications
- New features or bug fixes
- Important refactoring

Ignore:
- Lock file changes (package-lock.json, yarn.lock, etc.)
- Generated files
- Binary files
- Whitespace-only changes
- Comment-only changes

Here is the diff:

{}

Please provide a filtered version of the diff that contains only the relevant code changes for review. If the diff is already clean, return it as-is. Format your response as a Git unified diff."#,
        clip_for_prompt(diff)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::testing::ScriptedProvider;

    fn ctx() -> ReviewContext {
        ReviewContext {
            repository: "acme/widgets".into(),
            number: 42,
            language: "rust".into(),
        }
    }

    #[tokio::test]
    async fn success_returns_filtered_diff() {
        let provider = Arc::new(ScriptedProvider::new("openai"));
        provider.push_ok("diff --git a/x b/x\n+only the good part", Some(150));

        let stage = ScoutStage::new(provider, "gpt-4o-mini".into());
        let result = stage.analyze("diff --git a/x b/x\n+noise\n+signal", &ctx()).await;

        assert!(!result.is_degraded());
        assert_eq!(result.stage, "scout");
        assert_eq!(result.tokens_used, 150);
        assert!(result.output.contains("only the good part"));
    }

    #[tokio::test]
    async fn failure_passes_input_through_unchanged() {
        let provider = Arc::new(ScriptedProvider::new("openai"));
        provider.push_err("rate limited");

        let input = "diff --git a/x b/x\n+unchanged";
        let stage = ScoutStage::new(provider, "gpt-4o-mini".into());
        let result = stage.analyze(input, &ctx()).await;

        assert!(result.is_degraded());
        assert_eq!(result.output, input);
        assert_eq!(result.tokens_used, 0);
    }
}
