//! Architect: structure, design, and performance review.

use std::sync::Arc;

use crate::providers::AnalysisProvider;

use super::{clip_for_prompt, run_stage, ReviewContext, StageResult};

const SYSTEM_PROMPT: &str = "You are a senior software architect with expertise in code quality, design patterns, and best practices.";

/// Architectural analysis stage.
pub struct ArchitectStage {
    provider: Arc<dyn AnalysisProvider>,
    model: String,
}

impl ArchitectStage {
    /// Degraded output when the analysis cannot be produced.
    pub const FALLBACK_OUTPUT: &'static str =
        "Architectural analysis failed. Please review manually.";

    pub fn new(provider: Arc<dyn AnalysisProvider>, model: String) -> Self {
        Self { provider, model }
    }

    /// Model this stage is bound to.
    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn analyze(&self, diff: &str, ctx: &ReviewContext) -> StageResult {
        tracing::debug!(repository = %ctx.repository, number = ctx.number, "Architect starting");
        let prompt = build_prompt(diff);
        run_stage(
            "architect",
            self.provider.as_ref(),
            &self.model,
            Some(SYSTEM_PROMPT),
            prompt,
            4000,
            0.2,
            || Self::FALLBACK_OUTPUT.to_string(),
        )
        .await
    }
}

fn build_prompt(diff: &str) -> String {
    format!(
        r#"You are a senior software architect reviewing code changes. Analyze this Git diff for:

1. Logic Flow Issues:
   - Missing error handling
   - Incorrect control flow
   - Race conditions
   - Dead code
   - Infinite loops or recursion issues

2. Code Complexity:
   - Cyclomatic complexity
   - Nested conditionals
   - Long functions/methods
   - Cognitive complexity

3. DRY (Don't Repeat Yourself) Violations:
   - Code duplication
   - Opportunities for abstraction
   - Missing utility functions

4. Design Patterns:
   - Appropriate use of design patterns
   - Missing abstractions
   - Tight coupling
   - Poor separation of concerns

5. Performance:
   - Inefficient algorithms
   - Unnecessary database queries
   - Memory leaks
   - Resource management

For each issue, provide:
- Type of issue
- Location (file/function if identifiable)
- Impact
- Suggested improvement

Here is the diff:

{}

Provide a comprehensive architectural review."#,
        clip_for_prompt(diff)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::testing::ScriptedProvider;

    #[tokio::test]
    async fn failure_yields_fixed_fallback() {
        let provider = Arc::new(ScriptedProvider::new("openai"));
        provider.push_err("timeout");

        let stage = ArchitectStage::new(provider, "gpt-4o".into());
        let ctx = ReviewContext {
            repository: "acme/widgets".into(),
            number: 42,
            language: "rust".into(),
        };
        let result = stage.analyze("+fn f() {}", &ctx).await;

        assert!(result.is_degraded());
        assert_eq!(result.output, ArchitectStage::FALLBACK_OUTPUT);
    }
}
