//! Stylist: naming and style review.

use std::sync::Arc;

use crate::providers::AnalysisProvider;

use super::{clip_for_prompt, run_stage, ReviewContext, StageResult};

const SYSTEM_PROMPT: &str =
    "You are a friendly code style reviewer who provides constructive feedback.";

/// Style analysis stage. The detected-language hint only shapes how the
/// guidance is phrased.
pub struct StylistStage {
    provider: Arc<dyn AnalysisProvider>,
    model: String,
}

impl StylistStage {
    /// Degraded output when the analysis cannot be produced.
    pub const FALLBACK_OUTPUT: &'static str = "Style analysis failed. Please review manually.";

    pub fn new(provider: Arc<dyn AnalysisProvider>, model: String) -> Self {
        Self { provider, model }
    }

    /// Model this stage is bound to.
    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn analyze(&self, diff: &str, ctx: &ReviewContext) -> StageResult {
        tracing::debug!(repository = %ctx.repository, number = ctx.number, "Stylist starting");
        let prompt = build_prompt(diff, &ctx.language);
        run_stage(
            "stylist",
            self.provider.as_ref(),
            &self.model,
            Some(SYSTEM_PROMPT),
            prompt,
            3000,
            0.3,
            || Self::FALLBACK_OUTPUT.to_string(),
        )
        .await
    }
}

fn build_prompt(diff: &str, language: &str) -> String {
    format!(
        r#"You are a code style reviewer. Analyze this Git diff for style and naming issues.

Focus on:
1. Naming Conventions:
   - Variable names (camelCase, snake_case, etc.)
   - Function/method names
   - Class names
   - Constant names
   - File names

2. Code Style:
   - Indentation consistency
   - Spacing and formatting
   - Line length
   - Trailing whitespace
   - Missing/extra blank lines

3. Best Practices:
   - Magic numbers (should be constants)
   - Comment quality
   - Documentation
   - Import organization

4. Language-Specific Linting:
   - Follow common linting rules for {language}
   - Common anti-patterns

Provide feedback in a friendly, constructive manner. Focus on actionable improvements.
If the code style is good, acknowledge that.

Here is the diff:

{diff}

Provide a style review with specific suggestions."#,
        language = language,
        diff = clip_for_prompt(diff),
    )
}
