//! Synthesizer: merges the specialist reviews into one postable comment.

use std::sync::Arc;

use crate::providers::AnalysisProvider;

use super::{run_stage, StageResult};

const SYSTEM_PROMPT: &str =
    "You are a senior developer who writes clear, constructive, and actionable code review comments.";

/// Context assembled from the run for the synthesis prompt.
#[derive(Debug, Clone)]
pub struct SynthesisContext {
    /// Repository full name.
    pub repository: String,
    /// Pull request title fetched from the source-control provider.
    pub pr_title: String,
    /// Number of files surviving the noise filter.
    pub files_changed: usize,
}

/// Final stage: one markdown comment from the Guardian/Architect/Stylist
/// outputs, prioritized by severity, introducing nothing absent from its
/// inputs. On failure it concatenates whichever upstream sections
/// succeeded, so the output is non-empty whenever at least one specialist
/// produced a real analysis.
pub struct SynthesizerStage {
    provider: Arc<dyn AnalysisProvider>,
    model: String,
}

impl SynthesizerStage {
    pub fn new(provider: Arc<dyn AnalysisProvider>, model: String) -> Self {
        Self { provider, model }
    }

    pub async fn analyze(
        &self,
        guardian: &StageResult,
        architect: &StageResult,
        stylist: &StageResult,
        ctx: &SynthesisContext,
    ) -> StageResult {
        let prompt = build_prompt(guardian, architect, stylist, ctx);
        run_stage(
            "synthesizer",
            self.provider.as_ref(),
            &self.model,
            Some(SYSTEM_PROMPT),
            prompt,
            4000,
            0.3,
            || fallback_comment(guardian, architect, stylist),
        )
        .await
    }
}

/// Pick the section body for a specialist result: its output when it
/// succeeded, a neutral placeholder when it degraded.
fn section(result: &StageResult, placeholder: &str) -> String {
    if result.is_degraded() {
        placeholder.to_string()
    } else {
        result.output.clone()
    }
}

fn build_prompt(
    guardian: &StageResult,
    architect: &StageResult,
    stylist: &StageResult,
    ctx: &SynthesisContext,
) -> String {
    format!(
        r#"You are a senior developer synthesizing code review feedback from multiple specialized reviewers.

Your task is to create a single, cohesive, and friendly PR review comment that:
1. Summarizes the key findings from all reviewers
2. Prioritizes issues by severity/importance
3. Provides actionable feedback
4. Maintains a constructive, professional tone
5. Uses proper Markdown formatting for GitHub

Do not introduce findings that are not present in the reviews below.

Here are the individual reviews:

## Security Review (Guardian):
{guardian}

## Architecture Review (Architect):
{architect}

## Style Review (Stylist):
{stylist}

## Context:
- Repository: {repository}
- PR Title: {title}
- Files Changed: {files}

Create a well-structured PR review comment that:
- Starts with a brief summary
- Groups findings by category (Security, Architecture, Style)
- Highlights critical issues first
- Provides specific, actionable suggestions
- Ends on a positive note

Format the output as GitHub Markdown."#,
        guardian = section(guardian, "No security issues found or analysis unavailable."),
        architect = section(architect, "No architectural issues found or analysis unavailable."),
        stylist = section(stylist, "Code style looks good or analysis unavailable."),
        repository = ctx.repository,
        title = ctx.pr_title,
        files = ctx.files_changed,
    )
}

/// Deterministic degraded output: concatenate the sections of every
/// specialist that succeeded, skipping the ones that errored.
fn fallback_comment(
    guardian: &StageResult,
    architect: &StageResult,
    stylist: &StageResult,
) -> String {
    let mut comment = String::from("## Code Review Summary\n\n");

    if !guardian.is_degraded() {
        comment.push_str("### Security Review\n");
        comment.push_str(&guardian.output);
        comment.push_str("\n\n");
    }
    if !architect.is_degraded() {
        comment.push_str("### Architecture Review\n");
        comment.push_str(&architect.output);
        comment.push_str("\n\n");
    }
    if !stylist.is_degraded() {
        comment.push_str("### Style Review\n");
        comment.push_str(&stylist.output);
        comment.push_str("\n\n");
    }

    comment
}
