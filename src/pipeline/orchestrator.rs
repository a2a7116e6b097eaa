//! The review orchestrator.
//!
//! One dequeue loop admits tasks and spawns each onto its own tokio task,
//! so a slow review never blocks admission. Within one review:
//!
//! 1. mark processing, fetch + bound + filter the diff
//! 2. Scout reduces it (or degrades to a pass-through)
//! 3. Guardian / Architect / Stylist fan out concurrently, each behind
//!    its own provider's token bucket
//! 4. Synthesizer merges the three (plus PR details) into one comment
//! 5. outcome + per-stage costs persist, the comment posts, status flips
//!    to completed
//!
//! Any failure on that path marks the task failed and either re-enqueues
//! it with linear backoff or, once the retry ceiling is reached,
//! dead-letters it. Stage failures are not task failures: they degrade in
//! place and the review continues.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::diff;
use crate::github::SourceControlClient;
use crate::limiter::TokenBucket;
use crate::providers::AnalysisProvider;
use crate::queue::DurableQueue;
use crate::stages::{
    ArchitectStage, GuardianStage, ReviewContext, ScoutStage, StageResult, StylistStage,
    SynthesisContext, SynthesizerStage,
};
use crate::store::{estimate_cost, CostRecord, OutcomeMetadata, ResultStore, ReviewOutcome, StatusStore};
use crate::task::{ReviewStatus, ReviewTask};

/// Pause after an error in the dequeue loop itself.
const LOOP_ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Drives queued review tasks end-to-end.
///
/// All collaborators are injected; the orchestrator owns no hidden global
/// state, so tests run isolated instances in parallel.
pub struct Orchestrator {
    config: Config,
    queue: Arc<dyn DurableQueue>,
    status: Arc<dyn StatusStore>,
    results: Arc<dyn ResultStore>,
    source_control: Arc<dyn SourceControlClient>,

    github_limiter: Arc<TokenBucket>,
    openai_limiter: Arc<TokenBucket>,
    anthropic_limiter: Arc<TokenBucket>,

    scout: ScoutStage,
    guardian: Arc<GuardianStage>,
    architect: Arc<ArchitectStage>,
    stylist: Arc<StylistStage>,
    synthesizer: SynthesizerStage,
}

impl Orchestrator {
    pub fn new(
        config: Config,
        queue: Arc<dyn DurableQueue>,
        status: Arc<dyn StatusStore>,
        results: Arc<dyn ResultStore>,
        source_control: Arc<dyn SourceControlClient>,
        openai: Arc<dyn AnalysisProvider>,
        anthropic: Arc<dyn AnalysisProvider>,
    ) -> Self {
        Self {
            github_limiter: Arc::new(TokenBucket::per_minute(config.github_rate_limit_per_minute)),
            openai_limiter: Arc::new(TokenBucket::per_minute(config.openai_rate_limit_per_minute)),
            anthropic_limiter: Arc::new(TokenBucket::per_minute(
                config.anthropic_rate_limit_per_minute,
            )),
            scout: ScoutStage::new(openai.clone(), config.scout_model.clone()),
            guardian: Arc::new(GuardianStage::new(anthropic, config.guardian_model.clone())),
            architect: Arc::new(ArchitectStage::new(
                openai.clone(),
                config.architect_model.clone(),
            )),
            stylist: Arc::new(StylistStage::new(
                openai.clone(),
                config.stylist_model.clone(),
            )),
            synthesizer: SynthesizerStage::new(openai, config.synthesizer_model.clone()),
            config,
            queue,
            status,
            results,
            source_control,
        }
    }

    /// Run the worker loop until `shutdown` fires.
    ///
    /// Each admitted task runs on its own tokio task; the loop goes
    /// straight back to the queue.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        tracing::info!("Review worker started");
        let poll = Duration::from_secs(self.config.worker_poll_interval_secs);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                dequeued = self.queue.dequeue(poll) => match dequeued {
                    Ok(Some(task)) => {
                        let worker = Arc::clone(&self);
                        tokio::spawn(async move { worker.process_task(task).await });
                    }
                    Ok(None) => {}
                    Err(e) => {
                        tracing::error!(error = %e, "Error in worker loop");
                        tokio::time::sleep(LOOP_ERROR_BACKOFF).await;
                    }
                },
            }
        }

        tracing::info!("Review worker stopped");
    }

    /// Process a single task end-to-end, including retry/dead-letter
    /// handling. Directly callable for isolated testing.
    pub async fn process_task(&self, task: ReviewTask) {
        tracing::info!(
            number = task.number,
            repository = %task.repository,
            retry_count = task.retry_count,
            "Processing review task"
        );

        if let Err(e) = self.run_review(&task).await {
            self.handle_failure(task, e).await;
        }
    }

    /// The fallible review path: every step here is covered by the
    /// retry/dead-letter policy.
    async fn run_review(&self, task: &ReviewTask) -> anyhow::Result<()> {
        self.status
            .create_or_reset(task.number, &task.repository)
            .await?;
        self.status
            .update_status(
                task.number,
                &task.repository,
                ReviewStatus::Processing,
                None,
                None,
            )
            .await?;

        // Fetch and bound the diff.
        self.github_limiter.wait().await;
        let raw_diff = self
            .source_control
            .get_diff(&task.owner, &task.repo_name, task.number)
            .await?;

        let (filtered_diff, files) = diff::process(&raw_diff, self.config.max_diff_size);
        let ctx = ReviewContext {
            repository: task.repository.clone(),
            number: task.number,
            language: diff::detect_language(&files),
        };

        // Scout reduces the diff; on degradation the filtered diff goes
        // downstream unchanged.
        self.openai_limiter.wait().await;
        let scout = self.scout.analyze(&filtered_diff, &ctx).await;
        let review_input = if scout.is_degraded() {
            filtered_diff.clone()
        } else {
            scout.output.clone()
        };

        // Fan out the three specialists, each behind its own bucket.
        let guardian_handle = {
            let stage = Arc::clone(&self.guardian);
            let limiter = Arc::clone(&self.anthropic_limiter);
            let input = review_input.clone();
            let ctx = ctx.clone();
            tokio::spawn(async move {
                limiter.wait().await;
                stage.analyze(&input, &ctx).await
            })
        };
        let architect_handle = {
            let stage = Arc::clone(&self.architect);
            let limiter = Arc::clone(&self.openai_limiter);
            let input = review_input.clone();
            let ctx = ctx.clone();
            tokio::spawn(async move {
                limiter.wait().await;
                stage.analyze(&input, &ctx).await
            })
        };
        let stylist_handle = {
            let stage = Arc::clone(&self.stylist);
            let limiter = Arc::clone(&self.openai_limiter);
            let input = review_input;
            let ctx = ctx.clone();
            tokio::spawn(async move {
                limiter.wait().await;
                stage.analyze(&input, &ctx).await
            })
        };

        // A crashed stage task degrades exactly like a failed provider
        // call; the other two are unaffected.
        let guardian = match guardian_handle.await {
            Ok(result) => result,
            Err(e) => StageResult::degraded(
                "guardian",
                self.guardian.model(),
                GuardianStage::FALLBACK_OUTPUT.to_string(),
                format!("stage execution failed: {e}"),
            ),
        };
        let architect = match architect_handle.await {
            Ok(result) => result,
            Err(e) => StageResult::degraded(
                "architect",
                self.architect.model(),
                ArchitectStage::FALLBACK_OUTPUT.to_string(),
                format!("stage execution failed: {e}"),
            ),
        };
        let stylist = match stylist_handle.await {
            Ok(result) => result,
            Err(e) => StageResult::degraded(
                "stylist",
                self.stylist.model(),
                StylistStage::FALLBACK_OUTPUT.to_string(),
                format!("stage execution failed: {e}"),
            ),
        };

        // PR details feed the synthesis context.
        self.github_limiter.wait().await;
        let details = self
            .source_control
            .get_details(&task.owner, &task.repo_name, task.number)
            .await?;

        self.openai_limiter.wait().await;
        let synth_ctx = SynthesisContext {
            repository: task.repository.clone(),
            pr_title: details.title,
            files_changed: files.len(),
        };
        let synthesizer = self
            .synthesizer
            .analyze(&guardian, &architect, &stylist, &synth_ctx)
            .await;

        // Assemble and persist the outcome.
        let total_tokens = scout.tokens_used
            + guardian.tokens_used
            + architect.tokens_used
            + stylist.tokens_used
            + synthesizer.tokens_used;
        let final_comment = synthesizer.output.clone();

        let outcome = ReviewOutcome {
            number: task.number,
            repository: task.repository.clone(),
            scout,
            guardian,
            architect,
            stylist,
            synthesizer,
            final_comment: final_comment.clone(),
            total_tokens,
            metadata: OutcomeMetadata {
                files_changed: files.len(),
                diff_size: raw_diff.len(),
                filtered_diff_size: filtered_diff.len(),
            },
            created_at: Utc::now(),
        };
        self.results.save_outcome(&outcome).await?;

        for result in outcome.stages() {
            self.results
                .save_cost(&CostRecord {
                    number: task.number,
                    repository: task.repository.clone(),
                    stage: result.stage.clone(),
                    model: result.model.clone(),
                    tokens_used: result.tokens_used,
                    cost_usd: estimate_cost(&result.model, result.tokens_used),
                    recorded_at: Utc::now(),
                })
                .await?;
        }

        // Deliver and complete.
        self.github_limiter.wait().await;
        let comment = self
            .source_control
            .post_comment(&task.owner, &task.repo_name, task.number, &final_comment)
            .await?;
        self.status
            .update_status(
                task.number,
                &task.repository,
                ReviewStatus::Completed,
                None,
                Some(&comment),
            )
            .await?;

        tracing::info!(
            number = task.number,
            repository = %task.repository,
            total_tokens,
            comment_id = comment.id,
            "Review completed"
        );
        Ok(())
    }

    /// Mark the task failed, then either re-enqueue with linear backoff
    /// or dead-letter once the ceiling is reached.
    async fn handle_failure(&self, mut task: ReviewTask, error: anyhow::Error) {
        let error_text = format!("{error:#}");
        tracing::error!(
            number = task.number,
            repository = %task.repository,
            retry_count = task.retry_count,
            error = %error_text,
            "Review task failed"
        );

        if let Err(e) = self
            .status
            .update_status(
                task.number,
                &task.repository,
                ReviewStatus::Failed,
                Some(&error_text),
                None,
            )
            .await
        {
            tracing::error!(error = %e, "Failed to record failure status");
        }

        if task.retry_count >= self.config.max_retries {
            if let Err(e) = self.queue.enqueue_dead_letter(&task, &error_text).await {
                tracing::error!(error = %e, "Failed to dead-letter task");
            }
            return;
        }

        task.retry_count += 1;
        let delay =
            Duration::from_secs(self.config.retry_delay_secs * u64::from(task.retry_count));
        tracing::info!(
            number = task.number,
            retry_count = task.retry_count,
            delay_secs = delay.as_secs(),
            "Re-enqueueing task for retry"
        );
        tokio::time::sleep(delay).await;

        if let Err(e) = self.queue.enqueue(&task).await {
            tracing::error!(error = %e, "Failed to re-enqueue task");
        }
    }
}
