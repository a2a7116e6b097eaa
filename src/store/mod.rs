//! Review persistence: status tracking, outcomes, and per-stage costs.

mod memory;
mod sqlite;

pub use memory::{InMemoryResultStore, InMemoryStatusStore, StatusRecord};
pub use sqlite::{SqliteStore, StoredReview};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::stages::StageResult;
use crate::task::{PostedComment, ReviewStatus};

// ── Persisted aggregates ─────────────────────────────────────────

/// Size metadata captured alongside an outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeMetadata {
    /// Files surviving the noise filter.
    pub files_changed: usize,
    /// Raw diff size in bytes.
    pub diff_size: usize,
    /// Filtered diff size in bytes.
    pub filtered_diff_size: usize,
}

/// Aggregate result of one review run. Created once per task, persisted
/// once, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewOutcome {
    /// Pull request number.
    pub number: u64,
    /// Repository full name.
    pub repository: String,
    pub scout: StageResult,
    pub guardian: StageResult,
    pub architect: StageResult,
    pub stylist: StageResult,
    pub synthesizer: StageResult,
    /// The comment text that was (or will be) posted.
    pub final_comment: String,
    /// Sum of the five stage token counts.
    pub total_tokens: u64,
    pub metadata: OutcomeMetadata,
    pub created_at: DateTime<Utc>,
}

impl ReviewOutcome {
    /// The five stage results in pipeline order.
    pub fn stages(&self) -> [&StageResult; 5] {
        [
            &self.scout,
            &self.guardian,
            &self.architect,
            &self.stylist,
            &self.synthesizer,
        ]
    }
}

/// One stage's API usage for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostRecord {
    /// Pull request number.
    pub number: u64,
    /// Repository full name.
    pub repository: String,
    /// Stage that spent the tokens.
    pub stage: String,
    /// Model used.
    pub model: String,
    /// Tokens consumed.
    pub tokens_used: u64,
    /// Estimated cost in USD.
    pub cost_usd: f64,
    pub recorded_at: DateTime<Utc>,
}

/// Estimated USD cost for `tokens` on `model`, from a per-1K-token rate
/// table. Unknown models get a conservative default.
pub fn estimate_cost(model: &str, tokens: u64) -> f64 {
    let per_1k = if model.contains("gpt-4o-mini") {
        0.00015
    } else if model.contains("gpt-4o") {
        0.005
    } else if model.contains("claude-3-5-sonnet") {
        0.003
    } else {
        0.001
    };
    (tokens as f64 / 1000.0) * per_1k
}

// ── Contracts ────────────────────────────────────────────────────

/// Review lifecycle status persistence.
#[async_trait]
pub trait StatusStore: Send + Sync {
    /// Create the review record, or reset an existing one to `pending`.
    async fn create_or_reset(&self, number: u64, repository: &str) -> anyhow::Result<()>;

    /// Record a status transition, optionally with an error message and
    /// the posted-comment receipt.
    async fn update_status(
        &self,
        number: u64,
        repository: &str,
        status: ReviewStatus,
        error: Option<&str>,
        comment: Option<&PostedComment>,
    ) -> anyhow::Result<()>;
}

/// Outcome and cost persistence.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Persist the aggregate outcome of one run.
    async fn save_outcome(&self, outcome: &ReviewOutcome) -> anyhow::Result<()>;

    /// Persist one stage's usage record.
    async fn save_cost(&self, record: &CostRecord) -> anyhow::Result<()>;
}
