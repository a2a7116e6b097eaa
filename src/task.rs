//! Task and review-status types shared across the queue, stores, and
//! orchestrator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Review task ──────────────────────────────────────────────────

/// One queued unit of work: review a single pull request.
///
/// Serialized to JSON as the durable queue payload. Owned by the queue
/// until dequeued, then by exactly one pipeline execution; the only field
/// ever mutated is `retry_count`, incremented before a re-enqueue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewTask {
    /// Pull request number.
    pub number: u64,
    /// Repository full name (`owner/name`).
    pub repository: String,
    /// Repository owner.
    pub owner: String,
    /// Repository name without the owner.
    pub repo_name: String,
    /// Pull request title as seen at enqueue time.
    pub title: String,
    /// Pull request author login.
    pub author: String,
    /// Base branch name.
    pub base_branch: String,
    /// Head branch name.
    pub head_branch: String,
    /// Head commit SHA.
    pub head_sha: String,
    /// When the task entered the queue.
    pub queued_at: DateTime<Utc>,
    /// Number of times this task has been retried.
    #[serde(default)]
    pub retry_count: u32,
}

impl ReviewTask {
    /// Create a task for `owner/name` PR `number` with empty ref metadata.
    ///
    /// Used by the `enqueue` CLI path and tests; webhook-driven tasks carry
    /// the full metadata from the event payload.
    pub fn new(owner: &str, repo_name: &str, number: u64) -> Self {
        Self {
            number,
            repository: format!("{owner}/{repo_name}"),
            owner: owner.to_string(),
            repo_name: repo_name.to_string(),
            title: String::new(),
            author: String::new(),
            base_branch: String::new(),
            head_branch: String::new(),
            head_sha: String::new(),
            queued_at: Utc::now(),
            retry_count: 0,
        }
    }
}

// ── Review status ────────────────────────────────────────────────

/// Lifecycle status of a review, as persisted by the status store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    /// Recorded but not yet picked up.
    Pending,
    /// A pipeline execution owns the task.
    Processing,
    /// Review finished and the comment was posted.
    Completed,
    /// The attempt failed; the task was re-enqueued or dead-lettered.
    Failed,
}

impl ReviewStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Source-control payloads ──────────────────────────────────────

/// Pull request details fetched for synthesis context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullDetails {
    /// Pull request title.
    pub title: String,
    /// Pull request description body.
    #[serde(default)]
    pub body: String,
}

/// Receipt for a posted review comment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PostedComment {
    /// Comment id assigned by the source-control provider.
    pub id: i64,
}
