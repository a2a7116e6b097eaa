//! Durable FIFO work queue with a companion dead-letter store.
//!
//! Tasks enter at the tail and leave at the head; a task that exhausts its
//! retry budget moves to the dead-letter store with the error that killed
//! it and waits for an operator. Queue lengths are observability only and
//! never affect behavior.

mod memory;
mod sqlite;

pub use memory::InMemoryQueue;
pub use sqlite::SqliteQueue;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::task::ReviewTask;

/// A task that exhausted its retry budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetter {
    /// The task as it looked on its final failure.
    pub task: ReviewTask,
    /// Error text from the final attempt.
    pub error: String,
    /// When the task was dead-lettered.
    pub failed_at: DateTime<Utc>,
}

/// Durable FIFO queue contract.
#[async_trait]
pub trait DurableQueue: Send + Sync {
    /// Append a task to the tail.
    async fn enqueue(&self, task: &ReviewTask) -> anyhow::Result<()>;

    /// Pop from the head, waiting up to `timeout`; `None` on timeout.
    async fn dequeue(&self, timeout: Duration) -> anyhow::Result<Option<ReviewTask>>;

    /// Record a task that exhausted its retries. Used only then.
    async fn enqueue_dead_letter(&self, task: &ReviewTask, error: &str) -> anyhow::Result<()>;

    /// Number of queued tasks.
    async fn len(&self) -> anyhow::Result<u64>;

    /// Number of dead-lettered tasks.
    async fn dead_letter_len(&self) -> anyhow::Result<u64>;
}
