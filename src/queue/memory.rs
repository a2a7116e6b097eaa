//! In-memory queue for tests and single-process experiments.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use crate::task::ReviewTask;

use super::{DeadLetter, DurableQueue};

/// Interval between head polls while a `dequeue` waits.
const DEQUEUE_POLL: Duration = Duration::from_millis(10);

/// [`DurableQueue`] held entirely in memory. Not durable across restarts;
/// everything else matches the SQLite implementation's semantics.
#[derive(Default)]
pub struct InMemoryQueue {
    queue: Mutex<VecDeque<ReviewTask>>,
    dead: Mutex<Vec<DeadLetter>>,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the dead-letter store.
    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.dead.lock().clone()
    }
}

#[async_trait]
impl DurableQueue for InMemoryQueue {
    async fn enqueue(&self, task: &ReviewTask) -> anyhow::Result<()> {
        self.queue.lock().push_back(task.clone());
        Ok(())
    }

    async fn dequeue(&self, timeout: Duration) -> anyhow::Result<Option<ReviewTask>> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(task) = self.queue.lock().pop_front() {
                return Ok(Some(task));
            }
            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(DEQUEUE_POLL.min(deadline - now)).await;
        }
    }

    async fn enqueue_dead_letter(&self, task: &ReviewTask, error: &str) -> anyhow::Result<()> {
        self.dead.lock().push(DeadLetter {
            task: task.clone(),
            error: error.to_string(),
            failed_at: Utc::now(),
        });
        Ok(())
    }

    async fn len(&self) -> anyhow::Result<u64> {
        Ok(self.queue.lock().len() as u64)
    }

    async fn dead_letter_len(&self) -> anyhow::Result<u64> {
        Ok(self.dead.lock().len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fifo_and_timeout() {
        let queue = InMemoryQueue::new();
        queue
            .enqueue(&ReviewTask::new("acme", "widgets", 1))
            .await
            .unwrap();
        queue
            .enqueue(&ReviewTask::new("acme", "widgets", 2))
            .await
            .unwrap();

        let first = queue
            .dequeue(Duration::from_millis(10))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.number, 1);

        let second = queue
            .dequeue(Duration::from_millis(10))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.number, 2);

        assert!(queue
            .dequeue(Duration::from_millis(10))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn dequeue_sees_task_enqueued_while_waiting() {
        let queue = std::sync::Arc::new(InMemoryQueue::new());

        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.dequeue(Duration::from_secs(5)).await })
        };

        tokio::time::sleep(Duration::from_millis(30)).await;
        queue
            .enqueue(&ReviewTask::new("acme", "widgets", 9))
            .await
            .unwrap();

        let task = waiter.await.unwrap().unwrap().unwrap();
        assert_eq!(task.number, 9);
    }
}
