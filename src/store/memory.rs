//! In-memory status and result stores for tests.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::task::{PostedComment, ReviewStatus};

use super::{CostRecord, ResultStore, ReviewOutcome, StatusStore};

/// Latest status plus the full transition history for a review.
#[derive(Debug, Clone)]
pub struct StatusRecord {
    pub status: ReviewStatus,
    pub error: Option<String>,
    pub comment_id: Option<i64>,
    pub history: Vec<ReviewStatus>,
}

/// [`StatusStore`] held in memory.
#[derive(Default)]
pub struct InMemoryStatusStore {
    records: Mutex<HashMap<(u64, String), StatusRecord>>,
}

impl InMemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest record for a review, if any.
    pub fn get(&self, number: u64, repository: &str) -> Option<StatusRecord> {
        self.records
            .lock()
            .get(&(number, repository.to_string()))
            .cloned()
    }
}

#[async_trait]
impl StatusStore for InMemoryStatusStore {
    async fn create_or_reset(&self, number: u64, repository: &str) -> anyhow::Result<()> {
        let mut records = self.records.lock();
        let record = records
            .entry((number, repository.to_string()))
            .or_insert_with(|| StatusRecord {
                status: ReviewStatus::Pending,
                error: None,
                comment_id: None,
                history: Vec::new(),
            });
        record.status = ReviewStatus::Pending;
        record.error = None;
        record.comment_id = None;
        record.history.push(ReviewStatus::Pending);
        Ok(())
    }

    async fn update_status(
        &self,
        number: u64,
        repository: &str,
        status: ReviewStatus,
        error: Option<&str>,
        comment: Option<&PostedComment>,
    ) -> anyhow::Result<()> {
        let mut records = self.records.lock();
        let record = records
            .entry((number, repository.to_string()))
            .or_insert_with(|| StatusRecord {
                status,
                error: None,
                comment_id: None,
                history: Vec::new(),
            });
        record.status = status;
        record.error = error.map(str::to_string);
        if let Some(comment) = comment {
            record.comment_id = Some(comment.id);
        }
        record.history.push(status);
        Ok(())
    }
}

/// [`ResultStore`] held in memory.
#[derive(Default)]
pub struct InMemoryResultStore {
    outcomes: Mutex<Vec<ReviewOutcome>>,
    costs: Mutex<Vec<CostRecord>>,
}

impl InMemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn outcomes(&self) -> Vec<ReviewOutcome> {
        self.outcomes.lock().clone()
    }

    pub fn costs(&self) -> Vec<CostRecord> {
        self.costs.lock().clone()
    }
}

#[async_trait]
impl ResultStore for InMemoryResultStore {
    async fn save_outcome(&self, outcome: &ReviewOutcome) -> anyhow::Result<()> {
        self.outcomes.lock().push(outcome.clone());
        Ok(())
    }

    async fn save_cost(&self, record: &CostRecord) -> anyhow::Result<()> {
        self.costs.lock().push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn status_history_is_recorded() {
        let store = InMemoryStatusStore::new();
        store.create_or_reset(42, "acme/widgets").await.unwrap();
        store
            .update_status(42, "acme/widgets", ReviewStatus::Processing, None, None)
            .await
            .unwrap();
        store
            .update_status(
                42,
                "acme/widgets",
                ReviewStatus::Completed,
                None,
                Some(&PostedComment { id: 5 }),
            )
            .await
            .unwrap();

        let record = store.get(42, "acme/widgets").unwrap();
        assert_eq!(record.status, ReviewStatus::Completed);
        assert_eq!(record.comment_id, Some(5));
        assert_eq!(
            record.history,
            vec![
                ReviewStatus::Pending,
                ReviewStatus::Processing,
                ReviewStatus::Completed
            ]
        );
    }
}
