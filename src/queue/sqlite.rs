//! SQLite-backed queue: `review_queue` ordered by rowid plus `review_dlq`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use crate::task::ReviewTask;

use super::{DeadLetter, DurableQueue};

/// Interval between head polls while a `dequeue` waits.
const DEQUEUE_POLL: Duration = Duration::from_millis(250);

/// [`DurableQueue`] persisted in a local SQLite database.
pub struct SqliteQueue {
    db_path: PathBuf,
}

impl SqliteQueue {
    /// Open (creating the schema if needed) the queue at `db_path`.
    pub fn new(db_path: &Path) -> anyhow::Result<Self> {
        let conn = Connection::open(db_path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS review_queue (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                payload TEXT NOT NULL,
                enqueued_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS review_dlq (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                payload TEXT NOT NULL,
                error TEXT NOT NULL,
                failed_at TEXT NOT NULL
            );",
        )?;

        Ok(Self {
            db_path: db_path.to_path_buf(),
        })
    }

    fn conn(&self) -> anyhow::Result<Connection> {
        Ok(Connection::open(&self.db_path)?)
    }

    /// Pop the head row, if any, in one transaction.
    fn pop_front(&self) -> anyhow::Result<Option<ReviewTask>> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let row: Option<(i64, String)> = tx
            .query_row(
                "SELECT id, payload FROM review_queue ORDER BY id LIMIT 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((id, payload)) = row else {
            return Ok(None);
        };

        tx.execute("DELETE FROM review_queue WHERE id = ?1", params![id])?;
        tx.commit()?;

        match serde_json::from_str(&payload) {
            Ok(task) => Ok(Some(task)),
            Err(e) => {
                // A payload this process cannot read would wedge the head
                // forever; drop it and keep draining.
                tracing::error!(error = %e, "Dropping undecodable queue payload");
                Ok(None)
            }
        }
    }

    /// All dead-lettered tasks, oldest first.
    pub fn dead_letters(&self) -> anyhow::Result<Vec<DeadLetter>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT payload, error, failed_at FROM review_dlq ORDER BY id")?;

        let letters = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .filter_map(|r| r.ok())
            .filter_map(|(payload, error, failed_at)| {
                let task = serde_json::from_str(&payload).ok()?;
                let failed_at = failed_at.parse().ok()?;
                Some(DeadLetter {
                    task,
                    error,
                    failed_at,
                })
            })
            .collect();

        Ok(letters)
    }
}

#[async_trait]
impl DurableQueue for SqliteQueue {
    async fn enqueue(&self, task: &ReviewTask) -> anyhow::Result<()> {
        let payload = serde_json::to_string(task)?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO review_queue (payload, enqueued_at) VALUES (?1, ?2)",
            params![payload, Utc::now().to_rfc3339()],
        )?;
        tracing::info!(
            number = task.number,
            repository = %task.repository,
            "Task enqueued"
        );
        Ok(())
    }

    async fn dequeue(&self, timeout: Duration) -> anyhow::Result<Option<ReviewTask>> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(task) = self.pop_front()? {
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
        let payload = serde_json::to_string(task)?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO review_dlq (payload, error, failed_at) VALUES (?1, ?2, ?3)",
            params![payload, error, Utc::now().to_rfc3339()],
        )?;
        tracing::warn!(
            number = task.number,
            repository = %task.repository,
            error,
            "Task moved to dead-letter store"
        );
        Ok(())
    }

    async fn len(&self) -> anyhow::Result<u64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM review_queue", [], |r| r.get(0))?;
        Ok(count as u64)
    }

    async fn dead_letter_len(&self) -> anyhow::Result<u64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM review_dlq", [], |r| r.get(0))?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_queue() -> (TempDir, SqliteQueue) {
        let tmp = TempDir::new().unwrap();
        let queue = SqliteQueue::new(&tmp.path().join("queue.db")).unwrap();
        (tmp, queue)
    }

    #[tokio::test]
    async fn fifo_order_is_preserved() {
        let (_tmp, queue) = make_queue();

        for number in [1u64, 2, 3] {
            queue
                .enqueue(&ReviewTask::new("acme", "widgets", number))
                .await
                .unwrap();
        }
        assert_eq!(queue.len().await.unwrap(), 3);

        for expected in [1u64, 2, 3] {
            let task = queue
                .dequeue(Duration::from_millis(10))
                .await
                .unwrap()
                .unwrap();
            assert_eq!(task.number, expected);
        }
        assert_eq!(queue.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn dequeue_times_out_empty() {
        let (_tmp, queue) = make_queue();
        let result = queue.dequeue(Duration::from_millis(20)).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn tasks_survive_reopen() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("queue.db");

        {
            let queue = SqliteQueue::new(&path).unwrap();
            queue
                .enqueue(&ReviewTask::new("acme", "widgets", 7))
                .await
                .unwrap();
        }

        let reopened = SqliteQueue::new(&path).unwrap();
        let task = reopened
            .dequeue(Duration::from_millis(10))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(task.number, 7);
    }

    #[tokio::test]
    async fn dead_letter_records_task_and_error() {
        let (_tmp, queue) = make_queue();
        let mut task = ReviewTask::new("acme", "widgets", 42);
        task.retry_count = 3;

        queue
            .enqueue_dead_letter(&task, "diff fetch kept failing")
            .await
            .unwrap();

        assert_eq!(queue.dead_letter_len().await.unwrap(), 1);
        let letters = queue.dead_letters().unwrap();
        assert_eq!(letters.len(), 1);
        assert_eq!(letters[0].task.number, 42);
        assert_eq!(letters[0].task.retry_count, 3);
        assert_eq!(letters[0].error, "diff fetch kept failing");
    }

    #[tokio::test]
    async fn dead_letter_does_not_touch_primary_queue() {
        let (_tmp, queue) = make_queue();
        let task = ReviewTask::new("acme", "widgets", 42);

        queue.enqueue_dead_letter(&task, "boom").await.unwrap();
        assert_eq!(queue.len().await.unwrap(), 0);
        assert!(queue
            .dequeue(Duration::from_millis(10))
            .await
            .unwrap()
            .is_none());
    }
}
