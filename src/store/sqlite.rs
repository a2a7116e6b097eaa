//! SQLite-backed status and result stores.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use crate::task::{PostedComment, ReviewStatus};

use super::{CostRecord, ResultStore, ReviewOutcome, StatusStore};

/// Status row read back for operators and tests.
#[derive(Debug, Clone)]
pub struct StoredReview {
    pub status: String,
    pub error_message: Option<String>,
    pub comment_posted: bool,
    pub comment_id: Option<i64>,
}

/// [`StatusStore`] + [`ResultStore`] persisted in a local SQLite database.
pub struct SqliteStore {
    db_path: PathBuf,
}

impl SqliteStore {
    /// Open (creating the schema if needed) the store at `db_path`.
    pub fn new(db_path: &Path) -> anyhow::Result<Self> {
        let conn = Connection::open(db_path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS pr_reviews (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                pr_number INTEGER NOT NULL,
                repository TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                started_at TEXT,
                completed_at TEXT,
                error_message TEXT,
                comment_posted INTEGER NOT NULL DEFAULT 0,
                comment_id INTEGER,
                updated_at TEXT,
                UNIQUE(pr_number, repository)
            );
            CREATE TABLE IF NOT EXISTS review_results (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                pr_number INTEGER NOT NULL,
                repository TEXT NOT NULL,
                scout TEXT,
                guardian TEXT,
                architect TEXT,
                stylist TEXT,
                synthesizer TEXT,
                final_comment TEXT,
                total_tokens INTEGER NOT NULL DEFAULT 0,
                metadata TEXT,
                created_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS api_usage (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                pr_number INTEGER NOT NULL,
                repository TEXT NOT NULL,
                stage TEXT NOT NULL,
                model TEXT NOT NULL,
                tokens_used INTEGER NOT NULL,
                cost_usd REAL NOT NULL DEFAULT 0.0,
                recorded_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_pr_reviews_status ON pr_reviews(status);
            CREATE INDEX IF NOT EXISTS idx_api_usage_recorded ON api_usage(recorded_at);",
        )?;

        Ok(Self {
            db_path: db_path.to_path_buf(),
        })
    }

    fn conn(&self) -> anyhow::Result<Connection> {
        Ok(Connection::open(&self.db_path)?)
    }

    /// Read a review's status row back.
    pub fn fetch_status(&self, number: u64, repository: &str) -> anyhow::Result<Option<StoredReview>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT status, error_message, comment_posted, comment_id
                 FROM pr_reviews WHERE pr_number = ?1 AND repository = ?2",
                params![number as i64, repository],
                |row| {
                    Ok(StoredReview {
                        status: row.get(0)?,
                        error_message: row.get(1)?,
                        comment_posted: row.get::<_, i64>(2)? != 0,
                        comment_id: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }
}

#[async_trait]
impl StatusStore for SqliteStore {
    async fn create_or_reset(&self, number: u64, repository: &str) -> anyhow::Result<()> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO pr_reviews (pr_number, repository, status, started_at, updated_at)
             VALUES (?1, ?2, 'pending', ?3, ?3)
             ON CONFLICT(pr_number, repository) DO UPDATE SET
                 status = 'pending',
                 started_at = excluded.started_at,
                 completed_at = NULL,
                 error_message = NULL,
                 comment_posted = 0,
                 comment_id = NULL,
                 updated_at = excluded.updated_at",
            params![number as i64, repository, now],
        )?;
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
        let now = Utc::now().to_rfc3339();
        let conn = self.conn()?;

        match status {
            ReviewStatus::Completed => {
                conn.execute(
                    "UPDATE pr_reviews
                     SET status = ?1, completed_at = ?2, error_message = ?3,
                         comment_posted = ?4, comment_id = ?5, updated_at = ?2
                     WHERE pr_number = ?6 AND repository = ?7",
                    params![
                        status.as_str(),
                        now,
                        error,
                        comment.is_some() as i64,
                        comment.map(|c| c.id),
                        number as i64,
                        repository,
                    ],
                )?;
            }
            ReviewStatus::Failed => {
                conn.execute(
                    "UPDATE pr_reviews
                     SET status = ?1, completed_at = ?2, error_message = ?3, updated_at = ?2
                     WHERE pr_number = ?4 AND repository = ?5",
                    params![status.as_str(), now, error, number as i64, repository],
                )?;
            }
            _ => {
                conn.execute(
                    "UPDATE pr_reviews
                     SET status = ?1, error_message = ?2, updated_at = ?3
                     WHERE pr_number = ?4 AND repository = ?5",
                    params![status.as_str(), error, now, number as i64, repository],
                )?;
            }
        }

        Ok(())
    }
}

#[async_trait]
impl ResultStore for SqliteStore {
    async fn save_outcome(&self, outcome: &ReviewOutcome) -> anyhow::Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO review_results (
                 pr_number, repository, scout, guardian, architect, stylist,
                 synthesizer, final_comment, total_tokens, metadata, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                outcome.number as i64,
                outcome.repository,
                serde_json::to_string(&outcome.scout)?,
                serde_json::to_string(&outcome.guardian)?,
                serde_json::to_string(&outcome.architect)?,
                serde_json::to_string(&outcome.stylist)?,
                serde_json::to_string(&outcome.synthesizer)?,
                outcome.final_comment,
                outcome.total_tokens as i64,
                serde_json::to_string(&outcome.metadata)?,
                outcome.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    async fn save_cost(&self, record: &CostRecord) -> anyhow::Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO api_usage (pr_number, repository, stage, model, tokens_used, cost_usd, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.number as i64,
                record.repository,
                record.stage,
                record.model,
                record.tokens_used as i64,
                record.cost_usd,
                record.recorded_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }
}
