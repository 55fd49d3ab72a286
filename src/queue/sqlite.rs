//! SQLite queue implementation

use crate::queue::schema::initialize_schema;
use crate::queue::traits::{QueueError, QueueResult, QueueStore};
use crate::queue::{CrawlTarget, RunRecord, RunStatus, TargetKind, TargetStatus};
use crate::StatlineError;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::Path;

/// SQLite-backed crawl queue
pub struct SqliteQueue {
    conn: Connection,
}

impl SqliteQueue {
    /// Opens (or creates) the queue database at `path`
    pub fn new(path: &Path) -> Result<Self, StatlineError> {
        let conn = Connection::open(path)?;

        // Configure SQLite for better performance
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory queue (for testing)
    pub fn new_in_memory() -> Result<Self, StatlineError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn row_to_target(row: &Row<'_>) -> rusqlite::Result<CrawlTarget> {
        Ok(CrawlTarget {
            id: row.get(0)?,
            parent_id: row.get(1)?,
            kind: TargetKind::from_db_string(&row.get::<_, String>(2)?)
                .unwrap_or(TargetKind::MatchDetail),
            url: row.get(3)?,
            status: TargetStatus::from_db_string(&row.get::<_, String>(4)?)
                .unwrap_or(TargetStatus::Error),
            error_message: row.get(5)?,
            retry_count: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }
}

const TARGET_COLUMNS: &str =
    "id, parent_id, kind, url, status, error_message, retry_count, created_at, updated_at";

impl QueueStore for SqliteQueue {
    // ===== Run Management =====

    fn create_run(&mut self, config_hash: &str) -> QueueResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_latest_run(&self) -> QueueResult<Option<RunRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, started_at, finished_at, config_hash, status
             FROM runs ORDER BY id DESC LIMIT 1",
        )?;

        let run = stmt
            .query_row([], |row| {
                Ok(RunRecord {
                    id: row.get(0)?,
                    started_at: row.get(1)?,
                    finished_at: row.get(2)?,
                    config_hash: row.get(3)?,
                    status: RunStatus::from_db_string(&row.get::<_, String>(4)?)
                        .unwrap_or(RunStatus::Running),
                })
            })
            .optional()?;

        Ok(run)
    }

    fn complete_run(&mut self, run_id: i64) -> QueueResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2 WHERE id = ?3",
            params![RunStatus::Completed.to_db_string(), now, run_id],
        )?;
        Ok(())
    }

    fn fail_run(&mut self, run_id: i64) -> QueueResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2 WHERE id = ?3",
            params![RunStatus::Failed.to_db_string(), now, run_id],
        )?;
        Ok(())
    }

    // ===== Target Lifecycle =====

    fn enqueue(
        &mut self,
        url: &str,
        kind: TargetKind,
        parent_id: Option<i64>,
        run_id: i64,
    ) -> QueueResult<i64> {
        // Idempotent discovery: a URL seen before keeps its existing row
        // and status untouched
        let existing: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM crawl_targets WHERE url = ?1",
                params![url],
                |row| row.get(0),
            )
            .optional()?;

        if let Some(id) = existing {
            return Ok(id);
        }

        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO crawl_targets
             (parent_id, kind, url, status, discovered_run, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![
                parent_id,
                kind.to_db_string(),
                url,
                TargetStatus::Pending.to_db_string(),
                run_id,
                now
            ],
        )?;

        Ok(self.conn.last_insert_rowid())
    }

    fn get_target(&self, id: i64) -> QueueResult<CrawlTarget> {
        let sql = format!("SELECT {} FROM crawl_targets WHERE id = ?1", TARGET_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;

        stmt.query_row(params![id], Self::row_to_target)
            .optional()?
            .ok_or(QueueError::TargetNotFound(id))
    }

    fn get_target_by_url(&self, url: &str) -> QueueResult<Option<CrawlTarget>> {
        let sql = format!(
            "SELECT {} FROM crawl_targets WHERE url = ?1",
            TARGET_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        Ok(stmt.query_row(params![url], Self::row_to_target).optional()?)
    }

    fn claim_pending(&mut self, kind: TargetKind, limit: usize) -> QueueResult<Vec<CrawlTarget>> {
        let sql = format!(
            "SELECT {} FROM crawl_targets
             WHERE kind = ?1 AND status = 'pending'
             ORDER BY id ASC LIMIT ?2",
            TARGET_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let candidates: Vec<CrawlTarget> = stmt
            .query_map(params![kind.to_db_string(), limit as i64], Self::row_to_target)?
            .collect::<rusqlite::Result<_>>()?;

        // Conditional update so concurrent workers can never double-claim
        let now = Utc::now().to_rfc3339();
        let mut claimed = Vec::with_capacity(candidates.len());
        for mut target in candidates {
            let changed = self.conn.execute(
                "UPDATE crawl_targets SET status = 'in_progress', updated_at = ?1
                 WHERE id = ?2 AND status = 'pending'",
                params![now, target.id],
            )?;
            if changed == 1 {
                target.status = TargetStatus::InProgress;
                target.updated_at = now.clone();
                claimed.push(target);
            }
        }

        Ok(claimed)
    }

    fn mark(
        &mut self,
        target_id: i64,
        status: TargetStatus,
        error_message: Option<&str>,
    ) -> QueueResult<()> {
        let current = self.get_target(target_id)?;
        if current.status.is_terminal() {
            return Err(QueueError::InvalidTransition {
                id: target_id,
                from: current.status,
                to: status,
            });
        }

        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "UPDATE crawl_targets SET status = ?1, error_message = ?2, updated_at = ?3
             WHERE id = ?4",
            params![status.to_db_string(), error_message, now, target_id],
        )?;
        Ok(())
    }

    fn release(&mut self, target_id: i64) -> QueueResult<()> {
        let now = Utc::now().to_rfc3339();
        let changed = self.conn.execute(
            "UPDATE crawl_targets SET status = 'pending', updated_at = ?1
             WHERE id = ?2 AND status = 'in_progress'",
            params![now, target_id],
        )?;
        if changed == 0 {
            // Releasing a target that is not claimed is a logic error
            let current = self.get_target(target_id)?;
            return Err(QueueError::InvalidTransition {
                id: target_id,
                from: current.status,
                to: TargetStatus::Pending,
            });
        }
        Ok(())
    }

    fn increment_retry(&mut self, target_id: i64) -> QueueResult<()> {
        self.conn.execute(
            "UPDATE crawl_targets SET retry_count = retry_count + 1 WHERE id = ?1",
            params![target_id],
        )?;
        Ok(())
    }

    // ===== Recovery and Operator Resets =====

    fn reset_in_progress(&mut self) -> QueueResult<usize> {
        let now = Utc::now().to_rfc3339();
        let reset = self.conn.execute(
            "UPDATE crawl_targets SET status = 'pending', updated_at = ?1
             WHERE status = 'in_progress'",
            params![now],
        )?;
        if reset > 0 {
            tracing::info!("Reset {} interrupted targets to pending", reset);
        }
        Ok(reset)
    }

    fn reset_terminal(&mut self, status: TargetStatus) -> QueueResult<usize> {
        // Only terminal statuses are operator-resettable
        if !status.is_terminal() {
            return Ok(0);
        }

        let now = Utc::now().to_rfc3339();
        let reset = self.conn.execute(
            "UPDATE crawl_targets
             SET status = 'pending', error_message = NULL, updated_at = ?1
             WHERE status = ?2",
            params![now, status.to_db_string()],
        )?;
        tracing::warn!(
            "Operator reset {} targets from {} to pending",
            reset,
            status
        );
        Ok(reset)
    }

    // ===== Statistics =====

    fn count_by_status(&self, status: TargetStatus) -> QueueResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM crawl_targets WHERE status = ?1",
            params![status.to_db_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn count_by_kind_and_status(
        &self,
        kind: TargetKind,
        status: TargetStatus,
    ) -> QueueResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM crawl_targets WHERE kind = ?1 AND status = ?2",
            params![kind.to_db_string(), status.to_db_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn count_total(&self) -> QueueResult<u64> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM crawl_targets", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn status_breakdown(&self) -> QueueResult<HashMap<TargetStatus, u64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT status, COUNT(*) FROM crawl_targets GROUP BY status")?;

        let mut breakdown = HashMap::new();
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        for row in rows {
            let (status, count) = row?;
            if let Some(status) = TargetStatus::from_db_string(&status) {
                breakdown.insert(status, count as u64);
            }
        }

        Ok(breakdown)
    }
}
