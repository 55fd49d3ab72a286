//! Queue store trait and error types

use crate::queue::{CrawlTarget, RunRecord, TargetKind, TargetStatus};
use std::collections::HashMap;
use thiserror::Error;

/// Errors that can occur during queue operations
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Target not found: {0}")]
    TargetNotFound(i64),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Invalid status transition for target {id}: {from} -> {to}")]
    InvalidTransition {
        id: i64,
        from: TargetStatus,
        to: TargetStatus,
    },

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for queue operations
pub type QueueResult<T> = Result<T, QueueError>;

/// Trait for crawl queue backends
///
/// The store owns every status mutation; orchestrator stages only discover
/// targets and report outcomes through it.
pub trait QueueStore {
    // ===== Run Management =====

    /// Creates a new crawl run and returns its ID
    fn create_run(&mut self, config_hash: &str) -> QueueResult<i64>;

    /// Gets the most recent run
    fn get_latest_run(&self) -> QueueResult<Option<RunRecord>>;

    /// Marks a run as completed with a finish timestamp
    fn complete_run(&mut self, run_id: i64) -> QueueResult<()>;

    /// Marks a run as failed with a finish timestamp
    fn fail_run(&mut self, run_id: i64) -> QueueResult<()>;

    // ===== Target Lifecycle =====

    /// Idempotent upsert: registers a target, or returns the existing row's
    /// ID unchanged if the URL is already known
    fn enqueue(
        &mut self,
        url: &str,
        kind: TargetKind,
        parent_id: Option<i64>,
        run_id: i64,
    ) -> QueueResult<i64>;

    /// Gets a target by ID
    fn get_target(&self, id: i64) -> QueueResult<CrawlTarget>;

    /// Gets a target by URL
    fn get_target_by_url(&self, url: &str) -> QueueResult<Option<CrawlTarget>>;

    /// Atomically claims up to `limit` pending targets of the given kind,
    /// moving them to in_progress
    fn claim_pending(&mut self, kind: TargetKind, limit: usize) -> QueueResult<Vec<CrawlTarget>>;

    /// Moves a claimed target to a terminal status
    ///
    /// The sole terminal mutator. Refuses to touch a target that is already
    /// terminal, preserving status monotonicity.
    fn mark(
        &mut self,
        target_id: i64,
        status: TargetStatus,
        error_message: Option<&str>,
    ) -> QueueResult<()>;

    /// Returns a claimed target to pending without recording an attempt,
    /// e.g. when the fallback gate refused the fetch
    fn release(&mut self, target_id: i64) -> QueueResult<()>;

    /// Increments the retry counter of a target
    fn increment_retry(&mut self, target_id: i64) -> QueueResult<()>;

    // ===== Recovery and Operator Resets =====

    /// Returns in_progress targets to pending (startup crash recovery);
    /// returns how many were reset
    fn reset_in_progress(&mut self) -> QueueResult<usize>;

    /// Operator reset: returns targets in the given terminal status to
    /// pending; returns how many were reset
    fn reset_terminal(&mut self, status: TargetStatus) -> QueueResult<usize>;

    // ===== Statistics =====

    /// Counts targets in a given status
    fn count_by_status(&self, status: TargetStatus) -> QueueResult<u64>;

    /// Counts targets of a kind in a given status
    fn count_by_kind_and_status(
        &self,
        kind: TargetKind,
        status: TargetStatus,
    ) -> QueueResult<u64>;

    /// Total targets ever enqueued
    fn count_total(&self) -> QueueResult<u64>;

    /// Breakdown of status -> count for reporting
    fn status_breakdown(&self) -> QueueResult<HashMap<TargetStatus, u64>>;
}
