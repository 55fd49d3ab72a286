//! Durable, resumable crawl queue
//!
//! Every unit of crawl work is a row in SQLite with a lifecycle status.
//! Statuses move monotonically pending -> in_progress -> terminal; terminal
//! targets are never refetched except by explicit operator reset, and the
//! full history is append-only so interrupted runs resume exactly where
//! they stopped.

mod schema;
mod sqlite;
mod traits;

pub use schema::{initialize_schema, SCHEMA_SQL};
pub use sqlite::SqliteQueue;
pub use traits::{QueueError, QueueResult, QueueStore};

use std::fmt;

/// Kind of crawl target, forming the discovery hierarchy
/// competition -> season link -> match -> match detail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKind {
    /// A competition overview page
    Competition,
    /// A season page within a competition
    SeasonLink,
    /// A match listed in a season
    Match,
    /// The per-match detail page
    MatchDetail,
}

impl TargetKind {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Competition => "competition",
            Self::SeasonLink => "season_link",
            Self::Match => "match",
            Self::MatchDetail => "match_detail",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "competition" => Some(Self::Competition),
            "season_link" => Some(Self::SeasonLink),
            "match" => Some(Self::Match),
            "match_detail" => Some(Self::MatchDetail),
            _ => None,
        }
    }

    /// The kind of child this kind discovers, if any
    pub fn child_kind(&self) -> Option<Self> {
        match self {
            Self::Competition => Some(Self::SeasonLink),
            Self::SeasonLink => Some(Self::Match),
            Self::Match => Some(Self::MatchDetail),
            Self::MatchDetail => None,
        }
    }

    /// All kinds in pipeline order
    pub fn all() -> [Self; 4] {
        [
            Self::Competition,
            Self::SeasonLink,
            Self::Match,
            Self::MatchDetail,
        ]
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// Lifecycle status of a crawl target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetStatus {
    /// Discovered, not yet attempted
    Pending,
    /// Claimed by a running pipeline
    InProgress,
    /// Fetched and handed to the parser
    Done,
    /// Fetch or transport failure
    Error,
    /// Fetched, but the page legitimately had nothing to extract
    NoData,
}

impl TargetStatus {
    /// Terminal statuses are never revisited without an operator reset
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error | Self::NoData)
    }

    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Done => "done",
            Self::Error => "error",
            Self::NoData => "no_data",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "done" => Some(Self::Done),
            "error" => Some(Self::Error),
            "no_data" => Some(Self::NoData),
            _ => None,
        }
    }
}

impl fmt::Display for TargetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// One unit of crawl work
#[derive(Debug, Clone)]
pub struct CrawlTarget {
    pub id: i64,
    /// The target whose page discovered this one
    pub parent_id: Option<i64>,
    pub kind: TargetKind,
    pub url: String,
    pub status: TargetStatus,
    pub error_message: Option<String>,
    pub retry_count: u32,
    pub created_at: String,
    pub updated_at: String,
}

/// Status of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// One crawl run, for auditing and resume detection
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
}
