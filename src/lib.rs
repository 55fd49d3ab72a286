//! Statline: a resilient crawl control plane for sports statistics
//!
//! This crate implements the crawl-side machinery for a rate-limit-hostile,
//! unauthenticated statistics source: an adaptive rate-limit state machine,
//! a traffic-aware delay estimator, a rotating identity pool, a fallback
//! gate for degraded conditions, and a durable, resumable crawl queue that
//! a staged pipeline orchestrator drives.

pub mod config;
pub mod crawler;
pub mod identity;
pub mod queue;
pub mod throttle;

use thiserror::Error;

/// Main error type for Statline operations
#[derive(Debug, Error)]
pub enum StatlineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Queue error: {0}")]
    Queue(#[from] queue::QueueError),

    #[error("Rate limited (HTTP 429) at {url}")]
    RateLimited { url: String },

    #[error("Transport failure for {url}: {message}")]
    Transport { url: String, message: String },

    #[error("Fetch deadline exceeded for {url}")]
    DeadlineExceeded { url: String },

    #[error("No usable identity: all identities blocked or cooling down")]
    IdentityPoolExhausted,

    #[error(
        "Crawl session halted after {identity_changes} identity changes; operator reset required"
    )]
    HaltedSession { identity_changes: u32 },

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid proxy entry: {0}")]
    InvalidProxy(String),
}

/// Result type alias for Statline operations
pub type Result<T> = std::result::Result<T, StatlineError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use identity::{Identity, IdentityPool};
pub use queue::{CrawlTarget, TargetKind, TargetStatus};
pub use throttle::{CrawlPhase, DelayEstimator, FallbackGate, RateLimitStateMachine};
