//! Configuration module for Statline
//!
//! This module handles loading, parsing, and validating TOML configuration
//! files. Every throttling, identity, and fallback threshold in the crate is
//! a configuration field with a sensible default, so operators retune the
//! crawler without code changes.

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    CompetitionEntry, Config, FallbackConfig, FetchConfig, IdentityConfig, OutputConfig,
    ProxyEntry, ProxyKind, SourceConfig, ThrottleConfig, TrafficConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash};
