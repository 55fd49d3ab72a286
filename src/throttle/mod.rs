//! Adaptive throttling: the crawl session's resilience core
//!
//! This module contains the rate-limit state machine, the traffic-aware
//! delay estimator, the fallback gate, and the rolling outcome window they
//! all share. The orchestrator is their sole caller; stage logic never
//! touches throttling directly.

mod delay;
mod fallback;
mod outcomes;
mod state_machine;

pub use delay::{DelayEstimator, TrafficPattern};
pub use fallback::{synthetic_targets, FallbackGate, FallbackReason, GateDecision};
pub use outcomes::{OutcomeWindow, RequestOutcome, DEFAULT_CAPACITY};
pub use state_machine::{CrawlPhase, RateLimitStateMachine, ScrapeState};
