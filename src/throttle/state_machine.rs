//! Rate-limit state machine
//!
//! The authoritative state for a crawl session. Request outcomes feed in,
//! and the machine decides whether requests should happen at all and how
//! aggressively to back off. Phases move NOMINAL -> THROTTLED on rate
//! limiting, THROTTLED -> RECONFIGURING after repeated failures, and
//! RECONFIGURING -> HALTED once identity changes are exhausted. HALTED is
//! cleared only by an explicit operator reset.

use crate::config::ThrottleConfig;
use crate::StatlineError;
use rand::Rng;
use std::fmt;
use std::time::{Duration, Instant};

/// Phase of the crawl session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrawlPhase {
    /// Source is behaving; small randomized base delay
    Nominal,

    /// Source is rate limiting; exponential bounded backoff
    Throttled,

    /// Rotating to a fresh identity; fixed cool-in delay
    Reconfiguring,

    /// Session has given up; no requests may be issued
    Halted,
}

impl CrawlPhase {
    /// Returns true if requests may be issued in this phase
    pub fn allows_requests(&self) -> bool {
        !matches!(self, Self::Halted)
    }
}

impl fmt::Display for CrawlPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Nominal => "nominal",
            Self::Throttled => "throttled",
            Self::Reconfiguring => "reconfiguring",
            Self::Halted => "halted",
        };
        write!(f, "{}", s)
    }
}

/// Mutable per-session scrape state
///
/// Reset only by [`RateLimitStateMachine::reset`], except the consecutive
/// failure counter which clears on any recorded success.
#[derive(Debug, Clone)]
pub struct ScrapeState {
    pub phase: CrawlPhase,
    pub consecutive_failures: u32,
    pub consecutive_connection_errors: u32,
    /// Failures recorded since the current phase was entered
    pub failures_in_phase: u32,
    pub identity_changes: u32,
    pub identity_changed_in_phase: bool,
    pub current_delay: Duration,
    pub last_success_at: Option<Instant>,
    pub last_failure_at: Option<Instant>,
}

impl ScrapeState {
    fn new() -> Self {
        Self {
            phase: CrawlPhase::Nominal,
            consecutive_failures: 0,
            consecutive_connection_errors: 0,
            failures_in_phase: 0,
            identity_changes: 0,
            identity_changed_in_phase: false,
            current_delay: Duration::ZERO,
            last_success_at: None,
            last_failure_at: None,
        }
    }
}

/// State machine driving per-session throttling decisions
pub struct RateLimitStateMachine {
    config: ThrottleConfig,
    state: ScrapeState,
}

impl RateLimitStateMachine {
    pub fn new(config: ThrottleConfig) -> Self {
        Self {
            config,
            state: ScrapeState::new(),
        }
    }

    /// Current phase
    pub fn phase(&self) -> CrawlPhase {
        self.state.phase
    }

    /// Read-only view of the session state
    pub fn state(&self) -> &ScrapeState {
        &self.state
    }

    /// Records a successful request
    ///
    /// Clears the consecutive-failure counters. A success while throttled
    /// returns the session to nominal; a success while reconfiguring after a
    /// completed identity change does the same.
    pub fn record_success(&mut self, latency: Duration) {
        self.state.consecutive_failures = 0;
        self.state.consecutive_connection_errors = 0;
        self.state.last_success_at = Some(Instant::now());
        tracing::debug!("Request succeeded in {:?} ({})", latency, self.state.phase);

        match self.state.phase {
            CrawlPhase::Throttled => self.transition(CrawlPhase::Nominal, "success"),
            CrawlPhase::Reconfiguring if self.state.identity_changed_in_phase => {
                self.transition(CrawlPhase::Nominal, "identity change confirmed by success")
            }
            _ => {}
        }
    }

    /// Records an HTTP 429 response
    pub fn record_429_error(&mut self) {
        self.state.consecutive_connection_errors = 0;
        self.record_failure("HTTP 429");

        match self.state.phase {
            CrawlPhase::Nominal => self.transition(CrawlPhase::Throttled, "HTTP 429"),
            CrawlPhase::Throttled => self.maybe_reconfigure(),
            _ => {}
        }
    }

    /// Records a connection-level failure (reset, refused, timeout)
    ///
    /// A single connection error can be a blip; repeated ones are treated
    /// like rate limiting.
    pub fn record_connection_error(&mut self) {
        self.state.consecutive_connection_errors += 1;
        self.record_failure("connection error");

        match self.state.phase {
            CrawlPhase::Nominal if self.state.consecutive_connection_errors >= 2 => {
                self.transition(CrawlPhase::Throttled, "repeated connection errors")
            }
            CrawlPhase::Throttled => self.maybe_reconfigure(),
            _ => {}
        }
    }

    /// Records that an identity rotation was performed
    ///
    /// Halts the session once the configured maximum is reached.
    pub fn record_identity_change(&mut self) -> Result<(), StatlineError> {
        if self.state.phase == CrawlPhase::Halted {
            return Err(StatlineError::HaltedSession {
                identity_changes: self.state.identity_changes,
            });
        }

        self.state.identity_changes += 1;
        self.state.identity_changed_in_phase = true;
        // The fresh identity earns a fresh failure count for this phase
        self.state.failures_in_phase = 0;
        tracing::info!(
            "Identity change {}/{}",
            self.state.identity_changes,
            self.config.max_identity_changes
        );

        if self.state.identity_changes >= self.config.max_identity_changes {
            self.transition(CrawlPhase::Halted, "identity changes exhausted");
            return Err(StatlineError::HaltedSession {
                identity_changes: self.state.identity_changes,
            });
        }

        Ok(())
    }

    /// Computes the wait before the next request for the current phase
    ///
    /// Nominal is a small randomized base delay; throttled grows
    /// exponentially with consecutive failures but is capped; reconfiguring
    /// is a fixed cool-in; halted is zero because no request may follow.
    pub fn calculate_delay(&mut self) -> Duration {
        let delay = match self.state.phase {
            CrawlPhase::Nominal => {
                self.with_jitter(Duration::from_millis(self.config.base_delay_ms))
            }
            CrawlPhase::Throttled => {
                let exponent = self
                    .state
                    .consecutive_failures
                    .min(self.config.backoff_exponent_cap);
                let backoff_ms = (self.config.base_delay_ms as f64
                    * self.config.growth_factor.powi(exponent as i32))
                .min(self.config.max_delay_ms as f64);
                self.with_jitter(Duration::from_millis(backoff_ms as u64))
            }
            CrawlPhase::Reconfiguring => Duration::from_millis(self.config.reconfigure_delay_ms),
            CrawlPhase::Halted => Duration::ZERO,
        };

        let clamped = if self.state.phase == CrawlPhase::Halted {
            Duration::ZERO
        } else {
            delay.clamp(
                Duration::from_millis(self.config.min_delay_ms),
                Duration::from_millis(self.config.max_delay_ms),
            )
        };

        self.state.current_delay = clamped;
        clamped
    }

    /// Whether the caller should rotate to a fresh identity before the next
    /// request
    ///
    /// True on entering the reconfiguring phase, and again whenever the
    /// current replacement identity has itself accumulated enough failures,
    /// so a sustained storm keeps consuming identity changes toward the
    /// halt ceiling instead of stalling on one bad identity.
    pub fn should_rotate_identity(&self) -> bool {
        self.state.phase == CrawlPhase::Reconfiguring
            && (!self.state.identity_changed_in_phase
                || self.state.failures_in_phase >= self.config.failures_before_reconfigure)
    }

    /// Whether the caller should keep issuing requests
    pub fn should_continue(&self) -> bool {
        self.state.phase != CrawlPhase::Halted
            && self.state.consecutive_failures < self.config.max_consecutive_failures
    }

    /// Whether the session has halted
    pub fn is_halted(&self) -> bool {
        self.state.phase == CrawlPhase::Halted
    }

    /// Operator reset: returns the session to a fresh nominal state
    pub fn reset(&mut self) {
        tracing::warn!("Operator reset from {}", self.state.phase);
        self.state = ScrapeState::new();
    }

    fn record_failure(&mut self, what: &str) {
        self.state.consecutive_failures += 1;
        self.state.failures_in_phase += 1;
        self.state.last_failure_at = Some(Instant::now());
        tracing::debug!(
            "{} ({} consecutive failures, phase {})",
            what,
            self.state.consecutive_failures,
            self.state.phase
        );
    }

    fn maybe_reconfigure(&mut self) {
        if self.state.failures_in_phase >= self.config.failures_before_reconfigure {
            self.transition(CrawlPhase::Reconfiguring, "throttled failures exhausted");
        }
    }

    fn transition(&mut self, to: CrawlPhase, why: &str) {
        let from = self.state.phase;
        if from == to {
            return;
        }
        self.state.phase = to;
        self.state.failures_in_phase = 0;
        self.state.identity_changed_in_phase = false;
        tracing::info!("Crawl phase {} -> {} ({})", from, to, why);
    }

    fn with_jitter(&self, base: Duration) -> Duration {
        if self.config.jitter_fraction <= 0.0 {
            return base;
        }
        let j = self.config.jitter_fraction;
        let factor = rand::thread_rng().gen_range((1.0 - j)..(1.0 + j));
        base.mul_f64(factor)
    }
}
