//! Rolling record of recent request outcomes
//!
//! The delay estimator and fallback gate both reason over a trailing window
//! of recent outcomes rather than lifetime totals, so the crawler reacts to
//! what the source is doing *now*. Outcomes live in a fixed-capacity ring
//! buffer and are never persisted.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Default capacity of the outcome ring buffer
pub const DEFAULT_CAPACITY: usize = 1_000;

/// One completed request attempt
#[derive(Debug, Clone)]
pub struct RequestOutcome {
    /// When the attempt completed
    pub at: Instant,

    /// The URL that was fetched
    pub url: String,

    /// Whether the attempt succeeded
    pub success: bool,

    /// HTTP status, if a response was received at all
    pub http_status: Option<u16>,

    /// Response latency
    pub latency: Duration,
}

/// Fixed-capacity ring of recent outcomes plus per-URL block history
#[derive(Debug)]
pub struct OutcomeWindow {
    outcomes: std::collections::VecDeque<RequestOutcome>,
    capacity: usize,

    /// Times each URL produced a blocking response (429 or transport
    /// failure), bounded to at most `capacity` distinct URLs
    block_history: HashMap<String, u32>,
}

impl OutcomeWindow {
    /// Creates an empty window with the default capacity
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Creates an empty window holding at most `capacity` outcomes
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            outcomes: std::collections::VecDeque::with_capacity(capacity),
            capacity,
            block_history: HashMap::new(),
        }
    }

    /// Records an outcome, evicting the oldest once at capacity
    pub fn record(&mut self, outcome: RequestOutcome) {
        if !outcome.success {
            if !self.block_history.contains_key(&outcome.url)
                && self.block_history.len() >= self.capacity
            {
                // A long session can fail on arbitrarily many distinct URLs;
                // the least-blocked entry makes room for the new one
                let evict = self
                    .block_history
                    .iter()
                    .min_by_key(|(_, count)| **count)
                    .map(|(url, _)| url.clone());
                if let Some(url) = evict {
                    self.block_history.remove(&url);
                }
            }
            *self.block_history.entry(outcome.url.clone()).or_insert(0) += 1;
        }

        if self.outcomes.len() == self.capacity {
            self.outcomes.pop_front();
        }
        self.outcomes.push_back(outcome);
    }

    /// Number of outcomes currently held
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    /// Whether no outcomes have been recorded yet
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Rolling success rate over the trailing `window`
    ///
    /// Returns None when no outcomes fall inside the window, so callers can
    /// distinguish "no signal" from "all failing".
    pub fn success_rate(&self, window: Duration) -> Option<f64> {
        let cutoff = Instant::now().checked_sub(window);

        let recent: Vec<&RequestOutcome> = self
            .outcomes
            .iter()
            .filter(|o| match cutoff {
                Some(c) => o.at >= c,
                // Window exceeds process uptime: everything qualifies
                None => true,
            })
            .collect();

        if recent.is_empty() {
            return None;
        }

        let successes = recent.iter().filter(|o| o.success).count();
        Some(successes as f64 / recent.len() as f64)
    }

    /// Lifetime success rate over everything still in the ring
    pub fn overall_success_rate(&self) -> Option<f64> {
        if self.outcomes.is_empty() {
            return None;
        }
        let successes = self.outcomes.iter().filter(|o| o.success).count();
        Some(successes as f64 / self.outcomes.len() as f64)
    }

    /// Number of outcomes inside the trailing `window`
    pub fn outcomes_in(&self, window: Duration) -> usize {
        match Instant::now().checked_sub(window) {
            Some(cutoff) => self.outcomes.iter().filter(|o| o.at >= cutoff).count(),
            None => self.outcomes.len(),
        }
    }

    /// Times the given URL has produced a blocking response
    pub fn block_count(&self, url: &str) -> u32 {
        self.block_history.get(url).copied().unwrap_or(0)
    }

    /// Timestamp of the most recent successful outcome
    pub fn last_success_at(&self) -> Option<Instant> {
        self.outcomes
            .iter()
            .rev()
            .find(|o| o.success)
            .map(|o| o.at)
    }
}

impl Default for OutcomeWindow {
    fn default() -> Self {
        Self::new()
    }
}
