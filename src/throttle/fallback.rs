//! Fallback gate
//!
//! Decides before any network attempt whether live access is worth trying.
//! When recent conditions say it is not, the gate opens a timed fallback
//! window during which the pipeline substitutes previously cached results
//! or synthetic targets derived from known competition structure, so
//! forward progress never depends on a hostile source.

use crate::config::{CompetitionEntry, FallbackConfig};
use crate::queue::TargetKind;
use crate::throttle::outcomes::OutcomeWindow;
use crate::throttle::state_machine::ScrapeState;
use std::time::{Duration, Instant};

/// Why live access was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    /// A previously opened window is still active
    ActiveWindow,
    /// An operator or probe forced a window
    Forced,
    /// Too many consecutive failures
    ConsecutiveFailures,
    /// Overall success rate below the floor
    LowSuccessRate,
    /// Too long since the last successful fetch
    StaleSuccess,
}

/// Outcome of a gate check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Attempt the live fetch
    Live,
    /// Skip the live fetch; use cached or synthetic data
    Fallback(FallbackReason),
}

impl GateDecision {
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Live)
    }
}

/// Gate that short-circuits live fetches under degraded conditions
pub struct FallbackGate {
    config: FallbackConfig,
    window_until: Option<Instant>,
    window_reason: FallbackReason,
    /// One live attempt is granted when a window expires, so the session
    /// can re-learn whether the source has recovered
    grace_attempt: bool,
    session_started: Instant,
    probed: bool,
}

impl FallbackGate {
    pub fn new(config: FallbackConfig) -> Self {
        Self {
            config,
            window_until: None,
            window_reason: FallbackReason::Forced,
            grace_attempt: false,
            session_started: Instant::now(),
            probed: false,
        }
    }

    /// Evaluates the fallback rules in order
    ///
    /// Active window, then consecutive failures, then overall success rate,
    /// then staleness of the last success. The first rule that fires opens
    /// (or extends) a window and refuses live access.
    pub fn check(&mut self, state: &ScrapeState, window: &OutcomeWindow) -> GateDecision {
        let now = Instant::now();

        // (a) active window
        if let Some(until) = self.window_until {
            if now < until {
                return GateDecision::Fallback(FallbackReason::ActiveWindow);
            }
            self.window_until = None;
            self.grace_attempt = true;
            tracing::info!("Fallback window expired ({:?})", self.window_reason);
        }

        if self.grace_attempt {
            // The conditions that tripped the window are often still true
            // right after it expires; allow one live attempt to find out.
            self.grace_attempt = false;
            return GateDecision::Live;
        }

        // (b) consecutive failures
        if state.consecutive_failures >= self.config.consecutive_failure_threshold {
            self.open_window(
                Duration::from_secs(self.config.short_window_secs),
                FallbackReason::ConsecutiveFailures,
            );
            return GateDecision::Fallback(FallbackReason::ConsecutiveFailures);
        }

        // (c) overall success rate with a minimum sample
        if window.len() >= self.config.min_sample {
            if let Some(rate) = window.overall_success_rate() {
                if rate < self.config.success_floor {
                    self.open_window(
                        Duration::from_secs(self.config.long_window_secs),
                        FallbackReason::LowSuccessRate,
                    );
                    return GateDecision::Fallback(FallbackReason::LowSuccessRate);
                }
            }
        }

        // (d) staleness of the last success
        let last_success = window.last_success_at().unwrap_or(self.session_started);
        if now.duration_since(last_success)
            > Duration::from_secs(self.config.max_success_age_secs)
        {
            self.open_window(
                Duration::from_secs(self.config.stale_window_secs),
                FallbackReason::StaleSuccess,
            );
            return GateDecision::Fallback(FallbackReason::StaleSuccess);
        }

        GateDecision::Live
    }

    /// Forces a fallback window open, e.g. after a failed connectivity probe
    pub fn force_window(&mut self, duration: Duration) {
        self.open_window(duration, FallbackReason::Forced);
    }

    fn open_window(&mut self, duration: Duration, reason: FallbackReason) {
        self.window_until = Some(Instant::now() + duration);
        self.window_reason = reason;
        tracing::warn!(
            "Opening fallback window for {:?} ({:?}); live fetches suspended",
            duration,
            reason
        );
    }

    /// Whether a window is currently active
    pub fn in_fallback_window(&self) -> bool {
        self.window_until.is_some_and(|until| Instant::now() < until)
    }

    /// Once-per-session connectivity probe with a hard ceiling
    ///
    /// Issues a HEAD request against the source base URL under
    /// `tokio::time::timeout`. A failed or timed-out probe forces a short
    /// fallback window immediately so a dead network never burns identities.
    /// Subsequent calls are no-ops and report the gate's current view.
    pub async fn probe_connectivity(&mut self, client: &reqwest::Client, base_url: &str) -> bool {
        if self.probed {
            return !self.in_fallback_window();
        }
        self.probed = true;

        let ceiling = Duration::from_secs(self.config.probe_timeout_secs);
        let attempt = tokio::time::timeout(ceiling, client.head(base_url).send()).await;

        match attempt {
            Ok(Ok(response)) => {
                tracing::info!("Connectivity probe: HTTP {}", response.status());
                true
            }
            Ok(Err(e)) => {
                tracing::warn!("Connectivity probe failed: {}", e);
                self.force_window(Duration::from_secs(self.config.short_window_secs));
                false
            }
            Err(_) => {
                tracing::warn!("Connectivity probe exceeded {:?} ceiling", ceiling);
                self.force_window(Duration::from_secs(self.config.short_window_secs));
                false
            }
        }
    }
}

/// Derives synthetic season-link targets from the competition mapping
///
/// When live discovery is refused, the pipeline still makes forward
/// progress on structure it already knows: every configured competition
/// expands its known seasons through its URL pattern.
pub fn synthetic_targets(competitions: &[CompetitionEntry]) -> Vec<(String, TargetKind)> {
    let mut targets = Vec::new();

    for competition in competitions {
        for season in &competition.known_seasons {
            let url = competition
                .seasons_url_pattern
                .replace("{id}", &competition.id.to_string())
                .replace("{slug}", &competition.slug)
                .replace("{season}", season);
            targets.push((url, TargetKind::SeasonLink));
        }
    }

    targets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ThrottleConfig;
    use crate::throttle::outcomes::RequestOutcome;
    use crate::throttle::RateLimitStateMachine;

    fn gate() -> FallbackGate {
        FallbackGate::new(FallbackConfig::default())
    }

    fn state_with_failures(n: u32) -> ScrapeState {
        let mut sm = RateLimitStateMachine::new(ThrottleConfig::default());
        for _ in 0..n {
            sm.record_429_error();
        }
        sm.state().clone()
    }

    fn window_with_rate(total: usize, successes: usize) -> OutcomeWindow {
        let mut window = OutcomeWindow::new();
        for i in 0..total {
            window.record(RequestOutcome {
                at: Instant::now(),
                url: "https://s/x".to_string(),
                success: i < successes,
                http_status: Some(200),
                latency: Duration::from_millis(100),
            });
        }
        window
    }

    #[test]
    fn test_permits_live_on_fresh_session() {
        let mut gate = gate();
        let decision = gate.check(&state_with_failures(0), &OutcomeWindow::new());
        assert_eq!(decision, GateDecision::Live);
    }

    #[test]
    fn test_consecutive_failures_open_window() {
        let mut gate = gate();
        let decision = gate.check(&state_with_failures(3), &OutcomeWindow::new());
        assert_eq!(
            decision,
            GateDecision::Fallback(FallbackReason::ConsecutiveFailures)
        );
        assert!(gate.in_fallback_window());

        // Subsequent checks hit the active window first
        let again = gate.check(&state_with_failures(3), &OutcomeWindow::new());
        assert_eq!(again, GateDecision::Fallback(FallbackReason::ActiveWindow));
    }

    #[test]
    fn test_failures_below_threshold_permit_live() {
        let mut gate = gate();
        let decision = gate.check(&state_with_failures(2), &OutcomeWindow::new());
        assert_eq!(decision, GateDecision::Live);
    }

    #[test]
    fn test_low_success_rate_opens_long_window() {
        let mut gate = gate();
        // 20% success over a sufficient sample
        let window = window_with_rate(20, 4);
        let decision = gate.check(&state_with_failures(0), &window);
        assert_eq!(
            decision,
            GateDecision::Fallback(FallbackReason::LowSuccessRate)
        );
    }

    #[test]
    fn test_low_success_rate_needs_minimum_sample() {
        let mut gate = gate();
        // Same poor rate, but below min-sample
        let window = window_with_rate(5, 1);
        let decision = gate.check(&state_with_failures(0), &window);
        assert_eq!(decision, GateDecision::Live);
    }

    #[test]
    fn test_expired_window_grants_one_grace_attempt() {
        let mut config = FallbackConfig::default();
        config.short_window_secs = 0; // expires immediately
        let mut gate = FallbackGate::new(config);

        let trip = gate.check(&state_with_failures(3), &OutcomeWindow::new());
        assert_eq!(
            trip,
            GateDecision::Fallback(FallbackReason::ConsecutiveFailures)
        );

        // Window expired: one live attempt even though failures persist
        let grace = gate.check(&state_with_failures(3), &OutcomeWindow::new());
        assert_eq!(grace, GateDecision::Live);

        // Still failing: window reopens
        let retrip = gate.check(&state_with_failures(3), &OutcomeWindow::new());
        assert_eq!(
            retrip,
            GateDecision::Fallback(FallbackReason::ConsecutiveFailures)
        );
    }

    #[test]
    fn test_forced_window_refuses_live() {
        let mut gate = gate();
        gate.force_window(Duration::from_secs(600));
        let decision = gate.check(&state_with_failures(0), &OutcomeWindow::new());
        assert_eq!(decision, GateDecision::Fallback(FallbackReason::ActiveWindow));
    }

    #[test]
    fn test_synthetic_targets_expand_known_seasons() {
        let competitions = vec![CompetitionEntry {
            id: 17,
            name: "Premier League".to_string(),
            slug: "premier-league".to_string(),
            url: "https://s/league/17/premier-league".to_string(),
            seasons_url_pattern: "https://s/league/{id}/{slug}/{season}".to_string(),
            known_seasons: vec!["2024-2025".to_string(), "2023-2024".to_string()],
        }];

        let targets = synthetic_targets(&competitions);
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].0, "https://s/league/17/premier-league/2024-2025");
        assert!(targets.iter().all(|(_, k)| *k == TargetKind::SeasonLink));
    }

    #[test]
    fn test_synthetic_targets_empty_without_competitions() {
        assert!(synthetic_targets(&[]).is_empty());
    }

    #[tokio::test]
    async fn test_probe_failure_forces_window() {
        let mut gate = gate();
        let client = reqwest::Client::new();

        // Nothing listens on this port; the probe fails fast
        let ok = gate
            .probe_connectivity(&client, "http://127.0.0.1:9")
            .await;
        assert!(!ok);
        assert!(gate.in_fallback_window());

        // Second probe is a no-op reporting the gate's view
        let again = gate
            .probe_connectivity(&client, "http://127.0.0.1:9")
            .await;
        assert!(!again);
    }
}
