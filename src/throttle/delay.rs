//! Adaptive delay estimator
//!
//! Computes the recommended wait before the next request from a time-of-day
//! traffic pattern, the rolling success rate, and per-URL block history,
//! with occasional simulated human pauses so the request cadence never looks
//! mechanical. Burst mode shortens delays for a short run of requests when
//! the source is demonstrably healthy.

use crate::config::TrafficConfig;
use crate::throttle::outcomes::OutcomeWindow;
use chrono::{Datelike, Local, Timelike, Weekday};
use rand::Rng;
use std::time::Duration;

/// Requests granted per burst-mode window
const BURST_RUN_LENGTH: u32 = 5;

/// Time-of-day bucket used to select baseline delay parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrafficPattern {
    /// Weekday evenings, when real traffic peaks around match coverage
    Peak,
    /// Weekday daytime
    OffHours,
    /// Late night, any day
    Night,
    /// Weekend daytime
    Weekend,
}

impl TrafficPattern {
    /// Classifies the current local time
    pub fn current() -> Self {
        let now = Local::now();
        Self::classify(now.weekday(), now.hour())
    }

    /// Pure classification from weekday and hour (0-23)
    pub fn classify(weekday: Weekday, hour: u32) -> Self {
        if hour < 6 {
            return Self::Night;
        }
        let weekend = matches!(weekday, Weekday::Sat | Weekday::Sun);
        if weekend {
            return Self::Weekend;
        }
        if (18..23).contains(&hour) {
            Self::Peak
        } else {
            Self::OffHours
        }
    }
}

/// Computes recommended per-request delays
pub struct DelayEstimator {
    config: TrafficConfig,
    /// Floor for any recommended delay
    min_delay: Duration,
    /// Ceiling for any recommended delay, whatever the penalties say
    max_delay: Duration,
    /// Requests remaining in the current burst window
    burst_remaining: u32,
}

impl DelayEstimator {
    pub fn new(config: TrafficConfig, min_delay: Duration, max_delay: Duration) -> Self {
        Self {
            config,
            min_delay,
            max_delay,
            burst_remaining: 0,
        }
    }

    /// Recommended wait before fetching `url`
    ///
    /// Base delay from the current traffic pattern, multiplied by a capped
    /// exponential penalty for URLs with a blocking history, multiplied
    /// again when the rolling success rate is poor, occasionally padded with
    /// a bounded human pause. An active burst window shortens the result.
    /// Whatever the multipliers produce, the result is clamped to the
    /// configured delay bounds.
    pub fn recommended_delay(&mut self, url: &str, window: &OutcomeWindow) -> Duration {
        let pattern = TrafficPattern::current();
        self.delay_for_pattern(pattern, url, window)
    }

    /// Same as [`recommended_delay`] but with an explicit pattern, so tests
    /// are independent of the wall clock
    ///
    /// [`recommended_delay`]: Self::recommended_delay
    pub fn delay_for_pattern(
        &mut self,
        pattern: TrafficPattern,
        url: &str,
        window: &OutcomeWindow,
    ) -> Duration {
        let mut rng = rand::thread_rng();

        let (base_ms, variance_ms) = self.pattern_params(pattern);
        let mut delay_ms = base_ms as f64 + rng.gen_range(0..=variance_ms) as f64;

        // URLs that have been blocked before get a growing, capped penalty
        let blocks = window.block_count(url).min(self.config.block_penalty_cap);
        if blocks > 0 {
            delay_ms *= self.config.block_penalty_growth.powi(blocks as i32);
        }

        // A struggling session slows everything down
        let success_window = Duration::from_secs(self.config.success_window_secs);
        if let Some(rate) = window.success_rate(success_window) {
            if rate < self.config.critical_success_threshold {
                delay_ms *= self.config.critical_success_multiplier;
            } else if rate < self.config.low_success_threshold {
                delay_ms *= self.config.low_success_multiplier;
            }
        }

        if self.burst_remaining > 0 {
            self.burst_remaining -= 1;
            delay_ms *= self.config.burst_factor;
            tracing::debug!(
                "Burst mode: shortened delay, {} burst requests remaining",
                self.burst_remaining
            );
        } else if rng.gen_bool(self.config.human_pause_probability) {
            // Simulated pause, as if a human wandered off mid-session
            let pause = rng.gen_range(0..=self.config.human_pause_max_ms);
            tracing::debug!("Inserting human pause of {}ms", pause);
            delay_ms += pause as f64;
        }

        Duration::from_millis(delay_ms as u64).clamp(self.min_delay, self.max_delay)
    }

    /// Whether a burst window may open
    ///
    /// Requires a minimum sample, a rolling success rate at or above the
    /// configured threshold, and a random draw against the configured
    /// probability. On success the next few delays are shortened.
    pub fn should_use_burst_mode(&mut self, window: &OutcomeWindow) -> bool {
        if self.burst_remaining > 0 {
            return true;
        }

        if window.len() < self.config.burst_min_sample {
            return false;
        }

        let success_window = Duration::from_secs(self.config.success_window_secs);
        let rate = match window.success_rate(success_window) {
            Some(r) => r,
            None => return false,
        };

        if rate < self.config.burst_success_threshold {
            return false;
        }

        if rand::thread_rng().gen_bool(self.config.burst_probability) {
            self.burst_remaining = BURST_RUN_LENGTH;
            tracing::info!(
                "Entering burst mode for {} requests (success rate {:.2})",
                BURST_RUN_LENGTH,
                rate
            );
            true
        } else {
            false
        }
    }

    fn pattern_params(&self, pattern: TrafficPattern) -> (u64, u64) {
        match pattern {
            TrafficPattern::Peak => (self.config.peak_base_ms, self.config.peak_variance_ms),
            TrafficPattern::OffHours => (
                self.config.off_hours_base_ms,
                self.config.off_hours_variance_ms,
            ),
            TrafficPattern::Night => (self.config.night_base_ms, self.config.night_variance_ms),
            TrafficPattern::Weekend => (
                self.config.weekend_base_ms,
                self.config.weekend_variance_ms,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::throttle::outcomes::RequestOutcome;
    use std::time::Instant;

    fn estimator(config: TrafficConfig) -> DelayEstimator {
        DelayEstimator::new(
            config,
            Duration::from_millis(500),
            Duration::from_millis(300_000),
        )
    }

    fn window_with_rate(total: usize, successes: usize) -> OutcomeWindow {
        let mut window = OutcomeWindow::new();
        for i in 0..total {
            window.record(RequestOutcome {
                at: Instant::now(),
                url: "https://s/list".to_string(),
                success: i < successes,
                http_status: Some(if i < successes { 200 } else { 429 }),
                latency: Duration::from_millis(100),
            });
        }
        window
    }

    #[test]
    fn test_classify_night() {
        assert_eq!(
            TrafficPattern::classify(Weekday::Tue, 3),
            TrafficPattern::Night
        );
        assert_eq!(
            TrafficPattern::classify(Weekday::Sun, 2),
            TrafficPattern::Night
        );
    }

    #[test]
    fn test_classify_weekend_daytime() {
        assert_eq!(
            TrafficPattern::classify(Weekday::Sat, 14),
            TrafficPattern::Weekend
        );
    }

    #[test]
    fn test_classify_weekday_peak_and_off_hours() {
        assert_eq!(
            TrafficPattern::classify(Weekday::Wed, 20),
            TrafficPattern::Peak
        );
        assert_eq!(
            TrafficPattern::classify(Weekday::Wed, 10),
            TrafficPattern::OffHours
        );
    }

    #[test]
    fn test_delay_within_expected_range_for_pattern() {
        let config = TrafficConfig::default();
        let mut estimator = estimator(config.clone());
        let window = OutcomeWindow::new();

        for _ in 0..50 {
            let delay =
                estimator.delay_for_pattern(TrafficPattern::Night, "https://s/a", &window);
            // base..=base+variance, plus an optional human pause
            let max =
                config.night_base_ms + config.night_variance_ms + config.human_pause_max_ms;
            assert!(delay >= Duration::from_millis(config.night_base_ms));
            assert!(delay <= Duration::from_millis(max));
        }
    }

    #[test]
    fn test_blocked_url_gets_longer_delay() {
        let mut config = TrafficConfig::default();
        config.human_pause_probability = 0.0;
        config.off_hours_variance_ms = 0;
        let mut estimator = estimator(config);

        let clean = OutcomeWindow::new();
        let mut dirty = OutcomeWindow::new();
        for _ in 0..3 {
            dirty.record(RequestOutcome {
                at: Instant::now(),
                url: "https://s/hot".to_string(),
                success: false,
                http_status: Some(429),
                latency: Duration::from_millis(50),
            });
        }

        let base =
            estimator.delay_for_pattern(TrafficPattern::OffHours, "https://s/hot", &clean);
        let penalized =
            estimator.delay_for_pattern(TrafficPattern::OffHours, "https://s/hot", &dirty);
        assert!(penalized > base);
    }

    #[test]
    fn test_low_success_rate_slows_down() {
        let mut config = TrafficConfig::default();
        config.human_pause_probability = 0.0;
        config.off_hours_variance_ms = 0;
        let mut estimator = estimator(config.clone());

        let healthy = window_with_rate(20, 20);
        let failing = window_with_rate(20, 2); // 10% success

        let fast =
            estimator.delay_for_pattern(TrafficPattern::OffHours, "https://s/x", &healthy);
        let slow =
            estimator.delay_for_pattern(TrafficPattern::OffHours, "https://s/x", &failing);

        assert_eq!(
            slow.as_millis() as f64,
            fast.as_millis() as f64 * config.critical_success_multiplier
        );
    }

    #[test]
    fn test_burst_mode_requires_high_success_rate() {
        let mut config = TrafficConfig::default();
        config.burst_probability = 1.0; // remove the random draw
        let mut estimator = estimator(config);

        // 50% success: burst must never engage
        let mediocre = window_with_rate(20, 10);
        for _ in 0..20 {
            assert!(!estimator.should_use_burst_mode(&mediocre));
        }

        // 90% success: burst can engage
        let healthy = window_with_rate(20, 18);
        assert!(estimator.should_use_burst_mode(&healthy));
    }

    #[test]
    fn test_burst_mode_requires_minimum_sample() {
        let mut config = TrafficConfig::default();
        config.burst_probability = 1.0;
        let mut estimator = estimator(config);

        let tiny = window_with_rate(5, 5);
        assert!(!estimator.should_use_burst_mode(&tiny));
    }

    #[test]
    fn test_burst_window_shortens_then_expires() {
        let mut config = TrafficConfig::default();
        config.burst_probability = 1.0;
        config.human_pause_probability = 0.0;
        config.off_hours_variance_ms = 0;
        let mut estimator = estimator(config.clone());

        let healthy = window_with_rate(20, 20);
        assert!(estimator.should_use_burst_mode(&healthy));

        let burst =
            estimator.delay_for_pattern(TrafficPattern::OffHours, "https://s/x", &healthy);
        // With full success the only multiplier is the burst factor
        assert_eq!(
            burst.as_millis() as u64,
            (config.off_hours_base_ms as f64 * config.burst_factor) as u64
        );

        // Exhaust the window
        for _ in 0..BURST_RUN_LENGTH {
            estimator.delay_for_pattern(TrafficPattern::OffHours, "https://s/x", &healthy);
        }
        let normal =
            estimator.delay_for_pattern(TrafficPattern::OffHours, "https://s/x", &healthy);
        assert!(normal > burst);
    }

    #[test]
    fn test_penalties_never_exceed_delay_ceiling() {
        // Aggressive but validation-passing penalty tuning must still
        // produce a bounded sleep
        let mut config = TrafficConfig::default();
        config.human_pause_probability = 0.0;
        config.block_penalty_growth = 10.0;
        config.block_penalty_cap = 10;
        let min = Duration::from_millis(500);
        let max = Duration::from_secs(300);
        let mut estimator = DelayEstimator::new(config, min, max);

        let mut window = OutcomeWindow::new();
        for _ in 0..10 {
            window.record(RequestOutcome {
                at: Instant::now(),
                url: "https://s/hot".to_string(),
                success: false,
                http_status: Some(429),
                latency: Duration::from_millis(50),
            });
        }

        let delay = estimator.delay_for_pattern(TrafficPattern::Peak, "https://s/hot", &window);
        assert!(delay <= max, "delay {:?} above ceiling", delay);
        assert!(delay >= min);
    }
}
