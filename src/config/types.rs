use serde::Deserialize;

/// Main configuration structure for Statline
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub source: SourceConfig,
    #[serde(default)]
    pub throttle: ThrottleConfig,
    #[serde(default)]
    pub traffic: TrafficConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub fallback: FallbackConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    pub output: OutputConfig,
    #[serde(default, rename = "proxy")]
    pub proxies: Vec<ProxyEntry>,
    #[serde(default, rename = "competition")]
    pub competitions: Vec<CompetitionEntry>,
}

/// The remote source being crawled
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SourceConfig {
    /// Base URL of the statistics site, e.g. "https://stats.example.com"
    pub base_url: String,
}

/// Rate-limit state machine tuning
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ThrottleConfig {
    /// Base delay between requests while nominal (milliseconds)
    pub base_delay_ms: u64,

    /// Floor for any computed delay (milliseconds)
    pub min_delay_ms: u64,

    /// Ceiling for any computed delay (milliseconds)
    pub max_delay_ms: u64,

    /// Multiplier applied per consecutive failure while throttled
    pub growth_factor: f64,

    /// Cap on the backoff exponent so growth stays bounded
    pub backoff_exponent_cap: u32,

    /// Fixed delay while a fresh identity cools in (milliseconds)
    pub reconfigure_delay_ms: u64,

    /// Random jitter applied to delays, as a fraction of the delay
    pub jitter_fraction: f64,

    /// Consecutive failures while throttled before reconfiguring
    pub failures_before_reconfigure: u32,

    /// Consecutive failures before should_continue() reports false
    pub max_consecutive_failures: u32,

    /// Identity changes allowed before the session halts
    pub max_identity_changes: u32,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 2_000,
            min_delay_ms: 500,
            max_delay_ms: 300_000,
            growth_factor: 2.0,
            backoff_exponent_cap: 6,
            reconfigure_delay_ms: 45_000,
            jitter_fraction: 0.25,
            failures_before_reconfigure: 3,
            max_consecutive_failures: 10,
            max_identity_changes: 5,
        }
    }
}

/// Delay estimator tuning: traffic-pattern baselines and modifiers
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct TrafficConfig {
    /// Baseline delay during weekday peak hours (milliseconds)
    pub peak_base_ms: u64,
    /// Random variance added during peak hours (milliseconds)
    pub peak_variance_ms: u64,

    /// Baseline delay during weekday off-hours (milliseconds)
    pub off_hours_base_ms: u64,
    pub off_hours_variance_ms: u64,

    /// Baseline delay at night (milliseconds)
    pub night_base_ms: u64,
    pub night_variance_ms: u64,

    /// Baseline delay on weekends (milliseconds)
    pub weekend_base_ms: u64,
    pub weekend_variance_ms: u64,

    /// Per-URL penalty multiplier growth per recorded block
    pub block_penalty_growth: f64,
    /// Cap on the block-penalty exponent
    pub block_penalty_cap: u32,

    /// Trailing window for rolling success rate (seconds)
    pub success_window_secs: u64,
    /// Below this success rate, delays are multiplied
    pub low_success_threshold: f64,
    pub low_success_multiplier: f64,
    /// Below this success rate, delays are multiplied harder
    pub critical_success_threshold: f64,
    pub critical_success_multiplier: f64,

    /// Probability of inserting a simulated human pause
    pub human_pause_probability: f64,
    /// Upper bound on a simulated human pause (milliseconds)
    pub human_pause_max_ms: u64,

    /// Rolling success rate required before burst mode is considered
    pub burst_success_threshold: f64,
    /// Probability of entering burst mode once eligible
    pub burst_probability: f64,
    /// Delay multiplier while bursting (< 1.0 shortens delays)
    pub burst_factor: f64,
    /// Minimum recorded outcomes before burst mode is considered
    pub burst_min_sample: usize,
}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self {
            peak_base_ms: 4_000,
            peak_variance_ms: 2_000,
            off_hours_base_ms: 2_500,
            off_hours_variance_ms: 1_500,
            night_base_ms: 1_500,
            night_variance_ms: 1_000,
            weekend_base_ms: 2_000,
            weekend_variance_ms: 1_200,
            block_penalty_growth: 1.5,
            block_penalty_cap: 4,
            success_window_secs: 1_800,
            low_success_threshold: 0.6,
            low_success_multiplier: 1.5,
            critical_success_threshold: 0.3,
            critical_success_multiplier: 3.0,
            human_pause_probability: 0.08,
            human_pause_max_ms: 12_000,
            burst_success_threshold: 0.8,
            burst_probability: 0.15,
            burst_factor: 0.4,
            burst_min_sample: 20,
        }
    }
}

/// Identity pool tuning
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct IdentityConfig {
    /// Minimum time before an identity may be reused (seconds)
    pub cooldown_secs: u64,

    /// Failures required before the block rule is evaluated
    pub block_min_failures: u32,

    /// Success rate below which an identity is blocked
    pub block_success_floor: f64,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: 30,
            block_min_failures: 5,
            block_success_floor: 0.3,
        }
    }
}

/// Fallback gate tuning
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct FallbackConfig {
    /// Consecutive failures that open a short fallback window
    pub consecutive_failure_threshold: u32,
    /// Short fallback window duration (seconds)
    pub short_window_secs: u64,

    /// Overall success rate below which a long window opens
    pub success_floor: f64,
    /// Minimum outcomes before the success-floor rule applies
    pub min_sample: usize,
    /// Long fallback window duration (seconds)
    pub long_window_secs: u64,

    /// Maximum age of the last success before live access is suspect (seconds)
    pub max_success_age_secs: u64,
    /// Window opened when the last success is too old (seconds)
    pub stale_window_secs: u64,

    /// Hard ceiling on the once-per-session connectivity probe (seconds)
    pub probe_timeout_secs: u64,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            consecutive_failure_threshold: 3,
            short_window_secs: 300,
            success_floor: 0.3,
            min_sample: 10,
            long_window_secs: 1_800,
            max_success_age_secs: 3_600,
            stale_window_secs: 900,
            probe_timeout_secs: 4,
        }
    }
}

/// HTTP fetch tuning
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct FetchConfig {
    /// Hard deadline on a single fetch, including body read (seconds)
    pub hard_timeout_secs: u64,

    /// TCP connect timeout (seconds)
    pub connect_timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            hard_timeout_secs: 15,
            connect_timeout_secs: 10,
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Path to the SQLite crawl queue database
    pub database_path: String,
}

/// Kind of proxy endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyKind {
    Http,
    Https,
    Socks5,
}

/// One proxy identity entry; absence of any entries means direct connections
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ProxyEntry {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(rename = "type")]
    pub kind: ProxyKind,
    #[serde(default)]
    pub residential: bool,
}

/// Versioned competition mapping entry
///
/// Replaces the historical scattering of hard-coded ID-to-name tables with a
/// single resource loaded at startup. The seasons URL pattern, combined with
/// the known season labels, is what the fallback gate uses to derive
/// synthetic targets when live access is refused.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CompetitionEntry {
    /// Source-side numeric identifier
    pub id: u32,

    /// Human-readable competition name
    pub name: String,

    /// URL slug used by the source, e.g. "premier-league"
    pub slug: String,

    /// Competition overview page; seeds discovery at the top of the pipeline
    pub url: String,

    /// Pattern with `{id}`, `{slug}` and `{season}` placeholders
    pub seasons_url_pattern: String,

    /// Season labels known to exist, newest first (e.g. "2024-2025")
    #[serde(default)]
    pub known_seasons: Vec<String>,
}
