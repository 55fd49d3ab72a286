use crate::config::types::{
    CompetitionEntry, Config, FallbackConfig, FetchConfig, IdentityConfig, ProxyEntry,
    ThrottleConfig, TrafficConfig,
};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_source(&config.source.base_url)?;
    validate_throttle(&config.throttle)?;
    validate_traffic(&config.traffic)?;
    validate_identity(&config.identity)?;
    validate_fallback(&config.fallback)?;
    validate_fetch(&config.fetch)?;
    validate_output(&config.output.database_path)?;
    validate_proxies(&config.proxies)?;
    validate_competitions(&config.competitions)?;
    Ok(())
}

fn validate_source(base_url: &str) -> Result<(), ConfigError> {
    let url = Url::parse(base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base-url '{}': {}", base_url, e)))?;

    if url.scheme() != "https" {
        return Err(ConfigError::Validation(format!(
            "base-url must use HTTPS scheme, got '{}'",
            base_url
        )));
    }

    Ok(())
}

/// Validates throttle configuration
fn validate_throttle(config: &ThrottleConfig) -> Result<(), ConfigError> {
    if config.min_delay_ms > config.max_delay_ms {
        return Err(ConfigError::Validation(format!(
            "throttle min-delay-ms ({}) must not exceed max-delay-ms ({})",
            config.min_delay_ms, config.max_delay_ms
        )));
    }

    if config.growth_factor < 1.0 {
        return Err(ConfigError::Validation(format!(
            "throttle growth-factor must be >= 1.0, got {}",
            config.growth_factor
        )));
    }

    if !(0.0..=1.0).contains(&config.jitter_fraction) {
        return Err(ConfigError::Validation(format!(
            "throttle jitter-fraction must be between 0.0 and 1.0, got {}",
            config.jitter_fraction
        )));
    }

    if config.failures_before_reconfigure < 1 {
        return Err(ConfigError::Validation(
            "throttle failures-before-reconfigure must be >= 1".to_string(),
        ));
    }

    if config.max_identity_changes < 1 {
        return Err(ConfigError::Validation(
            "throttle max-identity-changes must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates traffic-pattern configuration
fn validate_traffic(config: &TrafficConfig) -> Result<(), ConfigError> {
    for (name, value) in [
        ("low-success-threshold", config.low_success_threshold),
        ("critical-success-threshold", config.critical_success_threshold),
        ("burst-success-threshold", config.burst_success_threshold),
        ("burst-probability", config.burst_probability),
        ("human-pause-probability", config.human_pause_probability),
    ] {
        if !(0.0..=1.0).contains(&value) {
            return Err(ConfigError::Validation(format!(
                "traffic {} must be between 0.0 and 1.0, got {}",
                name, value
            )));
        }
    }

    if config.critical_success_threshold > config.low_success_threshold {
        return Err(ConfigError::Validation(format!(
            "traffic critical-success-threshold ({}) must not exceed low-success-threshold ({})",
            config.critical_success_threshold, config.low_success_threshold
        )));
    }

    if config.burst_factor <= 0.0 || config.burst_factor >= 1.0 {
        return Err(ConfigError::Validation(format!(
            "traffic burst-factor must be between 0.0 and 1.0 exclusive, got {}",
            config.burst_factor
        )));
    }

    if config.block_penalty_growth < 1.0 {
        return Err(ConfigError::Validation(format!(
            "traffic block-penalty-growth must be >= 1.0, got {}",
            config.block_penalty_growth
        )));
    }

    Ok(())
}

/// Validates identity pool configuration
fn validate_identity(config: &IdentityConfig) -> Result<(), ConfigError> {
    if config.block_min_failures < 1 {
        return Err(ConfigError::Validation(
            "identity block-min-failures must be >= 1".to_string(),
        ));
    }

    if !(0.0..=1.0).contains(&config.block_success_floor) {
        return Err(ConfigError::Validation(format!(
            "identity block-success-floor must be between 0.0 and 1.0, got {}",
            config.block_success_floor
        )));
    }

    Ok(())
}

/// Validates fallback gate configuration
fn validate_fallback(config: &FallbackConfig) -> Result<(), ConfigError> {
    if config.consecutive_failure_threshold < 1 {
        return Err(ConfigError::Validation(
            "fallback consecutive-failure-threshold must be >= 1".to_string(),
        ));
    }

    if !(0.0..=1.0).contains(&config.success_floor) {
        return Err(ConfigError::Validation(format!(
            "fallback success-floor must be between 0.0 and 1.0, got {}",
            config.success_floor
        )));
    }

    if config.probe_timeout_secs == 0 || config.probe_timeout_secs > 30 {
        return Err(ConfigError::Validation(format!(
            "fallback probe-timeout-secs must be between 1 and 30, got {}",
            config.probe_timeout_secs
        )));
    }

    Ok(())
}

/// Validates fetch configuration
fn validate_fetch(config: &FetchConfig) -> Result<(), ConfigError> {
    if config.hard_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "fetch hard-timeout-secs must be >= 1".to_string(),
        ));
    }

    if config.connect_timeout_secs > config.hard_timeout_secs {
        return Err(ConfigError::Validation(format!(
            "fetch connect-timeout-secs ({}) must not exceed hard-timeout-secs ({})",
            config.connect_timeout_secs, config.hard_timeout_secs
        )));
    }

    Ok(())
}

fn validate_output(database_path: &str) -> Result<(), ConfigError> {
    if database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database-path cannot be empty".to_string(),
        ));
    }
    Ok(())
}

/// Validates proxy entries
fn validate_proxies(proxies: &[ProxyEntry]) -> Result<(), ConfigError> {
    for entry in proxies {
        if entry.host.is_empty() {
            return Err(ConfigError::InvalidProxy(
                "proxy host cannot be empty".to_string(),
            ));
        }

        if entry.port == 0 {
            return Err(ConfigError::InvalidProxy(format!(
                "proxy '{}' has invalid port 0",
                entry.host
            )));
        }

        // Credentials come as a pair or not at all
        if entry.username.is_some() != entry.password.is_some() {
            return Err(ConfigError::InvalidProxy(format!(
                "proxy '{}' must set both username and password, or neither",
                entry.host
            )));
        }
    }

    Ok(())
}

/// Validates competition mapping entries
fn validate_competitions(competitions: &[CompetitionEntry]) -> Result<(), ConfigError> {
    let mut seen_ids = std::collections::HashSet::new();

    for entry in competitions {
        if !seen_ids.insert(entry.id) {
            return Err(ConfigError::Validation(format!(
                "duplicate competition id {}",
                entry.id
            )));
        }

        if entry.slug.is_empty() {
            return Err(ConfigError::Validation(format!(
                "competition '{}' has an empty slug",
                entry.name
            )));
        }

        if Url::parse(&entry.url).is_err() {
            return Err(ConfigError::InvalidUrl(format!(
                "competition '{}' has an invalid url '{}'",
                entry.name, entry.url
            )));
        }

        if !entry.seasons_url_pattern.contains("{season}") {
            return Err(ConfigError::Validation(format!(
                "competition '{}' seasons-url-pattern must contain a {{season}} placeholder",
                entry.name
            )));
        }
    }

    Ok(())
}
