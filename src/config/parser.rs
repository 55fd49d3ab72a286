use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    validate(&config)?;
    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Recorded per run so a resumed crawl can detect that it is running under
/// different tuning than the run it resumes.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let result = hasher.finalize();
    Ok(hex::encode(result))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    const MINIMAL: &str = r#"
[source]
base-url = "https://stats.example.com"

[output]
database-path = "./statline.db"
"#;

    #[test]
    fn test_load_minimal_config_uses_defaults() {
        let file = create_temp_config(MINIMAL);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.source.base_url, "https://stats.example.com");
        assert_eq!(config.throttle.failures_before_reconfigure, 3);
        assert_eq!(config.identity.block_min_failures, 5);
        assert_eq!(config.fetch.hard_timeout_secs, 15);
        assert!(config.proxies.is_empty());
    }

    #[test]
    fn test_load_config_with_proxies_and_competitions() {
        let content = format!(
            "{}\n{}",
            MINIMAL,
            r#"
[[proxy]]
host = "10.0.0.1"
port = 8080
type = "http"
residential = true

[[proxy]]
host = "10.0.0.2"
port = 1080
username = "u"
password = "p"
type = "socks5"

[[competition]]
id = 17
name = "Premier League"
slug = "premier-league"
url = "https://stats.example.com/league/17/premier-league"
seasons-url-pattern = "https://stats.example.com/league/{id}/{slug}/{season}"
known-seasons = ["2024-2025", "2023-2024"]
"#
        );
        let file = create_temp_config(&content);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.proxies.len(), 2);
        assert!(config.proxies[0].residential);
        assert_eq!(
            config.proxies[1].kind,
            crate::config::ProxyKind::Socks5
        );
        assert_eq!(config.competitions.len(), 1);
        assert_eq!(config.competitions[0].known_seasons.len(), 2);
    }

    #[test]
    fn test_load_config_with_invalid_path() {
        let result = load_config(Path::new("/nonexistent/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_with_invalid_toml() {
        let file = create_temp_config("this is not valid TOML {{{");
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_load_config_with_validation_error() {
        // min-delay above max-delay must be rejected
        let content = format!(
            "{}\n[throttle]\nmin-delay-ms = 10000\nmax-delay-ms = 500\n",
            MINIMAL
        );
        let file = create_temp_config(&content);
        let result = load_config(file.path());
        assert!(matches!(result.unwrap_err(), ConfigError::Validation(_)));
    }

    #[test]
    fn test_compute_config_hash() {
        let file = create_temp_config("test content");

        let hash1 = compute_config_hash(file.path()).unwrap();
        let hash2 = compute_config_hash(file.path()).unwrap();

        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64); // SHA-256 produces 64 hex characters
    }

    #[test]
    fn test_different_content_different_hash() {
        let file1 = create_temp_config("content 1");
        let file2 = create_temp_config("content 2");

        assert_ne!(
            compute_config_hash(file1.path()).unwrap(),
            compute_config_hash(file2.path()).unwrap()
        );
    }
}
