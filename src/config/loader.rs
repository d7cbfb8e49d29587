//! Configuration loading from disk and environment.

use std::fs;
use std::path::{Path, PathBuf};
use crate::config::schema::ClientConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Comma-separated list of backend base URLs; replaces the configured list.
pub const ENV_API_URLS: &str = "CAMBIO_API_URLS";
/// Per-attempt request timeout in milliseconds.
pub const ENV_API_TIMEOUT_MS: &str = "CAMBIO_API_TIMEOUT_MS";
/// Probe interval in seconds.
pub const ENV_PROBE_INTERVAL_SECS: &str = "CAMBIO_PROBE_INTERVAL_SECS";
/// Directory for the persisted session.
pub const ENV_SESSION_DIR: &str = "CAMBIO_SESSION_DIR";

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Env { var: &'static str, value: String },
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Env { var, value } => write!(f, "Invalid value for {}: '{}'", var, value),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Load configuration from an optional TOML file, apply environment
/// overrides, then validate.
pub fn load_config(path: Option<&Path>) -> Result<ClientConfig, ConfigError> {
    let config = match path {
        Some(path) => {
            let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
            toml::from_str(&content).map_err(ConfigError::Parse)?
        }
        None => ClientConfig::default(),
    };

    let config = apply_env_overrides(config, |key| std::env::var(key).ok())?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Apply environment overrides, reading variables through `lookup`.
pub fn apply_env_overrides<F>(mut config: ClientConfig, lookup: F) -> Result<ClientConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = lookup(ENV_API_URLS) {
        let urls: Vec<String> = raw
            .split(',')
            .map(|s| s.trim().trim_end_matches('/').to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if !urls.is_empty() {
            config.endpoints.urls = urls;
        }
    }

    if let Some(raw) = lookup(ENV_API_TIMEOUT_MS) {
        config.timeouts.request_ms = raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Env { var: ENV_API_TIMEOUT_MS, value: raw.clone() })?;
    }

    if let Some(raw) = lookup(ENV_PROBE_INTERVAL_SECS) {
        config.probe.interval_secs = raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Env { var: ENV_PROBE_INTERVAL_SECS, value: raw.clone() })?;
    }

    if let Some(raw) = lookup(ENV_SESSION_DIR) {
        if !raw.trim().is_empty() {
            config.session.storage_dir = PathBuf::from(raw.trim());
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_env_overrides_urls_and_timeout() {
        let config = apply_env_overrides(
            ClientConfig::default(),
            env(&[
                (ENV_API_URLS, "http://a.test/, http://b.test ,"),
                (ENV_API_TIMEOUT_MS, "15000"),
            ]),
        )
        .unwrap();

        assert_eq!(config.endpoints.urls, vec!["http://a.test", "http://b.test"]);
        assert_eq!(config.timeouts.request_ms, 15000);
    }

    #[test]
    fn test_env_bad_number_is_reported() {
        let err = apply_env_overrides(ClientConfig::default(), env(&[(ENV_API_TIMEOUT_MS, "soon")]))
            .unwrap_err();
        assert!(err.to_string().contains(ENV_API_TIMEOUT_MS));
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[endpoints]
urls = ["http://127.0.0.1:7000"]

[breaker]
failure_threshold = 2
"#
        )
        .unwrap();

        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.breaker.failure_threshold, 2);
        // Untouched sections keep their defaults
        assert_eq!(config.retries.max_retries, 3);
    }

    #[test]
    fn test_invalid_file_fails_validation() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[breaker]\nfailure_threshold = 0").unwrap();

        match load_config(Some(file.path())) {
            Err(ConfigError::Validation(errors)) => {
                assert!(errors.iter().any(|e| e.field == "breaker.failure_threshold"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }
}
