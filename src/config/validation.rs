//! Configuration validation.
//!
//! Serde handles syntax; this module checks value ranges and URL shapes.
//! Every problem is reported, not just the first.

use std::fmt;
use std::net::SocketAddr;
use url::Url;

use crate::config::schema::ClientConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field, e.g. `retries.max_delay_ms`.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &ClientConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.endpoints.urls.is_empty() {
        errors.push(ValidationError::new("endpoints.urls", "at least one endpoint is required"));
    }
    for (i, raw) in config.endpoints.urls.iter().enumerate() {
        let field = format!("endpoints.urls[{}]", i);
        match Url::parse(raw) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {
                if url.host_str().is_none() {
                    errors.push(ValidationError::new(field, "missing host"));
                }
            }
            Ok(url) => {
                errors.push(ValidationError::new(field, format!("unsupported scheme '{}'", url.scheme())));
            }
            Err(e) => errors.push(ValidationError::new(field, format!("invalid URL '{}': {}", raw, e))),
        }
    }

    if !config.probe.path.starts_with('/') {
        errors.push(ValidationError::new("probe.path", "must start with '/'"));
    }
    if config.probe.interval_secs == 0 {
        errors.push(ValidationError::new("probe.interval_secs", "must be greater than 0"));
    }
    if config.probe.timeout_ms == 0 {
        errors.push(ValidationError::new("probe.timeout_ms", "must be greater than 0"));
    }

    if config.breaker.failure_threshold == 0 {
        errors.push(ValidationError::new("breaker.failure_threshold", "must be greater than 0"));
    }

    if config.retries.base_delay_ms > config.retries.max_delay_ms {
        errors.push(ValidationError::new(
            "retries.base_delay_ms",
            "must not exceed retries.max_delay_ms",
        ));
    }

    if config.timeouts.request_ms == 0 {
        errors.push(ValidationError::new("timeouts.request_ms", "must be greater than 0"));
    }
    if config.timeouts.export_ms == 0 {
        errors.push(ValidationError::new("timeouts.export_ms", "must be greater than 0"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("not a socket address: '{}'", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&ClientConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = ClientConfig::default();
        config.endpoints.urls = vec!["ftp://example.com".into(), "not a url".into()];
        config.breaker.failure_threshold = 0;
        config.retries.base_delay_ms = 10_000;

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "endpoints.urls[0]",
                "endpoints.urls[1]",
                "breaker.failure_threshold",
                "retries.base_delay_ms",
            ]
        );
    }

    #[test]
    fn test_empty_endpoint_list_rejected() {
        let mut config = ClientConfig::default();
        config.endpoints.urls.clear();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "endpoints.urls");
    }
}
