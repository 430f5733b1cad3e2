//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses and the upstream URL
//! - Validate value ranges (timeouts > 0, page sizes consistent)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AppConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use url::Url;

use crate::config::schema::{AppConfig, StorageBackend};

/// One semantic problem in a loaded configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Check a parsed configuration, collecting every problem found.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.max_body_size == 0 {
        errors.push(ValidationError::new("listener.max_body_size", "must be > 0"));
    }

    match Url::parse(&config.upstream.base_url) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.has_host() => {}
        Ok(url) => errors.push(ValidationError::new(
            "upstream.base_url",
            format!("'{url}' must be an absolute http or https URL"),
        )),
        Err(e) => errors.push(ValidationError::new(
            "upstream.base_url",
            format!("'{}' is not a URL: {e}", config.upstream.base_url),
        )),
    }
    if config.upstream.timeout_secs == 0 {
        errors.push(ValidationError::new("upstream.timeout_secs", "must be > 0"));
    }
    if config.upstream.connect_timeout_secs == 0 {
        errors.push(ValidationError::new(
            "upstream.connect_timeout_secs",
            "must be > 0",
        ));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be > 0"));
    } else if config.timeouts.request_secs <= config.upstream.timeout_secs {
        // The inbound deadline has to outlast the upstream one.
        errors.push(ValidationError::new(
            "timeouts.request_secs",
            format!(
                "must be greater than upstream.timeout_secs ({})",
                config.upstream.timeout_secs
            ),
        ));
    }

    if config.storage.backend == StorageBackend::Sqlite {
        if config.storage.url.trim().is_empty() {
            errors.push(ValidationError::new("storage.url", "must not be empty"));
        }
        if config.storage.max_connections == 0 {
            errors.push(ValidationError::new(
                "storage.max_connections",
                "must be > 0",
            ));
        }
    }

    if config.audit.max_page_size == 0 {
        errors.push(ValidationError::new("audit.max_page_size", "must be > 0"));
    }
    if config.audit.default_page_size == 0
        || config.audit.default_page_size > config.audit.max_page_size
    {
        errors.push(ValidationError::new(
            "audit.default_page_size",
            format!(
                "must be between 1 and max_page_size ({})",
                config.audit.max_page_size
            ),
        ));
    }
    if matches!(config.audit.api_key.as_deref(), Some(key) if key.is_empty()) {
        errors.push(ValidationError::new(
            "audit.api_key",
            "must not be empty when set",
        ));
    }

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!(
                "'{}' is not a socket address",
                config.observability.metrics_address
            ),
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
    fn test_defaults_are_valid() {
        assert_eq!(validate_config(&AppConfig::default()), Ok(()));
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = AppConfig::default();
        config.listener.bind_address = "not-an-address".into();
        config.upstream.base_url = "ftp://upstream".into();
        config.upstream.timeout_secs = 0;
        config.audit.default_page_size = 1000;

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec![
                "listener.bind_address",
                "upstream.base_url",
                "upstream.timeout_secs",
                "audit.default_page_size",
            ]
        );
    }

    #[test]
    fn test_inbound_deadline_must_outlast_upstream_timeout() {
        let mut config = AppConfig::default();
        config.upstream.timeout_secs = 30;
        config.timeouts.request_secs = 30;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "timeouts.request_secs");
        assert!(errors[0].message.contains("upstream.timeout_secs"));

        config.timeouts.request_secs = 31;
        assert_eq!(validate_config(&config), Ok(()));
    }

    #[test]
    fn test_relative_upstream_rejected() {
        let mut config = AppConfig::default();
        config.upstream.base_url = "/just/a/path".into();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_memory_backend_ignores_storage_url() {
        let mut config = AppConfig::default();
        config.storage.backend = StorageBackend::Memory;
        config.storage.url = String::new();
        assert_eq!(validate_config(&config), Ok(()));
    }

    #[test]
    fn test_metrics_address_checked_only_when_enabled() {
        let mut config = AppConfig::default();
        config.observability.metrics_address = "nope".into();
        assert_eq!(validate_config(&config), Ok(()));

        config.observability.metrics_enabled = true;
        assert!(validate_config(&config).is_err());
    }
}
