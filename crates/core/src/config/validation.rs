//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `origin` is not an absolute http(s) URL
    /// - `cache_prefix` or `cache_version` is empty or contains whitespace
    /// - `max_bytes` is 0 or exceeds 50MB
    /// - `timeout_ms` or `api_timeout_ms` is below 100ms or exceeds 5 minutes
    /// - `user_agent` or `emergency_number` is empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        match url::Url::parse(&self.origin) {
            Ok(origin) if matches!(origin.scheme(), "http" | "https") && origin.host_str().is_some() => {}
            Ok(origin) => {
                return Err(ConfigError::Invalid {
                    field: "origin".into(),
                    reason: format!("unsupported origin: {origin}"),
                });
            }
            Err(e) => return Err(ConfigError::Invalid { field: "origin".into(), reason: e.to_string() }),
        }

        for (field, value) in [("cache_prefix", &self.cache_prefix), ("cache_version", &self.cache_version)] {
            if value.is_empty() {
                return Err(ConfigError::Invalid { field: field.into(), reason: "must not be empty".into() });
            }
            if value.chars().any(char::is_whitespace) {
                return Err(ConfigError::Invalid { field: field.into(), reason: "must not contain whitespace".into() });
            }
        }

        if self.max_bytes == 0 {
            return Err(ConfigError::Invalid { field: "max_bytes".into(), reason: "must be greater than 0".into() });
        }
        if self.max_bytes > 50 * 1024 * 1024 {
            return Err(ConfigError::Invalid { field: "max_bytes".into(), reason: "must not exceed 50MB".into() });
        }

        for (field, value) in [("timeout_ms", self.timeout_ms), ("api_timeout_ms", self.api_timeout_ms)] {
            if value < 100 {
                return Err(ConfigError::Invalid { field: field.into(), reason: "must be at least 100ms".into() });
            }
            if value > 300_000 {
                return Err(ConfigError::Invalid {
                    field: field.into(),
                    reason: "must not exceed 5 minutes (300000ms)".into(),
                });
            }
        }

        if self.user_agent.is_empty() {
            return Err(ConfigError::Invalid { field: "user_agent".into(), reason: "must not be empty".into() });
        }

        if self.emergency_number.trim().is_empty() {
            return Err(ConfigError::Invalid { field: "emergency_number".into(), reason: "must not be empty".into() });
        }

        if self.api_timeout_ms > self.timeout_ms {
            tracing::warn!(
                api_timeout_ms = self.api_timeout_ms,
                timeout_ms = self.timeout_ms,
                "api_timeout_ms exceeds timeout_ms; the client timeout bounds network-first requests"
            );
        }

        Ok(())
    }
}
