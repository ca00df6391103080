//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::{AppConfig, MAX_LOCAL_ACCESS_LEVEL};
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `ttl.response` is 0
    /// - `ttl.hard_resource` is below `ttl.resource`
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `user_agent` is empty
    /// - a `local_access` level exceeds 8
    ///
    /// Returns `ConfigError::Missing` if `allowed_namespaces` is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ttl.response == 0 {
            return Err(ConfigError::Invalid { field: "ttl.response".into(), reason: "must be greater than 0".into() });
        }
        if self.ttl.hard_resource.is_some_and(|hard| hard < self.ttl.resource) {
            return Err(ConfigError::Invalid {
                field: "ttl.hard_resource".into(),
                reason: format!("must not be below ttl.resource ({})", self.ttl.resource),
            });
        }

        if self.timeout_ms < 100 {
            return Err(ConfigError::Invalid { field: "timeout_ms".into(), reason: "must be at least 100ms".into() });
        }
        if self.timeout_ms > 300_000 {
            return Err(ConfigError::Invalid {
                field: "timeout_ms".into(),
                reason: "must not exceed 5 minutes (300000ms)".into(),
            });
        }

        if self.user_agent.is_empty() {
            return Err(ConfigError::Invalid { field: "user_agent".into(), reason: "must not be empty".into() });
        }

        if self.allowed_namespaces.is_empty() {
            return Err(ConfigError::Missing {
                field: "allowed_namespaces".into(),
                hint: "Set DISSCACHE_ALLOWED_NAMESPACES or allowed_namespaces in the config file".into(),
            });
        }

        for (nmsp, access) in &self.local_access {
            if access.level > MAX_LOCAL_ACCESS_LEVEL {
                return Err(ConfigError::Invalid {
                    field: format!("local_access.{nmsp}.level"),
                    reason: format!("must not exceed {MAX_LOCAL_ACCESS_LEVEL}"),
                });
            }
            if !self.is_allowed(nmsp) {
                tracing::warn!(namespace = %nmsp, "local access configured for a namespace that is not served");
            }
        }

        if self.ttl.resource == 0 {
            tracing::warn!("ttl.resource is 0; every request revalidates against the repository");
        }

        Ok(())
    }
}
