//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use regex::Regex;
use thiserror::Error;
use url::Url;

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

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `max_bytes` is 0 or exceeds 50MB
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `user_agent` or `cache_version` is empty
    /// - `origin` is not an http(s) URL
    /// - a dynamic pattern does not compile
    /// - an external resource is not an absolute http(s) URL
    /// - a manifest path does not start with `/`
    ///
    /// Returns `ConfigError::Missing` if `sync_tag` is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_bytes == 0 {
            return Err(invalid("max_bytes", "must be greater than 0"));
        }
        if self.max_bytes > 50 * 1024 * 1024 {
            return Err(invalid("max_bytes", "must not exceed 50MB"));
        }

        if self.timeout_ms < 100 {
            return Err(invalid("timeout_ms", "must be at least 100ms"));
        }
        if self.timeout_ms > 300_000 {
            return Err(invalid("timeout_ms", "must not exceed 5 minutes (300000ms)"));
        }

        if self.user_agent.is_empty() {
            return Err(invalid("user_agent", "must not be empty"));
        }

        if self.cache_version.trim().is_empty() {
            return Err(invalid("cache_version", "must not be empty"));
        }

        let origin = self.origin_url()?;
        if !matches!(origin.scheme(), "http" | "https") {
            return Err(invalid("origin", format!("unsupported scheme: {}", origin.scheme())));
        }

        for pattern in &self.dynamic_patterns {
            Regex::new(pattern).map_err(|e| invalid("dynamic_patterns", format!("{pattern}: {e}")))?;
        }

        for resource in &self.external_resources {
            let url = Url::parse(resource).map_err(|e| invalid("external_resources", format!("{resource}: {e}")))?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(invalid("external_resources", format!("{resource}: not an http(s) URL")));
            }
        }

        if let Some(path) = self.static_manifest.iter().find(|p| !p.starts_with('/')) {
            return Err(invalid("static_manifest", format!("{path}: must start with '/'")));
        }

        if self.sync_tag.is_empty() {
            return Err(ConfigError::Missing {
                field: "sync_tag".into(),
                hint: "Set RELAYCACHE_SYNC_TAG environment variable".into(),
            });
        }

        if self.static_suffixes.iter().any(String::is_empty) {
            tracing::warn!("Empty entry in static_suffixes classifies every path as static");
        }

        Ok(())
    }
}
