//! Engine configuration.
//!
//! Configuration can be built in code, parsed from JSON and overridden from
//! environment variables:
//!
//! | Field                  | Environment variable          | Default |
//! |------------------------|-------------------------------|---------|
//! | `query_limit`          | `ROLAP_QUERY_LIMIT`           | 40      |
//! | `cache_accessors`      | `ROLAP_CACHE_ACCESSORS`       | true    |
//! | `admission_timeout_ms` | `ROLAP_ADMISSION_TIMEOUT_MS`  | none    |
//!
//! # Example
//!
//! ```no_run
//! use rolap_sql::config::EngineConfig;
//!
//! # fn main() -> Result<(), rolap_sql::error::ConfigError> {
//! let config = EngineConfig::from_json(r#"{ "query_limit": 8 }"#)?.with_env_overrides()?;
//! assert!(config.query_limit > 0);
//! # Ok(())
//! # }
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default number of statements that may execute at once.
pub const DEFAULT_QUERY_LIMIT: usize = 40;

pub const ENV_QUERY_LIMIT: &str = "ROLAP_QUERY_LIMIT";
pub const ENV_CACHE_ACCESSORS: &str = "ROLAP_CACHE_ACCESSORS";
pub const ENV_ADMISSION_TIMEOUT_MS: &str = "ROLAP_ADMISSION_TIMEOUT_MS";

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Capacity of the admission gate
    pub query_limit: usize,
    /// Whether column accessors cache the value read for the current row
    pub cache_accessors: bool,
    /// How long a statement may wait for a slot, in milliseconds
    pub admission_timeout_ms: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            query_limit: DEFAULT_QUERY_LIMIT,
            cache_accessors: true,
            admission_timeout_ms: None,
        }
    }
}

impl EngineConfig {
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::new()
    }

    /// Parse and validate a JSON document. Missing fields take their defaults.
    ///
    /// # Errors
    /// Returns `ConfigError` if the document is malformed or invalid.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from the process environment.
    ///
    /// # Errors
    /// Returns `ConfigError::InvalidParameter` if a variable does not parse.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_QUERY_LIMIT) {
            self.query_limit = parse_value(ENV_QUERY_LIMIT, &value)?;
        }
        if let Some(value) = lookup(ENV_CACHE_ACCESSORS) {
            self.cache_accessors = parse_value(ENV_CACHE_ACCESSORS, &value)?;
        }
        if let Some(value) = lookup(ENV_ADMISSION_TIMEOUT_MS) {
            self.admission_timeout_ms = Some(parse_value(ENV_ADMISSION_TIMEOUT_MS, &value)?);
        }
        self.validate()?;
        Ok(self)
    }

    /// Check value constraints.
    ///
    /// # Errors
    /// Returns `ConfigError::InvalidParameter` for the first invalid field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.query_limit == 0 {
            return Err(ConfigError::InvalidParameter {
                parameter: "query_limit".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        if self.admission_timeout_ms == Some(0) {
            return Err(ConfigError::InvalidParameter {
                parameter: "admission_timeout_ms".to_string(),
                message: "must be greater than zero when set".to_string(),
            });
        }
        Ok(())
    }

    pub fn admission_timeout(&self) -> Option<Duration> {
        self.admission_timeout_ms.map(Duration::from_millis)
    }
}

fn parse_value<T: std::str::FromStr>(parameter: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidParameter {
            parameter: parameter.to_string(),
            message: format!("cannot parse '{}'", value),
        })
}

/// Builder for [`EngineConfig`].
#[derive(Debug, Clone, Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query_limit(mut self, limit: usize) -> Self {
        self.config.query_limit = limit;
        self
    }

    pub fn cache_accessors(mut self, enabled: bool) -> Self {
        self.config.cache_accessors = enabled;
        self
    }

    pub fn admission_timeout(mut self, timeout: Duration) -> Self {
        self.config.admission_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// Validate and build.
    ///
    /// # Errors
    /// Returns `ConfigError::InvalidParameter` if a value is out of range.
    pub fn build(self) -> Result<EngineConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
