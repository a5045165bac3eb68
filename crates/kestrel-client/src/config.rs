//! Client configuration and YAML configuration sets.
//!
//! A configuration file holds one section per environment, optionally nested
//! under a namespace:
//!
//! ```yaml
//! development:
//!   servers: ["localhost:22133"]
//!   timeout: 0.25
//! reports:
//!   development:
//!     servers: ["localhost:22134"]
//!     gets_per_server: 10
//! ```
//!
//! Environment variables prefixed `KESTREL__` override file values, e.g.
//! `KESTREL__DEVELOPMENT__TIMEOUT=1`.

use crate::client::Client;
use crate::error::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

/// Environment used when none is selected
pub const DEFAULT_ENVIRONMENT: &str = "development";

/// Prefix of environment variables overriding file values
pub const ENV_PREFIX: &str = "KESTREL";

fn default_timeout() -> f64 {
    0.25
}

fn default_gets_per_server() -> u32 {
    100
}

fn default_exception_retry_limit() -> u32 {
    crate::retry::DEFAULT_EXCEPTION_RETRY_LIMIT
}

fn default_max_retries() -> u32 {
    100
}

fn default_error_rate() -> f64 {
    0.1
}

fn default_strict() -> bool {
    true
}

/// Connection and read behaviour of a [`Client`](crate::client::Client)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Servers as `host:port`
    #[serde(default)]
    pub servers: Vec<String>,

    /// Per-call I/O timeout in seconds. Half of it is the default server-side wait.
    #[serde(default = "default_timeout")]
    pub timeout: f64,

    /// Consecutive reads served by one server before re-randomizing
    #[serde(default = "default_gets_per_server")]
    pub gets_per_server: u32,

    /// Additional attempts for writes failing with a recoverable error
    #[serde(default = "default_exception_retry_limit")]
    pub exception_retry_limit: u32,

    /// Never ask the server to wait for items unless a read says so
    #[serde(default)]
    pub no_wait: bool,

    /// Seconds a server is skipped after a connection failure
    #[serde(default)]
    pub retry_timeout: f64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl ClientConfig {
    /// Default settings for `servers`
    pub fn new(servers: Vec<String>) -> Self {
        Self {
            servers,
            timeout: default_timeout(),
            gets_per_server: default_gets_per_server(),
            exception_retry_limit: default_exception_retry_limit(),
            no_wait: false,
            retry_timeout: 0.0,
        }
    }

    /// Server-side wait in milliseconds applied to reads without an explicit timeout
    pub fn default_get_timeout(&self) -> Option<u64> {
        if self.no_wait {
            None
        } else {
            Some((self.timeout / 2.0 * 1000.0) as u64)
        }
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout.max(0.0))
    }

    pub fn dead_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.retry_timeout.max(0.0))
    }

    /// Check the settings are usable
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.servers.is_empty() {
            return Err(ConfigurationError::Missing {
                key: "servers".to_string(),
            });
        }

        if !self.timeout.is_finite() || self.timeout < 0.0 {
            return Err(ConfigurationError::Invalid {
                message: format!("timeout must be a non-negative number, got {}", self.timeout),
            });
        }

        if !self.retry_timeout.is_finite() || self.retry_timeout < 0.0 {
            return Err(ConfigurationError::Invalid {
                message: format!(
                    "retry_timeout must be a non-negative number, got {}",
                    self.retry_timeout
                ),
            });
        }

        Ok(())
    }
}

/// Retry behaviour of the [`Transactional`](crate::transactional::Transactional) layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionalConfig {
    /// Attempts after which a failing job is abandoned
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Fraction of reads that try the error queue first
    #[serde(default = "default_error_rate")]
    pub error_rate: f64,

    /// Fail `retry()` without an open transaction instead of ignoring it
    #[serde(default = "default_strict")]
    pub strict: bool,
}

impl Default for TransactionalConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            error_rate: default_error_rate(),
            strict: default_strict(),
        }
    }
}

impl TransactionalConfig {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if !(0.0..=1.0).contains(&self.error_rate) {
            return Err(ConfigurationError::Invalid {
                message: format!("error_rate must be within [0, 1], got {}", self.error_rate),
            });
        }
        Ok(())
    }
}

/// A loaded configuration file with a selected environment
#[derive(Debug, Clone)]
pub struct ConfigSet {
    config: config::Config,
    environment: String,
}

impl ConfigSet {
    /// Load a YAML configuration file, applying `KESTREL__` overrides
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigurationError> {
        let config = config::Config::builder()
            .add_source(config::File::from(path.as_ref()).format(config::FileFormat::Yaml))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()
            .map_err(parsing_error)?;

        Ok(Self::from_config(config))
    }

    /// Parse configuration from YAML text
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigurationError> {
        let config = config::Config::builder()
            .add_source(config::File::from_str(yaml, config::FileFormat::Yaml))
            .build()
            .map_err(parsing_error)?;

        Ok(Self::from_config(config))
    }

    fn from_config(config: config::Config) -> Self {
        Self {
            config,
            environment: DEFAULT_ENVIRONMENT.to_string(),
        }
    }

    /// Select the environment sections are read from
    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Settings of the selected environment
    pub fn default_config(&self) -> Result<ClientConfig, ConfigurationError> {
        self.section(&self.environment)
    }

    /// Settings of the selected environment within `namespace`
    pub fn namespace(&self, namespace: &str) -> Result<ClientConfig, ConfigurationError> {
        self.section(&format!("{}.{}", namespace, self.environment))
    }

    /// TCP client for the selected environment
    pub fn new_client(&self) -> Result<Client, ConfigurationError> {
        Client::from_config(&self.default_config()?)
    }

    /// TCP client for the selected environment within `namespace`
    pub fn new_client_for(&self, namespace: &str) -> Result<Client, ConfigurationError> {
        Client::from_config(&self.namespace(namespace)?)
    }

    fn section(&self, key: &str) -> Result<ClientConfig, ConfigurationError> {
        let config: ClientConfig = self.config.get(key).map_err(|error| match error {
            config::ConfigError::NotFound(_) => ConfigurationError::Missing {
                key: key.to_string(),
            },
            other => parsing_error(other),
        })?;

        config.validate()?;
        Ok(config)
    }
}

fn parsing_error(error: config::ConfigError) -> ConfigurationError {
    ConfigurationError::Parsing {
        message: error.to_string(),
    }
}
