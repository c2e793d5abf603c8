//! # Configuration System
//!
//! YAML-based configuration with environment overlays: a base
//! `provisioner.yaml` merged with an optional `provisioner.<env>.yaml`.
//! Loaded once at process start and immutable for the process lifetime.
//!
//! ```rust,no_run
//! use provisioner_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let port = manager.config().server.port;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::plugins::host_pool::PooledHost;
use crate::remote::RetryPolicy;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration structure mirroring `provisioner.yaml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionerConfig {
    /// Web API bind settings
    pub server: ServerConfig,

    /// Log level and destinations
    pub logging: LoggingConfig,

    /// Remote execution engine retry knobs
    pub remote: RemoteConfig,

    /// Host-pool provider plugin settings
    pub host_pool: HostPoolSettings,

    /// Shell automator plugin settings
    pub automator: AutomatorSettings,
}

impl ProvisionerConfig {
    /// Validate the loaded configuration; no silent fallbacks past this
    /// point.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.server.port == 0 {
            return Err(ConfigurationError::invalid_value(
                "server.port",
                self.server.port.to_string(),
                "port must be non-zero",
            ));
        }
        if self.remote.retry_delay_secs == 0 {
            return Err(ConfigurationError::invalid_value(
                "remote.retry_delay_secs",
                self.remote.retry_delay_secs.to_string(),
                "retry delay must be non-zero",
            ));
        }
        if self.remote.retry_bound_secs < self.remote.retry_delay_secs {
            return Err(ConfigurationError::invalid_value(
                "remote.retry_bound_secs",
                self.remote.retry_bound_secs.to_string(),
                "retry bound must be at least the retry delay",
            ));
        }
        if !matches!(
            self.logging.level.as_str(),
            "trace" | "debug" | "info" | "warn" | "error"
        ) {
            return Err(ConfigurationError::invalid_value(
                "logging.level",
                self.logging.level.clone(),
                "expected one of trace, debug, info, warn, error",
            ));
        }
        Ok(())
    }

    /// Address the web API binds to.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.bind_address, self.server.port)
    }
}

/// Web server bind settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: constants::server::BIND_ADDRESS.to_string(),
            port: constants::server::PORT,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// trace | debug | info | warn | error
    pub level: String,
    /// When set, a JSON log file is written under this directory in
    /// addition to console output.
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: None,
        }
    }
}

/// Remote execution engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Per-attempt SSH connect timeout
    pub connect_timeout_secs: u64,
    /// Fixed delay between transient-connection retries
    pub retry_delay_secs: u64,
    /// Overall bound on waiting for a host to become reachable
    pub retry_bound_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: constants::remote::CONNECT_TIMEOUT_SECS,
            retry_delay_secs: constants::remote::RETRY_DELAY_SECS,
            retry_bound_secs: constants::remote::RETRY_BOUND_SECS,
        }
    }
}

impl RemoteConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            Duration::from_secs(self.retry_delay_secs),
            Duration::from_secs(self.retry_bound_secs),
        )
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Host-pool provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostPoolSettings {
    /// Machines the provider may claim
    pub hosts: Vec<PooledHost>,
    /// Connectivity probe run inside the instance during confirm
    pub probe_command: String,
}

impl Default for HostPoolSettings {
    fn default() -> Self {
        Self {
            hosts: Vec::new(),
            probe_command: "ping -c 1 -W 5 8.8.8.8".to_string(),
        }
    }
}

/// Shell automator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutomatorSettings {
    /// Cache directory staged on target nodes
    pub cache_dir: String,
}

impl Default for AutomatorSettings {
    fn default() -> Self {
        Self {
            cache_dir: constants::automator::REMOTE_CACHE_DIR.to_string(),
        }
    }
}
