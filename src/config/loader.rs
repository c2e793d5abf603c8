//! Configuration Loader
//!
//! Environment-aware configuration loading: discovers the base
//! `provisioner.yaml`, merges the `provisioner.<env>.yaml` overlay on top,
//! validates the result, and keeps it immutable for the process lifetime.

use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_yaml::Value as YamlValue;
use tracing::{debug, warn};

use super::error::{ConfigResult, ConfigurationError};
use super::ProvisionerConfig;

const BASE_FILE: &str = "provisioner.yaml";

/// Loaded configuration plus the environment it was resolved for.
pub struct ConfigManager {
    config: ProvisionerConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection.
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory.
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with an explicit
    /// environment. Useful for tests that must not touch global env vars.
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(Self::default_config_directory);

        debug!(
            environment,
            directory = %config_directory.display(),
            "loading configuration"
        );

        let config = Self::load_and_merge(&config_directory, environment)?;
        config.validate()?;

        debug!(
            config = %serde_json::to_string(&Self::sanitize_for_logging(&config))
                .unwrap_or_else(|_| "[serialization error]".to_string()),
            "configuration loaded"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    /// A manager carrying pure defaults; used when no config directory is
    /// present at all.
    pub fn with_defaults() -> Arc<ConfigManager> {
        Arc::new(ConfigManager {
            config: ProvisionerConfig::default(),
            environment: Self::detect_environment(),
            config_directory: Self::default_config_directory(),
        })
    }

    pub fn config(&self) -> &ProvisionerConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// Sanitized configuration for debugging that masks sensitive fields.
    pub fn debug_config(&self) -> serde_json::Value {
        Self::sanitize_for_logging(&self.config)
    }

    fn detect_environment() -> String {
        env::var("PROVISIONER_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
    }

    fn default_config_directory() -> PathBuf {
        PathBuf::from("config")
    }

    fn load_and_merge(directory: &Path, environment: &str) -> ConfigResult<ProvisionerConfig> {
        let base_path = directory.join(BASE_FILE);
        if !base_path.exists() {
            warn!(
                path = %base_path.display(),
                "no base configuration file, using defaults"
            );
            return Ok(ProvisionerConfig::default());
        }

        let mut merged = Self::read_yaml(&base_path)?;

        let overlay_path = directory.join(format!("provisioner.{environment}.yaml"));
        if overlay_path.exists() {
            let overlay = Self::read_yaml(&overlay_path)?;
            merge_yaml(&mut merged, overlay);
            debug!(path = %overlay_path.display(), "environment overlay applied");
        }

        serde_yaml::from_value(merged).map_err(|source| ConfigurationError::Parse {
            path: base_path,
            source,
        })
    }

    fn read_yaml(path: &Path) -> ConfigResult<YamlValue> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigurationError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&raw).map_err(|source| ConfigurationError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn sanitize_for_logging(config: &ProvisionerConfig) -> serde_json::Value {
        let mut value = serde_json::to_value(config).unwrap_or(serde_json::Value::Null);
        mask_secrets(&mut value);
        value
    }
}

/// Deep-merge `overlay` into `base`; overlay scalars and sequences win,
/// mappings merge key by key.
fn merge_yaml(base: &mut YamlValue, overlay: YamlValue) {
    match (base, overlay) {
        (YamlValue::Mapping(base_map), YamlValue::Mapping(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(base_value) => merge_yaml(base_value, overlay_value),
                    None => {
                        base_map.insert(key, overlay_value);
                    }
                }
            }
        }
        (base_slot, overlay_value) => *base_slot = overlay_value,
    }
}

/// Mask credential material wherever it appears in the tree.
fn mask_secrets(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                if matches!(key.as_str(), "password" | "private_key") && !child.is_null() {
                    *child = serde_json::Value::String("[redacted]".to_string());
                } else {
                    mask_secrets(child);
                }
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                mask_secrets(item);
            }
        }
        _ => {}
    }
}
