//! Registry routing tasks to provider and automator plugin instances.
//!
//! Plugins are registered once at process start and the registry is
//! read-only afterwards, so resolution is a pure lookup with no locking and
//! no I/O. Resolution fails when the name is unknown or when the registered
//! plugin does not declare the requested operation as a capability; both are
//! programming-level errors that propagate to the caller (the worker, which
//! converts them into a failed task result).

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::models::TaskOperation;
use crate::plugins::{AutomatorPlugin, PluginKind, ProviderPlugin};

/// Plugin resolution errors.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("{kind} plugin '{name}' is not registered")]
    PluginNotFound { kind: PluginKind, name: String },

    #[error("{kind} plugin '{name}' does not support operation '{operation}'")]
    UnsupportedOperation {
        kind: PluginKind,
        name: String,
        operation: TaskOperation,
    },
}

/// Registry of provider and automator plugins, keyed by name.
#[derive(Default)]
pub struct PluginRegistry {
    providers: HashMap<String, Arc<dyn ProviderPlugin>>,
    automators: HashMap<String, Arc<dyn AutomatorPlugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider plugin under its declared name. Later
    /// registrations with the same name replace earlier ones.
    pub fn register_provider(&mut self, plugin: Arc<dyn ProviderPlugin>) {
        let name = plugin.name().to_string();
        info!(plugin = %name, kind = %PluginKind::Provider, "registered plugin");
        self.providers.insert(name, plugin);
    }

    /// Register an automator plugin under its declared name.
    pub fn register_automator(&mut self, plugin: Arc<dyn AutomatorPlugin>) {
        let name = plugin.name().to_string();
        info!(plugin = %name, kind = %PluginKind::Automator, "registered plugin");
        self.automators.insert(name, plugin);
    }

    /// Resolve the provider plugin for `(name, operation)`.
    pub fn resolve_provider(
        &self,
        name: &str,
        operation: TaskOperation,
    ) -> Result<Arc<dyn ProviderPlugin>, RegistryError> {
        let plugin = self
            .providers
            .get(name)
            .ok_or_else(|| RegistryError::PluginNotFound {
                kind: PluginKind::Provider,
                name: name.to_string(),
            })?;

        if !plugin.capabilities().contains(&operation) {
            return Err(RegistryError::UnsupportedOperation {
                kind: PluginKind::Provider,
                name: name.to_string(),
                operation,
            });
        }

        Ok(plugin.clone())
    }

    /// Resolve the automator plugin for `(name, operation)`.
    pub fn resolve_automator(
        &self,
        name: &str,
        operation: TaskOperation,
    ) -> Result<Arc<dyn AutomatorPlugin>, RegistryError> {
        let plugin = self
            .automators
            .get(name)
            .ok_or_else(|| RegistryError::PluginNotFound {
                kind: PluginKind::Automator,
                name: name.to_string(),
            })?;

        if !plugin.capabilities().contains(&operation) {
            return Err(RegistryError::UnsupportedOperation {
                kind: PluginKind::Automator,
                name: name.to_string(),
                operation,
            });
        }

        Ok(plugin.clone())
    }

    /// Registered plugin names by kind.
    pub fn provider_names(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }

    pub fn automator_names(&self) -> Vec<String> {
        self.automators.keys().cloned().collect()
    }

    pub fn stats(&self) -> PluginStats {
        PluginStats {
            providers: self.providers.len(),
            automators: self.automators.len(),
        }
    }
}

/// Counts of registered plugins.
#[derive(Debug, Clone, Copy, Default)]
pub struct PluginStats {
    pub providers: usize,
    pub automators: usize,
}
