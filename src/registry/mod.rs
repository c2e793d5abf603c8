//! # Plugin Registry
//!
//! Maps plugin names to provider/automator instances and validates declared
//! capabilities at resolution time.

pub mod plugin_registry;

pub use plugin_registry::{PluginRegistry, PluginStats, RegistryError};
