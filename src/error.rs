//! Top-level error type aggregating the per-area errors.

use thiserror::Error;

use crate::capacity::CapacityError;
use crate::config::ConfigurationError;
use crate::dispatcher::DispatcherError;
use crate::plugins::PluginError;
use crate::registry::RegistryError;
use crate::remote::RemoteError;

/// Any error the provisioning core can surface to its callers.
#[derive(Debug, Error)]
pub enum ProvisionerError {
    #[error(transparent)]
    Capacity(#[from] CapacityError),

    #[error(transparent)]
    Dispatch(#[from] DispatcherError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Plugin(#[from] PluginError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

pub type Result<T> = std::result::Result<T, ProvisionerError>;
