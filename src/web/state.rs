//! Shared state handed to every web handler.

use std::sync::Arc;

use crate::core::ProvisionerCore;

/// Application state for the web API.
#[derive(Clone)]
pub struct AppState {
    pub core: Arc<ProvisionerCore>,
}

impl AppState {
    pub fn new(core: Arc<ProvisionerCore>) -> Self {
        Self { core }
    }
}
