//! Provisioner server binary: loads configuration, wires the core with the
//! in-tree plugins, and serves the REST API until the process is told to
//! stop. Shutdown is graceful: in-flight provisioning tasks always run to
//! completion before the process exits.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use provisioner_core::config::ConfigManager;
use provisioner_core::core::ProvisionerCore;
use provisioner_core::logging;
use provisioner_core::web;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_dir = std::env::args().nth(1).map(PathBuf::from);

    let manager = match ConfigManager::load_from_directory(config_dir) {
        Ok(manager) => manager,
        Err(error) => {
            eprintln!("configuration error: {error}; continuing with defaults");
            ConfigManager::with_defaults()
        }
    };
    let config = manager.config().clone();

    logging::init_structured_logging(&config.logging);
    info!(
        environment = manager.environment(),
        version = provisioner_core::constants::system::VERSION,
        "starting provisioner"
    );

    let registry = ProvisionerCore::standard_registry(&config);
    let core = ProvisionerCore::new(config.clone(), registry);

    let bind_address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("failed to bind {bind_address}"))?;
    info!(%bind_address, "web API listening");

    let app = web::router(core.clone());
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(core.clone()))
        .await
        .context("web server failed")?;

    info!("provisioner stopped");
    Ok(())
}

/// Wait for SIGTERM/ctrl-c, then drain the worker pool before letting the
/// server exit.
async fn shutdown_signal(core: Arc<ProvisionerCore>) {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            warn!(%error, "failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => warn!(%error, "failed to listen for SIGTERM"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("termination signal received, draining workers");
    core.shutdown().await;
}
