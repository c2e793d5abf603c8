//! # Structured Logging Module
//!
//! tracing-based logging with console output and an optional JSON file
//! layer, initialized once per process.

use std::sync::OnceLock;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::LoggingConfig;

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging from the loaded configuration.
///
/// `RUST_LOG` overrides the configured level when set. Safe to call more
/// than once; only the first call installs a subscriber.
pub fn init_structured_logging(config: &LoggingConfig) {
    let level = config.level.clone();
    let directory = config.directory.clone();

    LOGGER_INITIALIZED.get_or_init(|| {
        let env_filter = || {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.clone()))
        };

        let console_layer = fmt::layer()
            .with_target(true)
            .with_level(true)
            .with_filter(env_filter());

        let file_layer = directory.as_ref().map(|dir| {
            let appender = tracing_appender::rolling::daily(dir, "provisioner.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            // the guard must live as long as the process for the writer to
            // keep flushing
            std::mem::forget(guard);
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .json()
                .with_filter(env_filter())
        });

        let subscriber = tracing_subscriber::registry()
            .with(console_layer)
            .with(file_layer);

        if subscriber.try_init().is_err() {
            // a global subscriber is already installed (tests, embedding
            // applications); keep using it
            tracing::debug!("global tracing subscriber already initialized");
        }
    });
}
