// Logging module - Logging infrastructure
use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter directive for `level`, e.g. `comterm=warn`.
pub fn default_directive(level: &str) -> String {
    format!("comterm={}", level)
}

/// Initialize logging system
///
/// `RUST_LOG` wins over `level`. Diagnostics go to `trace_file` when given,
/// otherwise to stderr, which shares the terminal with the session.
pub fn init_logging(level: &str, trace_file: Option<&Path>) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive(level)))
        .with_context(|| format!("Invalid log level '{}'", level))?;

    let layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_level(true)
        .with_thread_names(true);

    match trace_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open trace file {}", path.display()))?;
            tracing_subscriber::registry()
                .with(env_filter)
                .with(layer.with_ansi(false).with_writer(Mutex::new(file)))
                .try_init()
                .context("Logging already initialized")?;
        }
        None => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(layer.with_writer(io::stderr))
                .try_init()
                .context("Logging already initialized")?;
        }
    }

    tracing::debug!("ComTerm logging system initialized");
    Ok(())
}
