//! Logging and observability
//!
//! Structured logging shared by both binaries. The only difference between
//! them is the default filter directive when `RUST_LOG` is unset: `info` on
//! the host controller, `debug` in the in-container agent so its logs are
//! diagnostic-rich without extra flags.

use std::path::Path;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn env_filter(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive))
}

/// Initialize logging for the host CLI.
pub fn init() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(env_filter("info"))
        .init();
    tracing::info!("logging initialized");
    Ok(())
}

/// Initialize logging for the in-container agent, optionally also
/// appending to a per-workspace init log file.
pub fn init_agent(log_file: Option<&Path>) -> anyhow::Result<()> {
    let registry = tracing_subscriber::registry()
        .with(fmt::layer())
        .with(env_filter("debug"));

    match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
            registry
                .with(fmt::layer().with_writer(file).with_ansi(false))
                .init();
        }
        None => registry.init(),
    }
    tracing::info!("agent logging initialized");
    Ok(())
}
