//! Tracing subscriber setup.

use std::io;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::cli::LogLevel;

/// Installs the global subscriber. `RUST_LOG`, when set, overrides `level`.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init(level: LogLevel, json: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(level.filter().into())
        .from_env_lossy();

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(io::stderr))
            .try_init()?;
    } else {
        registry.with(fmt::layer().with_writer(io::stderr)).try_init()?;
    }
    Ok(())
}
