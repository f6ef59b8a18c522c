//! Logging initialisation.
//!
//! Core logs through `tracing`, the protocol crate through `log`; the
//! subscriber installed here also captures `log` records.

use tracing_subscriber::EnvFilter;

use crate::error::{Result, RunnerError};

const DEFAULT_FILTER: &str = "info";

/// Filter from `--log-level`, else `RUST_LOG`, else `info`.
pub fn build_filter(level: Option<&str>) -> Result<EnvFilter> {
    match level {
        Some(level) => Ok(EnvFilter::try_new(level)?),
        None => Ok(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))),
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(level: Option<&str>) -> Result<()> {
    let filter = build_filter(level)?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| RunnerError::Logging(e.to_string()))
}
