//! Error types for the runner.

use thiserror::Error;
use wheelctl_core::ConfigError;

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid log filter: {0}")]
    LogFilter(#[from] tracing_subscriber::filter::ParseError),

    #[error("failed to initialise logging: {0}")]
    Logging(String),

    #[error("failed to start metrics exporter: {0}")]
    Metrics(String),

    #[error("failed to install Ctrl-C handler: {0}")]
    Signal(#[from] ctrlc::Error),
}

pub type Result<T> = std::result::Result<T, RunnerError>;
