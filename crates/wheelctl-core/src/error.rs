//! Error types for the controller core.

use std::time::Duration;

use thiserror::Error;
use wheelctl_protocol::ProtocolError;

/// Errors raised by a [`crate::Transport`].
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transport is not open")]
    NotOpen,

    #[error("transport is already open")]
    AlreadyOpen,

    #[error("device disconnected")]
    Disconnected,

    #[error("transport failed: {0}")]
    Failed(String),
}

/// Errors raised by [`crate::ConnectionLifecycle`].
#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("device did not become ready within {timeout:?}")]
    ConnectTimeout { timeout: Duration },

    #[error("device reported it is not ready")]
    DeviceNotReady,

    #[error("not connected")]
    NotConnected,

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Errors raised while loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Errors reported by an [`crate::ActionSink`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActionError {
    #[error("action not supported: {0}")]
    Unsupported(String),

    #[error("action failed: {0}")]
    Failed(String),
}

pub type Result<T> = std::result::Result<T, LifecycleError>;
