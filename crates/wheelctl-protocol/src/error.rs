//! Protocol error types.

use thiserror::Error;

/// Errors that can occur when working with the controller protocol.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Payload does not fit in the single length byte.
    #[error("payload too long: maximum {max} bytes, got {actual}")]
    PayloadTooLong {
        /// Maximum allowed length.
        max: usize,
        /// Actual length supplied.
        actual: usize,
    },

    /// Payload must contain exactly one delimiter.
    #[error("expected exactly one ':' delimiter, found {count} in {text:?}")]
    DelimiterCount {
        /// Number of delimiters found.
        count: usize,
        /// The offending payload text.
        text: String,
    },

    /// Command name before the delimiter is empty.
    #[error("empty command name in {0:?}")]
    EmptyCommand(String),

    /// Data after the delimiter is empty.
    #[error("empty command data in {0:?}")]
    EmptyData(String),

    /// Frame payload is not valid UTF-8 text.
    #[error("invalid UTF-8 in frame payload")]
    InvalidUtf8,

    /// Control sequence cannot be represented on the wire.
    #[error("invalid control sequence: {0}")]
    InvalidControl(String),
}

/// Result type alias for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;
