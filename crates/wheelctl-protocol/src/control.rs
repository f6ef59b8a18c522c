//! Device-bound control sequences.
//!
//! The host talks to the controller with bracketed ASCII text:
//! `<COMMAND:DATA>`, or `<COMMAND>` when there is no data.

use std::fmt;

use crate::constants::{
    COMMAND_DELIMITER, CONTROL_CLOSE, CONTROL_OPEN, CONTROL_START, CONTROL_STOP,
};
use crate::error::{ProtocolError, ProtocolResult};

/// A validated control sequence ready to be written to the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlSequence {
    command: String,
    data: String,
}

impl ControlSequence {
    /// Build a control sequence, rejecting text that would break the bracketing.
    pub fn new(command: impl Into<String>, data: impl Into<String>) -> ProtocolResult<Self> {
        let command = command.into();
        let data = data.into();

        if command.is_empty() {
            return Err(ProtocolError::InvalidControl("empty command".to_string()));
        }
        if command.contains(&[CONTROL_OPEN, CONTROL_CLOSE, COMMAND_DELIMITER][..]) {
            return Err(ProtocolError::InvalidControl(format!(
                "command {:?} contains a reserved character",
                command
            )));
        }
        if data.contains(&[CONTROL_OPEN, CONTROL_CLOSE][..]) {
            return Err(ProtocolError::InvalidControl(format!(
                "data {:?} contains a bracket",
                data
            )));
        }

        Ok(ControlSequence { command, data })
    }

    /// `<START>`: begin reporting input.
    pub fn start() -> Self {
        ControlSequence {
            command: CONTROL_START.to_string(),
            data: String::new(),
        }
    }

    /// `<STOP>`: stop reporting input.
    pub fn stop() -> Self {
        ControlSequence {
            command: CONTROL_STOP.to_string(),
            data: String::new(),
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn data(&self) -> &str {
        &self.data
    }

    /// Encode to the bytes written on the wire.
    pub fn encode(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }
}

impl fmt::Display for ControlSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.data.is_empty() {
            write!(f, "{}{}{}", CONTROL_OPEN, self.command, CONTROL_CLOSE)
        } else {
            write!(
                f,
                "{}{}{}{}{}",
                CONTROL_OPEN, self.command, COMMAND_DELIMITER, self.data, CONTROL_CLOSE
            )
        }
    }
}
