//! Commands decoded from frame payloads.
//!
//! A payload is ASCII text of the form `COMMAND:DATA` with exactly one
//! delimiter. The `LOG` command carries diagnostic text from the device.

use std::fmt;

use crate::constants::{
    CLICK_COMMAND, COMMAND_DELIMITER, DIMMER_COMMAND, HOLD_COMMAND, LOG_COMMAND,
    RELEASE_COMMAND, REVERSE_COMMAND, STARTED_COMMAND, STATE_OFF, STATE_ON,
};
use crate::error::{ProtocolError, ProtocolResult};
use crate::frame::Frame;

/// Classification of an inbound command name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// Diagnostic text (`LOG`, upper case only).
    Log,
    /// Button pressed (`click`).
    Click,
    /// Button held down (`hold`).
    Hold,
    /// Held button let go (`release`).
    Release,
    /// Dimmer line toggled or analog level (`dimmer`).
    Dimmer,
    /// Reverse gear signal (`reverse`).
    Reverse,
    /// Device started; data is the device id (`started`).
    Started,
    /// Any other command name.
    Other(String),
}

impl CommandKind {
    /// Classify a command name. Matching is case-insensitive except for `LOG`.
    pub fn from_name(name: &str) -> Self {
        if name == LOG_COMMAND {
            return CommandKind::Log;
        }
        let known = [
            (CLICK_COMMAND, CommandKind::Click),
            (HOLD_COMMAND, CommandKind::Hold),
            (RELEASE_COMMAND, CommandKind::Release),
            (DIMMER_COMMAND, CommandKind::Dimmer),
            (REVERSE_COMMAND, CommandKind::Reverse),
            (STARTED_COMMAND, CommandKind::Started),
        ];
        known
            .into_iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, kind)| kind)
            .unwrap_or_else(|| CommandKind::Other(name.to_string()))
    }
}

/// A parsed `(name, data)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    name: String,
    data: String,
    kind: CommandKind,
}

impl Command {
    /// Build a command from its parts.
    pub fn new(name: impl Into<String>, data: impl Into<String>) -> Self {
        let name = name.into();
        let kind = CommandKind::from_name(&name);
        Command {
            name,
            data: data.into(),
            kind,
        }
    }

    /// Parse `COMMAND:DATA` text.
    pub fn parse(text: &str) -> ProtocolResult<Self> {
        let count = text.matches(COMMAND_DELIMITER).count();
        if count != 1 {
            return Err(ProtocolError::DelimiterCount {
                count,
                text: text.to_string(),
            });
        }
        let (name, data) = text
            .split_once(COMMAND_DELIMITER)
            .ok_or_else(|| ProtocolError::DelimiterCount {
                count,
                text: text.to_string(),
            })?;
        if name.is_empty() {
            return Err(ProtocolError::EmptyCommand(text.to_string()));
        }
        if data.is_empty() {
            return Err(ProtocolError::EmptyData(text.to_string()));
        }
        Ok(Command::new(name, data))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &str {
        &self.data
    }

    pub fn kind(&self) -> &CommandKind {
        &self.kind
    }

    /// The data field as a decimal reading (`00100` → 100).
    pub fn reading(&self) -> Option<i32> {
        self.data.trim().parse().ok()
    }

    /// The data field as an `on`/`off` switch state.
    pub fn switch_state(&self) -> Option<bool> {
        let data = self.data.trim();
        if data.eq_ignore_ascii_case(STATE_ON) {
            Some(true)
        } else if data.eq_ignore_ascii_case(STATE_OFF) {
            Some(false)
        } else {
            None
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.name, COMMAND_DELIMITER, self.data)
    }
}

/// A frame payload after parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedFrame {
    /// A command for dispatch.
    Command(Command),
    /// Diagnostic text from the device, for logging only.
    DeviceLog(String),
}

/// Parse payload text, separating device log lines from commands.
pub fn parse_payload(text: &str) -> ProtocolResult<ParsedFrame> {
    let command = Command::parse(text)?;
    if command.kind == CommandKind::Log {
        return Ok(ParsedFrame::DeviceLog(command.data));
    }
    Ok(ParsedFrame::Command(command))
}

/// Parse a decoded frame.
pub fn parse_frame(frame: &Frame) -> ProtocolResult<ParsedFrame> {
    let text = std::str::from_utf8(frame.payload()).map_err(|_| ProtocolError::InvalidUtf8)?;
    parse_payload(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_click() {
        let cmd = Command::parse("click:00100").expect("should parse");
        assert_eq!(cmd.name(), "click");
        assert_eq!(cmd.data(), "00100");
        assert_eq!(cmd.kind(), &CommandKind::Click);
        assert_eq!(cmd.reading(), Some(100));
    }

    #[test]
    fn test_parse_log_routes_to_device_log() {
        let parsed = parse_payload("LOG:sensor calibration ok").expect("should parse");
        assert_eq!(
            parsed,
            ParsedFrame::DeviceLog("sensor calibration ok".to_string())
        );
    }

    #[test]
    fn test_lowercase_log_is_not_device_log() {
        let parsed = parse_payload("log:text").expect("should parse");
        match parsed {
            ParsedFrame::Command(cmd) => {
                assert_eq!(cmd.kind(), &CommandKind::Other("log".to_string()))
            }
            ParsedFrame::DeviceLog(_) => panic!("lower case log must not be a device log"),
        }
    }

    #[test]
    fn test_two_delimiters_rejected() {
        let err = Command::parse("click:00:10").expect_err("should reject");
        assert_eq!(
            err,
            ProtocolError::DelimiterCount {
                count: 2,
                text: "click:00:10".to_string()
            }
        );
    }

    #[test]
    fn test_no_delimiter_rejected() {
        assert!(matches!(
            Command::parse("click00100"),
            Err(ProtocolError::DelimiterCount { count: 0, .. })
        ));
    }

    #[test]
    fn test_empty_name_or_data_rejected() {
        assert!(matches!(
            Command::parse(":00100"),
            Err(ProtocolError::EmptyCommand(_))
        ));
        assert_eq!(
            Command::parse("click:"),
            Err(ProtocolError::EmptyData("click:".to_string()))
        );
        let cmd = Command::parse("started: ").expect("should parse");
        assert_eq!(cmd.kind(), &CommandKind::Started);
    }

    #[test]
    fn test_kind_case_insensitive() {
        assert_eq!(CommandKind::from_name("HOLD"), CommandKind::Hold);
        assert_eq!(CommandKind::from_name("Release"), CommandKind::Release);
        assert_eq!(CommandKind::from_name("dimmer"), CommandKind::Dimmer);
        assert_eq!(CommandKind::from_name("REVERSE"), CommandKind::Reverse);
        assert_eq!(
            CommandKind::from_name("battery"),
            CommandKind::Other("battery".to_string())
        );
    }

    #[test]
    fn test_reading_and_switch_state() {
        assert_eq!(Command::new("dimmer", " 0512 ").reading(), Some(512));
        assert_eq!(Command::new("dimmer", "on").reading(), None);
        assert_eq!(Command::new("dimmer", "ON").switch_state(), Some(true));
        assert_eq!(Command::new("reverse", "off").switch_state(), Some(false));
        assert_eq!(Command::new("reverse", "maybe").switch_state(), None);
    }

    #[test]
    fn test_parse_frame_invalid_utf8() {
        let frame = Frame::new(vec![0xFF, b':', 0xFE]);
        assert_eq!(parse_frame(&frame), Err(ProtocolError::InvalidUtf8));
    }

    #[test]
    fn test_display_round_trips_text() {
        let cmd = Command::parse("hold:00050").expect("should parse");
        assert_eq!(cmd.to_string(), "hold:00050");
    }
}
