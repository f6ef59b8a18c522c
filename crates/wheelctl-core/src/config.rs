//! Configuration types.
//!
//! The bridge reads a single YAML file:
//!
//! ```yaml
//! transport:
//!   type: tcp
//!   address: 127.0.0.1:7000
//! controller:
//!   connect_timeout_ms: 30000
//!   learning_mode: false
//! buttons:
//!   - id: 100
//!     tolerance: 10
//!     clickType: Builtin
//!     clickAction: Next
//!     holdType: Builtin
//!     holdAction: Volume Up
//! dimmer:
//!   mode: analog
//!   high_reading: 900
//!   low_reading: 100
//!   high_brightness: 255
//!   low_brightness: 10
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::buttons::ButtonMap;
use crate::dimmer::DimmerConfig;
use crate::error::ConfigError;

fn default_connect_timeout_ms() -> u64 {
    30_000
}

fn default_stop_grace_ms() -> u64 {
    500
}

fn default_repeat_interval_ms() -> u64 {
    500
}

fn default_event_buffer() -> usize {
    256
}

/// Tuning for [`crate::ConnectionLifecycle`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// How long `connect()` waits for the device to become ready.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Pause between sending `<STOP>` and closing the transport.
    #[serde(default = "default_stop_grace_ms")]
    pub stop_grace_ms: u64,
    /// Cadence of repeating hold actions.
    #[serde(default = "default_repeat_interval_ms")]
    pub repeat_interval_ms: u64,
    /// Capacity of the controller event channel.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
    /// Start in learning mode instead of executing actions.
    #[serde(default)]
    pub learning_mode: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            stop_grace_ms: default_stop_grace_ms(),
            repeat_interval_ms: default_repeat_interval_ms(),
            event_buffer: default_event_buffer(),
            learning_mode: false,
        }
    }
}

impl ControllerConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }

    pub fn repeat_interval(&self) -> Duration {
        Duration::from_millis(self.repeat_interval_ms)
    }

    /// Reject values that would make the controller unusable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.repeat_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "repeat_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.event_buffer == 0 {
            return Err(ConfigError::Invalid(
                "event_buffer must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Where the controller's serial stream is reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransportConfig {
    /// A serial port exposed over TCP (ser2net or a simulator UART port).
    Tcp { address: String },
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig::Tcp {
            address: "127.0.0.1:7000".to_string(),
        }
    }
}

/// Top-level bridge configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub controller: ControllerConfig,
    #[serde(default)]
    pub buttons: ButtonMap,
    #[serde(default)]
    pub dimmer: DimmerConfig,
}

impl BridgeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.controller.validate()
    }
}

/// Parse a bridge configuration from YAML text.
pub fn parse_config(yaml: &str) -> Result<BridgeConfig, ConfigError> {
    let config: BridgeConfig = serde_yaml::from_str(yaml)?;
    config.validate()?;
    Ok(config)
}

/// Load a bridge configuration from a YAML file.
pub fn load_config(path: impl AsRef<Path>) -> Result<BridgeConfig, ConfigError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_config(&text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buttons::ActionKind;
    use crate::dimmer::DimmerMode;

    #[test]
    fn test_controller_defaults() {
        let config = ControllerConfig::default();
        assert_eq!(config.connect_timeout(), Duration::from_secs(30));
        assert_eq!(config.stop_grace(), Duration::from_millis(500));
        assert_eq!(config.repeat_interval(), Duration::from_millis(500));
        assert_eq!(config.event_buffer, 256);
        assert!(!config.learning_mode);
    }

    #[test]
    fn test_parse_empty_config() {
        let config = parse_config("{}").expect("should parse empty config");
        assert_eq!(config, BridgeConfig::default());
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
transport:
  type: tcp
  address: 10.0.0.5:4001
controller:
  connect_timeout_ms: 5000
  learning_mode: true
buttons:
  - id: 100
    tolerance: 10
    clickType: Builtin
    clickAction: Next
    holdType: Builtin
    holdAction: Volume Up
  - id: 400
    tolerance: 2
    multiplied: true
    clickType: Application
    clickAction: com.example.maps
dimmer:
  mode: analog
  high_reading: 900
  low_reading: 100
  high_brightness: 255
  low_brightness: 10
"#;
        let config = parse_config(yaml).expect("should parse config");
        assert_eq!(
            config.transport,
            TransportConfig::Tcp {
                address: "10.0.0.5:4001".to_string()
            }
        );
        assert_eq!(config.controller.connect_timeout_ms, 5000);
        assert_eq!(config.controller.stop_grace_ms, 500);
        assert!(config.controller.learning_mode);
        assert_eq!(config.buttons.len(), 2);
        let second = &config.buttons.bindings()[1];
        assert!(second.multiplied);
        assert_eq!(second.click_type, ActionKind::Application);
        assert_eq!(second.hold_type, ActionKind::None);
        assert_eq!(config.dimmer.mode, DimmerMode::Analog);
    }

    #[test]
    fn test_invalid_controller_rejected() {
        let err = parse_config("controller:\n  repeat_interval_ms: 0\n").expect_err("should reject");
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_config("/nonexistent/wheelctl.yaml").expect_err("should fail");
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
