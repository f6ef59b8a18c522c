//! Headlight dimmer handling.
//!
//! The controller reports the dimmer line either as a switch (`dimmer:on`,
//! `dimmer:off`) or, when wired to the dash illumination rheostat, as an
//! analog reading (`dimmer:0512`). How those translate into brightness
//! actions depends on the configured [`DimmerMode`].

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::actions::{ActionInvocation, Trigger, DIMMER_LEVEL, DIMMER_OFF, DIMMER_ON};

/// Argument passed to the dimmer actions in auto-brightness mode.
pub const AUTO_BRIGHTNESS_ARGUMENT: &str = "auto";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DimmerMode {
    /// Dimmer input is ignored.
    #[default]
    None,
    /// Dimmer toggles the host's automatic brightness.
    AutoBrightness,
    /// Dimmer on switches to a fixed brightness.
    Digital,
    /// Dimmer readings are scaled into a brightness range.
    Analog,
}

/// Dimmer calibration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DimmerConfig {
    pub mode: DimmerMode,
    pub high_reading: i32,
    pub low_reading: i32,
    pub high_brightness: i32,
    pub low_brightness: i32,
    /// Brightness restored when the dimmer switches off.
    pub initial_brightness: i32,
}

impl DimmerConfig {
    /// Whether the current mode has the calibration it needs.
    pub fn is_calibrated(&self) -> bool {
        match self.mode {
            DimmerMode::None => false,
            DimmerMode::AutoBrightness => true,
            DimmerMode::Digital => self.high_brightness > 0,
            DimmerMode::Analog => {
                self.high_reading > 0
                    && self.low_reading > 0
                    && self.high_brightness > 0
                    && self.low_brightness > 0
                    && self.high_reading > self.low_reading
            }
        }
    }

    /// Brightness for an analog reading, or `None` outside a calibrated analog mode.
    ///
    /// The reading is clamped into `[low_reading + 1, high_reading]` and scaled
    /// linearly onto `[low_brightness, high_brightness]`.
    pub fn level_for(&self, reading: i32) -> Option<i32> {
        if self.mode != DimmerMode::Analog || !self.is_calibrated() {
            return None;
        }
        let reading_diff = (self.high_reading - self.low_reading) as i64;
        let bright_diff = (self.high_brightness - self.low_brightness) as f64;
        let offset = (reading as i64 - self.low_reading as i64).clamp(1, reading_diff);
        let coefficient = offset as f64 / reading_diff as f64;
        Some((coefficient * bright_diff).round() as i32 + self.low_brightness)
    }

    /// Action for a dimmer switch change, or `None` when the mode ignores it.
    pub fn toggle_invocation(&self, on: bool) -> Option<ActionInvocation> {
        if !self.is_calibrated() {
            return None;
        }
        let name = if on { DIMMER_ON } else { DIMMER_OFF };
        let invocation = ActionInvocation::new(name, Trigger::Device);
        let invocation = match (self.mode, on) {
            (DimmerMode::None, _) => return None,
            (DimmerMode::AutoBrightness, _) => invocation.with_argument(AUTO_BRIGHTNESS_ARGUMENT),
            (DimmerMode::Digital, true) => {
                invocation.with_argument(self.high_brightness.to_string())
            }
            (DimmerMode::Analog, true) => invocation,
            (DimmerMode::Digital | DimmerMode::Analog, false) => {
                invocation.with_argument(self.initial_brightness.to_string())
            }
        };
        Some(invocation)
    }
}

#[derive(Debug)]
struct DimmerState {
    config: DimmerConfig,
    on: bool,
}

/// Applies dimmer commands against the current configuration.
#[derive(Debug)]
pub struct DimmerController {
    state: Mutex<DimmerState>,
}

impl DimmerController {
    pub fn new(config: DimmerConfig) -> Self {
        if config.mode != DimmerMode::None && !config.is_calibrated() {
            info!("DimmerController: {:?} mode is not calibrated", config.mode);
        }
        DimmerController {
            state: Mutex::new(DimmerState { config, on: false }),
        }
    }

    pub fn config(&self) -> DimmerConfig {
        self.state.lock().config.clone()
    }

    pub fn is_on(&self) -> bool {
        self.state.lock().on
    }

    /// Replace the calibration. The on/off state is kept.
    pub fn update(&self, config: DimmerConfig) {
        debug!("DimmerController: mode set to {:?}", config.mode);
        self.state.lock().config = config;
    }

    /// Handle `dimmer:on` / `dimmer:off`. A repeat of the current state is ignored.
    pub fn toggle(&self, on: bool) -> Option<ActionInvocation> {
        let mut state = self.state.lock();
        if state.on == on {
            debug!(
                "DimmerController: dimmer already {}",
                if on { "on" } else { "off" }
            );
            return None;
        }
        state.on = on;
        state.config.toggle_invocation(on)
    }

    /// Handle an analog dimmer reading.
    pub fn level(&self, reading: i32) -> Option<ActionInvocation> {
        let state = self.state.lock();
        let brightness = state.config.level_for(reading)?;
        debug!(
            "DimmerController: reading {} -> brightness {}",
            reading, brightness
        );
        Some(ActionInvocation::new(DIMMER_LEVEL, Trigger::Device).with_argument(brightness.to_string()))
    }
}
