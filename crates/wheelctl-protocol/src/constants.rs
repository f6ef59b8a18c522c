//! Protocol constants.

// ============================================================================
// Framing
// ============================================================================

/// Byte that starts every device-to-host frame.
pub const FRAME_MARKER: u8 = 0xF1;

/// Escape marker; the byte after it is interpreted specially.
pub const ESCAPE_MARKER: u8 = 0x1B;

/// Escaped form of [`FRAME_MARKER`] (`0x1B 0x20` decodes to `0xF1`).
pub const ESCAPED_FRAME_MARKER: u8 = 0x20;

/// Maximum payload length expressible in the single length byte.
pub const MAX_PAYLOAD_LEN: usize = u8::MAX as usize;

/// Largest possible encoded frame: marker plus every remaining byte escaped.
pub const MAX_ENCODED_FRAME_LEN: usize = 1 + 2 * (1 + MAX_PAYLOAD_LEN + 1);

// ============================================================================
// Commands
// ============================================================================

/// Separator between the command name and its data in a frame payload.
pub const COMMAND_DELIMITER: char = ':';

/// Command name the device uses for diagnostic text.
pub const LOG_COMMAND: &str = "LOG";

/// Command sent by the device on a button press.
pub const CLICK_COMMAND: &str = "click";

/// Command sent by the device when a button is held down.
pub const HOLD_COMMAND: &str = "hold";

/// Command sent by the device when a held button is let go.
pub const RELEASE_COMMAND: &str = "release";

/// Command sent by the device when the dimmer line changes.
pub const DIMMER_COMMAND: &str = "dimmer";

/// Command sent by the device when the reverse signal changes.
pub const REVERSE_COMMAND: &str = "reverse";

/// Command sent by the device once it has started; data is the device id.
pub const STARTED_COMMAND: &str = "started";

/// Data value for an asserted dimmer/reverse line.
pub const STATE_ON: &str = "on";

/// Data value for a released dimmer/reverse line.
pub const STATE_OFF: &str = "off";

// ============================================================================
// Control sequences (host -> device)
// ============================================================================

/// Opening bracket of a control sequence.
pub const CONTROL_OPEN: char = '<';

/// Closing bracket of a control sequence.
pub const CONTROL_CLOSE: char = '>';

/// Tells the device to begin reporting input.
pub const CONTROL_START: &str = "START";

/// Tells the device to stop reporting input.
pub const CONTROL_STOP: &str = "STOP";
