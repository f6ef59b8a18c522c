//! Steering Wheel Controller Serial Protocol
//!
//! This crate provides types and utilities for talking to the microcontroller
//! that samples the steering wheel resistor ladder, dimmer line and reverse
//! signal. The controller is attached over USB or Bluetooth serial.
//!
//! # Protocol Overview
//!
//! Device-to-host traffic is framed and checksummed:
//!
//! ```text
//! +------+-----+----------------------+----------+
//! | 0xF1 | LEN | payload[0..LEN]      | CHECKSUM |
//! +------+-----+----------------------+----------+
//! ```
//!
//! - **Marker** `0xF1` starts every frame and never appears unescaped inside one
//! - **Escape** `0x1B` makes the next byte special: `0x20` means `0xF1`, `0x1B` means `0x1B`
//! - **Checksum** is `(LEN + sum(payload)) mod 256`
//! - **Payload** is ASCII text of the form `COMMAND:DATA`
//!
//! Host-to-device traffic is plain text control sequences such as `<START>`,
//! `<STOP>` and `<command:data>`.
//!
//! # Example
//!
//! ```rust
//! use wheelctl_protocol::{encode_frame, parse_frame, DecodeEvent, FrameDecoder, ParsedFrame};
//!
//! let wire = encode_frame(b"click:00100").unwrap();
//!
//! let mut decoder = FrameDecoder::new();
//! let events = decoder.feed(&wire);
//! let frame = match &events[0] {
//!     DecodeEvent::Frame(frame) => frame,
//!     other => panic!("unexpected event: {:?}", other),
//! };
//!
//! match parse_frame(frame).unwrap() {
//!     ParsedFrame::Command(cmd) => assert_eq!(cmd.reading(), Some(100)),
//!     ParsedFrame::DeviceLog(_) => unreachable!(),
//! }
//! ```

mod command;
mod constants;
mod control;
mod error;
mod frame;

pub use command::*;
pub use constants::*;
pub use control::*;
pub use error::*;
pub use frame::*;
