//! Frame encoding/decoding utilities.
//!
//! The controller frames every message with a marker byte, a one-byte length,
//! the (escaped) payload and a one-byte checksum:
//!
//! ```text
//! +------+-----+-------------------+----------+
//! | 0xF1 | LEN | payload[0..LEN]   | CHECKSUM |
//! +------+-----+-------------------+----------+
//! ```
//!
//! Any of LEN, payload or CHECKSUM may be escaped with `0x1B`, since the
//! marker must never appear unescaped after the start of a frame.

use bytes::{BufMut, Bytes, BytesMut};

use crate::constants::{ESCAPED_FRAME_MARKER, ESCAPE_MARKER, FRAME_MARKER, MAX_PAYLOAD_LEN};
use crate::error::{ProtocolError, ProtocolResult};

/// A checksum-validated, de-escaped frame payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    payload: Bytes,
}

impl Frame {
    /// Create a frame from an already validated payload.
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Frame {
            payload: payload.into(),
        }
    }

    /// The payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Consume the frame, returning its payload.
    pub fn into_payload(self) -> Bytes {
        self.payload
    }
}

/// The part of a frame an escaped byte belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameField {
    Length,
    Payload,
    Checksum,
}

/// Decoder automaton state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecoderState {
    /// Outside a frame; everything except the marker is noise.
    #[default]
    AwaitingMarker,
    /// Marker seen, next byte is the payload length.
    AwaitingLength,
    /// Collecting payload bytes, then the checksum byte.
    AwaitingPayloadOrChecksum,
    /// An escape marker was seen while completing the given field.
    EscapeSeen(FrameField),
}

/// A non-fatal framing problem. The decoder has already recovered when one
/// of these is reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameDiagnostic {
    /// A byte arrived outside a frame and was discarded.
    NoiseByte(u8),
    /// The checksum byte did not match; the frame was dropped.
    ChecksumMismatch {
        /// Checksum computed from LEN and the payload.
        expected: u8,
        /// Checksum byte received.
        received: u8,
        /// Declared payload length.
        len: usize,
    },
    /// A marker arrived before the current frame completed; a new frame was started.
    MarkerMidFrame {
        /// Payload bytes discarded from the abandoned frame.
        discarded: usize,
    },
    /// An escape marker was followed by a byte with no escaped meaning.
    InvalidEscape(u8),
}

impl FrameDiagnostic {
    /// Short machine-friendly label, suitable as a metric label value.
    pub fn reason(&self) -> &'static str {
        match self {
            FrameDiagnostic::NoiseByte(_) => "noise",
            FrameDiagnostic::ChecksumMismatch { .. } => "checksum",
            FrameDiagnostic::MarkerMidFrame { .. } => "marker_mid_frame",
            FrameDiagnostic::InvalidEscape(_) => "invalid_escape",
        }
    }
}

impl std::fmt::Display for FrameDiagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameDiagnostic::NoiseByte(b) => write!(f, "invalid byte 0x{:02X} outside frame", b),
            FrameDiagnostic::ChecksumMismatch {
                expected,
                received,
                len,
            } => write!(
                f,
                "invalid checksum: expected 0x{:02X}, got 0x{:02X} (len {})",
                expected, received, len
            ),
            FrameDiagnostic::MarkerMidFrame { discarded } => {
                write!(f, "frame marker mid-frame, {} payload bytes discarded", discarded)
            }
            FrameDiagnostic::InvalidEscape(b) => write!(f, "invalid escaped byte 0x{:02X}", b),
        }
    }
}

/// Output of feeding bytes to a [`FrameDecoder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeEvent {
    Frame(Frame),
    Diagnostic(FrameDiagnostic),
}

/// Counters accumulated by a [`FrameDecoder`] since creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderStats {
    pub frames: u64,
    pub checksum_failures: u64,
    pub noise_bytes: u64,
    pub marker_resets: u64,
    pub invalid_escapes: u64,
}

/// Stateful, escape-aware byte stream framer.
///
/// Bytes may be fed in arbitrary chunks; the output depends only on the
/// byte sequence, never on how it was split. The payload buffer never grows
/// beyond [`MAX_PAYLOAD_LEN`] bytes.
#[derive(Debug)]
pub struct FrameDecoder {
    state: DecoderState,
    expected_len: usize,
    checksum: u8,
    payload: BytesMut,
    stats: DecoderStats,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    /// Create a decoder awaiting the first marker.
    pub fn new() -> Self {
        FrameDecoder {
            state: DecoderState::AwaitingMarker,
            expected_len: 0,
            checksum: 0,
            payload: BytesMut::with_capacity(MAX_PAYLOAD_LEN),
            stats: DecoderStats::default(),
        }
    }

    /// Current automaton state.
    pub fn state(&self) -> DecoderState {
        self.state
    }

    /// Counters since creation.
    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    /// Abandon any partial frame and wait for the next marker.
    pub fn reset(&mut self) {
        self.state = DecoderState::AwaitingMarker;
        self.expected_len = 0;
        self.checksum = 0;
        self.payload.clear();
    }

    /// Feed a chunk of bytes, returning every frame and diagnostic it completes.
    pub fn feed(&mut self, data: &[u8]) -> Vec<DecodeEvent> {
        data.iter().filter_map(|&b| self.push_byte(b)).collect()
    }

    /// Feed a single byte.
    pub fn push_byte(&mut self, byte: u8) -> Option<DecodeEvent> {
        match self.state {
            DecoderState::AwaitingMarker => {
                if byte == FRAME_MARKER {
                    self.begin_frame();
                    None
                } else {
                    self.stats.noise_bytes += 1;
                    log::trace!("discarding noise byte 0x{:02X}", byte);
                    Some(DecodeEvent::Diagnostic(FrameDiagnostic::NoiseByte(byte)))
                }
            }
            DecoderState::AwaitingLength => match byte {
                FRAME_MARKER => Some(self.restart_mid_frame()),
                ESCAPE_MARKER => {
                    self.state = DecoderState::EscapeSeen(FrameField::Length);
                    None
                }
                _ => {
                    self.accept_length(byte);
                    None
                }
            },
            DecoderState::AwaitingPayloadOrChecksum => match byte {
                FRAME_MARKER => Some(self.restart_mid_frame()),
                ESCAPE_MARKER => {
                    let field = if self.payload.len() < self.expected_len {
                        FrameField::Payload
                    } else {
                        FrameField::Checksum
                    };
                    self.state = DecoderState::EscapeSeen(field);
                    None
                }
                _ => self.accept_data(byte),
            },
            DecoderState::EscapeSeen(field) => {
                let value = match byte {
                    ESCAPED_FRAME_MARKER => FRAME_MARKER,
                    ESCAPE_MARKER => ESCAPE_MARKER,
                    FRAME_MARKER => return Some(self.restart_mid_frame()),
                    other => {
                        self.stats.invalid_escapes += 1;
                        log::warn!("invalid escaped byte 0x{:02X}, dropping frame", other);
                        self.reset();
                        return Some(DecodeEvent::Diagnostic(FrameDiagnostic::InvalidEscape(
                            other,
                        )));
                    }
                };
                match field {
                    FrameField::Length => {
                        self.accept_length(value);
                        None
                    }
                    FrameField::Payload | FrameField::Checksum => self.accept_data(value),
                }
            }
        }
    }

    fn begin_frame(&mut self) {
        self.payload.clear();
        self.expected_len = 0;
        self.checksum = 0;
        self.state = DecoderState::AwaitingLength;
    }

    fn restart_mid_frame(&mut self) -> DecodeEvent {
        let discarded = self.payload.len();
        self.stats.marker_resets += 1;
        log::warn!(
            "frame marker received mid-frame, discarding {} payload bytes",
            discarded
        );
        self.begin_frame();
        DecodeEvent::Diagnostic(FrameDiagnostic::MarkerMidFrame { discarded })
    }

    fn accept_length(&mut self, len: u8) {
        self.expected_len = len as usize;
        self.checksum = len;
        self.state = DecoderState::AwaitingPayloadOrChecksum;
    }

    fn accept_data(&mut self, value: u8) -> Option<DecodeEvent> {
        if self.payload.len() < self.expected_len {
            self.payload.put_u8(value);
            self.checksum = self.checksum.wrapping_add(value);
            self.state = DecoderState::AwaitingPayloadOrChecksum;
            return None;
        }

        // Payload complete; this byte is the checksum.
        let expected = self.checksum;
        let len = self.expected_len;
        self.state = DecoderState::AwaitingMarker;
        if value == expected {
            self.stats.frames += 1;
            log::trace!("decoded frame of {} bytes", len);
            Some(DecodeEvent::Frame(Frame::new(self.payload.split().freeze())))
        } else {
            self.stats.checksum_failures += 1;
            self.payload.clear();
            log::warn!(
                "invalid checksum: expected 0x{:02X}, got 0x{:02X}",
                expected,
                value
            );
            Some(DecodeEvent::Diagnostic(FrameDiagnostic::ChecksumMismatch {
                expected,
                received: value,
                len,
            }))
        }
    }
}

/// Compute the checksum for a payload: `(LEN + sum(payload)) mod 256`.
pub fn checksum(payload: &[u8]) -> u8 {
    payload
        .iter()
        .fold(payload.len() as u8, |acc, &b| acc.wrapping_add(b))
}

fn put_escaped(buf: &mut Vec<u8>, byte: u8) {
    match byte {
        FRAME_MARKER => buf.extend_from_slice(&[ESCAPE_MARKER, ESCAPED_FRAME_MARKER]),
        ESCAPE_MARKER => buf.extend_from_slice(&[ESCAPE_MARKER, ESCAPE_MARKER]),
        b => buf.push(b),
    }
}

/// Encode a payload into wire format, escaping LEN, payload and CHECKSUM as needed.
pub fn encode_frame(payload: &[u8]) -> ProtocolResult<Vec<u8>> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(ProtocolError::PayloadTooLong {
            max: MAX_PAYLOAD_LEN,
            actual: payload.len(),
        });
    }

    let mut buf = Vec::with_capacity(3 + payload.len());
    buf.push(FRAME_MARKER);
    put_escaped(&mut buf, payload.len() as u8);
    for &b in payload {
        put_escaped(&mut buf, b);
    }
    put_escaped(&mut buf, checksum(payload));
    Ok(buf)
}
