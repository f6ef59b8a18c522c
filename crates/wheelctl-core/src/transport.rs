//! Transport abstraction.
//!
//! A [`Transport`] moves bytes to and from the controller. It does not know
//! about frames: on [`Transport::open`] it receives a [`TransportSink`] and
//! hands every received chunk to it from its own reader thread. The sink
//! decodes frames and parses commands right there, then queues the commands
//! to the command worker, so the reader never waits on command handling.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::Sender;
use tracing::{debug, error, info, warn};
use wheelctl_metrics::metric_defs;
use wheelctl_protocol::{parse_frame, DecodeEvent, FrameDecoder, FrameDiagnostic, ParsedFrame};

use crate::error::TransportError;
use crate::events::{ConnectionState, ControllerEvent, StateCell};
use crate::router::WorkerMessage;

/// A byte pipe to the controller (USB serial, Bluetooth serial, TCP bridge, ...).
pub trait Transport: Send {
    /// Open the connection and start delivering received bytes to `sink`.
    ///
    /// The transport must call [`TransportSink::ready`] once it knows whether
    /// the device is usable, and [`TransportSink::device_error`] if the link
    /// fails afterwards.
    fn open(&mut self, sink: TransportSink) -> Result<(), TransportError>;

    fn write(&mut self, data: &[u8]) -> Result<(), TransportError>;

    /// Close the connection and stop the reader. Closing a closed transport is a no-op.
    fn close(&mut self) -> Result<(), TransportError>;

    /// Human-readable description for logs.
    fn description(&self) -> String;
}

/// Receiving end handed to a transport's reader thread.
pub struct TransportSink {
    decoder: FrameDecoder,
    commands: Sender<WorkerMessage>,
    accepting: Arc<AtomicBool>,
    ready_tx: Sender<bool>,
    status: Arc<StateCell>,
}

impl TransportSink {
    pub(crate) fn new(
        commands: Sender<WorkerMessage>,
        accepting: Arc<AtomicBool>,
        ready_tx: Sender<bool>,
        status: Arc<StateCell>,
    ) -> Self {
        TransportSink {
            decoder: FrameDecoder::new(),
            commands,
            accepting,
            ready_tx,
            status,
        }
    }

    /// Whether the connection still wants input.
    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    /// Report whether the device is ready. Only the first report of a
    /// connection attempt is used.
    pub fn ready(&self, ready: bool) {
        debug!("TransportSink: device ready = {}", ready);
        let _ = self.ready_tx.try_send(ready);
    }

    /// Report a transport-level failure. Stops input and cancels any active
    /// hold. Ignored once the connection is closing.
    pub fn device_error(&self, message: &str) {
        if !self.accepting.swap(false, Ordering::AcqRel) {
            debug!("TransportSink: ignoring error while closing: {}", message);
            return;
        }
        error!("TransportSink: device error: {}", message);
        metrics::counter!(metric_defs::DEVICE_ERRORS.name).increment(1);
        // Commands are dropped from here on, so no release will arrive.
        let _ = self.commands.send(WorkerMessage::ReleaseHolds);
        let _ = self.ready_tx.try_send(false);
        self.status.set(ConnectionState::Error);
        self.status
            .events()
            .emit(ControllerEvent::DeviceError(message.to_string()));
    }

    /// Feed received bytes. Never blocks.
    pub fn deliver(&mut self, bytes: &[u8]) {
        for event in self.decoder.feed(bytes) {
            match event {
                DecodeEvent::Frame(frame) => {
                    metrics::counter!(metric_defs::FRAMES_DECODED.name).increment(1);
                    match parse_frame(&frame) {
                        Ok(ParsedFrame::Command(command)) => self.enqueue(command),
                        Ok(ParsedFrame::DeviceLog(text)) => {
                            info!(target: "wheelctl::device", "{}", text);
                            self.status.events().emit(ControllerEvent::DeviceLog(text));
                        }
                        Err(e) => {
                            warn!("TransportSink: dropping frame: {}", e);
                            metrics::counter!(metric_defs::COMMANDS_REJECTED.name).increment(1);
                        }
                    }
                }
                DecodeEvent::Diagnostic(FrameDiagnostic::NoiseByte(_)) => {
                    metrics::counter!(metric_defs::NOISE_BYTES.name).increment(1);
                }
                DecodeEvent::Diagnostic(diagnostic) => {
                    debug!("TransportSink: {}", diagnostic);
                    metrics::counter!(metric_defs::FRAMES_DROPPED.name, "reason" => diagnostic.reason())
                        .increment(1);
                }
            }
        }
    }

    fn enqueue(&self, command: wheelctl_protocol::Command) {
        metrics::counter!(metric_defs::COMMANDS_PARSED.name, "command" => command.name().to_ascii_lowercase())
            .increment(1);
        if !self.is_accepting() {
            debug!("TransportSink: not accepting, dropping {}", command);
            metrics::counter!(metric_defs::COMMANDS_DISCARDED.name).increment(1);
            return;
        }
        if self.commands.send(WorkerMessage::Command(command)).is_err() {
            debug!("TransportSink: command worker gone");
            metrics::counter!(metric_defs::COMMANDS_DISCARDED.name).increment(1);
        }
    }

    /// Framing counters for this connection.
    pub fn decoder_stats(&self) -> wheelctl_protocol::DecoderStats {
        self.decoder.stats()
    }
}

impl std::fmt::Debug for TransportSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportSink")
            .field("decoder", &self.decoder.state())
            .field("accepting", &self.is_accepting())
            .finish()
    }
}
