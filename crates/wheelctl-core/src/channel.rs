//! In-memory transport.
//!
//! [`ChannelTransport::pair`] returns the host side and a [`DeviceEndpoint`]
//! that plays the controller: it injects bytes or framed commands, observes
//! what the host writes, and can simulate a failing or unresponsive device.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, warn};
use wheelctl_protocol::{encode_frame, ProtocolResult};

use crate::error::TransportError;
use crate::transport::{Transport, TransportSink};

/// How a [`ChannelTransport`] reports readiness when opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadyBehavior {
    /// Ready as soon as the transport opens.
    #[default]
    OnOpen,
    /// Never reports readiness (connect times out).
    Never,
    /// Reports that the device is not usable.
    Refuse,
}

#[derive(Debug)]
enum DeviceInput {
    Bytes(Vec<u8>),
    Fail(String),
    /// Sent by `close()` to stop the reader.
    Close,
}

/// Host side of an in-memory controller link.
#[derive(Debug)]
pub struct ChannelTransport {
    input_tx: Sender<DeviceInput>,
    input_rx: Receiver<DeviceInput>,
    output_tx: Sender<Vec<u8>>,
    ready: ReadyBehavior,
    fail_open: Arc<AtomicBool>,
    open: bool,
    reader: Option<JoinHandle<()>>,
}

/// Device side of an in-memory controller link.
#[derive(Debug, Clone)]
pub struct DeviceEndpoint {
    input_tx: Sender<DeviceInput>,
    output_rx: Receiver<Vec<u8>>,
    fail_open: Arc<AtomicBool>,
}

impl ChannelTransport {
    /// Create a connected pair that becomes ready on open.
    pub fn pair() -> (ChannelTransport, DeviceEndpoint) {
        Self::pair_with(ReadyBehavior::OnOpen)
    }

    pub fn pair_with(ready: ReadyBehavior) -> (ChannelTransport, DeviceEndpoint) {
        let (input_tx, input_rx) = crossbeam_channel::unbounded();
        let (output_tx, output_rx) = crossbeam_channel::unbounded();
        let fail_open = Arc::new(AtomicBool::new(false));
        (
            ChannelTransport {
                input_tx: input_tx.clone(),
                input_rx,
                output_tx,
                ready,
                fail_open: Arc::clone(&fail_open),
                open: false,
                reader: None,
            },
            DeviceEndpoint {
                input_tx,
                output_rx,
                fail_open,
            },
        )
    }

    fn join_reader(&mut self) {
        if let Some(reader) = self.reader.take() {
            if reader.join().is_err() {
                warn!("ChannelTransport: reader thread panicked");
            }
        }
    }
}

impl Transport for ChannelTransport {
    fn open(&mut self, sink: TransportSink) -> Result<(), TransportError> {
        if self.open {
            return Err(TransportError::AlreadyOpen);
        }
        if self.fail_open.load(Ordering::Acquire) {
            return Err(TransportError::Failed("device unavailable".to_string()));
        }
        // A reader left over from a device-side failure has already exited.
        self.join_reader();

        let rx = self.input_rx.clone();
        let ready = self.ready;
        let reader = thread::Builder::new()
            .name("channel-reader".to_string())
            .spawn(move || channel_reader_main(rx, sink, ready))
            .expect("Failed to spawn channel reader thread");
        self.reader = Some(reader);
        self.open = true;
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        if !self.open {
            return Err(TransportError::NotOpen);
        }
        self.output_tx
            .send(data.to_vec())
            .map_err(|_| TransportError::Disconnected)
    }

    fn close(&mut self) -> Result<(), TransportError> {
        if !self.open {
            return Ok(());
        }
        self.open = false;
        let _ = self.input_tx.send(DeviceInput::Close);
        self.join_reader();
        // Input sent while closed (or a Close the reader never saw) must not
        // reach the next connection.
        while self.input_rx.try_recv().is_ok() {}
        Ok(())
    }

    fn description(&self) -> String {
        "in-memory channel".to_string()
    }
}

impl Drop for ChannelTransport {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

fn channel_reader_main(rx: Receiver<DeviceInput>, mut sink: TransportSink, ready: ReadyBehavior) {
    match ready {
        ReadyBehavior::OnOpen => sink.ready(true),
        ReadyBehavior::Refuse => sink.ready(false),
        ReadyBehavior::Never => {}
    }

    for input in rx.iter() {
        match input {
            DeviceInput::Bytes(bytes) => sink.deliver(&bytes),
            DeviceInput::Fail(message) => {
                sink.device_error(&message);
                break;
            }
            DeviceInput::Close => break,
        }
    }
    debug!("ChannelTransport: reader exiting");
}

impl DeviceEndpoint {
    /// Send raw bytes to the host.
    pub fn send_bytes(&self, bytes: &[u8]) {
        let _ = self.input_tx.send(DeviceInput::Bytes(bytes.to_vec()));
    }

    /// Frame `text` (e.g. `click:00100`) and send it to the host.
    pub fn send_command(&self, text: &str) -> ProtocolResult<()> {
        self.send_bytes(&encode_frame(text.as_bytes())?);
        Ok(())
    }

    /// Simulate a link failure. The host's reader stops.
    pub fn fail(&self, message: &str) {
        let _ = self.input_tx.send(DeviceInput::Fail(message.to_string()));
    }

    /// Make subsequent `open()` calls fail.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.fail_open.store(unavailable, Ordering::Release);
    }

    /// Next write from the host, as text.
    pub fn recv_text(&self, timeout: Duration) -> Option<String> {
        self.output_rx
            .recv_timeout(timeout)
            .ok()
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Everything the host has written so far, as text.
    pub fn written(&self) -> Vec<String> {
        self.output_rx
            .try_iter()
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::WorkerMessage;
    use crate::transport::tests::sink_fixture;

    #[test]
    fn test_open_reports_ready_and_delivers() {
        let (mut transport, device) = ChannelTransport::pair();
        let f = sink_fixture();
        transport.open(f.sink).expect("should open");

        assert_eq!(f.ready.recv_timeout(Duration::from_secs(1)), Ok(true));
        device.send_command("click:00100").expect("should encode");
        match f.commands.recv_timeout(Duration::from_secs(1)) {
            Ok(WorkerMessage::Command(cmd)) => assert_eq!(cmd.to_string(), "click:00100"),
            other => panic!("unexpected: {:?}", other),
        }

        transport.write(b"<START>").expect("should write");
        assert_eq!(device.recv_text(Duration::from_secs(1)).as_deref(), Some("<START>"));
        transport.close().expect("should close");
        assert!(matches!(transport.write(b"x"), Err(TransportError::NotOpen)));
    }

    #[test]
    fn test_never_ready_and_refuse() {
        let (mut transport, _device) = ChannelTransport::pair_with(ReadyBehavior::Never);
        let f = sink_fixture();
        transport.open(f.sink).expect("should open");
        assert!(f.ready.recv_timeout(Duration::from_millis(100)).is_err());

        let (mut transport, _device) = ChannelTransport::pair_with(ReadyBehavior::Refuse);
        let f = sink_fixture();
        transport.open(f.sink).expect("should open");
        assert_eq!(f.ready.recv_timeout(Duration::from_secs(1)), Ok(false));
    }

    #[test]
    fn test_unavailable_device_fails_open() {
        let (mut transport, device) = ChannelTransport::pair();
        device.set_unavailable(true);
        assert!(matches!(
            transport.open(sink_fixture().sink),
            Err(TransportError::Failed(_))
        ));
        device.set_unavailable(false);
        transport.open(sink_fixture().sink).expect("should open");
    }

    #[test]
    fn test_device_failure_reaches_sink() {
        let (mut transport, device) = ChannelTransport::pair();
        let f = sink_fixture();
        transport.open(f.sink).expect("should open");
        device.fail("usb detached");
        let deadline = std::time::Instant::now() + Duration::from_secs(1);
        while f.accepting.load(Ordering::SeqCst) && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(!f.accepting.load(Ordering::SeqCst));
    }

    #[test]
    fn test_reopen_after_close() {
        let (mut transport, device) = ChannelTransport::pair();
        transport.open(sink_fixture().sink).expect("should open");
        assert!(matches!(
            transport.open(sink_fixture().sink),
            Err(TransportError::AlreadyOpen)
        ));
        transport.close().expect("should close");

        let f = sink_fixture();
        transport.open(f.sink).expect("should reopen");
        device.send_command("hold:00050").expect("should encode");
        assert!(f.commands.recv_timeout(Duration::from_secs(1)).is_ok());
    }
}
