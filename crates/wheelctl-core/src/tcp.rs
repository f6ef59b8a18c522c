//! TCP transport.
//!
//! Connects to a serial port exposed over TCP (ser2net, a Bluetooth serial
//! bridge, or a simulator UART port). The byte stream is the raw controller
//! stream; framing is handled by the [`TransportSink`].

use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::TransportError;
use crate::transport::{Transport, TransportSink};

const READ_BUFFER_SIZE: usize = 1024;
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Client for a TCP-exposed serial port.
#[derive(Debug)]
pub struct TcpTransport {
    address: String,
    connect_timeout: Duration,
    stream: Option<TcpStream>,
    closing: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
}

impl TcpTransport {
    pub fn new(address: impl Into<String>) -> Self {
        TcpTransport {
            address: address.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            stream: None,
            closing: Arc::new(AtomicBool::new(false)),
            reader: None,
        }
    }

    /// Timeout for establishing the TCP connection.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    fn resolve(&self) -> Result<SocketAddr, TransportError> {
        self.address
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| TransportError::Failed(format!("cannot resolve {}", self.address)))
    }
}

impl Transport for TcpTransport {
    fn open(&mut self, sink: TransportSink) -> Result<(), TransportError> {
        if self.stream.is_some() {
            return Err(TransportError::AlreadyOpen);
        }
        let addr = self.resolve()?;
        let stream = TcpStream::connect_timeout(&addr, self.connect_timeout)?;
        stream.set_nodelay(true)?;
        let read_half = stream.try_clone()?;
        info!("TcpTransport: connected to {}", addr);

        self.closing.store(false, Ordering::Release);
        let closing = Arc::clone(&self.closing);
        let reader = thread::Builder::new()
            .name("tcp-reader".to_string())
            .spawn(move || tcp_reader_main(read_half, sink, closing))
            .expect("Failed to spawn TCP reader thread");

        self.stream = Some(stream);
        self.reader = Some(reader);
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let stream = self.stream.as_mut().ok_or(TransportError::NotOpen)?;
        stream.write_all(data)?;
        stream.flush()?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), TransportError> {
        let Some(stream) = self.stream.take() else {
            return Ok(());
        };
        self.closing.store(true, Ordering::Release);
        if let Err(e) = stream.shutdown(Shutdown::Both) {
            debug!("TcpTransport: shutdown: {}", e);
        }
        if let Some(reader) = self.reader.take() {
            if reader.join().is_err() {
                warn!("TcpTransport: reader thread panicked");
            }
        }
        info!("TcpTransport: closed {}", self.address);
        Ok(())
    }

    fn description(&self) -> String {
        format!("tcp://{}", self.address)
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

fn tcp_reader_main(mut stream: TcpStream, mut sink: TransportSink, closing: Arc<AtomicBool>) {
    // A TCP bridge has no handshake of its own; the socket being up is readiness.
    sink.ready(true);

    let mut buf = [0u8; READ_BUFFER_SIZE];
    loop {
        match stream.read(&mut buf) {
            Ok(0) => {
                if !closing.load(Ordering::Acquire) {
                    sink.device_error("connection closed by peer");
                }
                break;
            }
            Ok(n) => sink.deliver(&buf[..n]),
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                if !closing.load(Ordering::Acquire) {
                    sink.device_error(&format!("read failed: {}", e));
                }
                break;
            }
        }
    }
    debug!("TcpTransport: reader exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::WorkerMessage;
    use crate::transport::tests::sink_fixture;
    use std::net::TcpListener;
    use wheelctl_protocol::encode_frame;

    #[test]
    fn test_tcp_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("should bind");
        let addr = listener.local_addr().expect("should have address");

        let mut transport = TcpTransport::new(addr.to_string());
        let f = sink_fixture();
        transport.open(f.sink).expect("should connect");
        let (mut device, _) = listener.accept().expect("should accept");

        assert_eq!(f.ready.recv_timeout(Duration::from_secs(1)), Ok(true));

        device
            .write_all(&encode_frame(b"click:00100").expect("should encode"))
            .expect("should write");
        match f.commands.recv_timeout(Duration::from_secs(2)) {
            Ok(WorkerMessage::Command(cmd)) => assert_eq!(cmd.to_string(), "click:00100"),
            other => panic!("unexpected: {:?}", other),
        }

        transport.write(b"<START>").expect("should write");
        let mut buf = [0u8; 7];
        device.read_exact(&mut buf).expect("should read");
        assert_eq!(&buf, b"<START>");

        transport.close().expect("should close");
        // Closing locally is not a device error.
        assert!(f.accepting.load(Ordering::SeqCst));
    }

    #[test]
    fn test_peer_close_is_device_error() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("should bind");
        let addr = listener.local_addr().expect("should have address");

        let mut transport = TcpTransport::new(addr.to_string());
        let f = sink_fixture();
        transport.open(f.sink).expect("should connect");
        let (device, _) = listener.accept().expect("should accept");
        drop(device);

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while f.accepting.load(Ordering::SeqCst) && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(!f.accepting.load(Ordering::SeqCst));
        transport.close().expect("should close");
    }

    #[test]
    fn test_write_before_open() {
        let mut transport = TcpTransport::new("127.0.0.1:1");
        assert!(matches!(transport.write(b"x"), Err(TransportError::NotOpen)));
        assert_eq!(transport.description(), "tcp://127.0.0.1:1");
    }
}
