//! Connection lifecycle.
//!
//! [`ConnectionLifecycle`] owns the transport, the command worker and the
//! router, and moves the link through
//! `Disconnected -> Connecting -> Ready` (or `Error`). It never retries on
//! its own: a failed attempt or a device error is reported, and the owner
//! decides whether to call [`ConnectionLifecycle::connect`] again.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};
use wheelctl_metrics::metric_defs;
use wheelctl_protocol::ControlSequence;

use crate::actions::{ActionCatalog, ActionSink};
use crate::buttons::{ButtonMap, ButtonResolver};
use crate::config::{BridgeConfig, ControllerConfig};
use crate::dimmer::DimmerConfig;
use crate::dispatch::ActionDispatcher;
use crate::error::{LifecycleError, Result};
use crate::events::{ConnectionState, ControllerEvent, EventSender, StateCell};
use crate::hold::HoldStatus;
use crate::router::{
    spawn_command_worker, CommandHandler, CommandRouter, CommandWorkerHandle, LearnObserver,
    OperatingMode,
};
use crate::transport::{Transport, TransportSink};

type SharedTransport = Arc<Mutex<Box<dyn Transport>>>;

/// Drives one controller connection.
pub struct ConnectionLifecycle {
    transport: SharedTransport,
    config: ControllerConfig,
    router: Arc<CommandRouter>,
    status: Arc<StateCell>,
    accepting: Arc<AtomicBool>,
    worker: Option<CommandWorkerHandle>,
    events: Receiver<ControllerEvent>,
}

impl ConnectionLifecycle {
    pub fn new(
        transport: Box<dyn Transport>,
        config: ControllerConfig,
        buttons: ButtonMap,
        dimmer: DimmerConfig,
        sink: Arc<dyn ActionSink>,
    ) -> Self {
        let (event_tx, events) = EventSender::channel(config.event_buffer.max(1));
        let dispatcher = Arc::new(ActionDispatcher::new(
            sink,
            ActionCatalog::default(),
            config.repeat_interval(),
        ));
        let router = Arc::new(CommandRouter::new(
            OperatingMode::from_learning(config.learning_mode),
            ButtonResolver::new(buttons),
            dimmer,
            dispatcher,
        ));
        ConnectionLifecycle {
            transport: Arc::new(Mutex::new(transport)),
            config,
            router,
            status: Arc::new(StateCell::new(event_tx)),
            accepting: Arc::new(AtomicBool::new(false)),
            worker: None,
            events,
        }
    }

    /// Build a lifecycle from a loaded configuration file.
    pub fn from_config(
        transport: Box<dyn Transport>,
        config: &BridgeConfig,
        sink: Arc<dyn ActionSink>,
    ) -> Self {
        Self::new(
            transport,
            config.controller.clone(),
            config.buttons.clone(),
            config.dimmer.clone(),
            sink,
        )
    }

    /// Receiver for controller events. All clones share one queue.
    pub fn events(&self) -> Receiver<ControllerEvent> {
        self.events.clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.status.get()
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Open the transport, send `<START>` and wait for the device to become ready.
    ///
    /// Blocks for at most the configured connect timeout. On failure the
    /// transport is closed and the state is [`ConnectionState::Error`].
    pub fn connect(&mut self) -> Result<()> {
        if self.worker.is_some() {
            debug!("ConnectionLifecycle: reconnecting, tearing down previous connection");
            self.disconnect();
        }

        let started = Instant::now();
        self.status.set(ConnectionState::Connecting);
        self.router.clear_device_id();

        let worker = spawn_command_worker(Arc::clone(&self.router), self.status.events().clone());
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);
        self.accepting.store(true, Ordering::Release);
        let sink = TransportSink::new(
            worker.sender(),
            Arc::clone(&self.accepting),
            ready_tx,
            Arc::clone(&self.status),
        );
        self.worker = Some(worker);

        let description = self.transport.lock().description();
        info!("ConnectionLifecycle: connecting to {}", description);

        let opened = self.transport.lock().open(sink);
        if let Err(e) = opened {
            error!("ConnectionLifecycle: failed to open {}: {}", description, e);
            self.fail_connect("open_failed");
            return Err(e.into());
        }
        let started_written = self.transport.lock().write(&ControlSequence::start().encode());
        if let Err(e) = started_written {
            error!("ConnectionLifecycle: failed to send start: {}", e);
            self.fail_connect("open_failed");
            return Err(e.into());
        }

        let timeout = self.config.connect_timeout();
        match ready_rx.recv_timeout(timeout) {
            Ok(true) if self.accepting.load(Ordering::Acquire) => {
                let elapsed = started.elapsed();
                self.status.set(ConnectionState::Ready);
                self.status.events().emit(ControllerEvent::DeviceReady(true));
                metrics::counter!(metric_defs::CONNECTION_ATTEMPTS.name, "outcome" => "ready")
                    .increment(1);
                metrics::histogram!(metric_defs::CONNECT_TIME.name)
                    .record(elapsed.as_secs_f64() * 1000.0);
                info!(
                    "ConnectionLifecycle: {} ready after {:?}",
                    description, elapsed
                );
                Ok(())
            }
            Ok(_) => {
                warn!("ConnectionLifecycle: {} reported not ready", description);
                self.fail_connect("not_ready");
                Err(LifecycleError::DeviceNotReady)
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                warn!(
                    "ConnectionLifecycle: {} not ready within {:?}",
                    description, timeout
                );
                self.fail_connect("timeout");
                Err(LifecycleError::ConnectTimeout { timeout })
            }
        }
    }

    fn fail_connect(&mut self, outcome: &'static str) {
        metrics::counter!(metric_defs::CONNECTION_ATTEMPTS.name, "outcome" => outcome)
            .increment(1);
        self.teardown();
        self.status.set(ConnectionState::Error);
        self.status.events().emit(ControllerEvent::DeviceReady(false));
    }

    /// Stop accepting input, stop the worker, cancel holds and close the transport.
    fn teardown(&mut self) {
        self.accepting.store(false, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            worker.shutdown();
        }
        if self.router.release_all() {
            debug!("ConnectionLifecycle: cancelled active hold");
        }
        if let Err(e) = self.transport.lock().close() {
            warn!("ConnectionLifecycle: close failed: {}", e);
        }
    }

    /// Close the connection.
    ///
    /// Unless the link is in the error state, `<STOP>` is sent first and the
    /// transport stays open for the stop grace period. Always ends in
    /// [`ConnectionState::Disconnected`].
    pub fn disconnect(&mut self) {
        let state = self.status.get();
        if state == ConnectionState::Disconnected && self.worker.is_none() {
            return;
        }
        info!("ConnectionLifecycle: disconnecting from {}", state);

        self.accepting.store(false, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            worker.shutdown();
        }
        self.router.release_all();

        if state != ConnectionState::Error {
            let written = self.transport.lock().write(&ControlSequence::stop().encode());
            match written {
                Ok(()) => thread::sleep(self.config.stop_grace()),
                Err(e) => debug!("ConnectionLifecycle: could not send stop: {}", e),
            }
        }
        if let Err(e) = self.transport.lock().close() {
            warn!("ConnectionLifecycle: close failed: {}", e);
        }
        self.status.set(ConnectionState::Disconnected);
    }

    /// Reconnect with a different operating mode.
    pub fn refresh(&mut self, mode: OperatingMode) -> Result<()> {
        info!("ConnectionLifecycle: refreshing connection in {:?} mode", mode);
        self.disconnect();
        self.router.set_mode(mode);
        self.connect()
    }

    /// Switch between executing actions and learning without reconnecting.
    pub fn set_mode(&self, mode: OperatingMode) {
        self.router.set_mode(mode);
    }

    pub fn mode(&self) -> OperatingMode {
        self.router.mode()
    }

    pub fn set_learn_observer(&self, observer: Arc<dyn LearnObserver>) {
        self.router.set_observer(observer);
    }

    pub fn clear_learn_observer(&self) {
        self.router.clear_observer();
    }

    /// Handle an additional inbound command name.
    pub fn register_handler(&self, name: &str, handler: Arc<dyn CommandHandler>) {
        self.router.register_handler(name, handler);
    }

    /// Swap in a new button table. Commands already being resolved finish
    /// against the old one.
    pub fn update_button_map(&self, map: ButtonMap) {
        self.router.update_button_map(map);
    }

    pub fn update_dimmer(&self, config: DimmerConfig) {
        self.router.update_dimmer(config);
    }

    pub fn hold_status(&self) -> HoldStatus {
        self.router.hold_status()
    }

    /// Id from the device's `started` announcement on this connection.
    pub fn device_id(&self) -> Option<String> {
        self.router.device_id()
    }

    /// Handle for sending control sequences to the device.
    pub fn device_handle(&self) -> DeviceHandle {
        DeviceHandle {
            transport: Arc::clone(&self.transport),
            status: Arc::clone(&self.status),
        }
    }
}

impl Drop for ConnectionLifecycle {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl std::fmt::Debug for ConnectionLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionLifecycle")
            .field("state", &self.state())
            .field("router", &self.router)
            .finish()
    }
}

/// Sends `<COMMAND:DATA>` to the device while the connection is ready.
#[derive(Clone)]
pub struct DeviceHandle {
    transport: SharedTransport,
    status: Arc<StateCell>,
}

impl DeviceHandle {
    pub fn send(&self, command: &str, data: &str) -> Result<()> {
        if self.status.get() != ConnectionState::Ready {
            return Err(LifecycleError::NotConnected);
        }
        let sequence = ControlSequence::new(command, data)?;
        debug!("DeviceHandle: sending {}", sequence);
        self.transport.lock().write(&sequence.encode())?;
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.status.get() == ConnectionState::Ready
    }
}

impl std::fmt::Debug for DeviceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("state", &self.status.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::ActionInvocation;
    use crate::channel::{ChannelTransport, DeviceEndpoint, ReadyBehavior};
    use std::time::Duration;

    fn lifecycle(ready: ReadyBehavior) -> (ConnectionLifecycle, DeviceEndpoint) {
        let (transport, device) = ChannelTransport::pair_with(ready);
        let (tx, _rx) = crossbeam_channel::unbounded::<ActionInvocation>();
        let config = ControllerConfig {
            connect_timeout_ms: 100,
            stop_grace_ms: 10,
            ..Default::default()
        };
        let lifecycle = ConnectionLifecycle::new(
            Box::new(transport),
            config,
            ButtonMap::default(),
            DimmerConfig::default(),
            Arc::new(tx),
        );
        (lifecycle, device)
    }

    #[test]
    fn test_connect_and_disconnect() {
        let (mut lifecycle, device) = lifecycle(ReadyBehavior::OnOpen);
        lifecycle.connect().expect("should connect");
        assert_eq!(lifecycle.state(), ConnectionState::Ready);

        lifecycle.disconnect();
        assert_eq!(lifecycle.state(), ConnectionState::Disconnected);
        assert_eq!(device.written(), vec!["<START>", "<STOP>"]);
    }

    #[test]
    fn test_connect_timeout() {
        let (mut lifecycle, _device) = lifecycle(ReadyBehavior::Never);
        let err = lifecycle.connect().expect_err("should time out");
        assert!(matches!(err, LifecycleError::ConnectTimeout { .. }));
        assert_eq!(lifecycle.state(), ConnectionState::Error);
    }

    #[test]
    fn test_device_handle_requires_ready() {
        let (mut lifecycle, device) = lifecycle(ReadyBehavior::OnOpen);
        let handle = lifecycle.device_handle();
        assert!(matches!(
            handle.send("PING", ""),
            Err(LifecycleError::NotConnected)
        ));

        lifecycle.connect().expect("should connect");
        assert_eq!(device.recv_text(Duration::from_secs(1)).as_deref(), Some("<START>"));
        handle.send("LED", "on").expect("should send");
        assert_eq!(device.recv_text(Duration::from_secs(1)).as_deref(), Some("<LED:on>"));
        assert!(matches!(
            handle.send("BAD:CMD", "x"),
            Err(LifecycleError::Protocol(_))
        ));
    }
}
