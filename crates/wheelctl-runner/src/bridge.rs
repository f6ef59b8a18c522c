//! The bridge's connect / serve / reconnect loop.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use tracing::{debug, error, info, warn};
use wheelctl_core::{
    load_config, BridgeConfig, ConnectionLifecycle, ControllerEvent, LearnEvent, OperatingMode,
    TcpTransport, TransportConfig,
};

use crate::cli::Args;
#[cfg(feature = "prometheus")]
use crate::error::RunnerError;
use crate::error::Result;
use crate::sink::LoggingActionSink;

/// Why a connected session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    Shutdown,
    DeviceError,
}

/// Load configuration, connect and serve until Ctrl-C.
pub fn run(args: Args) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            load_config(path)?
        }
        None => BridgeConfig::default(),
    };
    args.apply(&mut config);
    match args.metrics_listen {
        Some(addr) => install_metrics(addr)?,
        None => wheelctl_metrics::describe_metrics(),
    }

    let transport = match &config.transport {
        TransportConfig::Tcp { address } => TcpTransport::new(address.clone()),
    };
    info!(
        "{} buttons configured, dimmer mode {:?}",
        config.buttons.len(),
        config.dimmer.mode
    );

    let sink = Arc::new(LoggingActionSink::new());
    let mut lifecycle = ConnectionLifecycle::from_config(Box::new(transport), &config, sink.clone());
    let (learn_tx, learned) = crossbeam_channel::unbounded::<LearnEvent>();
    lifecycle.set_learn_observer(Arc::new(learn_tx));

    let (shutdown_tx, shutdown) = crossbeam_channel::bounded::<()>(1);
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.try_send(());
    })?;

    serve(&mut lifecycle, &learned, &shutdown, args.reconnect_delay());
    info!("Stopped after {} actions", sink.performed());
    Ok(())
}

#[cfg(feature = "prometheus")]
fn install_metrics(addr: SocketAddr) -> Result<()> {
    wheelctl_metrics::install_prometheus(addr).map_err(|e| RunnerError::Metrics(e.to_string()))?;
    info!("Serving metrics on http://{}/metrics", addr);
    Ok(())
}

#[cfg(not(feature = "prometheus"))]
fn install_metrics(addr: SocketAddr) -> Result<()> {
    warn!(
        "Built without the prometheus feature, ignoring --metrics-listen {}",
        addr
    );
    wheelctl_metrics::describe_metrics();
    Ok(())
}

/// Keep the controller connected until `shutdown` fires, reconnecting
/// after `reconnect_delay` whenever an attempt fails or the device errors.
pub fn serve(
    lifecycle: &mut ConnectionLifecycle,
    learned: &Receiver<LearnEvent>,
    shutdown: &Receiver<()>,
    reconnect_delay: Duration,
) {
    let events = lifecycle.events();
    if lifecycle.mode() == OperatingMode::Learn {
        info!("Learning mode: press buttons to see their readings");
    }

    loop {
        let connected = lifecycle.connect();
        for event in events.try_iter() {
            log_event(&event);
        }
        let end = match connected {
            Ok(()) => session(&events, learned, shutdown),
            Err(e) => {
                warn!("Connection attempt failed: {}", e);
                SessionEnd::DeviceError
            }
        };
        if end == SessionEnd::Shutdown || wait_for_shutdown(shutdown, reconnect_delay) {
            break;
        }
        info!("Reconnecting");
    }
    lifecycle.disconnect();
}

/// Serve one connection. Returns when the device errors or shutdown is requested.
fn session(
    events: &Receiver<ControllerEvent>,
    learned: &Receiver<LearnEvent>,
    shutdown: &Receiver<()>,
) -> SessionEnd {
    let closed = crossbeam_channel::never();
    let mut observing = true;
    loop {
        let learn_rx = if observing { learned } else { &closed };
        crossbeam_channel::select! {
            recv(events) -> event => match event {
                Ok(event) => {
                    log_event(&event);
                    if matches!(event, ControllerEvent::DeviceError(_)) {
                        return SessionEnd::DeviceError;
                    }
                }
                Err(_) => return SessionEnd::Shutdown,
            },
            recv(learn_rx) -> event => match event {
                Ok(event) => log_learned(event),
                // Observer gone; stop polling it.
                Err(_) => observing = false,
            },
            recv(shutdown) -> _ => return SessionEnd::Shutdown,
        }
    }
}

/// Returns `true` if shutdown was requested during the wait.
fn wait_for_shutdown(shutdown: &Receiver<()>, delay: Duration) -> bool {
    match shutdown.recv_timeout(delay) {
        Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
        Err(RecvTimeoutError::Timeout) => false,
    }
}

fn log_event(event: &ControllerEvent) {
    match event {
        ControllerEvent::StateChanged(state) => debug!("Connection {}", state),
        ControllerEvent::DeviceReady(true) => info!("Controller ready"),
        ControllerEvent::DeviceReady(false) => warn!("Controller not ready"),
        ControllerEvent::CommandReceived(command) => debug!("Received {}", command),
        ControllerEvent::DeviceLog(_) => {}
        ControllerEvent::DeviceError(message) => error!("Controller error: {}", message),
        ControllerEvent::DeviceStarted(id) => info!("Controller {} started", id),
    }
}

fn log_learned(event: LearnEvent) {
    match event {
        LearnEvent::ButtonClicked(reading) => {
            info!(target: "wheelctl::learn", "Button clicked, reading {}", reading)
        }
        LearnEvent::DimmerToggled(on) => {
            info!(target: "wheelctl::learn", "Dimmer {}", if on { "on" } else { "off" })
        }
        LearnEvent::DimmerLevel(reading) => {
            info!(target: "wheelctl::learn", "Dimmer reading {}", reading)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use wheelctl_core::actions::NEXT;
    use wheelctl_core::{
        ActionInvocation, ActionKind, ButtonBinding, ButtonMap, ChannelTransport,
        ConnectionState, ControllerConfig, DimmerConfig, ReadyBehavior,
    };

    fn lifecycle(
        ready: ReadyBehavior,
    ) -> (
        ConnectionLifecycle,
        wheelctl_core::DeviceEndpoint,
        Receiver<ActionInvocation>,
    ) {
        let (transport, device) = ChannelTransport::pair_with(ready);
        let (tx, actions) = crossbeam_channel::unbounded::<ActionInvocation>();
        let config = ControllerConfig {
            connect_timeout_ms: 50,
            stop_grace_ms: 10,
            ..Default::default()
        };
        let buttons =
            ButtonMap::new(vec![ButtonBinding::new(100, 10).on_click(ActionKind::Builtin, NEXT)]);
        let lifecycle = ConnectionLifecycle::new(
            Box::new(transport),
            config,
            buttons,
            DimmerConfig::default(),
            Arc::new(tx),
        );
        (lifecycle, device, actions)
    }

    #[test]
    fn test_serve_until_shutdown() {
        let (mut lifecycle, device, actions) = lifecycle(ReadyBehavior::OnOpen);
        let (_learn_tx, learned) = crossbeam_channel::unbounded::<LearnEvent>();
        let (shutdown_tx, shutdown) = crossbeam_channel::bounded::<()>(1);

        let driver = thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            device.send_command("click:00100").expect("should encode");
            let action = actions
                .recv_timeout(Duration::from_secs(2))
                .expect("click should be dispatched");
            shutdown_tx.send(()).expect("serve should be running");
            (action, device)
        });

        serve(&mut lifecycle, &learned, &shutdown, Duration::from_millis(10));
        let (action, device) = driver.join().expect("driver should finish");
        assert_eq!(action.name, NEXT);
        assert_eq!(lifecycle.state(), ConnectionState::Disconnected);
        assert_eq!(device.written(), vec!["<START>", "<STOP>"]);
    }

    #[test]
    fn test_serve_reconnects_after_device_error() {
        let (mut lifecycle, device, _actions) = lifecycle(ReadyBehavior::OnOpen);
        let (_learn_tx, learned) = crossbeam_channel::unbounded::<LearnEvent>();
        let (shutdown_tx, shutdown) = crossbeam_channel::bounded::<()>(1);

        let driver = thread::spawn(move || {
            assert_eq!(
                device.recv_text(Duration::from_secs(2)).as_deref(),
                Some("<START>")
            );
            device.fail("link lost");
            // Reconnected: a second start arrives.
            assert_eq!(
                device.recv_text(Duration::from_secs(2)).as_deref(),
                Some("<START>")
            );
            shutdown_tx.send(()).expect("serve should be running");
        });

        serve(&mut lifecycle, &learned, &shutdown, Duration::from_millis(10));
        driver.join().expect("driver should finish");
        assert_eq!(lifecycle.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_serve_retries_until_shutdown() {
        let (mut lifecycle, _device, _actions) = lifecycle(ReadyBehavior::Never);
        let (_learn_tx, learned) = crossbeam_channel::unbounded::<LearnEvent>();
        let (shutdown_tx, shutdown) = crossbeam_channel::bounded::<()>(1);

        let driver = thread::spawn(move || {
            thread::sleep(Duration::from_millis(200));
            shutdown_tx.send(()).expect("serve should be running");
        });

        serve(&mut lifecycle, &learned, &shutdown, Duration::from_millis(10));
        driver.join().expect("driver should finish");
        assert_eq!(lifecycle.state(), ConnectionState::Disconnected);
    }
}
