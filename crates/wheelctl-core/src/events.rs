//! Events reported to the host.

use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use tracing::{debug, info};
use wheelctl_metrics::metric_defs;
use wheelctl_protocol::Command;

/// Connection state of a [`crate::ConnectionLifecycle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Ready,
    Error,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Ready => "ready",
            ConnectionState::Error => "error",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the controller reports upward, on one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerEvent {
    StateChanged(ConnectionState),
    /// Outcome of a connection attempt.
    DeviceReady(bool),
    /// A command was taken off the queue and routed.
    CommandReceived(Command),
    /// `LOG` text from the device.
    DeviceLog(String),
    /// Transport-level failure; the connection is now in the error state.
    DeviceError(String),
    /// The device announced itself; carries the device id.
    DeviceStarted(String),
}

/// Sending half of the event channel. Never blocks: events are dropped when
/// the host falls behind.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: Sender<ControllerEvent>,
}

impl EventSender {
    /// Create a bounded event channel.
    pub fn channel(capacity: usize) -> (EventSender, Receiver<ControllerEvent>) {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        (EventSender { tx }, rx)
    }

    pub fn emit(&self, event: ControllerEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                debug!("Controller: event channel full, dropping {:?}", event);
                metrics::counter!(metric_defs::EVENTS_DROPPED.name).increment(1);
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

/// Connection state shared between the lifecycle and the transport's reader.
#[derive(Debug)]
pub(crate) struct StateCell {
    state: Mutex<ConnectionState>,
    events: EventSender,
}

impl StateCell {
    pub(crate) fn new(events: EventSender) -> Self {
        StateCell {
            state: Mutex::new(ConnectionState::Disconnected),
            events,
        }
    }

    pub(crate) fn get(&self) -> ConnectionState {
        *self.state.lock()
    }

    /// Set the state, reporting a change.
    pub(crate) fn set(&self, new: ConnectionState) {
        let old = std::mem::replace(&mut *self.state.lock(), new);
        if old != new {
            info!("Controller: {} -> {}", old, new);
            self.events.emit(ControllerEvent::StateChanged(new));
        }
    }

    pub(crate) fn events(&self) -> &EventSender {
        &self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_drops_when_full() {
        let (events, rx) = EventSender::channel(1);
        events.emit(ControllerEvent::DeviceReady(true));
        events.emit(ControllerEvent::DeviceReady(false));
        assert_eq!(rx.try_recv(), Ok(ControllerEvent::DeviceReady(true)));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_state_cell_reports_changes_only() {
        let (events, rx) = EventSender::channel(8);
        let cell = StateCell::new(events);
        cell.set(ConnectionState::Connecting);
        cell.set(ConnectionState::Connecting);
        cell.set(ConnectionState::Ready);
        assert_eq!(cell.get(), ConnectionState::Ready);
        assert_eq!(
            rx.try_iter().collect::<Vec<_>>(),
            vec![
                ControllerEvent::StateChanged(ConnectionState::Connecting),
                ControllerEvent::StateChanged(ConnectionState::Ready),
            ]
        );
    }

    #[test]
    fn test_emit_without_receiver() {
        let (events, rx) = EventSender::channel(4);
        drop(rx);
        events.emit(ControllerEvent::StateChanged(ConnectionState::Ready));
    }
}
