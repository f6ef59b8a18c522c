//! Command routing and the command worker.
//!
//! The reader thread parses frames into [`Command`]s and queues them to a
//! single command worker, which hands each one to the [`CommandRouter`]. In
//! execute mode the router resolves buttons and dispatches actions; in
//! learning mode it forwards clicks and dimmer changes to a
//! [`LearnObserver`] instead.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, trace, warn};
use wheelctl_protocol::{Command, CommandKind};

use crate::actions::{ActionInvocation, Trigger, CLOSE_CAMERA, LAUNCH_CAMERA};
use crate::buttons::{ButtonMap, ButtonResolver};
use crate::dimmer::{DimmerConfig, DimmerController};
use crate::dispatch::ActionDispatcher;
use crate::events::{ControllerEvent, EventSender};
use crate::hold::{HoldStateTracker, HoldStatus};

/// Which downstream handler receives parsed commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OperatingMode {
    /// Resolve buttons and run actions.
    #[default]
    Execute,
    /// Forward raw clicks and dimmer changes to the learn observer.
    Learn,
}

impl OperatingMode {
    pub fn from_learning(learning: bool) -> Self {
        if learning {
            OperatingMode::Learn
        } else {
            OperatingMode::Execute
        }
    }
}

/// Input forwarded while in learning mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LearnEvent {
    ButtonClicked(i32),
    DimmerToggled(bool),
    DimmerLevel(i32),
}

/// Receives input while in learning mode (e.g. a button-mapping editor).
pub trait LearnObserver: Send + Sync {
    fn on_learn_event(&self, event: LearnEvent);
}

impl LearnObserver for Sender<LearnEvent> {
    fn on_learn_event(&self, event: LearnEvent) {
        if self.send(event).is_err() {
            debug!("CommandRouter: learn observer dropped, discarding {:?}", event);
        }
    }
}

/// Handler for a command name the router does not know.
pub trait CommandHandler: Send + Sync {
    fn handle(&self, command: &Command);
}

impl<F> CommandHandler for F
where
    F: Fn(&Command) + Send + Sync,
{
    fn handle(&self, command: &Command) {
        self(command)
    }
}

// ============================================================================
// Router
// ============================================================================

/// Routes commands to the action dispatcher or the learn observer.
pub struct CommandRouter {
    mode: RwLock<OperatingMode>,
    resolver: ButtonResolver,
    holds: HoldStateTracker,
    dimmer: DimmerController,
    dispatcher: Arc<ActionDispatcher>,
    observer: RwLock<Option<Arc<dyn LearnObserver>>>,
    handlers: RwLock<HashMap<String, Arc<dyn CommandHandler>>>,
    device_id: Mutex<Option<String>>,
}

impl CommandRouter {
    pub fn new(
        mode: OperatingMode,
        resolver: ButtonResolver,
        dimmer: DimmerConfig,
        dispatcher: Arc<ActionDispatcher>,
    ) -> Self {
        CommandRouter {
            mode: RwLock::new(mode),
            resolver,
            holds: HoldStateTracker::new(),
            dimmer: DimmerController::new(dimmer),
            dispatcher,
            observer: RwLock::new(None),
            handlers: RwLock::new(HashMap::new()),
            device_id: Mutex::new(None),
        }
    }

    pub fn mode(&self) -> OperatingMode {
        *self.mode.read()
    }

    /// Switch between execute and learning mode. Any active hold is released.
    pub fn set_mode(&self, mode: OperatingMode) {
        let previous = std::mem::replace(&mut *self.mode.write(), mode);
        if previous != mode {
            info!("CommandRouter: mode {:?} -> {:?}", previous, mode);
            self.holds.release_all();
        }
    }

    pub fn set_observer(&self, observer: Arc<dyn LearnObserver>) {
        *self.observer.write() = Some(observer);
    }

    pub fn clear_observer(&self) {
        self.observer.write().take();
    }

    /// Register a handler for an additional command name (case-insensitive).
    pub fn register_handler(&self, name: &str, handler: Arc<dyn CommandHandler>) {
        self.handlers
            .write()
            .insert(name.to_ascii_lowercase(), handler);
    }

    pub fn resolver(&self) -> &ButtonResolver {
        &self.resolver
    }

    pub fn update_button_map(&self, map: ButtonMap) {
        self.resolver.replace(map);
    }

    pub fn update_dimmer(&self, config: DimmerConfig) {
        self.dimmer.update(config);
    }

    pub fn hold_status(&self) -> HoldStatus {
        self.holds.status()
    }

    /// Cancel any active hold and its repeat loop.
    pub fn release_all(&self) -> bool {
        self.holds.release_all()
    }

    /// Id announced by the device in its `started` command.
    pub fn device_id(&self) -> Option<String> {
        self.device_id.lock().clone()
    }

    pub fn clear_device_id(&self) {
        self.device_id.lock().take();
    }

    /// Route one command. Never fails; problems are logged.
    pub fn route(&self, command: &Command) {
        trace!("CommandRouter: routing {}", command);
        match command.kind() {
            CommandKind::Started => {
                info!("CommandRouter: device started, id {:?}", command.data());
                *self.device_id.lock() = Some(command.data().to_string());
            }
            CommandKind::Log => info!(target: "wheelctl::device", "{}", command.data()),
            CommandKind::Other(name) => self.route_custom(name, command),
            _ => match self.mode() {
                OperatingMode::Execute => self.execute(command),
                OperatingMode::Learn => self.learn(command),
            },
        }
    }

    fn route_custom(&self, name: &str, command: &Command) {
        let handler = self.handlers.read().get(&name.to_ascii_lowercase()).cloned();
        match handler {
            Some(handler) => handler.handle(command),
            None => info!("CommandRouter: unhandled command {}", command),
        }
    }

    fn reading(command: &Command) -> Option<i32> {
        let reading = command.reading();
        if reading.is_none() {
            warn!("CommandRouter: invalid reading in {}", command);
        }
        reading
    }

    fn execute(&self, command: &Command) {
        match command.kind() {
            CommandKind::Click => {
                let Some(reading) = Self::reading(command) else {
                    return;
                };
                if self.holds.check_click(reading).is_err() {
                    return;
                }
                self.run_button(reading);
            }
            CommandKind::Hold => {
                let Some(reading) = Self::reading(command) else {
                    return;
                };
                // Anomalies are logged by the tracker.
                let _ = self.holds.begin_hold(reading, || {
                    let action = self.resolver.resolve(reading, false)?;
                    let invocation = ActionInvocation::from_action_ref(&action, Trigger::Hold);
                    if invocation.is_none() {
                        info!("CommandRouter: button {} has no hold action", action.binding_id);
                    }
                    self.dispatcher.start_hold(invocation?)
                });
            }
            CommandKind::Release => {
                let _ = self.holds.release(command.reading());
            }
            CommandKind::Dimmer => {
                let invocation = match command.switch_state() {
                    Some(on) => self.dimmer.toggle(on),
                    None => Self::reading(command).and_then(|r| self.dimmer.level(r)),
                };
                if let Some(invocation) = invocation {
                    self.dispatcher.fire(invocation);
                }
            }
            CommandKind::Reverse => match command.switch_state() {
                Some(true) => {
                    self.dispatcher
                        .fire(ActionInvocation::new(LAUNCH_CAMERA, Trigger::Device));
                }
                Some(false) => {
                    self.dispatcher
                        .fire(ActionInvocation::new(CLOSE_CAMERA, Trigger::Device));
                }
                None => warn!("CommandRouter: invalid reverse state in {}", command),
            },
            _ => {}
        }
    }

    fn run_button(&self, reading: i32) {
        let Some(action) = self.resolver.resolve(reading, true) else {
            return;
        };
        match ActionInvocation::from_action_ref(&action, Trigger::Click) {
            Some(invocation) => {
                self.dispatcher.fire(invocation);
            }
            None => info!("CommandRouter: button {} has no click action", action.binding_id),
        }
    }

    fn learn(&self, command: &Command) {
        let event = match command.kind() {
            CommandKind::Click => Self::reading(command).map(LearnEvent::ButtonClicked),
            CommandKind::Dimmer => match command.switch_state() {
                Some(on) => Some(LearnEvent::DimmerToggled(on)),
                None => Self::reading(command).map(LearnEvent::DimmerLevel),
            },
            _ => {
                debug!("CommandRouter: ignoring {} in learning mode", command);
                None
            }
        };
        let Some(event) = event else {
            return;
        };
        match self.observer.read().as_ref() {
            Some(observer) => observer.on_learn_event(event),
            None => debug!("CommandRouter: no learn observer for {:?}", event),
        }
    }
}

impl std::fmt::Debug for CommandRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRouter")
            .field("mode", &self.mode())
            .field("holds", &self.holds.status())
            .field("handlers", &self.handlers.read().len())
            .finish()
    }
}

// ============================================================================
// Command Worker
// ============================================================================

/// Messages consumed by the command worker.
#[derive(Debug)]
pub enum WorkerMessage {
    Command(Command),
    /// Cancel any active hold. Queued behind the commands accepted before it.
    ReleaseHolds,
    /// Stop the worker; anything queued behind this is dropped.
    Shutdown,
}

/// Handle to a running command worker.
#[derive(Debug)]
pub struct CommandWorkerHandle {
    tx: Sender<WorkerMessage>,
    thread: JoinHandle<()>,
}

impl CommandWorkerHandle {
    /// A sender for queueing commands to this worker.
    pub fn sender(&self) -> Sender<WorkerMessage> {
        self.tx.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Ask the worker to stop and wait for it.
    pub fn shutdown(self) {
        let _ = self.tx.send(WorkerMessage::Shutdown);
        if self.thread.join().is_err() {
            warn!("CommandRouter: command worker panicked");
        }
    }
}

/// Spawn the single consumer of the command queue.
pub fn spawn_command_worker(router: Arc<CommandRouter>, events: EventSender) -> CommandWorkerHandle {
    let (tx, rx) = crossbeam_channel::unbounded();
    let thread = thread::Builder::new()
        .name("commands".to_string())
        .spawn(move || command_worker_main(router, rx, events))
        .expect("Failed to spawn command worker thread");
    CommandWorkerHandle { tx, thread }
}

fn command_worker_main(router: Arc<CommandRouter>, rx: Receiver<WorkerMessage>, events: EventSender) {
    for message in rx.iter() {
        match message {
            WorkerMessage::Command(command) => {
                router.route(&command);
                if *command.kind() == CommandKind::Started {
                    events.emit(ControllerEvent::DeviceStarted(command.data().to_string()));
                }
                events.emit(ControllerEvent::CommandReceived(command));
            }
            WorkerMessage::ReleaseHolds => {
                if router.release_all() {
                    debug!("CommandRouter: cancelled active hold after link failure");
                }
            }
            WorkerMessage::Shutdown => break,
        }
    }
    debug!("CommandRouter: command worker exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{ActionCatalog, ActionSink, MUTE, VOLUME_UP};
    use crate::buttons::{ActionKind, ButtonBinding};
    use crate::dimmer::DimmerMode;
    use std::time::Duration;

    struct Fixture {
        router: CommandRouter,
        actions: Receiver<ActionInvocation>,
    }

    fn fixture(mode: OperatingMode) -> Fixture {
        let (tx, actions) = crossbeam_channel::unbounded::<ActionInvocation>();
        let sink: Arc<dyn ActionSink> = Arc::new(tx);
        let dispatcher = Arc::new(ActionDispatcher::new(
            sink,
            ActionCatalog::default(),
            Duration::from_millis(50),
        ));
        let map = ButtonMap::new(vec![
            ButtonBinding::new(100, 10)
                .on_click(ActionKind::Builtin, MUTE)
                .on_hold(ActionKind::Builtin, VOLUME_UP),
            ButtonBinding::new(300, 10).on_click(ActionKind::Application, "com.example.nav"),
        ]);
        let dimmer = DimmerConfig {
            mode: DimmerMode::AutoBrightness,
            ..Default::default()
        };
        Fixture {
            router: CommandRouter::new(mode, ButtonResolver::new(map), dimmer, dispatcher),
            actions,
        }
    }

    fn cmd(text: &str) -> Command {
        Command::parse(text).expect("should parse")
    }

    #[test]
    fn test_click_dispatches_bound_action() {
        let f = fixture(OperatingMode::Execute);
        f.router.route(&cmd("click:00104"));
        let action = f.actions.recv_timeout(Duration::from_secs(1)).expect("should fire");
        assert_eq!(action.name, MUTE);
        assert_eq!(action.trigger, Trigger::Click);
    }

    #[test]
    fn test_unmapped_click_is_noop() {
        let f = fixture(OperatingMode::Execute);
        f.router.route(&cmd("click:00700"));
        assert!(f.actions.recv_timeout(Duration::from_millis(100)).is_err());
    }

    #[test]
    fn test_hold_repeats_until_release() {
        let f = fixture(OperatingMode::Execute);
        f.router.route(&cmd("hold:00100"));
        assert_eq!(f.router.hold_status(), HoldStatus::Holding { reading: 100 });

        let first = f.actions.recv_timeout(Duration::from_secs(1)).expect("should fire");
        let second = f.actions.recv_timeout(Duration::from_secs(1)).expect("should repeat");
        assert_eq!(first.trigger, Trigger::Hold);
        assert_eq!(second.trigger, Trigger::Repeat(1));

        f.router.route(&cmd("release:00100"));
        assert_eq!(f.router.hold_status(), HoldStatus::Idle);
        thread::sleep(Duration::from_millis(20));
        let _ = f.actions.try_iter().count();
        assert!(f.actions.recv_timeout(Duration::from_millis(200)).is_err());
    }

    #[test]
    fn test_click_while_holding_ignored() {
        let f = fixture(OperatingMode::Execute);
        f.router.route(&cmd("hold:00600"));
        assert!(f.router.hold_status() != HoldStatus::Idle);
        f.router.route(&cmd("click:00100"));
        assert!(f.actions.recv_timeout(Duration::from_millis(100)).is_err());
    }

    #[test]
    fn test_reverse_and_dimmer() {
        let f = fixture(OperatingMode::Execute);
        f.router.route(&cmd("reverse:on"));
        f.router.route(&cmd("dimmer:on"));
        f.router.route(&cmd("dimmer:on"));
        f.router.route(&cmd("reverse:off"));

        let names: Vec<_> = (0..3)
            .map(|_| f.actions.recv_timeout(Duration::from_secs(1)).expect("should fire").name)
            .collect();
        assert_eq!(names, vec![LAUNCH_CAMERA, crate::actions::DIMMER_ON, CLOSE_CAMERA]);
        assert!(f.actions.recv_timeout(Duration::from_millis(100)).is_err());
    }

    #[test]
    fn test_learning_mode_forwards_to_observer() {
        let f = fixture(OperatingMode::Learn);
        let (tx, learned) = crossbeam_channel::unbounded::<LearnEvent>();
        f.router.set_observer(Arc::new(tx));

        f.router.route(&cmd("click:00104"));
        f.router.route(&cmd("dimmer:off"));
        f.router.route(&cmd("dimmer:0420"));
        f.router.route(&cmd("hold:00100"));

        assert_eq!(learned.try_recv(), Ok(LearnEvent::ButtonClicked(104)));
        assert_eq!(learned.try_recv(), Ok(LearnEvent::DimmerToggled(false)));
        assert_eq!(learned.try_recv(), Ok(LearnEvent::DimmerLevel(420)));
        assert!(learned.try_recv().is_err());
        assert_eq!(f.router.hold_status(), HoldStatus::Idle);
        assert!(f.actions.recv_timeout(Duration::from_millis(100)).is_err());
    }

    #[test]
    fn test_set_mode_releases_hold() {
        let f = fixture(OperatingMode::Execute);
        f.router.route(&cmd("hold:00600"));
        f.router.set_mode(OperatingMode::Learn);
        assert_eq!(f.router.hold_status(), HoldStatus::Idle);
        assert_eq!(f.router.mode(), OperatingMode::Learn);
    }

    #[test]
    fn test_custom_handler_and_device_id() {
        let f = fixture(OperatingMode::Execute);
        let (tx, seen) = crossbeam_channel::unbounded::<String>();
        f.router.register_handler(
            "Battery",
            Arc::new(move |command: &Command| {
                let _ = tx.send(command.data().to_string());
            }),
        );

        f.router.route(&cmd("battery:12.6"));
        f.router.route(&cmd("unknown:1"));
        f.router.route(&cmd("started:WHEEL-01"));

        assert_eq!(seen.try_recv(), Ok("12.6".to_string()));
        assert!(seen.try_recv().is_err());
        assert_eq!(f.router.device_id().as_deref(), Some("WHEEL-01"));
    }

    #[test]
    fn test_worker_routes_in_order_and_emits_events() {
        let f = fixture(OperatingMode::Execute);
        let router = Arc::new(f.router);
        let (events, event_rx) = EventSender::channel(16);
        let worker = spawn_command_worker(Arc::clone(&router), events);

        let tx = worker.sender();
        tx.send(WorkerMessage::Command(cmd("started:ABC")))
            .expect("worker should be running");
        tx.send(WorkerMessage::Command(cmd("click:00300")))
            .expect("worker should be running");
        worker.shutdown();

        assert_eq!(
            event_rx.try_recv(),
            Ok(ControllerEvent::DeviceStarted("ABC".to_string()))
        );
        assert!(matches!(event_rx.try_recv(), Ok(ControllerEvent::CommandReceived(_))));
        assert!(matches!(event_rx.try_recv(), Ok(ControllerEvent::CommandReceived(_))));

        let action = f.actions.recv_timeout(Duration::from_secs(1)).expect("should fire");
        assert_eq!(action.name, crate::actions::APPLICATION);
        assert_eq!(action.argument.as_deref(), Some("com.example.nav"));
    }
}
