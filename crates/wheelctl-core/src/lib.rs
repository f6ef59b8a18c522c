//! Steering wheel controller core.
//!
//! Turns the controller's framed serial stream into host actions:
//!
//! ```text
//! Transport reader ──bytes──> TransportSink (FrameDecoder + parser)
//!                                   │ Command
//!                                   ▼
//!                           command worker ──> CommandRouter
//!                                                 │
//!                 ┌───────────────────────────────┼───────────────────┐
//!                 ▼                               ▼                   ▼
//!          ButtonResolver                 HoldStateTracker      DimmerController
//!                 │                               │
//!                 └──────────> ActionDispatcher <─┘
//!                               │            │
//!                        "actions" worker   one repeat thread per hold
//!                               │            │
//!                               └──> ActionSink
//! ```
//!
//! [`ConnectionLifecycle`] ties it together and reports
//! [`ControllerEvent`]s on a bounded channel.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use wheelctl_core::{
//!     actions, ActionInvocation, ActionKind, ButtonBinding, ButtonMap, ChannelTransport,
//!     ConnectionLifecycle, ControllerConfig, DimmerConfig,
//! };
//!
//! let (transport, device) = ChannelTransport::pair();
//! let (tx, performed) = crossbeam_channel::unbounded::<ActionInvocation>();
//! let buttons = ButtonMap::new(vec![
//!     ButtonBinding::new(100, 10).on_click(ActionKind::Builtin, actions::NEXT),
//! ]);
//!
//! let mut lifecycle = ConnectionLifecycle::new(
//!     Box::new(transport),
//!     ControllerConfig::default(),
//!     buttons,
//!     DimmerConfig::default(),
//!     Arc::new(tx),
//! );
//! lifecycle.connect().unwrap();
//!
//! device.send_command("click:00103").unwrap();
//! let action = performed.recv_timeout(Duration::from_secs(1)).unwrap();
//! assert_eq!(action.name, actions::NEXT);
//! ```

pub mod actions;
pub mod buttons;
pub mod channel;
pub mod config;
pub mod dimmer;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod hold;
pub mod lifecycle;
pub mod router;
pub mod tcp;
pub mod transport;

pub use actions::{ActionCatalog, ActionInvocation, ActionMode, ActionSink, Trigger};
pub use buttons::{
    ActionKind, ActionRef, ButtonBinding, ButtonMap, ButtonResolver, SharedButtonMap,
    TOLERANCE_MULTIPLIER,
};
pub use channel::{ChannelTransport, DeviceEndpoint, ReadyBehavior};
pub use config::{load_config, parse_config, BridgeConfig, ControllerConfig, TransportConfig};
pub use dimmer::{DimmerConfig, DimmerController, DimmerMode};
pub use dispatch::{ActionDispatcher, RepeatHandle};
pub use error::{ActionError, ConfigError, LifecycleError, Result, TransportError};
pub use events::{ConnectionState, ControllerEvent, EventSender};
pub use hold::{HoldAnomaly, HoldStateTracker, HoldStatus};
pub use lifecycle::{ConnectionLifecycle, DeviceHandle};
pub use router::{
    spawn_command_worker, CommandHandler, CommandRouter, CommandWorkerHandle, LearnEvent,
    LearnObserver, OperatingMode, WorkerMessage,
};
pub use tcp::TcpTransport;
pub use transport::{Transport, TransportSink};

pub use wheelctl_protocol as protocol;
