//! Action catalog, invocations and the host-side action sink.

use std::collections::HashMap;
use std::fmt;

use crossbeam_channel::Sender;

use crate::buttons::{ActionKind, ActionRef};
use crate::error::ActionError;

// ============================================================================
// Action names
// ============================================================================

pub const VOLUME_UP: &str = "Volume Up";
pub const VOLUME_DOWN: &str = "Volume Down";
pub const MUTE: &str = "Mute";
pub const NEXT: &str = "Next";
pub const PREVIOUS: &str = "Previous";
pub const PLAY_PAUSE: &str = "Play/Pause";
pub const FAST_FORWARD: &str = "Fast Forward";
pub const REWIND: &str = "Rewind";
pub const LAUNCH_CAMERA: &str = "Launch Camera";
pub const CLOSE_CAMERA: &str = "Close Camera";
pub const TOGGLE_CAMERA: &str = "Toggle Camera";
pub const DIMMER_ON: &str = "Dimmer On";
pub const DIMMER_OFF: &str = "Dimmer Off";
pub const DIMMER_LEVEL: &str = "Dimmer Level";
pub const TOGGLE_AUTO_BRIGHTNESS: &str = "Toggle Auto-Brightness";
pub const APPLICATION: &str = "Application";
pub const TASKER: &str = "Tasker";
pub const SET_AUDIO_SOURCE: &str = "Set Audio Source";
pub const TOGGLE_AUDIO_SOURCE: &str = "Toggle Audio Source";

/// Whether an action fires once or repeats while its button is held.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionMode {
    Simple,
    Repeating,
}

/// Known action names and how each one runs.
#[derive(Debug, Clone)]
pub struct ActionCatalog {
    actions: HashMap<String, ActionMode>,
}

impl Default for ActionCatalog {
    fn default() -> Self {
        let mut catalog = ActionCatalog::empty();
        for name in [VOLUME_UP, VOLUME_DOWN, NEXT, PREVIOUS] {
            catalog.register(name, ActionMode::Repeating);
        }
        for name in [
            MUTE,
            PLAY_PAUSE,
            FAST_FORWARD,
            REWIND,
            LAUNCH_CAMERA,
            CLOSE_CAMERA,
            TOGGLE_CAMERA,
            DIMMER_ON,
            DIMMER_OFF,
            DIMMER_LEVEL,
            TOGGLE_AUTO_BRIGHTNESS,
            APPLICATION,
            TASKER,
            SET_AUDIO_SOURCE,
            TOGGLE_AUDIO_SOURCE,
        ] {
            catalog.register(name, ActionMode::Simple);
        }
        catalog
    }
}

impl ActionCatalog {
    /// A catalog with no actions.
    pub fn empty() -> Self {
        ActionCatalog {
            actions: HashMap::new(),
        }
    }

    /// Add or redefine an action.
    pub fn register(&mut self, name: impl Into<String>, mode: ActionMode) {
        self.actions.insert(name.into(), mode);
    }

    pub fn mode(&self, name: &str) -> Option<ActionMode> {
        self.actions.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// What caused an action to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Click,
    /// First firing of a hold.
    Hold,
    /// Nth repeat of a hold (1-based).
    Repeat(u32),
    /// A device line change (dimmer, reverse).
    Device,
}

impl Trigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trigger::Click => "click",
            Trigger::Hold => "hold",
            Trigger::Repeat(_) => "repeat",
            Trigger::Device => "device",
        }
    }
}

/// A single request to perform an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionInvocation {
    pub name: String,
    pub argument: Option<String>,
    pub trigger: Trigger,
}

impl ActionInvocation {
    pub fn new(name: impl Into<String>, trigger: Trigger) -> Self {
        ActionInvocation {
            name: name.into(),
            argument: None,
            trigger,
        }
    }

    pub fn with_argument(mut self, argument: impl Into<String>) -> Self {
        self.argument = Some(argument.into());
        self
    }

    /// Translate a binding's action into an invocation.
    ///
    /// Application, Tasker and audio source bindings run the catalog action
    /// named after their kind, with the bound name as the argument. Returns
    /// `None` for [`ActionKind::None`].
    pub fn from_action_ref(action: &ActionRef, trigger: Trigger) -> Option<Self> {
        let invocation = match action.kind {
            ActionKind::None => return None,
            ActionKind::Builtin => ActionInvocation::new(action.action.clone(), trigger),
            ActionKind::Application => {
                ActionInvocation::new(APPLICATION, trigger).with_argument(action.action.clone())
            }
            ActionKind::Tasker => {
                ActionInvocation::new(TASKER, trigger).with_argument(action.action.clone())
            }
            ActionKind::AudioSource => ActionInvocation::new(SET_AUDIO_SOURCE, trigger)
                .with_argument(action.action.clone()),
        };
        Some(invocation)
    }

    /// Same action, different trigger.
    pub fn retriggered(&self, trigger: Trigger) -> Self {
        ActionInvocation {
            trigger,
            ..self.clone()
        }
    }
}

impl fmt::Display for ActionInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.argument {
            Some(arg) => write!(f, "{}({}) [{}]", self.name, arg, self.trigger.as_str()),
            None => write!(f, "{} [{}]", self.name, self.trigger.as_str()),
        }
    }
}

/// Performs actions on behalf of the controller.
///
/// Called from the action worker and from hold repeat threads, never from the
/// byte reader.
pub trait ActionSink: Send + Sync {
    fn perform(&self, invocation: &ActionInvocation) -> Result<(), ActionError>;
}

impl<F> ActionSink for F
where
    F: Fn(&ActionInvocation) -> Result<(), ActionError> + Send + Sync,
{
    fn perform(&self, invocation: &ActionInvocation) -> Result<(), ActionError> {
        self(invocation)
    }
}

/// Forwards invocations to a channel, e.g. for a host event loop.
impl ActionSink for Sender<ActionInvocation> {
    fn perform(&self, invocation: &ActionInvocation) -> Result<(), ActionError> {
        self.send(invocation.clone())
            .map_err(|_| ActionError::Failed("action receiver dropped".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action(kind: ActionKind, name: &str) -> ActionRef {
        ActionRef {
            binding_id: 1,
            kind,
            action: name.to_string(),
        }
    }

    #[test]
    fn test_default_catalog_modes() {
        let catalog = ActionCatalog::default();
        assert_eq!(catalog.mode(VOLUME_UP), Some(ActionMode::Repeating));
        assert_eq!(catalog.mode(PREVIOUS), Some(ActionMode::Repeating));
        assert_eq!(catalog.mode(MUTE), Some(ActionMode::Simple));
        assert_eq!(catalog.mode(SET_AUDIO_SOURCE), Some(ActionMode::Simple));
        assert_eq!(catalog.mode("Self Destruct"), None);
        assert_eq!(catalog.len(), 19);
    }

    #[test]
    fn test_invocation_from_builtin() {
        let inv = ActionInvocation::from_action_ref(&action(ActionKind::Builtin, NEXT), Trigger::Click)
            .expect("should map");
        assert_eq!(inv.name, NEXT);
        assert_eq!(inv.argument, None);
    }

    #[test]
    fn test_invocation_from_argument_kinds() {
        let inv = ActionInvocation::from_action_ref(
            &action(ActionKind::Application, "com.example.maps"),
            Trigger::Click,
        )
        .expect("should map");
        assert_eq!(inv.name, APPLICATION);
        assert_eq!(inv.argument.as_deref(), Some("com.example.maps"));

        let inv = ActionInvocation::from_action_ref(&action(ActionKind::Tasker, "Night"), Trigger::Hold)
            .expect("should map");
        assert_eq!(inv.name, TASKER);

        let inv = ActionInvocation::from_action_ref(&action(ActionKind::AudioSource, "FM"), Trigger::Click)
            .expect("should map");
        assert_eq!(inv.name, SET_AUDIO_SOURCE);
        assert_eq!(inv.argument.as_deref(), Some("FM"));
    }

    #[test]
    fn test_invocation_from_none_kind() {
        assert!(ActionInvocation::from_action_ref(&action(ActionKind::None, ""), Trigger::Click).is_none());
    }

    #[test]
    fn test_closure_and_channel_sinks() {
        let sink = |inv: &ActionInvocation| {
            if inv.name == MUTE {
                Ok(())
            } else {
                Err(ActionError::Unsupported(inv.name.clone()))
            }
        };
        assert!(sink.perform(&ActionInvocation::new(MUTE, Trigger::Click)).is_ok());
        assert!(sink.perform(&ActionInvocation::new(NEXT, Trigger::Click)).is_err());

        let (tx, rx) = crossbeam_channel::unbounded();
        tx.perform(&ActionInvocation::new(REWIND, Trigger::Device))
            .expect("should forward");
        assert_eq!(rx.try_recv().expect("should receive").name, REWIND);
        drop(rx);
        assert!(tx.perform(&ActionInvocation::new(REWIND, Trigger::Device)).is_err());
    }

    #[test]
    fn test_display() {
        let inv = ActionInvocation::new(DIMMER_LEVEL, Trigger::Device).with_argument("128");
        assert_eq!(inv.to_string(), "Dimmer Level(128) [device]");
        assert_eq!(
            inv.retriggered(Trigger::Repeat(2)).trigger,
            Trigger::Repeat(2)
        );
    }
}
