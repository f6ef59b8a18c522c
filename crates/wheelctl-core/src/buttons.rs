//! Button bindings and reading-to-button resolution.
//!
//! The wheel buttons sit on a resistor ladder, so the controller reports an
//! analog reading rather than a button number. Each [`ButtonBinding`] claims
//! the readings within its tolerance of its id; the first binding in the map
//! that claims a reading wins.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use wheelctl_metrics::metric_defs;

use crate::error::ConfigError;

/// Tolerance is scaled by this factor when a binding's `multiplied` flag is set.
pub const TOLERANCE_MULTIPLIER: i64 = 10;

/// What kind of action a binding triggers.
///
/// Older button files name the built-in groups ("Volume", "Media",
/// "Integrated"); those all load as [`ActionKind::Builtin`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ActionKind {
    /// Bound, but nothing happens.
    #[default]
    #[serde(alias = "none")]
    None,
    /// A named action from the [`crate::ActionCatalog`].
    #[serde(
        alias = "builtin",
        alias = "Built-in",
        alias = "Volume",
        alias = "Media",
        alias = "Integrated"
    )]
    Builtin,
    /// Launch an application; the action name is the application id.
    #[serde(alias = "application")]
    Application,
    /// Run a Tasker task; the action name is the task name.
    #[serde(alias = "tasker")]
    Tasker,
    /// Switch audio source; the action name is the source.
    #[serde(alias = "Set Audio Source", alias = "audio_source")]
    AudioSource,
}

/// One configured button.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ButtonBinding {
    /// Nominal reading for this button.
    pub id: i32,
    #[serde(default)]
    pub tolerance: i32,
    /// Scale `tolerance` by [`TOLERANCE_MULTIPLIER`].
    #[serde(default)]
    pub multiplied: bool,
    #[serde(default)]
    pub click_type: ActionKind,
    #[serde(default)]
    pub click_action: String,
    #[serde(default)]
    pub hold_type: ActionKind,
    #[serde(default)]
    pub hold_action: String,
}

impl ButtonBinding {
    /// A binding with no actions; use the builder methods to attach some.
    pub fn new(id: i32, tolerance: i32) -> Self {
        ButtonBinding {
            id,
            tolerance,
            multiplied: false,
            click_type: ActionKind::None,
            click_action: String::new(),
            hold_type: ActionKind::None,
            hold_action: String::new(),
        }
    }

    pub fn multiplied(mut self, multiplied: bool) -> Self {
        self.multiplied = multiplied;
        self
    }

    pub fn on_click(mut self, kind: ActionKind, action: impl Into<String>) -> Self {
        self.click_type = kind;
        self.click_action = action.into();
        self
    }

    pub fn on_hold(mut self, kind: ActionKind, action: impl Into<String>) -> Self {
        self.hold_type = kind;
        self.hold_action = action.into();
        self
    }

    /// Tolerance after applying the multiplier flag.
    pub fn effective_tolerance(&self) -> i64 {
        let tolerance = self.tolerance as i64;
        if self.multiplied {
            tolerance * TOLERANCE_MULTIPLIER
        } else {
            tolerance
        }
    }

    /// Whether `reading` lies in `[id - tolerance, id + tolerance]`.
    pub fn accepts(&self, reading: i32) -> bool {
        let tolerance = self.effective_tolerance();
        let id = self.id as i64;
        let reading = reading as i64;
        (id - tolerance..=id + tolerance).contains(&reading)
    }

    /// The click or hold action of this binding.
    pub fn action(&self, is_click: bool) -> ActionRef {
        let (kind, action) = if is_click {
            (self.click_type, &self.click_action)
        } else {
            (self.hold_type, &self.hold_action)
        };
        ActionRef {
            binding_id: self.id,
            kind,
            action: action.clone(),
        }
    }
}

/// A resolved action, as named by a binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRef {
    /// Id of the binding that matched.
    pub binding_id: i32,
    pub kind: ActionKind,
    pub action: String,
}

/// Ordered list of button bindings. Order is the tie-break for overlapping ranges.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ButtonMap(Vec<ButtonBinding>);

impl ButtonMap {
    pub fn new(bindings: Vec<ButtonBinding>) -> Self {
        ButtonMap(bindings)
    }

    /// Load the legacy JSON button list.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn bindings(&self) -> &[ButtonBinding] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// First binding (in configured order) that accepts `reading`.
    pub fn find(&self, reading: i32) -> Option<&ButtonBinding> {
        self.0.iter().find(|binding| binding.accepts(reading))
    }

    /// Resolve a reading to the click or hold action of the first accepting binding.
    pub fn resolve(&self, reading: i32, is_click: bool) -> Option<ActionRef> {
        self.find(reading).map(|binding| binding.action(is_click))
    }
}

impl From<Vec<ButtonBinding>> for ButtonMap {
    fn from(bindings: Vec<ButtonBinding>) -> Self {
        ButtonMap(bindings)
    }
}

/// A button map shared between the resolver and whoever edits the configuration.
///
/// Readers clone the inner `Arc` and iterate without holding the lock; writers
/// swap the whole table.
pub type SharedButtonMap = Arc<RwLock<Arc<ButtonMap>>>;

/// Resolves readings against the current button map.
#[derive(Debug, Clone, Default)]
pub struct ButtonResolver {
    map: SharedButtonMap,
}

impl ButtonResolver {
    pub fn new(map: ButtonMap) -> Self {
        ButtonResolver {
            map: Arc::new(RwLock::new(Arc::new(map))),
        }
    }

    /// Resolver over an existing shared map.
    pub fn with_shared(map: SharedButtonMap) -> Self {
        ButtonResolver { map }
    }

    pub fn shared(&self) -> SharedButtonMap {
        Arc::clone(&self.map)
    }

    /// The map currently in effect.
    pub fn snapshot(&self) -> Arc<ButtonMap> {
        Arc::clone(&self.map.read())
    }

    /// Replace the whole map. Resolutions already in progress finish on the old map.
    pub fn replace(&self, map: ButtonMap) {
        let count = map.len();
        *self.map.write() = Arc::new(map);
        debug!("ButtonResolver: button map replaced ({} bindings)", count);
    }

    /// Resolve `reading` to an action. `None` means no binding claims the reading.
    pub fn resolve(&self, reading: i32, is_click: bool) -> Option<ActionRef> {
        let map = self.snapshot();
        let resolved = map.resolve(reading, is_click);
        if resolved.is_none() {
            let trigger = if is_click { "click" } else { "hold" };
            info!("ButtonResolver: no button mapped to {} reading {}", trigger, reading);
            metrics::counter!(metric_defs::ACTIONS_UNMAPPED.name, "trigger" => trigger)
                .increment(1);
        }
        resolved
    }
}
