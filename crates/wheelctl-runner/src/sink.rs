//! Action sink for the command-line bridge.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::info;
use wheelctl_core::{ActionError, ActionInvocation, ActionSink};

/// Logs every action it is asked to perform.
///
/// Stands in for the host integration (media session, volume, brightness)
/// when the bridge runs headless.
#[derive(Debug, Default)]
pub struct LoggingActionSink {
    performed: AtomicU64,
}

impl LoggingActionSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of actions performed so far.
    pub fn performed(&self) -> u64 {
        self.performed.load(Ordering::Relaxed)
    }
}

impl ActionSink for LoggingActionSink {
    fn perform(&self, invocation: &ActionInvocation) -> Result<(), ActionError> {
        self.performed.fetch_add(1, Ordering::Relaxed);
        info!(
            target: "wheelctl::action",
            action = %invocation.name,
            argument = invocation.argument.as_deref().unwrap_or(""),
            trigger = invocation.trigger.as_str(),
            "perform"
        );
        Ok(())
    }
}
