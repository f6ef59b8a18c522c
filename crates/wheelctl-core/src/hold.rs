//! Click/hold/release state tracking.
//!
//! The controller reports one button at a time, so there is a single channel:
//! either nothing is held or one reading is held. Transitions that make no
//! sense (a second hold, a release with nothing held, a click mid-hold) are
//! logged and ignored rather than treated as errors.

use std::fmt;

use parking_lot::Mutex;
use tracing::{debug, warn};
use wheelctl_metrics::metric_defs;

use crate::dispatch::RepeatHandle;

/// Observable hold state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldStatus {
    Idle,
    Holding { reading: i32 },
}

/// A click/hold/release that arrived in a state with no valid transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldAnomaly {
    HoldWhileHolding { held: i32, reading: i32 },
    ReleaseWhileIdle { reading: Option<i32> },
    ClickWhileHolding { held: i32, reading: i32 },
}

impl HoldAnomaly {
    pub fn label(&self) -> &'static str {
        match self {
            HoldAnomaly::HoldWhileHolding { .. } => "hold_while_holding",
            HoldAnomaly::ReleaseWhileIdle { .. } => "release_while_idle",
            HoldAnomaly::ClickWhileHolding { .. } => "click_while_holding",
        }
    }

    fn report(self) -> Self {
        warn!("HoldStateTracker: {}", self);
        metrics::counter!(metric_defs::STATE_ANOMALIES.name, "anomaly" => self.label())
            .increment(1);
        self
    }
}

impl fmt::Display for HoldAnomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HoldAnomaly::HoldWhileHolding { held, reading } => write!(
                f,
                "hold {} received while already holding {}",
                reading, held
            ),
            HoldAnomaly::ReleaseWhileIdle { reading: Some(r) } => {
                write!(f, "release {} received while not holding", r)
            }
            HoldAnomaly::ReleaseWhileIdle { reading: None } => {
                write!(f, "release received while not holding")
            }
            HoldAnomaly::ClickWhileHolding { held, reading } => write!(
                f,
                "click {} received while holding {}",
                reading, held
            ),
        }
    }
}

#[derive(Debug)]
enum HoldState {
    Idle,
    Holding {
        reading: i32,
        /// Dropping the handle stops the repeat loop.
        _repeat: Option<RepeatHandle>,
    },
}

/// Tracks whether a button is held and owns the repeat loop of the held action.
#[derive(Debug)]
pub struct HoldStateTracker {
    state: Mutex<HoldState>,
}

impl Default for HoldStateTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl HoldStateTracker {
    pub fn new() -> Self {
        HoldStateTracker {
            state: Mutex::new(HoldState::Idle),
        }
    }

    pub fn status(&self) -> HoldStatus {
        match &*self.state.lock() {
            HoldState::Idle => HoldStatus::Idle,
            HoldState::Holding { reading, .. } => HoldStatus::Holding { reading: *reading },
        }
    }

    pub fn is_holding(&self) -> bool {
        matches!(self.status(), HoldStatus::Holding { .. })
    }

    /// Idle → Holding. `start` runs once, under the state lock, and may hand
    /// back the repeat loop of the held action.
    ///
    /// A hold that resolves to nothing still enters Holding so that its
    /// release is not reported as an anomaly.
    pub fn begin_hold<F>(&self, reading: i32, start: F) -> Result<(), HoldAnomaly>
    where
        F: FnOnce() -> Option<RepeatHandle>,
    {
        let mut state = self.state.lock();
        if let HoldState::Holding { reading: held, .. } = &*state {
            return Err(HoldAnomaly::HoldWhileHolding {
                held: *held,
                reading,
            }
            .report());
        }
        let repeat = start();
        debug!(
            "HoldStateTracker: holding {}{}",
            reading,
            if repeat.is_some() { " (repeating)" } else { "" }
        );
        *state = HoldState::Holding {
            reading,
            _repeat: repeat,
        };
        Ok(())
    }

    /// Holding → Idle, cancelling the repeat loop. Ends the current hold
    /// whatever the reading.
    pub fn release(&self, reading: Option<i32>) -> Result<(), HoldAnomaly> {
        let previous = {
            let mut state = self.state.lock();
            if matches!(&*state, HoldState::Idle) {
                return Err(HoldAnomaly::ReleaseWhileIdle { reading }.report());
            }
            std::mem::replace(&mut *state, HoldState::Idle)
        };
        if let HoldState::Holding { reading: held, .. } = &previous {
            debug!("HoldStateTracker: released {}", held);
        }
        drop(previous);
        Ok(())
    }

    /// Clicks are only valid while idle.
    pub fn check_click(&self, reading: i32) -> Result<(), HoldAnomaly> {
        match &*self.state.lock() {
            HoldState::Idle => Ok(()),
            HoldState::Holding { reading: held, .. } => Err(HoldAnomaly::ClickWhileHolding {
                held: *held,
                reading,
            }
            .report()),
        }
    }

    /// Drop any hold, cancelling its repeat loop. Returns whether one was active.
    pub fn release_all(&self) -> bool {
        let previous = std::mem::replace(&mut *self.state.lock(), HoldState::Idle);
        let was_holding = matches!(previous, HoldState::Holding { .. });
        if was_holding {
            debug!("HoldStateTracker: all holds released");
        }
        was_holding
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    fn handle() -> (RepeatHandle, Arc<AtomicBool>, crossbeam_channel::Receiver<()>) {
        let active = Arc::new(AtomicBool::new(true));
        let (tx, rx) = crossbeam_channel::bounded(0);
        (
            RepeatHandle::new("Volume Up".to_string(), Arc::clone(&active), tx),
            active,
            rx,
        )
    }

    #[test]
    fn test_hold_then_release() {
        let tracker = HoldStateTracker::new();
        let (repeat, active, stop_rx) = handle();

        tracker
            .begin_hold(50, || Some(repeat))
            .expect("idle tracker should accept hold");
        assert_eq!(tracker.status(), HoldStatus::Holding { reading: 50 });
        assert!(active.load(std::sync::atomic::Ordering::SeqCst));

        tracker.release(Some(50)).expect("should release");
        assert_eq!(tracker.status(), HoldStatus::Idle);
        assert!(!active.load(std::sync::atomic::Ordering::SeqCst));
        assert!(stop_rx.recv().is_err(), "repeat loop should be woken");
    }

    #[test]
    fn test_hold_while_holding_does_not_restart() {
        let tracker = HoldStateTracker::new();
        let (repeat, active, _stop_rx) = handle();
        tracker.begin_hold(50, || Some(repeat)).expect("should hold");

        let mut started = false;
        let err = tracker
            .begin_hold(80, || {
                started = true;
                None
            })
            .expect_err("second hold should be anomalous");
        assert_eq!(err, HoldAnomaly::HoldWhileHolding { held: 50, reading: 80 });
        assert!(!started);
        assert!(active.load(std::sync::atomic::Ordering::SeqCst));
        assert_eq!(tracker.status(), HoldStatus::Holding { reading: 50 });
    }

    #[test]
    fn test_release_while_idle() {
        let tracker = HoldStateTracker::new();
        assert_eq!(
            tracker.release(Some(10)),
            Err(HoldAnomaly::ReleaseWhileIdle { reading: Some(10) })
        );
        assert_eq!(tracker.status(), HoldStatus::Idle);
    }

    #[test]
    fn test_click_while_holding() {
        let tracker = HoldStateTracker::new();
        assert!(tracker.check_click(10).is_ok());
        tracker.begin_hold(50, || None).expect("should hold");
        assert_eq!(
            tracker.check_click(10),
            Err(HoldAnomaly::ClickWhileHolding { held: 50, reading: 10 })
        );
    }

    #[test]
    fn test_unresolved_hold_still_holds() {
        let tracker = HoldStateTracker::new();
        tracker.begin_hold(999, || None).expect("should hold");
        assert!(tracker.is_holding());
        // Release with a different reading still ends the hold.
        tracker.release(Some(5)).expect("should release");
        assert!(!tracker.is_holding());
    }

    #[test]
    fn test_release_all() {
        let tracker = HoldStateTracker::new();
        assert!(!tracker.release_all());
        let (repeat, active, _stop_rx) = handle();
        tracker.begin_hold(50, || Some(repeat)).expect("should hold");
        assert!(tracker.release_all());
        assert!(!active.load(std::sync::atomic::Ordering::SeqCst));
        assert_eq!(tracker.status(), HoldStatus::Idle);
    }
}
