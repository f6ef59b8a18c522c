//! Metrics infrastructure for the wheelctl controller bridge.
//!
//! Every metric recorded by the bridge is declared here as a structured
//! [`Metric`] constant so names stay consistent between the recording sites
//! and whatever exporter the host installs. Recording is a no-op until a
//! recorder is installed with the `metrics` crate.
//!
//! # Example
//!
//! ```rust
//! use wheelctl_metrics::{metric_defs, Metric, MetricKind};
//!
//! assert_eq!(metric_defs::FRAMES_DECODED.kind, MetricKind::Counter);
//!
//! metrics::counter!(metric_defs::FRAMES_DROPPED.name, "reason" => "checksum").increment(1);
//! ```

pub use metrics;

use metrics::{KeyName, Recorder, SharedString, Unit};

/// Counter, gauge or histogram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Gauge,
    Histogram,
}

impl MetricKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Histogram => "histogram",
        }
    }
}

/// Compile-time declaration of one bridge metric.
///
/// ```rust
/// use wheelctl_metrics::{Metric, MetricKind};
/// use metrics::Unit;
///
/// const BYTES_IN: Metric = Metric::counter("wheelctl.transport.bytes_in")
///     .with_description("Bytes received from the controller")
///     .with_unit(Unit::Bytes)
///     .with_labels(&["transport"]);
///
/// assert_eq!(BYTES_IN.kind, MetricKind::Counter);
/// ```
#[derive(Debug, Clone)]
pub struct Metric {
    /// Dotted name, `wheelctl.<area>.<what>`.
    pub name: &'static str,
    pub kind: MetricKind,
    pub description: &'static str,
    pub unit: Option<Unit>,
    /// Label keys recorded with this metric.
    pub labels: &'static [&'static str],
}

impl Metric {
    const fn declare(name: &'static str, kind: MetricKind) -> Self {
        Metric {
            name,
            kind,
            description: "",
            unit: None,
            labels: &[],
        }
    }

    pub const fn counter(name: &'static str) -> Self {
        Self::declare(name, MetricKind::Counter)
    }

    pub const fn gauge(name: &'static str) -> Self {
        Self::declare(name, MetricKind::Gauge)
    }

    pub const fn histogram(name: &'static str) -> Self {
        Self::declare(name, MetricKind::Histogram)
    }

    pub const fn with_description(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    pub const fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = Some(unit);
        self
    }

    pub const fn with_labels(mut self, labels: &'static [&'static str]) -> Self {
        self.labels = labels;
        self
    }

    /// Hand this metric's unit and description to the installed recorder.
    pub fn describe(&self) {
        let key = KeyName::from_const_str(self.name);
        let description = SharedString::const_str(self.description);
        metrics::with_recorder(|recorder: &dyn Recorder| match self.kind {
            MetricKind::Counter => recorder.describe_counter(key, self.unit, description),
            MetricKind::Gauge => recorder.describe_gauge(key, self.unit, description),
            MetricKind::Histogram => recorder.describe_histogram(key, self.unit, description),
        });
    }
}

/// All metric definitions for the bridge.
pub mod metric_defs {
    use super::{Metric, Unit};

    // ========================================================================
    // Framing
    // ========================================================================

    /// Frames that passed checksum validation.
    pub const FRAMES_DECODED: Metric = Metric::counter("wheelctl.frame.decoded")
        .with_description("Frames that passed checksum validation")
        .with_unit(Unit::Count);

    /// Frames dropped by the decoder.
    ///
    /// Labels: reason (checksum, marker_mid_frame, invalid_escape)
    pub const FRAMES_DROPPED: Metric = Metric::counter("wheelctl.frame.dropped")
        .with_description("Frames dropped by the decoder")
        .with_unit(Unit::Count)
        .with_labels(&["reason"]);

    pub const NOISE_BYTES: Metric = Metric::counter("wheelctl.frame.noise_bytes")
        .with_description("Bytes discarded outside any frame")
        .with_unit(Unit::Bytes);

    // ========================================================================
    // Commands
    // ========================================================================

    /// Labels: command
    pub const COMMANDS_PARSED: Metric = Metric::counter("wheelctl.command.parsed")
        .with_description("Commands parsed from valid frames")
        .with_unit(Unit::Count)
        .with_labels(&["command"]);

    pub const COMMANDS_REJECTED: Metric = Metric::counter("wheelctl.command.rejected")
        .with_description("Frame payloads that did not parse as COMMAND:DATA")
        .with_unit(Unit::Count);

    /// Commands that arrived while the pipeline was shutting down.
    pub const COMMANDS_DISCARDED: Metric = Metric::counter("wheelctl.command.discarded")
        .with_description("Commands dropped because the connection was closing")
        .with_unit(Unit::Count);

    /// Labels: anomaly (hold_while_holding, release_while_idle, click_while_holding)
    pub const STATE_ANOMALIES: Metric = Metric::counter("wheelctl.hold.anomalies")
        .with_description("Click/hold/release events with no valid state transition")
        .with_unit(Unit::Count)
        .with_labels(&["anomaly"]);

    // ========================================================================
    // Actions
    // ========================================================================

    /// Labels: action, trigger
    pub const ACTIONS_DISPATCHED: Metric = Metric::counter("wheelctl.action.dispatched")
        .with_description("Actions handed to the action sink")
        .with_unit(Unit::Count)
        .with_labels(&["action", "trigger"]);

    /// Labels: trigger
    pub const ACTIONS_UNMAPPED: Metric = Metric::counter("wheelctl.action.unmapped")
        .with_description("Readings that matched no button binding")
        .with_unit(Unit::Count)
        .with_labels(&["trigger"]);

    /// Labels: action
    pub const ACTION_FAILURES: Metric = Metric::counter("wheelctl.action.failures")
        .with_description("Actions the sink reported as failed")
        .with_unit(Unit::Count)
        .with_labels(&["action"]);

    /// Labels: action
    pub const HOLD_REPEATS: Metric = Metric::counter("wheelctl.action.hold_repeats")
        .with_description("Repeat firings of a held action")
        .with_unit(Unit::Count)
        .with_labels(&["action"]);

    pub const ACTIVE_HOLDS: Metric = Metric::gauge("wheelctl.action.active_holds")
        .with_description("Repeat loops currently running");

    // ========================================================================
    // Connection
    // ========================================================================

    /// Labels: outcome (ready, not_ready, timeout, open_failed)
    pub const CONNECTION_ATTEMPTS: Metric = Metric::counter("wheelctl.connection.attempts")
        .with_description("Connection attempts by outcome")
        .with_unit(Unit::Count)
        .with_labels(&["outcome"]);

    pub const CONNECT_TIME: Metric = Metric::histogram("wheelctl.connection.connect_time_ms")
        .with_description("Time from connect() to the device signalling ready")
        .with_unit(Unit::Milliseconds);

    pub const DEVICE_ERRORS: Metric = Metric::counter("wheelctl.connection.device_errors")
        .with_description("Transport-level failures reported by the device")
        .with_unit(Unit::Count);

    pub const EVENTS_DROPPED: Metric = Metric::counter("wheelctl.events.dropped")
        .with_description("Controller events dropped because the event channel was full")
        .with_unit(Unit::Count);

    /// Returns a slice of all defined metrics.
    pub const ALL: &[&Metric] = &[
        // Framing
        &FRAMES_DECODED,
        &FRAMES_DROPPED,
        &NOISE_BYTES,
        // Commands
        &COMMANDS_PARSED,
        &COMMANDS_REJECTED,
        &COMMANDS_DISCARDED,
        &STATE_ANOMALIES,
        // Actions
        &ACTIONS_DISPATCHED,
        &ACTIONS_UNMAPPED,
        &ACTION_FAILURES,
        &HOLD_REPEATS,
        &ACTIVE_HOLDS,
        // Connection
        &CONNECTION_ATTEMPTS,
        &CONNECT_TIME,
        &DEVICE_ERRORS,
        &EVENTS_DROPPED,
    ];
}

/// Install a Prometheus recorder serving `/metrics` on `addr`, then
/// describe every bridge metric to it.
#[cfg(feature = "prometheus")]
pub fn install_prometheus(
    addr: std::net::SocketAddr,
) -> Result<(), metrics_exporter_prometheus::BuildError> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    describe_metrics();
    Ok(())
}

/// Describes all metrics used by the bridge.
///
/// Call once at startup, after installing a recorder.
pub fn describe_metrics() {
    for metric in metric_defs::ALL {
        metric.describe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_definitions() {
        assert_eq!(metric_defs::FRAMES_DECODED.name, "wheelctl.frame.decoded");
        assert_eq!(metric_defs::FRAMES_DECODED.kind, MetricKind::Counter);
        assert_eq!(metric_defs::FRAMES_DROPPED.labels, &["reason"]);
        assert_eq!(metric_defs::NOISE_BYTES.unit, Some(Unit::Bytes));
        assert_eq!(metric_defs::ACTIVE_HOLDS.kind, MetricKind::Gauge);
        assert_eq!(metric_defs::CONNECT_TIME.kind, MetricKind::Histogram);
        assert_eq!(metric_defs::CONNECT_TIME.unit, Some(Unit::Milliseconds));
    }

    #[test]
    fn test_metric_names_unique() {
        let mut names: Vec<_> = metric_defs::ALL.iter().map(|m| m.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), metric_defs::ALL.len());
    }

    #[test]
    fn test_describe_without_recorder() {
        // No recorder installed; must not panic.
        describe_metrics();
    }
}
