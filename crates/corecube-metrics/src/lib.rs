//! Metrics infrastructure for the Core Cube client.
//!
//! Every counter, gauge and histogram the client emits is declared here as a
//! structured [`Metric`] constant, so call sites never spell a metric name by
//! hand. The `metrics` crate is re-exported for convenience.
//!
//! # Example
//!
//! ```rust,ignore
//! use corecube_metrics::{CubeLabels, metric_defs, describe_metrics};
//!
//! // Initialize metrics descriptions at startup
//! describe_metrics();
//!
//! let labels = CubeLabels::new("4f1c0a").with_characteristic("battery");
//! metrics::counter!(metric_defs::GATT_READS_ISSUED.name, &labels.to_labels()).increment(1);
//! ```

pub use metrics;

use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};

/// The kind of metric (counter, gauge, or histogram).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// A monotonically increasing counter.
    Counter,
    /// A gauge that can go up and down.
    Gauge,
    /// A histogram for recording distributions.
    Histogram,
}

impl MetricKind {
    /// Returns the kind as a lowercase string.
    pub const fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Histogram => "histogram",
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A metric declaration with its metadata.
///
/// ```rust
/// use corecube_metrics::{Metric, MetricKind};
/// use metrics::Unit;
///
/// const WRITES: Metric = Metric::counter("corecube.gatt.writes")
///     .with_description("Writes issued")
///     .with_unit(Unit::Count)
///     .with_labels(&["cube", "characteristic"]);
///
/// assert_eq!(WRITES.name, "corecube.gatt.writes");
/// assert_eq!(WRITES.kind, MetricKind::Counter);
/// ```
#[derive(Debug, Clone)]
pub struct Metric {
    /// The metric name (e.g., "corecube.gatt.reads_issued").
    pub name: &'static str,
    /// The kind of metric.
    pub kind: MetricKind,
    /// Human-readable description of the metric.
    pub description: &'static str,
    /// The unit of measurement (optional).
    pub unit: Option<Unit>,
    /// Expected label keys for this metric.
    pub labels: &'static [&'static str],
}

impl Metric {
    const fn new(name: &'static str, kind: MetricKind) -> Self {
        Self {
            name,
            kind,
            description: "",
            unit: None,
            labels: &[],
        }
    }

    /// Creates a new counter metric with the given name.
    pub const fn counter(name: &'static str) -> Self {
        Self::new(name, MetricKind::Counter)
    }

    /// Creates a new gauge metric with the given name.
    pub const fn gauge(name: &'static str) -> Self {
        Self::new(name, MetricKind::Gauge)
    }

    /// Creates a new histogram metric with the given name.
    pub const fn histogram(name: &'static str) -> Self {
        Self::new(name, MetricKind::Histogram)
    }

    /// Sets the description for the metric.
    pub const fn with_description(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    /// Sets the unit for the metric.
    pub const fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = Some(unit);
        self
    }

    /// Sets the expected label keys for the metric.
    pub const fn with_labels(mut self, labels: &'static [&'static str]) -> Self {
        self.labels = labels;
        self
    }

    /// Registers this metric's description with the metrics recorder.
    ///
    /// This should be called once at startup for each metric.
    pub fn describe(&self) {
        match (self.kind, self.unit) {
            (MetricKind::Counter, Some(unit)) => {
                describe_counter!(self.name, unit, self.description);
            }
            (MetricKind::Counter, None) => {
                describe_counter!(self.name, self.description);
            }
            (MetricKind::Gauge, Some(unit)) => {
                describe_gauge!(self.name, unit, self.description);
            }
            (MetricKind::Gauge, None) => {
                describe_gauge!(self.name, self.description);
            }
            (MetricKind::Histogram, Some(unit)) => {
                describe_histogram!(self.name, unit, self.description);
            }
            (MetricKind::Histogram, None) => {
                describe_histogram!(self.name, self.description);
            }
        }
    }
}

/// All metric definitions for the client.
pub mod metric_defs {
    use super::{Metric, Unit};

    // ========================================================================
    // Standard Label Keys
    // ========================================================================

    /// Labels present on all cube-scoped metrics.
    pub const CUBE_LABELS: &[&str] = &["cube"];

    /// Labels on characteristic-scoped metrics.
    pub const CHARACTERISTIC_LABELS: &[&str] = &["cube", "characteristic"];

    // ========================================================================
    // GATT Traffic
    // ========================================================================

    /// Hardware read requests sent to the BLE stack.
    pub const GATT_READS_ISSUED: Metric = Metric::counter("corecube.gatt.reads_issued")
        .with_description("Hardware reads issued")
        .with_unit(Unit::Count)
        .with_labels(CHARACTERISTIC_LABELS);

    /// Reads that joined an in-flight hardware read instead of issuing one.
    pub const GATT_READS_COALESCED: Metric = Metric::counter("corecube.gatt.reads_coalesced")
        .with_description("Reads served by an already pending hardware read")
        .with_unit(Unit::Count)
        .with_labels(CHARACTERISTIC_LABELS);

    /// Writes sent to the BLE stack.
    ///
    /// Labels: cube, characteristic, response ("with" or "without")
    pub const GATT_WRITES_ISSUED: Metric = Metric::counter("corecube.gatt.writes_issued")
        .with_description("Hardware writes issued")
        .with_unit(Unit::Count)
        .with_labels(&["cube", "characteristic", "response"]);

    /// Values delivered to subscribers.
    pub const GATT_NOTIFICATIONS_DELIVERED: Metric =
        Metric::counter("corecube.gatt.notifications_delivered")
            .with_description("Value updates delivered to subscribers")
            .with_unit(Unit::Count)
            .with_labels(CHARACTERISTIC_LABELS);

    /// Hardware notify enable/disable requests.
    ///
    /// Labels: cube, characteristic, enabled ("true" or "false")
    pub const GATT_NOTIFY_TOGGLES: Metric = Metric::counter("corecube.gatt.notify_toggles")
        .with_description("Notification enable/disable requests")
        .with_unit(Unit::Count)
        .with_labels(&["cube", "characteristic", "enabled"]);

    /// Payloads that failed to decode.
    pub const GATT_DECODE_FAILURES: Metric = Metric::counter("corecube.gatt.decode_failures")
        .with_description("Payloads that could not be decoded")
        .with_unit(Unit::Count)
        .with_labels(CHARACTERISTIC_LABELS);

    /// Currently registered notification subscriptions.
    pub const GATT_ACTIVE_SUBSCRIPTIONS: Metric =
        Metric::gauge("corecube.gatt.active_subscriptions")
            .with_description("Active notification subscriptions")
            .with_unit(Unit::Count)
            .with_labels(CHARACTERISTIC_LABELS);

    // ========================================================================
    // Session
    // ========================================================================

    /// Hardware errors no waiter could take.
    pub const SESSION_UNHANDLED_ERRORS: Metric =
        Metric::counter("corecube.session.unhandled_errors")
            .with_description("Errors surfaced on the unhandled-error channel")
            .with_unit(Unit::Count)
            .with_labels(CUBE_LABELS);

    /// Connection attempts started.
    pub const SESSION_CONNECT_ATTEMPTS: Metric =
        Metric::counter("corecube.session.connect_attempts")
            .with_description("Connection attempts started")
            .with_unit(Unit::Count)
            .with_labels(CUBE_LABELS);

    /// Connections that reached the ready state.
    pub const SESSION_CONNECT_SUCCESSES: Metric =
        Metric::counter("corecube.session.connect_successes")
            .with_description("Connections that completed discovery")
            .with_unit(Unit::Count)
            .with_labels(CUBE_LABELS);

    /// Connection attempts abandoned after the timeout elapsed.
    pub const SESSION_CONNECT_TIMEOUTS: Metric =
        Metric::counter("corecube.session.connect_timeouts")
            .with_description("Connection attempts that timed out")
            .with_unit(Unit::Count)
            .with_labels(CUBE_LABELS);

    /// Connection attempts that failed for any other reason.
    pub const SESSION_CONNECT_FAILURES: Metric =
        Metric::counter("corecube.session.connect_failures")
            .with_description("Connection attempts that failed")
            .with_unit(Unit::Count)
            .with_labels(CUBE_LABELS);

    /// Time from connect request to ready.
    pub const SESSION_CONNECT_DURATION: Metric =
        Metric::histogram("corecube.session.connect_duration")
            .with_description("Time from connect request to ready")
            .with_unit(Unit::Seconds)
            .with_labels(CUBE_LABELS);

    /// Unsolicited disconnects of ready cubes.
    pub const SESSION_DISCONNECTS: Metric = Metric::counter("corecube.session.disconnects")
        .with_description("Disconnects not requested by the host")
        .with_unit(Unit::Count)
        .with_labels(CUBE_LABELS);

    // ========================================================================
    // Scanner
    // ========================================================================

    /// Distinct cubes discovered.
    pub const SCAN_CUBES_DISCOVERED: Metric = Metric::counter("corecube.scan.cubes_discovered")
        .with_description("Distinct cubes discovered while scanning")
        .with_unit(Unit::Count);

    /// Scans that ended without finding a cube.
    pub const SCAN_TIMEOUTS: Metric = Metric::counter("corecube.scan.timeouts")
        .with_description("Scans that timed out without finding a cube")
        .with_unit(Unit::Count);

    /// All declared metrics.
    pub const ALL: &[&Metric] = &[
        &GATT_READS_ISSUED,
        &GATT_READS_COALESCED,
        &GATT_WRITES_ISSUED,
        &GATT_NOTIFICATIONS_DELIVERED,
        &GATT_NOTIFY_TOGGLES,
        &GATT_DECODE_FAILURES,
        &GATT_ACTIVE_SUBSCRIPTIONS,
        &SESSION_UNHANDLED_ERRORS,
        &SESSION_CONNECT_ATTEMPTS,
        &SESSION_CONNECT_SUCCESSES,
        &SESSION_CONNECT_TIMEOUTS,
        &SESSION_CONNECT_FAILURES,
        &SESSION_CONNECT_DURATION,
        &SESSION_DISCONNECTS,
        &SCAN_CUBES_DISCOVERED,
        &SCAN_TIMEOUTS,
    ];
}

/// Labels identifying a cube, and optionally one of its characteristics.
///
/// ```rust
/// use corecube_metrics::CubeLabels;
///
/// let labels = CubeLabels::new("cube-1").with_characteristic("motor");
/// let label_vec = labels.to_labels();
/// assert!(label_vec.iter().any(|(k, v)| *k == "characteristic" && v == "motor"));
/// ```
#[derive(Debug, Clone)]
pub struct CubeLabels {
    /// Peripheral identifier of the cube.
    pub cube: String,
    /// Characteristic the metric refers to, if any.
    pub characteristic: Option<&'static str>,
}

impl CubeLabels {
    /// Creates labels for the given cube.
    pub fn new(cube: impl Into<String>) -> Self {
        Self {
            cube: cube.into(),
            characteristic: None,
        }
    }

    /// Scopes the labels to one characteristic.
    pub fn with_characteristic(mut self, characteristic: &'static str) -> Self {
        self.characteristic = Some(characteristic);
        self
    }

    /// Converts the labels to the metrics crate label format.
    pub fn to_labels(&self) -> Vec<(&'static str, String)> {
        let mut labels = vec![("cube", self.cube.clone())];
        if let Some(characteristic) = self.characteristic {
            labels.push(("characteristic", characteristic.to_string()));
        }
        labels
    }

    /// Returns labels with additional key-value pairs.
    pub fn with(&self, extra: &[(&'static str, String)]) -> Vec<(&'static str, String)> {
        let mut labels = self.to_labels();
        labels.extend_from_slice(extra);
        labels
    }
}

/// Describes all client metrics.
///
/// Call once at startup, after installing a recorder.
pub fn describe_metrics() {
    for metric in metric_defs::ALL {
        metric.describe();
    }
}
