//! In-process metrics registry.
//!
//! Counters track pipeline throughput. Gauges hold the latest numeric value of
//! a fixed set of well-known NUT variables per `(host, device)`.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use serde::Serialize;

/// NUT variables recorded as gauges, with the gauge name they map to.
pub const GAUGES: &[(&str, &str)] = &[
    ("output.voltage", "output_voltage"),
    ("output.current", "output_current"),
    ("output.frequency", "output_frequency"),
    ("input.voltage", "input_voltage"),
    ("input.current", "input_current"),
    ("input.frequency", "input_frequency"),
    ("ups.load", "ups_load"),
    ("battery.voltage", "battery_voltage"),
    ("battery.charge", "battery_charge"),
];

/// Gauge name for a NUT variable, if it is tracked.
pub fn gauge_name(variable: &str) -> Option<&'static str> {
    GAUGES
        .iter()
        .find(|(var, _)| *var == variable)
        .map(|(_, gauge)| *gauge)
}

/// Identity of a gauge sample.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GaugeKey {
    pub host: String,
    pub device: String,
    pub metric: &'static str,
}

/// Bridge-wide counters and gauges.
#[derive(Debug, Default)]
pub struct BridgeMetrics {
    control_messages_processed: AtomicU64,
    poll_sweeps: AtomicU64,
    variable_updates_processed: AtomicU64,
    bus_publishes: AtomicU64,
    bus_publish_failures: AtomicU64,
    gauges: RwLock<BTreeMap<GaugeKey, f64>>,
}

impl BridgeMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_control_messages(&self) {
        self.control_messages_processed
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_poll_sweeps(&self) {
        self.poll_sweeps.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_variable_updates(&self) {
        self.variable_updates_processed
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_bus_publishes(&self) {
        self.bus_publishes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_bus_publish_failures(&self) {
        self.bus_publish_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_gauge(&self, host: &str, device: &str, metric: &'static str, value: f64) {
        self.gauges.write().insert(
            GaugeKey {
                host: host.to_string(),
                device: device.to_string(),
                metric,
            },
            value,
        );
    }

    pub fn gauge(&self, host: &str, device: &str, metric: &'static str) -> Option<f64> {
        self.gauges
            .read()
            .get(&GaugeKey {
                host: host.to_string(),
                device: device.to_string(),
                metric,
            })
            .copied()
    }

    /// Point-in-time copy of every counter and gauge.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            control_messages_processed: self.control_messages_processed.load(Ordering::Relaxed),
            poll_sweeps: self.poll_sweeps.load(Ordering::Relaxed),
            variable_updates_processed: self.variable_updates_processed.load(Ordering::Relaxed),
            bus_publishes: self.bus_publishes.load(Ordering::Relaxed),
            bus_publish_failures: self.bus_publish_failures.load(Ordering::Relaxed),
            gauges: self
                .gauges
                .read()
                .iter()
                .map(|(key, value)| GaugeSample {
                    host: key.host.clone(),
                    device: key.device.clone(),
                    metric: key.metric.to_string(),
                    value: *value,
                })
                .collect(),
        }
    }
}

/// Serializable metrics snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub control_messages_processed: u64,
    pub poll_sweeps: u64,
    pub variable_updates_processed: u64,
    pub bus_publishes: u64,
    pub bus_publish_failures: u64,
    pub gauges: Vec<GaugeSample>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GaugeSample {
    pub host: String,
    pub device: String,
    pub metric: String,
    pub value: f64,
}
