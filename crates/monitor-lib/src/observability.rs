//! Observability infrastructure for the energy monitor
//!
//! Provides:
//! - Prometheus metrics (ingest latency, classification counts, alert and
//!   notifier counters, baseline refresh timing)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Default histogram buckets for latency measurements (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
];

/// Histogram buckets for baseline refresh cycles (in seconds)
const REFRESH_BUCKETS: &[f64] = &[0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 15.0, 60.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<MonitorMetricsInner> = OnceLock::new();

/// Inner metrics structure that holds the actual Prometheus metrics
struct MonitorMetricsInner {
    readings_processed: IntCounterVec,
    readings_rejected: IntCounter,
    ingest_latency_seconds: Histogram,
    alerts_fired: IntCounterVec,
    alerts_broadcast: IntCounter,
    notifier_dropped_messages: IntCounter,
    subscribers_connected: IntGauge,
    devices_tracked: IntGauge,
    baselines_loaded: IntGauge,
    baseline_refresh_seconds: Histogram,
    store_errors: IntCounter,
}

impl MonitorMetricsInner {
    fn new() -> Self {
        Self {
            readings_processed: register_int_counter_vec!(
                "energy_monitor_readings_processed_total",
                "Readings accepted and stored, by classification",
                &["classification"]
            )
            .expect("Failed to register readings_processed"),

            readings_rejected: register_int_counter!(
                "energy_monitor_readings_rejected_total",
                "Readings rejected before classification"
            )
            .expect("Failed to register readings_rejected"),

            ingest_latency_seconds: register_histogram!(
                "energy_monitor_ingest_latency_seconds",
                "Time spent processing one reading end to end",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register ingest_latency_seconds"),

            alerts_fired: register_int_counter_vec!(
                "energy_monitor_alerts_fired_total",
                "Alerts raised, by type and severity",
                &["alert_type", "severity"]
            )
            .expect("Failed to register alerts_fired"),

            alerts_broadcast: register_int_counter!(
                "energy_monitor_alerts_broadcast_total",
                "Alert payloads handed to the WebSocket notifier"
            )
            .expect("Failed to register alerts_broadcast"),

            notifier_dropped_messages: register_int_counter!(
                "energy_monitor_notifier_dropped_messages_total",
                "Alert payloads dropped because a subscriber lagged behind"
            )
            .expect("Failed to register notifier_dropped_messages"),

            subscribers_connected: register_int_gauge!(
                "energy_monitor_subscribers_connected",
                "WebSocket subscribers currently connected"
            )
            .expect("Failed to register subscribers_connected"),

            devices_tracked: register_int_gauge!(
                "energy_monitor_devices_tracked",
                "Devices with a cached last reading"
            )
            .expect("Failed to register devices_tracked"),

            baselines_loaded: register_int_gauge!(
                "energy_monitor_baselines_loaded",
                "Device-hour slots in the active baseline snapshot"
            )
            .expect("Failed to register baselines_loaded"),

            baseline_refresh_seconds: register_histogram!(
                "energy_monitor_baseline_refresh_seconds",
                "Time spent recomputing the baseline snapshot",
                REFRESH_BUCKETS.to_vec()
            )
            .expect("Failed to register baseline_refresh_seconds"),

            store_errors: register_int_counter!(
                "energy_monitor_store_errors_total",
                "Failed operations against the reading store"
            )
            .expect("Failed to register store_errors"),
        }
    }
}

/// Monitor metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct MonitorMetrics {
    // This is just a marker - we use the global instance
    _private: (),
}

impl Default for MonitorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl MonitorMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(MonitorMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &MonitorMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    /// Count a stored reading under its classification
    pub fn inc_readings_processed(&self, classification: &str) {
        self.inner()
            .readings_processed
            .with_label_values(&[classification])
            .inc();
    }

    /// Count a rejected reading
    pub fn inc_readings_rejected(&self) {
        self.inner().readings_rejected.inc();
    }

    /// Record an end-to-end ingest latency observation
    pub fn observe_ingest_latency(&self, duration_secs: f64) {
        self.inner().ingest_latency_seconds.observe(duration_secs);
    }

    /// Count a raised alert
    pub fn inc_alerts_fired(&self, alert_type: &str, severity: &str) {
        self.inner()
            .alerts_fired
            .with_label_values(&[alert_type, severity])
            .inc();
    }

    /// Count a payload handed to the notifier
    pub fn inc_alerts_broadcast(&self) {
        self.inner().alerts_broadcast.inc();
    }

    /// Count payloads a lagging subscriber missed
    pub fn inc_notifier_dropped(&self, count: u64) {
        self.inner().notifier_dropped_messages.inc_by(count);
    }

    /// Update the connected subscriber gauge
    pub fn set_subscribers_connected(&self, count: i64) {
        self.inner().subscribers_connected.set(count);
    }

    /// Update the tracked device gauge
    pub fn set_devices_tracked(&self, count: i64) {
        self.inner().devices_tracked.set(count);
    }

    /// Update the baseline slot gauge
    pub fn set_baselines_loaded(&self, count: usize) {
        self.inner().baselines_loaded.set(count as i64);
    }

    /// Record a baseline refresh duration observation
    pub fn observe_refresh_duration(&self, duration_secs: f64) {
        self.inner().baseline_refresh_seconds.observe(duration_secs);
    }

    /// Count a failed store operation
    pub fn inc_store_errors(&self) {
        self.inner().store_errors.inc();
    }
}

/// Structured logger for monitor events
///
/// Provides consistent JSON-formatted logging for processed readings,
/// alerts, and other significant events.
#[derive(Clone)]
pub struct StructuredLogger {
    service: String,
}

impl StructuredLogger {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    /// Log a stored reading with its verdict
    pub fn log_reading_processed(
        &self,
        device_code: &str,
        classification: &str,
        reason: &str,
        delta: Option<f64>,
    ) {
        info!(
            event = "reading_processed",
            service = %self.service,
            device_code = %device_code,
            classification = %classification,
            reason = %reason,
            delta = ?delta,
            "Reading processed"
        );
    }

    /// Log a reading rejected before classification
    pub fn log_reading_rejected(&self, device_code: &str, error: &str) {
        info!(
            event = "reading_rejected",
            service = %self.service,
            device_code = %device_code,
            error = %error,
            "Reading rejected"
        );
    }

    /// Log a raised alert
    pub fn log_alert(&self, device_code: &str, alert_type: &str, severity: &str, message: &str) {
        match severity {
            "critical" => {
                warn!(
                    event = "alert_fired",
                    service = %self.service,
                    device_code = %device_code,
                    alert_type = %alert_type,
                    severity = %severity,
                    message = %message,
                    "Critical alert fired"
                );
            }
            _ => {
                info!(
                    event = "alert_fired",
                    service = %self.service,
                    device_code = %device_code,
                    alert_type = %alert_type,
                    severity = %severity,
                    message = %message,
                    "Alert fired"
                );
            }
        }
    }

    /// Log a store operation that failed and will be retried by the caller
    pub fn log_store_unavailable(&self, operation: &str, error: &str) {
        warn!(
            event = "store_unavailable",
            service = %self.service,
            operation = %operation,
            error = %error,
            "Store operation failed"
        );
    }

    /// Log a WebSocket subscriber change
    pub fn log_subscriber_change(&self, connected: bool, total: usize) {
        info!(
            event = "subscriber_change",
            service = %self.service,
            connected = connected,
            total = total,
            "Alert subscriber change"
        );
    }

    /// Log monitor startup
    pub fn log_startup(&self, version: &str) {
        info!(
            event = "monitor_started",
            service = %self.service,
            version = %version,
            "Energy monitor started"
        );
    }

    /// Log monitor shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "monitor_shutdown",
            service = %self.service,
            reason = %reason,
            "Energy monitor shutting down"
        );
    }
}
