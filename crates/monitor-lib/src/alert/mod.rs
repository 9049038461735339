//! Alert evaluation and delivery
//!
//! The alert engine turns tracker outcomes into concrete alert rows; the
//! notifier fans persisted alerts out to WebSocket subscribers.

mod notifier;

pub use notifier::{Notifier, DEFAULT_NOTIFIER_CAPACITY, PING, PONG};

use chrono::{DateTime, Utc};
use serde_json::json;

use crate::ingest::TrackerOutcome;
use crate::models::{AlertSeverity, AlertType, Device, NewAlert};

/// Builds alert rows from per-reading observations.
///
/// Rules are evaluated independently, so a single reading can raise
/// several alert types at once but never two alerts of the same type.
#[derive(Debug, Default)]
pub struct AlertEngine;

impl AlertEngine {
    pub fn new() -> Self {
        Self
    }

    /// Evaluate all alert rules for one processed reading
    pub fn evaluate(
        &self,
        device: &Device,
        timestamp: DateTime<Utc>,
        delta: Option<f64>,
        cumulative_value: f64,
        reason: &str,
        outcome: &TrackerOutcome,
    ) -> Vec<NewAlert> {
        let mut alerts = Vec::new();

        // Negative deltas are alerted on every occurrence; each one is an
        // independent data-corruption event.
        if let Some(d) = delta {
            if d < 0.0 {
                alerts.push(self.negative_delta(device, timestamp, d, cumulative_value));
            }
        }

        if outcome.frozen_value_hit {
            alerts.push(self.frozen_value(device, timestamp, outcome));
        }

        if outcome.quarantine_streak_hit {
            alerts.push(self.consecutive_quarantine(device, timestamp, reason, outcome));
        }

        alerts
    }

    fn negative_delta(
        &self,
        device: &Device,
        timestamp: DateTime<Utc>,
        delta: f64,
        cumulative_value: f64,
    ) -> NewAlert {
        NewAlert {
            device_id: device.id,
            device_code: device.device_code.clone(),
            alert_type: AlertType::NegativeDelta,
            severity: AlertSeverity::Warning,
            message: format!(
                "Device {}: negative delta of {:.2} kWh",
                device.device_code, delta
            ),
            details: json!({
                "delta": delta,
                "cumulative_value": cumulative_value,
                "timestamp": timestamp.to_rfc3339(),
            }),
        }
    }

    fn frozen_value(
        &self,
        device: &Device,
        timestamp: DateTime<Utc>,
        outcome: &TrackerOutcome,
    ) -> NewAlert {
        let minutes = outcome.frozen_for.map(|d| d.num_minutes()).unwrap_or(0);
        NewAlert {
            device_id: device.id,
            device_code: device.device_code.clone(),
            alert_type: AlertType::FrozenValue,
            severity: AlertSeverity::Warning,
            message: format!(
                "Device {}: no generation for {} minutes during expected generation hours",
                device.device_code, minutes
            ),
            details: json!({
                "frozen_for_minutes": minutes,
                "timestamp": timestamp.to_rfc3339(),
            }),
        }
    }

    fn consecutive_quarantine(
        &self,
        device: &Device,
        timestamp: DateTime<Utc>,
        reason: &str,
        outcome: &TrackerOutcome,
    ) -> NewAlert {
        NewAlert {
            device_id: device.id,
            device_code: device.device_code.clone(),
            alert_type: AlertType::ConsecutiveQuarantine,
            severity: AlertSeverity::Critical,
            message: format!(
                "Device {}: {} consecutive readings in quarantine",
                device.device_code, outcome.consecutive_quarantine
            ),
            details: json!({
                "consecutive_count": outcome.consecutive_quarantine,
                "last_reason": reason,
                "timestamp": timestamp.to_rfc3339(),
            }),
        }
    }
}
