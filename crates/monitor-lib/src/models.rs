//! Core data models for the energy monitor

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Operational status of a registered inverter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Active,
    Inactive,
    Maintenance,
}

impl DeviceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceStatus::Active => "active",
            DeviceStatus::Inactive => "inactive",
            DeviceStatus::Maintenance => "maintenance",
        }
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DeviceStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "active" => Ok(DeviceStatus::Active),
            "inactive" => Ok(DeviceStatus::Inactive),
            "maintenance" => Ok(DeviceStatus::Maintenance),
            other => Err(format!("unknown device status: {}", other)),
        }
    }
}

/// A registered solar inverter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub id: i64,
    pub device_code: String,
    pub device_name: String,
    pub nominal_power: f64,
    pub status: DeviceStatus,
}

/// Quality verdict attached to every stored reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Valid,
    Uncertain,
    Quarantine,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Valid => "valid",
            Classification::Uncertain => "uncertain",
            Classification::Quarantine => "quarantine",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Classification {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "valid" => Ok(Classification::Valid),
            "uncertain" => Ok(Classification::Uncertain),
            "quarantine" => Ok(Classification::Quarantine),
            other => Err(format!("unknown classification: {}", other)),
        }
    }
}

/// The meter value carried by an ingestion request
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReadingValue {
    /// Lifetime energy counter; the delta is derived from the previous reading
    Cumulative(f64),
    /// Pre-computed interval delta reported by an edge gateway
    ExplicitDelta(f64),
}

/// A single ingestion request for one device
#[derive(Debug, Clone, Copy)]
pub struct ReadingInput {
    pub timestamp: DateTime<Utc>,
    pub value: ReadingValue,
}

/// A processed meter reading with its classification verdict
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reading {
    pub id: i64,
    pub device_id: i64,
    pub timestamp: DateTime<Utc>,
    pub cumulative_value: f64,
    pub delta: Option<f64>,
    pub classification: Classification,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

/// A classified reading before persistence assigns identity
#[derive(Debug, Clone)]
pub struct NewReading {
    pub device_id: i64,
    pub timestamp: DateTime<Utc>,
    pub cumulative_value: f64,
    pub delta: Option<f64>,
    pub classification: Classification,
    pub reason: String,
}

/// Per-device, per-hour generation statistics over the trailing window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HourlyBaseline {
    pub device_id: i64,
    pub hour_of_day: u8,
    pub mean_delta: f64,
    pub stddev_delta: f64,
    pub min_delta: f64,
    pub max_delta: f64,
    pub sample_count: i64,
    pub last_updated: DateTime<Utc>,
}

/// Alert severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Info => "info",
            AlertSeverity::Warning => "warning",
            AlertSeverity::Critical => "critical",
        }
    }
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AlertSeverity {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "info" => Ok(AlertSeverity::Info),
            "warning" => Ok(AlertSeverity::Warning),
            "critical" => Ok(AlertSeverity::Critical),
            other => Err(format!("unknown alert severity: {}", other)),
        }
    }
}

/// Alert categories raised by the alert engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    NegativeDelta,
    FrozenValue,
    ConsecutiveQuarantine,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::NegativeDelta => "negative_delta",
            AlertType::FrozenValue => "frozen_value",
            AlertType::ConsecutiveQuarantine => "consecutive_quarantine",
        }
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AlertType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "negative_delta" => Ok(AlertType::NegativeDelta),
            "frozen_value" => Ok(AlertType::FrozenValue),
            "consecutive_quarantine" => Ok(AlertType::ConsecutiveQuarantine),
            other => Err(format!("unknown alert type: {}", other)),
        }
    }
}

/// A persisted alert, joined with the owning device's code
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: i64,
    pub device_id: i64,
    pub device_code: String,
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub message: String,
    pub details: serde_json::Value,
    pub resolved: bool,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// An alert before persistence assigns identity
#[derive(Debug, Clone)]
pub struct NewAlert {
    pub device_id: i64,
    pub device_code: String,
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub message: String,
    pub details: serde_json::Value,
}

/// Wire payload pushed to WebSocket subscribers, one JSON object per alert
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertPayload {
    pub id: i64,
    pub device_id: i64,
    pub device_code: String,
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub message: String,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl From<&Alert> for AlertPayload {
    fn from(alert: &Alert) -> Self {
        AlertPayload {
            id: alert.id,
            device_id: alert.device_id,
            device_code: alert.device_code.clone(),
            alert_type: alert.alert_type,
            severity: alert.severity,
            message: alert.message.clone(),
            details: alert.details.clone(),
            created_at: alert.created_at,
        }
    }
}

/// Per-device classification counts for the quality report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualitySummary {
    pub device_code: String,
    pub valid_count: i64,
    pub uncertain_count: i64,
    pub quarantine_count: i64,
    pub total_count: i64,
    pub validity_percentage: f64,
}
