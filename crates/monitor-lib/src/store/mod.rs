//! Persistence layer
//!
//! The `ReadingStore` trait is the monitor's only interface to durable
//! state. The Postgres implementation backs production deployments; the
//! in-memory implementation backs tests and local development.

mod memory;
mod postgres;
pub mod schema;

pub use memory::MemoryStore;
pub use postgres::PgReadingStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{
    Alert, Classification, Device, DeviceStatus, HourlyBaseline, NewAlert, NewReading,
    QualitySummary, Reading,
};

/// Filters for listing alerts
#[derive(Debug, Clone, Copy)]
pub struct AlertFilter {
    pub device_id: Option<i64>,
    pub resolved: Option<bool>,
    pub since: DateTime<Utc>,
}

/// Durable storage for devices, readings, alerts and baseline input
#[async_trait]
pub trait ReadingStore: Send + Sync {
    /// Fetch a device by id
    async fn device(&self, device_id: i64) -> Result<Option<Device>>;

    /// List devices, optionally filtered by operational status
    async fn devices(&self, status: Option<DeviceStatus>) -> Result<Vec<Device>>;

    /// Persist a classified reading.
    ///
    /// Valid readings are shadowed into the clean series in the same
    /// transaction, so the raw and clean series never diverge.
    async fn insert_reading(&self, reading: &NewReading) -> Result<Reading>;

    /// The most recent reading for a device, if any
    async fn latest_reading(&self, device_id: i64) -> Result<Option<Reading>>;

    /// Readings for a device since a cutoff, newest first, capped at `limit`
    async fn readings_since(
        &self,
        device_id: i64,
        since: DateTime<Utc>,
        classification: Option<Classification>,
        limit: i64,
    ) -> Result<Vec<Reading>>;

    /// Aggregate per-device hourly statistics over the positive deltas in
    /// the clean series since `window_start`. Hour slots with fewer than
    /// `min_samples` samples are omitted.
    async fn collect_baselines(
        &self,
        window_start: DateTime<Utc>,
        min_samples: i64,
    ) -> Result<Vec<HourlyBaseline>>;

    /// Persist a new alert
    async fn insert_alert(&self, alert: &NewAlert) -> Result<Alert>;

    /// List alerts matching the filter, newest first
    async fn alerts(&self, filter: &AlertFilter) -> Result<Vec<Alert>>;

    /// Mark an alert resolved; fails with `UnknownAlert` if absent
    async fn resolve_alert(&self, alert_id: i64) -> Result<Alert>;

    /// Per-device classification counts across all stored readings
    async fn quality_summary(&self) -> Result<Vec<QualitySummary>>;

    /// Cheap connectivity probe for health checks
    async fn ping(&self) -> Result<()>;
}
