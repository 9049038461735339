//! In-memory reading store
//!
//! Backs tests and local development. Mirrors the Postgres semantics,
//! including the transactional raw/clean shadow write and the baseline
//! aggregation, and can simulate a store outage for failure-path tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Timelike, Utc};

use super::{AlertFilter, ReadingStore};
use crate::error::{MonitorError, Result};
use crate::models::{
    Alert, Classification, Device, DeviceStatus, HourlyBaseline, NewAlert, NewReading,
    QualitySummary, Reading,
};

#[derive(Default)]
struct MemoryInner {
    devices: HashMap<i64, Device>,
    readings: Vec<Reading>,
    clean_readings: Vec<Reading>,
    alerts: Vec<Alert>,
    next_reading_id: i64,
    next_alert_id: i64,
}

/// Reading store backed by process memory
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
    failing: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a device. Provisioning is outside the monitor's scope,
    /// so this lives next to the trait rather than on it.
    pub fn add_device(&self, device: Device) {
        let mut inner = self.inner.lock().unwrap();
        inner.devices.insert(device.id, device);
    }

    /// Make every subsequent operation fail until switched back
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(MonitorError::TransientStore(
                "simulated store outage".to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ReadingStore for MemoryStore {
    async fn device(&self, device_id: i64) -> Result<Option<Device>> {
        self.check_available()?;
        let inner = self.inner.lock().unwrap();
        Ok(inner.devices.get(&device_id).cloned())
    }

    async fn devices(&self, status: Option<DeviceStatus>) -> Result<Vec<Device>> {
        self.check_available()?;
        let inner = self.inner.lock().unwrap();
        let mut devices: Vec<Device> = inner
            .devices
            .values()
            .filter(|d| status.map_or(true, |s| d.status == s))
            .cloned()
            .collect();
        devices.sort_by(|a, b| a.device_code.cmp(&b.device_code));
        Ok(devices)
    }

    async fn insert_reading(&self, reading: &NewReading) -> Result<Reading> {
        self.check_available()?;
        let mut inner = self.inner.lock().unwrap();

        let duplicate = inner.readings.iter().any(|r| {
            r.device_id == reading.device_id && r.timestamp == reading.timestamp
        });
        if duplicate {
            return Err(MonitorError::TransientStore(
                "unique constraint violation: readings(device_id, timestamp)".to_string(),
            ));
        }

        inner.next_reading_id += 1;
        let stored = Reading {
            id: inner.next_reading_id,
            device_id: reading.device_id,
            timestamp: reading.timestamp,
            cumulative_value: reading.cumulative_value,
            delta: reading.delta,
            classification: reading.classification,
            reason: reading.reason.clone(),
            created_at: Utc::now(),
        };
        inner.readings.push(stored.clone());
        if stored.classification == Classification::Valid {
            inner.clean_readings.push(stored.clone());
        }
        Ok(stored)
    }

    async fn latest_reading(&self, device_id: i64) -> Result<Option<Reading>> {
        self.check_available()?;
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .readings
            .iter()
            .filter(|r| r.device_id == device_id)
            .max_by_key(|r| r.timestamp)
            .cloned())
    }

    async fn readings_since(
        &self,
        device_id: i64,
        since: DateTime<Utc>,
        classification: Option<Classification>,
        limit: i64,
    ) -> Result<Vec<Reading>> {
        self.check_available()?;
        let inner = self.inner.lock().unwrap();
        let mut readings: Vec<Reading> = inner
            .readings
            .iter()
            .filter(|r| r.device_id == device_id && r.timestamp >= since)
            .filter(|r| classification.map_or(true, |c| r.classification == c))
            .cloned()
            .collect();
        readings.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        readings.truncate(limit as usize);
        Ok(readings)
    }

    async fn collect_baselines(
        &self,
        window_start: DateTime<Utc>,
        min_samples: i64,
    ) -> Result<Vec<HourlyBaseline>> {
        self.check_available()?;
        let inner = self.inner.lock().unwrap();

        let mut groups: HashMap<(i64, u8), Vec<f64>> = HashMap::new();
        for r in &inner.clean_readings {
            if r.timestamp < window_start {
                continue;
            }
            let delta = match r.delta {
                Some(d) if d > 0.0 => d,
                _ => continue,
            };
            groups
                .entry((r.device_id, r.timestamp.hour() as u8))
                .or_default()
                .push(delta);
        }

        let now = Utc::now();
        let mut baselines = Vec::new();
        for ((device_id, hour_of_day), deltas) in groups {
            if (deltas.len() as i64) < min_samples {
                continue;
            }
            let count = deltas.len() as f64;
            let mean = deltas.iter().sum::<f64>() / count;
            let variance = deltas.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / count;
            let min = deltas.iter().cloned().fold(f64::INFINITY, f64::min);
            let max = deltas.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

            baselines.push(HourlyBaseline {
                device_id,
                hour_of_day,
                mean_delta: mean,
                stddev_delta: variance.sqrt(),
                min_delta: min,
                max_delta: max,
                sample_count: deltas.len() as i64,
                last_updated: now,
            });
        }
        Ok(baselines)
    }

    async fn insert_alert(&self, alert: &NewAlert) -> Result<Alert> {
        self.check_available()?;
        let mut inner = self.inner.lock().unwrap();
        inner.next_alert_id += 1;
        let stored = Alert {
            id: inner.next_alert_id,
            device_id: alert.device_id,
            device_code: alert.device_code.clone(),
            alert_type: alert.alert_type,
            severity: alert.severity,
            message: alert.message.clone(),
            details: alert.details.clone(),
            resolved: false,
            created_at: Utc::now(),
            resolved_at: None,
        };
        inner.alerts.push(stored.clone());
        Ok(stored)
    }

    async fn alerts(&self, filter: &AlertFilter) -> Result<Vec<Alert>> {
        self.check_available()?;
        let inner = self.inner.lock().unwrap();
        let mut alerts: Vec<Alert> = inner
            .alerts
            .iter()
            .filter(|a| a.created_at >= filter.since)
            .filter(|a| filter.device_id.map_or(true, |id| a.device_id == id))
            .filter(|a| filter.resolved.map_or(true, |r| a.resolved == r))
            .cloned()
            .collect();
        alerts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(alerts)
    }

    async fn resolve_alert(&self, alert_id: i64) -> Result<Alert> {
        self.check_available()?;
        let mut inner = self.inner.lock().unwrap();
        let alert = inner
            .alerts
            .iter_mut()
            .find(|a| a.id == alert_id)
            .ok_or(MonitorError::UnknownAlert(alert_id))?;
        alert.resolved = true;
        if alert.resolved_at.is_none() {
            alert.resolved_at = Some(Utc::now());
        }
        Ok(alert.clone())
    }

    async fn quality_summary(&self) -> Result<Vec<QualitySummary>> {
        self.check_available()?;
        let inner = self.inner.lock().unwrap();

        let mut summaries: Vec<QualitySummary> = inner
            .devices
            .values()
            .map(|device| {
                let mut valid = 0i64;
                let mut uncertain = 0i64;
                let mut quarantine = 0i64;
                for r in inner.readings.iter().filter(|r| r.device_id == device.id) {
                    match r.classification {
                        Classification::Valid => valid += 1,
                        Classification::Uncertain => uncertain += 1,
                        Classification::Quarantine => quarantine += 1,
                    }
                }
                let total = valid + uncertain + quarantine;
                let validity_percentage = if total > 0 {
                    valid as f64 / total as f64 * 100.0
                } else {
                    0.0
                };
                QualitySummary {
                    device_code: device.device_code.clone(),
                    valid_count: valid,
                    uncertain_count: uncertain,
                    quarantine_count: quarantine,
                    total_count: total,
                    validity_percentage,
                }
            })
            .collect();
        summaries.sort_by(|a, b| a.device_code.cmp(&b.device_code));
        Ok(summaries)
    }

    async fn ping(&self) -> Result<()> {
        self.check_available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AlertSeverity, AlertType};
    use chrono::TimeZone;

    fn device(id: i64, code: &str) -> Device {
        Device {
            id,
            device_code: code.to_string(),
            device_name: format!("Inverter {}", id),
            nominal_power: 50.0,
            status: DeviceStatus::Active,
        }
    }

    fn reading(device_id: i64, ts: DateTime<Utc>, delta: Option<f64>, classification: Classification) -> NewReading {
        NewReading {
            device_id,
            timestamp: ts,
            cumulative_value: 1000.0,
            delta,
            classification,
            reason: "test".to_string(),
        }
    }

    fn at(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, day, hour, minute, 0).unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_fetch_latest() {
        let store = MemoryStore::new();
        store.add_device(device(1, "INV-001"));

        store.insert_reading(&reading(1, at(1, 10, 0), None, Classification::Valid)).await.unwrap();
        store.insert_reading(&reading(1, at(1, 10, 10), Some(5.0), Classification::Valid)).await.unwrap();

        let latest = store.latest_reading(1).await.unwrap().unwrap();
        assert_eq!(latest.timestamp, at(1, 10, 10));
        assert_eq!(latest.delta, Some(5.0));
        assert!(store.latest_reading(2).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_timestamp_rejected() {
        let store = MemoryStore::new();
        store.add_device(device(1, "INV-001"));

        store.insert_reading(&reading(1, at(1, 10, 0), Some(5.0), Classification::Valid)).await.unwrap();
        let err = store
            .insert_reading(&reading(1, at(1, 10, 0), Some(6.0), Classification::Valid))
            .await
            .unwrap_err();
        assert!(matches!(err, MonitorError::TransientStore(_)));
    }

    #[tokio::test]
    async fn test_baseline_aggregation_statistics() {
        let store = MemoryStore::new();
        store.add_device(device(1, "INV-001"));

        // Deltas 8, 10, 12 in the same hour slot across days.
        for (day, delta) in [(1, 8.0), (2, 10.0), (3, 12.0)] {
            store
                .insert_reading(&reading(1, at(day, 12, 0), Some(delta), Classification::Valid))
                .await
                .unwrap();
        }

        let baselines = store.collect_baselines(at(1, 0, 0), 1).await.unwrap();
        assert_eq!(baselines.len(), 1);
        let b = &baselines[0];
        assert_eq!(b.hour_of_day, 12);
        assert!((b.mean_delta - 10.0).abs() < 1e-9);
        // Population standard deviation of [8, 10, 12].
        assert!((b.stddev_delta - (8.0f64 / 3.0).sqrt()).abs() < 1e-9);
        assert_eq!(b.min_delta, 8.0);
        assert_eq!(b.max_delta, 12.0);
        assert_eq!(b.sample_count, 3);
    }

    #[tokio::test]
    async fn test_baseline_aggregation_only_positive_clean_deltas() {
        let store = MemoryStore::new();
        store.add_device(device(1, "INV-001"));

        store.insert_reading(&reading(1, at(1, 12, 0), Some(10.0), Classification::Valid)).await.unwrap();
        // Zero deltas, quarantined rows and uncertain rows never feed the baseline.
        store.insert_reading(&reading(1, at(2, 12, 0), Some(0.0), Classification::Valid)).await.unwrap();
        store.insert_reading(&reading(1, at(3, 12, 0), Some(-4.0), Classification::Quarantine)).await.unwrap();
        store.insert_reading(&reading(1, at(4, 12, 0), Some(25.0), Classification::Uncertain)).await.unwrap();

        let baselines = store.collect_baselines(at(1, 0, 0), 1).await.unwrap();
        assert_eq!(baselines.len(), 1);
        assert_eq!(baselines[0].sample_count, 1);
        assert_eq!(baselines[0].mean_delta, 10.0);
    }

    #[tokio::test]
    async fn test_baseline_aggregation_honors_window_and_min_samples() {
        let store = MemoryStore::new();
        store.add_device(device(1, "INV-001"));

        for day in 1..=4 {
            store
                .insert_reading(&reading(1, at(day, 12, 0), Some(10.0), Classification::Valid))
                .await
                .unwrap();
        }

        // Cutoff excludes day 1, leaving three samples.
        let baselines = store.collect_baselines(at(2, 0, 0), 3).await.unwrap();
        assert_eq!(baselines[0].sample_count, 3);

        // Four samples exist but five are required.
        let none = store.collect_baselines(at(1, 0, 0), 5).await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_readings_since_filters_and_caps() {
        let store = MemoryStore::new();
        store.add_device(device(1, "INV-001"));

        for minute in 0..5 {
            let class = if minute % 2 == 0 {
                Classification::Valid
            } else {
                Classification::Quarantine
            };
            store
                .insert_reading(&reading(1, at(1, 10, minute), Some(1.0), class))
                .await
                .unwrap();
        }

        let all = store.readings_since(1, at(1, 0, 0), None, 100).await.unwrap();
        assert_eq!(all.len(), 5);
        assert!(all[0].timestamp > all[4].timestamp);

        let quarantined = store
            .readings_since(1, at(1, 0, 0), Some(Classification::Quarantine), 100)
            .await
            .unwrap();
        assert_eq!(quarantined.len(), 2);

        let capped = store.readings_since(1, at(1, 0, 0), None, 2).await.unwrap();
        assert_eq!(capped.len(), 2);
    }

    #[tokio::test]
    async fn test_alert_lifecycle() {
        let store = MemoryStore::new();
        store.add_device(device(1, "INV-001"));

        let alert = store
            .insert_alert(&NewAlert {
                device_id: 1,
                device_code: "INV-001".to_string(),
                alert_type: AlertType::NegativeDelta,
                severity: AlertSeverity::Warning,
                message: "negative delta".to_string(),
                details: serde_json::json!({"delta": -1.0}),
            })
            .await
            .unwrap();
        assert!(!alert.resolved);

        let unresolved = store
            .alerts(&AlertFilter {
                device_id: Some(1),
                resolved: Some(false),
                since: at(1, 0, 0),
            })
            .await
            .unwrap();
        assert_eq!(unresolved.len(), 1);

        let resolved = store.resolve_alert(alert.id).await.unwrap();
        assert!(resolved.resolved);
        assert!(resolved.resolved_at.is_some());

        let still_unresolved = store
            .alerts(&AlertFilter {
                device_id: Some(1),
                resolved: Some(false),
                since: at(1, 0, 0),
            })
            .await
            .unwrap();
        assert!(still_unresolved.is_empty());

        let err = store.resolve_alert(9999).await.unwrap_err();
        assert!(matches!(err, MonitorError::UnknownAlert(9999)));
    }

    #[tokio::test]
    async fn test_quality_summary_counts_by_device() {
        let store = MemoryStore::new();
        store.add_device(device(1, "INV-001"));
        store.add_device(device(2, "INV-002"));

        store.insert_reading(&reading(1, at(1, 10, 0), Some(5.0), Classification::Valid)).await.unwrap();
        store.insert_reading(&reading(1, at(1, 10, 10), Some(5.0), Classification::Valid)).await.unwrap();
        store.insert_reading(&reading(1, at(1, 10, 20), Some(25.0), Classification::Uncertain)).await.unwrap();
        store.insert_reading(&reading(1, at(1, 10, 30), Some(-1.0), Classification::Quarantine)).await.unwrap();

        let summary = store.quality_summary().await.unwrap();
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].device_code, "INV-001");
        assert_eq!(summary[0].valid_count, 2);
        assert_eq!(summary[0].uncertain_count, 1);
        assert_eq!(summary[0].quarantine_count, 1);
        assert_eq!(summary[0].total_count, 4);
        assert!((summary[0].validity_percentage - 50.0).abs() < 1e-9);

        // A device with no readings still appears.
        assert_eq!(summary[1].device_code, "INV-002");
        assert_eq!(summary[1].total_count, 0);
        assert_eq!(summary[1].validity_percentage, 0.0);
    }

    #[tokio::test]
    async fn test_failure_switch_simulates_outage() {
        let store = MemoryStore::new();
        store.add_device(device(1, "INV-001"));

        store.set_failing(true);
        assert!(store.ping().await.is_err());
        let err = store
            .insert_reading(&reading(1, at(1, 10, 0), Some(5.0), Classification::Valid))
            .await
            .unwrap_err();
        assert!(err.is_retryable());

        store.set_failing(false);
        assert!(store.ping().await.is_ok());
    }
}
