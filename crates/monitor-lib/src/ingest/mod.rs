//! Reading ingestion pipeline
//!
//! Turns raw meter reports into classified, persisted readings:
//! - Delta computation against the per-device counter cache
//! - Classification against the hourly baseline snapshot
//! - Runtime tracking for streak and frozen-value conditions
//! - Alert evaluation, persistence and fan-out
//!
//! Processing is serialized per device; different devices proceed in
//! parallel.

mod classify;
mod delta;
mod tracker;

#[cfg(test)]
mod tests;

pub use classify::{classify, reasons, ClassifierConfig, Verdict};
pub use delta::{DeltaEngine, LastAccepted, PreparedReading};
pub use tracker::{RuntimeTracker, TrackerConfig, TrackerOutcome};

use std::sync::Arc;
use std::time::Instant;

use chrono::Timelike;
use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::alert::{AlertEngine, Notifier};
use crate::baseline::BaselineStore;
use crate::error::{MonitorError, Result};
use crate::models::{Alert, AlertPayload, Device, NewReading, Reading, ReadingInput};
use crate::observability::{MonitorMetrics, StructuredLogger};
use crate::store::ReadingStore;

/// Everything one accepted reading produced
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub reading: Reading,
    pub alerts: Vec<Alert>,
}

/// The ingestion pipeline, shared across request handlers
pub struct Ingestor {
    store: Arc<dyn ReadingStore>,
    baselines: Arc<BaselineStore>,
    delta_engine: DeltaEngine,
    tracker: RuntimeTracker,
    alert_engine: AlertEngine,
    notifier: Notifier,
    classifier_config: ClassifierConfig,
    locks: DashMap<i64, Arc<Mutex<()>>>,
    metrics: MonitorMetrics,
    logger: StructuredLogger,
}

impl Ingestor {
    pub fn new(
        store: Arc<dyn ReadingStore>,
        baselines: Arc<BaselineStore>,
        notifier: Notifier,
        classifier_config: ClassifierConfig,
        tracker_config: TrackerConfig,
    ) -> Self {
        Self {
            store,
            baselines,
            delta_engine: DeltaEngine::new(),
            tracker: RuntimeTracker::new(tracker_config),
            alert_engine: AlertEngine::new(),
            notifier,
            classifier_config,
            locks: DashMap::new(),
            metrics: MonitorMetrics::new(),
            logger: StructuredLogger::new("energy-monitor"),
        }
    }

    /// Process one reading end to end.
    ///
    /// Input errors reject the reading without side effects; a store
    /// error leaves the delta cache unchanged so the same reading can be
    /// retried once the store recovers.
    pub async fn ingest(&self, device_id: i64, input: ReadingInput) -> Result<IngestOutcome> {
        let started = Instant::now();

        let device = match self.store.device(device_id).await? {
            Some(device) => device,
            None => {
                self.metrics.inc_readings_rejected();
                return Err(MonitorError::UnknownDevice(device_id));
            }
        };

        // Readings for the same counter must not race the prepare/commit
        // window; clone the lock handle out before awaiting on it.
        let lock = {
            let entry = self
                .locks
                .entry(device_id)
                .or_insert_with(|| Arc::new(Mutex::new(())));
            Arc::clone(entry.value())
        };
        let _guard = lock.lock().await;

        let result = self.process(&device, &input).await;

        match &result {
            Ok(outcome) => {
                self.metrics
                    .inc_readings_processed(outcome.reading.classification.as_str());
                self.metrics
                    .observe_ingest_latency(started.elapsed().as_secs_f64());
                self.metrics
                    .set_devices_tracked(self.delta_engine.tracked_devices() as i64);
                self.logger.log_reading_processed(
                    &device.device_code,
                    outcome.reading.classification.as_str(),
                    &outcome.reading.reason,
                    outcome.reading.delta,
                );
            }
            Err(e) if e.is_input_error() => {
                self.metrics.inc_readings_rejected();
                self.logger
                    .log_reading_rejected(&device.device_code, &e.to_string());
            }
            Err(_) => {}
        }

        result
    }

    async fn process(&self, device: &Device, input: &ReadingInput) -> Result<IngestOutcome> {
        // Lazy rehydration after restart: the last persisted reading comes
        // back from the store before the first delta is computed.
        if !self.delta_engine.is_tracked(device.id) {
            if let Some(last) = self.store.latest_reading(device.id).await? {
                self.delta_engine
                    .seed(device.id, last.timestamp, last.cumulative_value);
            }
        }

        let prepared = self
            .delta_engine
            .prepare(device.id, input.timestamp, input.value)?;

        let hour = input.timestamp.hour() as u8;
        let baseline = self.baselines.get(device.id, hour);
        let verdict = classify(
            prepared.delta,
            prepared.cumulative_value,
            baseline.as_ref(),
            &self.classifier_config,
        );

        let new_reading = NewReading {
            device_id: device.id,
            timestamp: input.timestamp,
            cumulative_value: prepared.cumulative_value,
            delta: prepared.delta,
            classification: verdict.classification,
            reason: verdict.reason.to_string(),
        };

        let reading = match self.store.insert_reading(&new_reading).await {
            Ok(reading) => reading,
            Err(e) => {
                self.metrics.inc_store_errors();
                self.logger
                    .log_store_unavailable("insert_reading", &e.to_string());
                return Err(e);
            }
        };

        // The cache advances only after the row is durable.
        self.delta_engine
            .commit(device.id, reading.timestamp, reading.cumulative_value);

        let generation_expected = self
            .classifier_config
            .generation_expected(baseline.as_ref());
        let outcome = self.tracker.observe(
            device.id,
            reading.timestamp,
            reading.delta,
            reading.classification,
            generation_expected,
        );

        let new_alerts = self.alert_engine.evaluate(
            device,
            reading.timestamp,
            reading.delta,
            reading.cumulative_value,
            &reading.reason,
            &outcome,
        );

        let mut alerts = Vec::with_capacity(new_alerts.len());
        for new_alert in &new_alerts {
            match self.store.insert_alert(new_alert).await {
                Ok(alert) => {
                    self.metrics
                        .inc_alerts_fired(alert.alert_type.as_str(), alert.severity.as_str());
                    self.logger.log_alert(
                        &alert.device_code,
                        alert.alert_type.as_str(),
                        alert.severity.as_str(),
                        &alert.message,
                    );
                    self.notifier.broadcast(&AlertPayload::from(&alert));
                    self.metrics.inc_alerts_broadcast();
                    alerts.push(alert);
                }
                Err(e) => {
                    // The reading is already durable; failing the whole
                    // call would make the gateway retry a timestamp the
                    // delta cache has moved past.
                    self.metrics.inc_store_errors();
                    self.logger
                        .log_store_unavailable("insert_alert", &e.to_string());
                }
            }
        }

        Ok(IngestOutcome { reading, alerts })
    }

    /// Devices with a live entry in the delta cache
    pub fn tracked_devices(&self) -> usize {
        self.delta_engine.tracked_devices()
    }
}
