//! End-to-end pipeline tests over the in-memory store

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};

use super::{reasons, ClassifierConfig, IngestOutcome, Ingestor, TrackerConfig};
use crate::alert::Notifier;
use crate::baseline::BaselineStore;
use crate::error::{MonitorError, Result};
use crate::models::{
    AlertSeverity, AlertType, Classification, Device, DeviceStatus, HourlyBaseline, ReadingInput,
    ReadingValue,
};
use crate::store::{MemoryStore, ReadingStore};

struct Pipeline {
    store: Arc<MemoryStore>,
    baselines: Arc<BaselineStore>,
    notifier: Notifier,
    ingestor: Ingestor,
}

fn pipeline() -> Pipeline {
    let store = Arc::new(MemoryStore::new());
    store.add_device(Device {
        id: 1,
        device_code: "INV-001".to_string(),
        device_name: "Roof array inverter".to_string(),
        nominal_power: 50.0,
        status: DeviceStatus::Active,
    });
    let baselines = Arc::new(BaselineStore::new());
    let notifier = Notifier::new(16);
    let ingestor = Ingestor::new(
        Arc::clone(&store) as Arc<dyn ReadingStore>,
        Arc::clone(&baselines),
        notifier.clone(),
        ClassifierConfig::default(),
        TrackerConfig::default(),
    );
    Pipeline {
        store,
        baselines,
        notifier,
        ingestor,
    }
}

fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, hour, minute, 0).unwrap()
}

fn baseline_for(hour_of_day: u8) -> HourlyBaseline {
    HourlyBaseline {
        device_id: 1,
        hour_of_day,
        mean_delta: 10.0,
        stddev_delta: 1.2,
        min_delta: 8.0,
        max_delta: 12.0,
        sample_count: 7,
        last_updated: Utc::now(),
    }
}

async fn send(p: &Pipeline, ts: DateTime<Utc>, value: f64) -> Result<IngestOutcome> {
    p.ingestor
        .ingest(
            1,
            ReadingInput {
                timestamp: ts,
                value: ReadingValue::Cumulative(value),
            },
        )
        .await
}

fn alerts_of(outcome: &IngestOutcome, alert_type: AlertType) -> usize {
    outcome
        .alerts
        .iter()
        .filter(|a| a.alert_type == alert_type)
        .count()
}

#[tokio::test]
async fn test_first_reading_establishes_counter_origin() {
    let p = pipeline();

    let outcome = send(&p, at(12, 0), 5000.0).await.unwrap();
    assert_eq!(outcome.reading.delta, None);
    assert_eq!(outcome.reading.classification, Classification::Valid);
    assert_eq!(outcome.reading.reason, reasons::FIRST_READING);
    assert!(outcome.alerts.is_empty());
}

#[tokio::test]
async fn test_cumulative_delta_against_previous_reading() {
    let p = pipeline();

    send(&p, at(12, 0), 5000.0).await.unwrap();
    let outcome = send(&p, at(12, 10), 5010.5).await.unwrap();

    assert_eq!(outcome.reading.delta, Some(10.5));
    assert_eq!(outcome.reading.cumulative_value, 5010.5);
    // No baseline installed, so the verdict stays permissive.
    assert_eq!(outcome.reading.classification, Classification::Valid);
    assert_eq!(outcome.reading.reason, reasons::NO_BASELINE);
}

#[tokio::test]
async fn test_explicit_delta_carries_counter_forward() {
    let p = pipeline();

    let first = p
        .ingestor
        .ingest(
            1,
            ReadingInput {
                timestamp: at(12, 0),
                value: ReadingValue::ExplicitDelta(5.0),
            },
        )
        .await
        .unwrap();
    assert_eq!(first.reading.delta, Some(5.0));
    assert_eq!(first.reading.cumulative_value, 5.0);

    // A cumulative reading picks up from the carried counter position.
    let second = send(&p, at(12, 10), 15.0).await.unwrap();
    assert_eq!(second.reading.delta, Some(10.0));
}

#[tokio::test]
async fn test_unknown_device_rejected() {
    let p = pipeline();

    let err = p
        .ingestor
        .ingest(
            99,
            ReadingInput {
                timestamp: at(12, 0),
                value: ReadingValue::Cumulative(1.0),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, MonitorError::UnknownDevice(99)));
    assert!(err.is_input_error());
}

#[tokio::test]
async fn test_duplicate_timestamp_rejected_without_side_effects() {
    let p = pipeline();

    send(&p, at(12, 0), 5000.0).await.unwrap();
    send(&p, at(12, 10), 5010.0).await.unwrap();

    let err = send(&p, at(12, 10), 5020.0).await.unwrap_err();
    assert!(matches!(err, MonitorError::DuplicateOrOutOfOrder { .. }));
    assert!(err.is_input_error());

    // The rejected reading left no row behind.
    let latest = p.store.latest_reading(1).await.unwrap().unwrap();
    assert_eq!(latest.cumulative_value, 5010.0);

    // Processing continues normally afterwards.
    let outcome = send(&p, at(12, 20), 5020.0).await.unwrap();
    assert_eq!(outcome.reading.delta, Some(10.0));
}

#[tokio::test]
async fn test_classification_against_installed_baseline() {
    let p = pipeline();
    p.baselines.install(vec![baseline_for(12)]);

    send(&p, at(12, 0), 5000.0).await.unwrap();

    // Within mean +/- 10%.
    let ok = send(&p, at(12, 10), 5010.2).await.unwrap();
    assert_eq!(ok.reading.classification, Classification::Valid);
    assert_eq!(ok.reading.reason, reasons::WITHIN_NORMAL_RANGE);

    // Outside tolerance, inside the extended band.
    let high = send(&p, at(12, 20), 5022.2).await.unwrap();
    assert_eq!(high.reading.classification, Classification::Uncertain);
    assert_eq!(high.reading.reason, reasons::OUTSIDE_NORMAL_RANGE);
}

#[tokio::test]
async fn test_negative_delta_quarantined_and_alerted() {
    let p = pipeline();

    send(&p, at(12, 0), 5000.0).await.unwrap();
    let outcome = send(&p, at(12, 10), 4997.0).await.unwrap();

    assert_eq!(outcome.reading.delta, Some(-3.0));
    assert_eq!(outcome.reading.classification, Classification::Quarantine);
    assert_eq!(outcome.reading.reason, reasons::NEGATIVE_DELTA);

    assert_eq!(alerts_of(&outcome, AlertType::NegativeDelta), 1);
    let alert = &outcome.alerts[0];
    assert_eq!(alert.severity, AlertSeverity::Warning);
    assert_eq!(alert.device_code, "INV-001");
    assert_eq!(alert.details["delta"].as_f64(), Some(-3.0));
}

#[tokio::test]
async fn test_quarantine_streak_fires_once_then_rearms() {
    let p = pipeline();
    let base = at(12, 0);

    send(&p, base, 1000.0).await.unwrap();

    // Three decreasing readings; the critical fires exactly on the third.
    let mut value = 1000.0;
    for minutes in [10, 20] {
        value -= 1.0;
        let outcome = send(&p, base + Duration::minutes(minutes), value).await.unwrap();
        assert_eq!(alerts_of(&outcome, AlertType::ConsecutiveQuarantine), 0);
    }
    value -= 1.0;
    let third = send(&p, base + Duration::minutes(30), value).await.unwrap();
    assert_eq!(alerts_of(&third, AlertType::ConsecutiveQuarantine), 1);
    let critical = third
        .alerts
        .iter()
        .find(|a| a.alert_type == AlertType::ConsecutiveQuarantine)
        .unwrap();
    assert_eq!(critical.severity, AlertSeverity::Critical);
    assert_eq!(critical.details["consecutive_count"].as_u64(), Some(3));

    // Still quarantined, but the streak alert stays latched.
    value -= 1.0;
    let fourth = send(&p, base + Duration::minutes(40), value).await.unwrap();
    assert_eq!(alerts_of(&fourth, AlertType::ConsecutiveQuarantine), 0);
    assert_eq!(alerts_of(&fourth, AlertType::NegativeDelta), 1);

    // A clean reading breaks the streak and re-arms the latch.
    value += 20.0;
    let clean = send(&p, base + Duration::minutes(50), value).await.unwrap();
    assert_eq!(clean.reading.classification, Classification::Valid);

    let mut criticals = 0;
    for minutes in [60, 70, 80] {
        value -= 1.0;
        let outcome = send(&p, base + Duration::minutes(minutes), value).await.unwrap();
        criticals += alerts_of(&outcome, AlertType::ConsecutiveQuarantine);
    }
    assert_eq!(criticals, 1);
}

#[tokio::test]
async fn test_frozen_value_alert_crosses_threshold_once() {
    let p = pipeline();
    // The run spans two hour slots, both with expected generation.
    p.baselines.install(vec![baseline_for(12), baseline_for(13)]);

    let base = at(12, 0);
    send(&p, base, 5000.0).await.unwrap();

    // The counter never moves for two hours at ten-minute cadence.
    for minutes in (10..=120).step_by(10) {
        let outcome = send(&p, base + Duration::minutes(minutes), 5000.0)
            .await
            .unwrap();
        let frozen = alerts_of(&outcome, AlertType::FrozenValue);

        if minutes == 70 {
            // First reading strictly past the one-hour threshold.
            assert_eq!(frozen, 1, "expected the frozen alert at minute {}", minutes);
            let alert = outcome
                .alerts
                .iter()
                .find(|a| a.alert_type == AlertType::FrozenValue)
                .unwrap();
            assert_eq!(alert.details["frozen_for_minutes"].as_i64(), Some(70));
        } else {
            assert_eq!(frozen, 0, "unexpected frozen alert at minute {}", minutes);
        }
    }
}

#[tokio::test]
async fn test_zero_delta_outside_generation_hours_is_valid() {
    let p = pipeline();
    // Nighttime slot: the baseline says this hour produces nothing.
    p.baselines.install(vec![HourlyBaseline {
        mean_delta: 0.0,
        ..baseline_for(2)
    }]);

    p.ingestor
        .ingest(
            1,
            ReadingInput {
                timestamp: Utc.with_ymd_and_hms(2024, 6, 1, 2, 0, 0).unwrap(),
                value: ReadingValue::Cumulative(5000.0),
            },
        )
        .await
        .unwrap();
    let outcome = p
        .ingestor
        .ingest(
            1,
            ReadingInput {
                timestamp: Utc.with_ymd_and_hms(2024, 6, 1, 2, 10, 0).unwrap(),
                value: ReadingValue::Cumulative(5000.0),
            },
        )
        .await
        .unwrap();

    assert_eq!(outcome.reading.classification, Classification::Valid);
    assert_eq!(outcome.reading.reason, reasons::NO_GENERATION_EXPECTED);
    assert!(outcome.alerts.is_empty());
}

#[tokio::test]
async fn test_store_outage_leaves_reading_retryable() {
    let p = pipeline();

    send(&p, at(12, 0), 5000.0).await.unwrap();

    p.store.set_failing(true);
    let err = send(&p, at(12, 10), 5010.0).await.unwrap_err();
    assert!(err.is_retryable());
    assert!(!err.is_input_error());

    // The delta cache did not advance, so the identical retry succeeds
    // with the correct delta once the store recovers.
    p.store.set_failing(false);
    let outcome = send(&p, at(12, 10), 5010.0).await.unwrap();
    assert_eq!(outcome.reading.delta, Some(10.0));
}

#[tokio::test]
async fn test_restart_rehydrates_from_persisted_readings() {
    let p = pipeline();

    send(&p, at(12, 0), 5000.0).await.unwrap();
    send(&p, at(12, 10), 5010.0).await.unwrap();

    // A fresh pipeline over the same store stands in for a restart.
    let restarted = Ingestor::new(
        Arc::clone(&p.store) as Arc<dyn ReadingStore>,
        Arc::new(BaselineStore::new()),
        Notifier::new(16),
        ClassifierConfig::default(),
        TrackerConfig::default(),
    );

    // Stale replays are still rejected against the persisted position.
    let err = restarted
        .ingest(
            1,
            ReadingInput {
                timestamp: at(12, 10),
                value: ReadingValue::Cumulative(5010.0),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, MonitorError::DuplicateOrOutOfOrder { .. }));

    // And the next reading deltas against the persisted counter.
    let outcome = restarted
        .ingest(
            1,
            ReadingInput {
                timestamp: at(12, 20),
                value: ReadingValue::Cumulative(5022.0),
            },
        )
        .await
        .unwrap();
    assert_eq!(outcome.reading.delta, Some(12.0));
}

#[tokio::test]
async fn test_only_valid_readings_feed_the_clean_series() {
    let p = pipeline();

    send(&p, at(12, 0), 5000.0).await.unwrap();
    send(&p, at(12, 10), 5010.0).await.unwrap(); // valid, +10
    send(&p, at(12, 20), 5005.0).await.unwrap(); // quarantine, -5

    let baselines = p
        .store
        .collect_baselines(at(0, 0), 1)
        .await
        .unwrap();
    assert_eq!(baselines.len(), 1);
    assert_eq!(baselines[0].sample_count, 1);
    assert_eq!(baselines[0].mean_delta, 10.0);
}

#[tokio::test]
async fn test_persisted_alerts_reach_subscribers() {
    let p = pipeline();
    let mut rx = p.notifier.subscribe();

    send(&p, at(12, 0), 5000.0).await.unwrap();
    send(&p, at(12, 10), 4995.0).await.unwrap();

    let message = rx.recv().await.unwrap();
    let payload: serde_json::Value = serde_json::from_str(&message).unwrap();
    assert_eq!(payload["alert_type"], "negative_delta");
    assert_eq!(payload["device_code"], "INV-001");
    assert_eq!(payload["severity"], "warning");
}
