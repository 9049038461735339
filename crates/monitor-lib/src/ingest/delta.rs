//! Delta computation from cumulative counters
//!
//! Keeps the last accepted reading per device in memory and turns each
//! incoming cumulative counter into an interval delta. The cache advances
//! in two steps: `prepare` computes the candidate delta and enforces
//! ordering, `commit` records the reading once it has been persisted. A
//! failed persist leaves the cache untouched, so the same input can be
//! resubmitted.

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::error::{MonitorError, Result};
use crate::models::ReadingValue;

/// Last accepted reading for one device
#[derive(Debug, Clone, Copy)]
pub struct LastAccepted {
    pub timestamp: DateTime<Utc>,
    pub cumulative_value: f64,
}

/// A delta computed by `prepare`, not yet committed
#[derive(Debug, Clone, Copy)]
pub struct PreparedReading {
    /// Interval delta; `None` for a device's first cumulative reading
    pub delta: Option<f64>,
    /// Counter position this reading leaves the device at
    pub cumulative_value: f64,
}

/// In-memory last-value cache keyed by device id
#[derive(Debug, Default)]
pub struct DeltaEngine {
    last: DashMap<i64, LastAccepted>,
}

impl DeltaEngine {
    pub fn new() -> Self {
        Self {
            last: DashMap::new(),
        }
    }

    /// True once the device has a cached last reading
    pub fn is_tracked(&self, device_id: i64) -> bool {
        self.last.contains_key(&device_id)
    }

    /// Number of devices currently cached
    pub fn tracked_devices(&self) -> usize {
        self.last.len()
    }

    /// Seed the cache from the store's latest persisted reading.
    ///
    /// Called once per device on first touch after a restart. An existing
    /// entry always wins over the seed.
    pub fn seed(&self, device_id: i64, timestamp: DateTime<Utc>, cumulative_value: f64) {
        self.last.entry(device_id).or_insert(LastAccepted {
            timestamp,
            cumulative_value,
        });
    }

    /// Compute the candidate delta for an incoming reading.
    ///
    /// Rejects timestamps that are not strictly after the last accepted
    /// reading. Never mutates the cache.
    pub fn prepare(
        &self,
        device_id: i64,
        timestamp: DateTime<Utc>,
        value: ReadingValue,
    ) -> Result<PreparedReading> {
        let last = self.last.get(&device_id).map(|entry| *entry.value());

        if let Some(last) = last {
            if timestamp <= last.timestamp {
                return Err(MonitorError::DuplicateOrOutOfOrder {
                    device_id,
                    timestamp,
                    last_accepted: last.timestamp,
                });
            }
        }

        let prepared = match (value, last) {
            (ReadingValue::Cumulative(v), Some(last)) => PreparedReading {
                delta: Some(v - last.cumulative_value),
                cumulative_value: v,
            },
            // The first cumulative reading only establishes the counter
            // origin; there is nothing to subtract from yet.
            (ReadingValue::Cumulative(v), None) => PreparedReading {
                delta: None,
                cumulative_value: v,
            },
            // Gateways that pre-compute deltas skip the subtraction; the
            // counter position is still carried forward for continuity.
            (ReadingValue::ExplicitDelta(d), Some(last)) => PreparedReading {
                delta: Some(d),
                cumulative_value: last.cumulative_value + d,
            },
            (ReadingValue::ExplicitDelta(d), None) => PreparedReading {
                delta: Some(d),
                cumulative_value: d,
            },
        };

        Ok(prepared)
    }

    /// Advance the cache after the reading was persisted
    pub fn commit(&self, device_id: i64, timestamp: DateTime<Utc>, cumulative_value: f64) {
        self.last.insert(
            device_id,
            LastAccepted {
                timestamp,
                cumulative_value,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_first_cumulative_reading_has_no_delta() {
        let engine = DeltaEngine::new();
        let prepared = engine.prepare(1, ts(100), ReadingValue::Cumulative(5000.0)).unwrap();
        assert_eq!(prepared.delta, None);
        assert_eq!(prepared.cumulative_value, 5000.0);
    }

    #[test]
    fn test_delta_computed_from_previous_counter() {
        let engine = DeltaEngine::new();
        engine.commit(1, ts(100), 5000.0);
        let prepared = engine.prepare(1, ts(200), ReadingValue::Cumulative(5010.5)).unwrap();
        assert_eq!(prepared.delta, Some(10.5));
        assert_eq!(prepared.cumulative_value, 5010.5);
    }

    #[test]
    fn test_counter_reset_produces_negative_delta() {
        let engine = DeltaEngine::new();
        engine.commit(1, ts(100), 5000.0);
        let prepared = engine.prepare(1, ts(200), ReadingValue::Cumulative(20.0)).unwrap();
        assert_eq!(prepared.delta, Some(-4980.0));
    }

    #[test]
    fn test_duplicate_timestamp_rejected() {
        let engine = DeltaEngine::new();
        engine.commit(1, ts(100), 5000.0);
        let err = engine
            .prepare(1, ts(100), ReadingValue::Cumulative(5001.0))
            .unwrap_err();
        assert!(matches!(err, MonitorError::DuplicateOrOutOfOrder { .. }));
    }

    #[test]
    fn test_out_of_order_timestamp_rejected() {
        let engine = DeltaEngine::new();
        engine.commit(1, ts(100), 5000.0);
        let err = engine
            .prepare(1, ts(50), ReadingValue::Cumulative(5001.0))
            .unwrap_err();
        assert!(matches!(err, MonitorError::DuplicateOrOutOfOrder { .. }));
    }

    #[test]
    fn test_prepare_does_not_advance_the_cache() {
        let engine = DeltaEngine::new();
        engine.commit(1, ts(100), 5000.0);

        // Two prepares at the same timestamp both succeed as long as no
        // commit happened in between, which is what makes a retry after a
        // failed persist possible.
        assert!(engine.prepare(1, ts(200), ReadingValue::Cumulative(5010.0)).is_ok());
        assert!(engine.prepare(1, ts(200), ReadingValue::Cumulative(5010.0)).is_ok());

        engine.commit(1, ts(200), 5010.0);
        assert!(engine.prepare(1, ts(200), ReadingValue::Cumulative(5010.0)).is_err());
    }

    #[test]
    fn test_explicit_delta_bypasses_subtraction() {
        let engine = DeltaEngine::new();
        engine.commit(1, ts(100), 5000.0);
        let prepared = engine.prepare(1, ts(200), ReadingValue::ExplicitDelta(7.5)).unwrap();
        assert_eq!(prepared.delta, Some(7.5));
        assert_eq!(prepared.cumulative_value, 5007.5);
    }

    #[test]
    fn test_explicit_delta_first_reading_keeps_delta() {
        let engine = DeltaEngine::new();
        let prepared = engine.prepare(1, ts(100), ReadingValue::ExplicitDelta(3.0)).unwrap();
        assert_eq!(prepared.delta, Some(3.0));
        assert_eq!(prepared.cumulative_value, 3.0);
    }

    #[test]
    fn test_seed_never_overwrites_live_entry() {
        let engine = DeltaEngine::new();
        engine.commit(1, ts(200), 6000.0);
        engine.seed(1, ts(100), 5000.0);

        let prepared = engine.prepare(1, ts(300), ReadingValue::Cumulative(6010.0)).unwrap();
        assert_eq!(prepared.delta, Some(10.0));
    }

    #[test]
    fn test_devices_tracked_independently() {
        let engine = DeltaEngine::new();
        engine.commit(1, ts(100), 5000.0);
        assert!(engine.is_tracked(1));
        assert!(!engine.is_tracked(2));

        let prepared = engine.prepare(2, ts(50), ReadingValue::Cumulative(10.0)).unwrap();
        assert_eq!(prepared.delta, None);
        assert_eq!(engine.tracked_devices(), 1);
    }
}
