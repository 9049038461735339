//! Hourly generation baselines
//!
//! Holds the per-device, per-hour statistics snapshot that classification
//! reads on the hot path. Lookups clone an `Arc` under a briefly held
//! lock; refreshes build a complete replacement map offline and swap it
//! in atomically, so readers never observe a partially updated snapshot.

mod refresh;

pub use refresh::{RefreshConfig, RefreshLoop};

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use crate::models::HourlyBaseline;

/// Minimum positive-delta samples an hour slot needs inside the window
/// before its statistics are trusted
pub const MIN_BASELINE_SAMPLES: i64 = 5;

type SnapshotMap = HashMap<(i64, u8), HourlyBaseline>;

/// Immutable baseline snapshot with atomic replacement
pub struct BaselineStore {
    snapshot: RwLock<Arc<SnapshotMap>>,
    last_refresh: RwLock<Option<DateTime<Utc>>>,
}

impl BaselineStore {
    pub fn new() -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(HashMap::new())),
            last_refresh: RwLock::new(None),
        }
    }

    /// Look up the baseline for a device at an hour of day
    pub fn get(&self, device_id: i64, hour_of_day: u8) -> Option<HourlyBaseline> {
        let snapshot = Arc::clone(&self.snapshot.read().unwrap());
        snapshot.get(&(device_id, hour_of_day)).cloned()
    }

    /// Replace the whole snapshot with freshly aggregated rows.
    ///
    /// Returns the number of (device, hour) slots installed.
    pub fn install(&self, rows: Vec<HourlyBaseline>) -> usize {
        let mut map: SnapshotMap = HashMap::with_capacity(rows.len());
        for row in rows {
            map.insert((row.device_id, row.hour_of_day), row);
        }
        let count = map.len();
        *self.snapshot.write().unwrap() = Arc::new(map);
        *self.last_refresh.write().unwrap() = Some(Utc::now());
        count
    }

    /// Number of (device, hour) slots in the current snapshot
    pub fn len(&self) -> usize {
        self.snapshot.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// When the snapshot was last replaced
    pub fn last_refresh(&self) -> Option<DateTime<Utc>> {
        *self.last_refresh.read().unwrap()
    }
}

impl Default for BaselineStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(device_id: i64, hour: u8, mean: f64) -> HourlyBaseline {
        HourlyBaseline {
            device_id,
            hour_of_day: hour,
            mean_delta: mean,
            stddev_delta: 0.5,
            min_delta: mean - 1.0,
            max_delta: mean + 1.0,
            sample_count: 7,
            last_updated: Utc::now(),
        }
    }

    #[test]
    fn test_empty_store_returns_none() {
        let store = BaselineStore::new();
        assert!(store.get(1, 12).is_none());
        assert!(store.is_empty());
        assert!(store.last_refresh().is_none());
    }

    #[test]
    fn test_install_and_lookup() {
        let store = BaselineStore::new();
        let installed = store.install(vec![row(1, 12, 10.0), row(1, 13, 9.5), row(2, 12, 4.0)]);
        assert_eq!(installed, 3);
        assert_eq!(store.len(), 3);

        let b = store.get(1, 12).unwrap();
        assert_eq!(b.mean_delta, 10.0);
        assert!(store.get(1, 3).is_none());
        assert!(store.last_refresh().is_some());
    }

    #[test]
    fn test_install_replaces_whole_snapshot() {
        let store = BaselineStore::new();
        store.install(vec![row(1, 12, 10.0), row(1, 13, 9.5)]);
        store.install(vec![row(1, 12, 11.0)]);

        // The slot missing from the second refresh is gone, not stale.
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(1, 12).unwrap().mean_delta, 11.0);
        assert!(store.get(1, 13).is_none());
    }

    #[test]
    fn test_lookups_keep_old_snapshot_alive() {
        let store = BaselineStore::new();
        store.install(vec![row(1, 12, 10.0)]);

        let before = store.get(1, 12).unwrap();
        store.install(vec![row(1, 12, 20.0)]);

        // The clone taken before the swap still carries the old values.
        assert_eq!(before.mean_delta, 10.0);
        assert_eq!(store.get(1, 12).unwrap().mean_delta, 20.0);
    }
}
