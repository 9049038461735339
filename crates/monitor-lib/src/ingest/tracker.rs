//! Per-device runtime state
//!
//! Tracks the transient counters the alert engine needs: the consecutive
//! quarantine streak and the time since the last nonzero delta. State is
//! mutated exactly once per classified reading, only after the reading
//! was persisted, and resets to zero on process restart.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

use crate::models::Classification;

/// Default number of consecutive quarantines before a critical alert
pub const DEFAULT_CONSECUTIVE_QUARANTINE_THRESHOLD: u32 = 3;

/// Default time without a nonzero delta before a frozen-value alert
pub const DEFAULT_FROZEN_VALUE_SECS: i64 = 3600;

/// Thresholds for the edge-triggered alert conditions
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Consecutive quarantined readings that trip the critical alert
    pub consecutive_quarantine_threshold: u32,
    /// How long a device may sit without a nonzero delta during
    /// generation hours before it counts as frozen
    pub frozen_value_duration: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            consecutive_quarantine_threshold: DEFAULT_CONSECUTIVE_QUARANTINE_THRESHOLD,
            frozen_value_duration: Duration::seconds(DEFAULT_FROZEN_VALUE_SECS),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct DeviceRuntimeState {
    consecutive_quarantine: u32,
    streak_alerted: bool,
    last_nonzero_delta: Option<DateTime<Utc>>,
    frozen_alerted: bool,
}

/// What one tracker update observed, consumed by the alert engine
#[derive(Debug, Clone, Copy)]
pub struct TrackerOutcome {
    /// Quarantine streak length including the current reading
    pub consecutive_quarantine: u32,
    /// The streak reached the threshold on this exact reading
    pub quarantine_streak_hit: bool,
    /// Time since the last nonzero delta, if one was ever observed
    pub frozen_for: Option<Duration>,
    /// The frozen duration crossed the threshold on this exact reading
    pub frozen_value_hit: bool,
}

/// Tracks per-device alert state across readings
pub struct RuntimeTracker {
    config: TrackerConfig,
    state: DashMap<i64, DeviceRuntimeState>,
}

impl RuntimeTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            state: DashMap::new(),
        }
    }

    /// Fold one classified reading into the device's runtime state.
    ///
    /// Both alert conditions are edge-triggered: once reported they stay
    /// latched until the condition clears (a non-quarantine reading, a
    /// nonzero delta) and builds up again. `generation_expected` gates the
    /// frozen-value condition; a device idling outside its generation
    /// hours is not frozen.
    pub fn observe(
        &self,
        device_id: i64,
        timestamp: DateTime<Utc>,
        delta: Option<f64>,
        classification: Classification,
        generation_expected: bool,
    ) -> TrackerOutcome {
        let mut entry = self.state.entry(device_id).or_default();
        let state = entry.value_mut();

        if classification == Classification::Quarantine {
            state.consecutive_quarantine += 1;
        } else {
            state.consecutive_quarantine = 0;
            state.streak_alerted = false;
        }

        let quarantine_streak_hit = state.consecutive_quarantine
            >= self.config.consecutive_quarantine_threshold
            && !state.streak_alerted;
        if quarantine_streak_hit {
            state.streak_alerted = true;
        }

        match delta {
            Some(d) if d > 0.0 => {
                state.last_nonzero_delta = Some(timestamp);
                state.frozen_alerted = false;
            }
            _ => {
                // A device first seen while idle counts as frozen from
                // this reading onward.
                if state.last_nonzero_delta.is_none() {
                    state.last_nonzero_delta = Some(timestamp);
                }
            }
        }

        let frozen_for = state.last_nonzero_delta.map(|t| timestamp - t);
        let frozen_value_hit = generation_expected
            && frozen_for.map_or(false, |d| d > self.config.frozen_value_duration)
            && !state.frozen_alerted;
        if frozen_value_hit {
            state.frozen_alerted = true;
        }

        TrackerOutcome {
            consecutive_quarantine: state.consecutive_quarantine,
            quarantine_streak_hit,
            frozen_for,
            frozen_value_hit,
        }
    }

    /// Number of devices with runtime state
    pub fn tracked_devices(&self) -> usize {
        self.state.len()
    }
}

impl Default for RuntimeTracker {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}
