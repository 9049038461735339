//! Reading classification
//!
//! Applies the first-match decision ladder that assigns every delta a
//! three-way verdict: valid, uncertain or quarantine. The classifier is
//! pure; callers hand it the already-computed delta together with the
//! hourly baseline looked up for the reading's hour.

use crate::models::{Classification, HourlyBaseline};

/// Default percent tolerance around the hourly mean
pub const DEFAULT_TOLERANCE_PERCENTAGE: f64 = 10.0;

/// Default multiple of the hourly mean accepted before a delta is a spike
pub const DEFAULT_EXTENDED_TOLERANCE_MULTIPLIER: f64 = 2.5;

/// Default minimum hourly mean (kWh) for an hour to count as generating
pub const DEFAULT_GENERATION_FLOOR: f64 = 0.1;

/// Reason strings attached to stored readings and API responses
pub mod reasons {
    pub const NEGATIVE_DELTA: &str = "negative delta";
    pub const FROZEN_DURING_GENERATION: &str = "frozen value during expected generation";
    pub const NO_GENERATION_EXPECTED: &str = "no generation expected at this hour";
    pub const NO_BASELINE: &str = "no baseline yet";
    pub const FIRST_READING: &str = "first reading for device";
    pub const NEGATIVE_INITIAL: &str = "negative initial value";
    pub const WITHIN_NORMAL_RANGE: &str = "within normal range";
    pub const OUTSIDE_NORMAL_RANGE: &str = "outside normal range, within extended tolerance";
    pub const BEYOND_EXTENDED_TOLERANCE: &str = "beyond extended tolerance, flagged for review";
}

/// Tunable thresholds for the classification ladder
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// Percent tolerance around the hourly mean treated as normal
    pub tolerance_percentage: f64,
    /// Multiple of the hourly mean accepted before a delta is called a spike
    pub extended_tolerance_multiplier: f64,
    /// Minimum hourly mean for an hour to count as expected generation
    pub generation_floor: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            tolerance_percentage: DEFAULT_TOLERANCE_PERCENTAGE,
            extended_tolerance_multiplier: DEFAULT_EXTENDED_TOLERANCE_MULTIPLIER,
            generation_floor: DEFAULT_GENERATION_FLOOR,
        }
    }
}

impl ClassifierConfig {
    /// True when the baseline says this hour normally produces energy
    pub fn generation_expected(&self, baseline: Option<&HourlyBaseline>) -> bool {
        baseline
            .map(|b| b.mean_delta > self.generation_floor)
            .unwrap_or(false)
    }
}

/// Outcome of classifying a single reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub classification: Classification,
    pub reason: &'static str,
}

impl Verdict {
    fn valid(reason: &'static str) -> Self {
        Self {
            classification: Classification::Valid,
            reason,
        }
    }

    fn uncertain(reason: &'static str) -> Self {
        Self {
            classification: Classification::Uncertain,
            reason,
        }
    }

    fn quarantine(reason: &'static str) -> Self {
        Self {
            classification: Classification::Quarantine,
            reason,
        }
    }
}

/// Classify a prepared reading against its hourly baseline.
///
/// Rules are evaluated top to bottom and the first match wins. `delta` is
/// `None` only for a device's first cumulative reading, where no previous
/// counter value exists to subtract from.
pub fn classify(
    delta: Option<f64>,
    cumulative_value: f64,
    baseline: Option<&HourlyBaseline>,
    config: &ClassifierConfig,
) -> Verdict {
    let delta = match delta {
        Some(d) => d,
        None => {
            // First reading establishes the counter origin. Accept it
            // unless the counter itself is impossible.
            if cumulative_value < 0.0 {
                return Verdict::quarantine(reasons::NEGATIVE_INITIAL);
            }
            return Verdict::valid(reasons::FIRST_READING);
        }
    };

    // A cumulative counter never decreases; a negative delta means meter
    // reset or data corruption.
    if delta < 0.0 {
        return Verdict::quarantine(reasons::NEGATIVE_DELTA);
    }

    // Zero delta is normal overnight but suspicious while the baseline
    // says the device should be generating.
    if delta == 0.0 {
        return if config.generation_expected(baseline) {
            Verdict::quarantine(reasons::FROZEN_DURING_GENERATION)
        } else {
            Verdict::valid(reasons::NO_GENERATION_EXPECTED)
        };
    }

    let baseline = match baseline {
        Some(b) => b,
        None => return Verdict::valid(reasons::NO_BASELINE),
    };

    let tolerance = baseline.mean_delta * config.tolerance_percentage / 100.0;
    if delta >= baseline.mean_delta - tolerance && delta <= baseline.mean_delta + tolerance {
        return Verdict::valid(reasons::WITHIN_NORMAL_RANGE);
    }

    // Spikes are flagged for review rather than quarantined; legitimate
    // clear-sky peaks would otherwise be discarded.
    let extended_bound = baseline.mean_delta * config.extended_tolerance_multiplier;
    if delta <= extended_bound {
        Verdict::uncertain(reasons::OUTSIDE_NORMAL_RANGE)
    } else {
        Verdict::uncertain(reasons::BEYOND_EXTENDED_TOLERANCE)
    }
}
