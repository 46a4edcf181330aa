//! Time codes: totally ordered, possibly non-integral sample coordinates.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Evaluation time for time-sampled attributes.
///
/// Ordering uses `f64::total_cmp`, so every value (including NaN) has a
/// stable position and the type can key ordered maps. `-0.0` is folded
/// into `0.0` on construction so both address the same sample.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(from = "f64", into = "f64")]
pub struct TimeCode(f64);

impl TimeCode {
    pub const ZERO: TimeCode = TimeCode(0.0);

    pub fn new(value: f64) -> Self {
        if value == 0.0 { Self(0.0) } else { Self(value) }
    }

    pub fn value(self) -> f64 {
        self.0
    }

    /// Fraction of the way from `a` to `b` (clamped to 0..=1).
    pub fn alpha(self, a: TimeCode, b: TimeCode) -> f64 {
        let span = b.0 - a.0;
        if span <= 0.0 {
            return 0.0;
        }
        ((self.0 - a.0) / span).clamp(0.0, 1.0)
    }
}

impl From<f64> for TimeCode {
    fn from(v: f64) -> Self {
        TimeCode::new(v)
    }
}

impl From<TimeCode> for f64 {
    fn from(t: TimeCode) -> Self {
        t.0
    }
}

impl PartialEq for TimeCode {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for TimeCode {}

impl PartialOrd for TimeCode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimeCode {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl Hash for TimeCode {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

impl fmt::Display for TimeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
