//! Per-item progress values.
//!
//! A [`Progress`] is either [`Progress::Complete`] or
//! [`Progress::Incomplete`] with a percentage in `[0, 100)`. Inputs are
//! clamped on construction, so every value is valid and the order below is
//! total:
//!
//! - `Complete` is greater than every `Incomplete` value
//! - `Incomplete` values are ordered by their percentage

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A percentage in `[0, 100)`.
///
/// Only constructed through [`Progress`], which guarantees the range and
/// excludes NaN. Deserialization rejects anything outside that range.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(try_from = "f64")]
pub struct Percent(f64);

impl Percent {
    /// Returns the percentage.
    #[inline]
    pub fn value(&self) -> f64 {
        self.0
    }
}

impl TryFrom<f64> for Percent {
    type Error = String;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        if (0.0..100.0).contains(&value) {
            Ok(Percent(value))
        } else {
            Err(format!("incomplete percentage {value} outside [0, 100)"))
        }
    }
}

impl PartialEq for Percent {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Percent {}

impl PartialOrd for Percent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Percent {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Completion state of one item's save or fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Progress {
    /// The item has not finished.
    Incomplete(Percent),
    /// The item has finished.
    Complete,
}

impl Progress {
    /// Creates a progress value from a raw percentage and a "done" signal.
    ///
    /// `done` always gives `Complete`. Otherwise the percentage is clamped as
    /// in [`from_percent`](Self::from_percent).
    pub fn from_raw(percent: f64, done: bool) -> Self {
        if done {
            Progress::Complete
        } else {
            Self::from_percent(percent)
        }
    }

    /// Creates a progress value from a percentage.
    ///
    /// Values at or below zero (and NaN) map to `Incomplete(0)`, values at or
    /// above 100 map to `Complete`.
    pub fn from_percent(percent: f64) -> Self {
        if percent.is_nan() || percent <= 0.0 {
            Progress::Incomplete(Percent(0.0))
        } else if percent >= 100.0 {
            Progress::Complete
        } else {
            Progress::Incomplete(Percent(percent))
        }
    }

    /// Returns the percentage, with `Complete` reported as 100.
    pub fn percent(&self) -> f64 {
        match self {
            Progress::Incomplete(p) => p.value(),
            Progress::Complete => 100.0,
        }
    }

    /// Returns true if this is `Complete`.
    pub fn is_complete(&self) -> bool {
        matches!(self, Progress::Complete)
    }
}

impl Default for Progress {
    fn default() -> Self {
        Progress::Incomplete(Percent(0.0))
    }
}

impl PartialOrd for Progress {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Progress {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Progress::Complete, Progress::Complete) => Ordering::Equal,
            (Progress::Complete, Progress::Incomplete(_)) => Ordering::Greater,
            (Progress::Incomplete(_), Progress::Complete) => Ordering::Less,
            (Progress::Incomplete(a), Progress::Incomplete(b)) => a.cmp(b),
        }
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Progress::Incomplete(p) => write!(f, "{:.1}%", p.value()),
            Progress::Complete => write!(f, "complete"),
        }
    }
}
