//! Threshold and watermark types for deadline notifications.
//!
//! A threshold is an hours-before-deadline marker (48 means "notify once no
//! more than 48 hours remain"; 0 means "the deadline has passed"). The
//! watermark is the most urgent threshold already announced for a task and
//! gates duplicate notifications across evaluation cycles.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ValidationError;

/// Watermark value meaning "never notified". Larger than any real threshold.
pub const SENTINEL_HOURS: i64 = 100;

/// An hours-before-deadline notification marker.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(transparent)]
pub struct Threshold(i64);

impl Threshold {
    pub fn hours(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}h", self.0)
    }
}

impl TryFrom<i64> for Threshold {
    type Error = ValidationError;

    fn try_from(hours: i64) -> Result<Self, Self::Error> {
        if !(0..SENTINEL_HOURS).contains(&hours) {
            return Err(ValidationError::InvalidThresholds(format!(
                "threshold must lie in 0..{SENTINEL_HOURS}, got {hours}"
            )));
        }
        Ok(Self(hours))
    }
}

/// The most urgent threshold already acknowledged for a task.
///
/// Created at the sentinel value and only ever tightened (decreased) by the
/// storage layer after a notification is confirmed delivered. Explicit
/// resets (deadline change, reopen) return it to the sentinel.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(transparent)]
pub struct Watermark(i64);

impl Watermark {
    /// The "never notified" watermark.
    pub fn sentinel() -> Self {
        Self(SENTINEL_HOURS)
    }

    /// Rehydrate a watermark from stored hours.
    pub fn from_hours(hours: i64) -> Self {
        Self(hours)
    }

    pub fn hours(&self) -> i64 {
        self.0
    }

    pub fn is_sentinel(&self) -> bool {
        self.0 >= SENTINEL_HOURS
    }

    /// Whether `threshold` is strictly more urgent than anything already
    /// acknowledged, i.e. still allowed to fire.
    pub fn permits(&self, threshold: Threshold) -> bool {
        self.0 > threshold.hours()
    }
}

impl Default for Watermark {
    fn default() -> Self {
        Self::sentinel()
    }
}

impl From<Threshold> for Watermark {
    fn from(t: Threshold) -> Self {
        Self(t.hours())
    }
}

/// A validated, descending-ordered set of notification thresholds.
///
/// Strictly descending with no duplicates -- the evaluator's tie-break
/// relies on the ordering. Every entry must lie below the watermark
/// sentinel, otherwise it could never fire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(try_from = "Vec<i64>", into = "Vec<i64>")]
pub struct ThresholdSet {
    hours: Vec<i64>,
}

impl ThresholdSet {
    /// Build a threshold set from descending hour offsets.
    pub fn new(hours: Vec<i64>) -> Result<Self, ValidationError> {
        if hours.is_empty() {
            return Err(ValidationError::InvalidThresholds(
                "threshold set must not be empty".to_string(),
            ));
        }
        for window in hours.windows(2) {
            if window[0] <= window[1] {
                return Err(ValidationError::InvalidThresholds(format!(
                    "thresholds must be strictly descending, got {} before {}",
                    window[0], window[1]
                )));
            }
        }
        if let Some(&last) = hours.last() {
            if last < 0 {
                return Err(ValidationError::InvalidThresholds(format!(
                    "thresholds must be non-negative, got {last}"
                )));
            }
        }
        if let Some(&first) = hours.first() {
            if first >= SENTINEL_HOURS {
                return Err(ValidationError::InvalidThresholds(format!(
                    "thresholds must stay below the sentinel ({SENTINEL_HOURS}), got {first}"
                )));
            }
        }
        Ok(Self { hours })
    }

    /// Thresholds from loosest to tightest (descending hours).
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = Threshold> + '_ {
        self.hours.iter().map(|&h| Threshold(h))
    }

    /// Raw hour offsets, descending.
    pub fn hours(&self) -> &[i64] {
        &self.hours
    }
}

impl Default for ThresholdSet {
    fn default() -> Self {
        Self {
            hours: vec![48, 24, 12, 6, 3, 0],
        }
    }
}

impl TryFrom<Vec<i64>> for ThresholdSet {
    type Error = ValidationError;

    fn try_from(hours: Vec<i64>) -> Result<Self, Self::Error> {
        Self::new(hours)
    }
}

impl From<ThresholdSet> for Vec<i64> {
    fn from(set: ThresholdSet) -> Self {
        set.hours
    }
}
