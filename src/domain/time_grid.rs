use chrono::{DateTime, Duration, FixedOffset};
use serde::{Deserialize, Serialize};
use std::ops::Range;

use crate::error::{Result, SchedulingError};

/// Uniformly spaced, ordered timestamps shared by every computation of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<DateTime<FixedOffset>>", into = "Vec<DateTime<FixedOffset>>")]
pub struct TimeGrid {
    timestamps: Vec<DateTime<FixedOffset>>,
    step: Duration,
}

impl TimeGrid {
    /// Build `len` timestamps starting at `start`, `step` apart.
    pub fn new(start: DateTime<FixedOffset>, step: Duration, len: usize) -> Result<Self> {
        if step <= Duration::zero() {
            return Err(SchedulingError::MalformedTimeGrid(format!(
                "step must be positive, got {step}"
            )));
        }
        let timestamps = (0..len as i32).map(|i| start + step * i).collect();
        Ok(Self { timestamps, step })
    }

    /// Validate an explicit list of timestamps. At least two entries are
    /// needed to infer the step, and every gap must equal it.
    pub fn from_timestamps(timestamps: Vec<DateTime<FixedOffset>>) -> Result<Self> {
        if timestamps.len() < 2 {
            return Err(SchedulingError::MalformedTimeGrid(
                "at least two timestamps are required to infer the step".into(),
            ));
        }
        let step = timestamps[1] - timestamps[0];
        if step <= Duration::zero() {
            return Err(SchedulingError::MalformedTimeGrid(
                "timestamps must be strictly increasing".into(),
            ));
        }
        if let Some(pair) = timestamps.windows(2).find(|w| w[1] - w[0] != step) {
            return Err(SchedulingError::MalformedTimeGrid(format!(
                "gap between {} and {} differs from step {step}",
                pair[0], pair[1]
            )));
        }
        Ok(Self { timestamps, step })
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn step(&self) -> Duration {
        self.step
    }

    /// Step length in hours (Δt).
    pub fn step_hours(&self) -> f64 {
        self.step.num_seconds() as f64 / 3600.0
    }

    pub fn timestamps(&self) -> &[DateTime<FixedOffset>] {
        &self.timestamps
    }

    pub fn at(&self, index: usize) -> DateTime<FixedOffset> {
        self.timestamps[index]
    }

    /// Exact-match lookup.
    pub fn index_of(&self, t: DateTime<FixedOffset>) -> Option<usize> {
        self.timestamps.binary_search(&t).ok()
    }

    /// Indices of the timestamps `t` with `from <= t < until`.
    pub fn range(&self, from: DateTime<FixedOffset>, until: DateTime<FixedOffset>) -> Range<usize> {
        let start = self.timestamps.partition_point(|t| *t < from);
        let end = self.timestamps.partition_point(|t| *t < until);
        start..end.max(start)
    }
}

impl TryFrom<Vec<DateTime<FixedOffset>>> for TimeGrid {
    type Error = SchedulingError;

    fn try_from(timestamps: Vec<DateTime<FixedOffset>>) -> Result<Self> {
        Self::from_timestamps(timestamps)
    }
}

impl From<TimeGrid> for Vec<DateTime<FixedOffset>> {
    fn from(grid: TimeGrid) -> Self {
        grid.timestamps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(s).unwrap()
    }

    #[test]
    fn quarter_hour_grid() {
        let grid = TimeGrid::new(ts("2024-01-01T08:00:00+01:00"), Duration::minutes(15), 4).unwrap();
        assert_eq!(grid.len(), 4);
        assert_eq!(grid.step_hours(), 0.25);
        assert_eq!(grid.at(3), ts("2024-01-01T08:45:00+01:00"));
        assert_eq!(grid.index_of(ts("2024-01-01T08:30:00+01:00")), Some(2));
        assert_eq!(grid.index_of(ts("2024-01-01T08:31:00+01:00")), None);
    }

    #[test]
    fn range_is_half_open_and_clamped() {
        let grid = TimeGrid::new(ts("2024-01-01T08:00:00+01:00"), Duration::minutes(15), 8).unwrap();
        assert_eq!(grid.range(ts("2024-01-01T08:15:00+01:00"), ts("2024-01-01T09:00:00+01:00")), 1..4);
        assert_eq!(grid.range(ts("2024-01-01T07:00:00+01:00"), ts("2024-01-01T08:10:00+01:00")), 0..1);
        assert_eq!(grid.range(ts("2024-01-01T12:00:00+01:00"), ts("2024-01-01T13:00:00+01:00")), 8..8);
        // An arrival between two grid points starts at the next one
        assert_eq!(grid.range(ts("2024-01-01T08:05:00+01:00"), ts("2024-01-01T08:40:00+01:00")), 1..3);
    }

    #[test]
    fn uneven_timestamps_are_rejected() {
        let err = TimeGrid::from_timestamps(vec![
            ts("2024-01-01T08:00:00+01:00"),
            ts("2024-01-01T08:15:00+01:00"),
            ts("2024-01-01T08:45:00+01:00"),
        ])
        .unwrap_err();
        assert!(matches!(err, SchedulingError::MalformedTimeGrid(_)));
    }

    #[test]
    fn non_positive_step_is_rejected() {
        assert!(TimeGrid::new(ts("2024-01-01T08:00:00+01:00"), Duration::zero(), 4).is_err());
    }
}
