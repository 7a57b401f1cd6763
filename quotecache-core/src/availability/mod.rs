//! Availability bookkeeping: what a reader can answer without delegating.
//!
//! - [`merge_ranges`] coalesces a list of ranges, treating short gaps
//!   (weekends, single holidays) as contiguous coverage.
//! - [`resolve`] / [`resolve_criteria`] split a request into covered and
//!   missing sub-ranges against a known-availability list.
//! - [`ranges_from_dates`] derives a known-availability list from the dates a
//!   cache actually holds.

pub mod merge;
pub mod resolve;

pub use merge::merge_ranges;
pub use resolve::{ranges_from_dates, resolve, resolve_criteria};

use crate::domain::DateRange;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Gap tolerance used when coalescing ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoalescePolicy {
    /// Two ranges whose boundary dates are at most this many calendar days
    /// apart are treated as one. Adjacent ranges always join.
    pub max_gap_days: i64,
}

impl CoalescePolicy {
    pub const DEFAULT_MAX_GAP_DAYS: i64 = 4;

    pub fn new(max_gap_days: i64) -> Self {
        Self { max_gap_days }
    }

    /// Whether a range starting at `next_start` continues one ending at
    /// `prev_end`.
    pub fn joins(&self, prev_end: NaiveDate, next_start: NaiveDate) -> bool {
        (next_start - prev_end).num_days() <= self.max_gap_days.max(1)
    }
}

impl Default for CoalescePolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_GAP_DAYS)
    }
}

/// Outcome class of an availability check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AvailabilityStatus {
    None,
    Partial,
    Complete,
    /// The reader does not track availability; always read through.
    Unknown,
}

/// Answer to "do I have this?".
///
/// `covered` and `missing` are each sorted and non-overlapping; unless the
/// status is `Unknown` they tile the requested trading days exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityReport {
    pub status: AvailabilityStatus,
    pub covered: Vec<DateRange>,
    pub missing: Vec<DateRange>,
}

impl AvailabilityReport {
    pub fn unknown() -> Self {
        Self {
            status: AvailabilityStatus::Unknown,
            covered: Vec::new(),
            missing: Vec::new(),
        }
    }

    /// Classify covered/missing into a report.
    pub fn from_parts(covered: Vec<DateRange>, missing: Vec<DateRange>) -> Self {
        let status = if covered.is_empty() {
            AvailabilityStatus::None
        } else if missing.is_empty() {
            AvailabilityStatus::Complete
        } else {
            AvailabilityStatus::Partial
        };
        Self {
            status,
            covered,
            missing,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.status == AvailabilityStatus::Complete
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn default_policy_bridges_a_long_weekend() {
        let p = CoalescePolicy::default();
        assert!(p.joins(d(2019, 12, 29), d(2020, 1, 2)));
        assert!(!p.joins(d(2019, 12, 28), d(2020, 1, 2)));
    }

    #[test]
    fn zero_tolerance_still_joins_adjacent_days() {
        let p = CoalescePolicy::new(0);
        assert!(p.joins(d(2024, 1, 1), d(2024, 1, 2)));
        assert!(!p.joins(d(2024, 1, 1), d(2024, 1, 3)));
    }

    #[test]
    fn status_follows_covered_and_missing() {
        let r = DateRange::single(d(2024, 1, 2));
        assert_eq!(
            AvailabilityReport::from_parts(vec![], vec![r]).status,
            AvailabilityStatus::None
        );
        assert_eq!(
            AvailabilityReport::from_parts(vec![r], vec![]).status,
            AvailabilityStatus::Complete
        );
        let later = DateRange::single(d(2024, 1, 3));
        assert_eq!(
            AvailabilityReport::from_parts(vec![r], vec![later]).status,
            AvailabilityStatus::Partial
        );
    }
}
