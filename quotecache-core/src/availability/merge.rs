//! Interval merging with gap tolerance.

use super::CoalescePolicy;
use crate::domain::DateRange;

/// Sort by start date and coalesce ranges that overlap, touch, or sit within
/// the policy's gap tolerance of each other.
pub fn merge_ranges(ranges: &[DateRange], policy: CoalescePolicy) -> Vec<DateRange> {
    let mut sorted = ranges.to_vec();
    sorted.sort_by_key(|r| r.from_date());

    let mut merged: Vec<DateRange> = Vec::with_capacity(sorted.len());
    for next in sorted {
        if let Some(current) = merged.last_mut() {
            if policy.joins(current.to_date(), next.from_date()) {
                current.extend_to(next.to_date());
                continue;
            }
        }
        merged.push(next);
    }
    merged
}
