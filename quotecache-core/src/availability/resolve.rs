//! Split a request into covered and missing sub-ranges.

use super::{merge_ranges, AvailabilityReport, CoalescePolicy};
use crate::calendar::MarketCalendar;
use crate::domain::{DateCriteria, DateRange};
use chrono::{Duration, NaiveDate};

/// Resolve a date-range request against a known-availability list.
///
/// The request is first narrowed to trading-day boundaries. Covered ranges are
/// the overlaps with the merged known list; missing ranges are the gaps
/// before, between and after them, clipped to the request. A request that
/// narrows to nothing (weekend only) resolves to `None` with no ranges.
pub fn resolve(
    known: &[DateRange],
    requested: &DateRange,
    calendar: &dyn MarketCalendar,
    policy: CoalescePolicy,
) -> AvailabilityReport {
    let from = calendar.this_or_next_trading_day(requested.from_date());
    let to = calendar.this_or_previous_trading_day(requested.to_date());
    if from > to {
        return AvailabilityReport::from_parts(Vec::new(), Vec::new());
    }

    let mut covered = Vec::new();
    let mut missing = Vec::new();
    // first date not yet assigned to covered or missing
    let mut cursor = from;

    for interval in merge_ranges(known, policy) {
        if interval.from_date() > to {
            break;
        }
        if interval.to_date() < from {
            continue;
        }

        let start = interval.from_date().max(from);
        let end = interval.to_date().min(to);
        if start > cursor {
            missing.push(DateRange::spanning(cursor, start - Duration::days(1)));
        }
        covered.push(DateRange::spanning(start, end));
        cursor = end + Duration::days(1);
    }

    if cursor <= to {
        missing.push(DateRange::spanning(cursor, to));
    }

    AvailabilityReport::from_parts(covered, missing)
}

/// Resolve any criteria shape.
///
/// - `ForDate` is all-or-nothing: `Complete` or `None`, never `Partial`.
/// - `MultiDates` checks each distinct trading day on its own.
pub fn resolve_criteria(
    known: &[DateRange],
    criteria: &DateCriteria,
    calendar: &dyn MarketCalendar,
    policy: CoalescePolicy,
) -> AvailabilityReport {
    match criteria {
        DateCriteria::ForDate(date) => {
            let day = DateRange::single(*date);
            if merge_ranges(known, policy).iter().any(|r| r.contains(*date)) {
                AvailabilityReport::from_parts(vec![day], Vec::new())
            } else {
                AvailabilityReport::from_parts(Vec::new(), vec![day])
            }
        }
        DateCriteria::DateRange(range) => resolve(known, range, calendar, policy),
        DateCriteria::MultiDates(dates) => {
            let merged = merge_ranges(known, policy);
            let mut days: Vec<NaiveDate> = dates
                .iter()
                .copied()
                .filter(|d| calendar.is_trading_day(*d))
                .collect();
            days.sort();
            days.dedup();

            let (covered, missing): (Vec<DateRange>, Vec<DateRange>) = days
                .into_iter()
                .map(DateRange::single)
                .partition(|day| merged.iter().any(|r| r.contains(day.from_date())));
            AvailabilityReport::from_parts(covered, missing)
        }
    }
}

/// Derive known-availability ranges from the dates actually present.
///
/// Dates are sorted and de-duplicated; a new range starts whenever the gap to
/// the previous date is wider than the policy tolerance.
pub fn ranges_from_dates(dates: &[NaiveDate], policy: CoalescePolicy) -> Vec<DateRange> {
    let mut sorted = dates.to_vec();
    sorted.sort();
    sorted.dedup();

    let mut ranges: Vec<DateRange> = Vec::new();
    for date in sorted {
        if let Some(current) = ranges.last_mut() {
            if policy.joins(current.to_date(), date) {
                current.extend_to(date);
                continue;
            }
        }
        ranges.push(DateRange::single(date));
    }
    ranges
}
