//! Date ranges and read criteria.

use crate::reader::ReaderError;
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed interval of calendar dates, `from_date <= to_date`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "RawDateRange")]
pub struct DateRange {
    from_date: NaiveDate,
    to_date: NaiveDate,
}

#[derive(Deserialize)]
struct RawDateRange {
    from_date: NaiveDate,
    to_date: NaiveDate,
}

impl TryFrom<RawDateRange> for DateRange {
    type Error = ReaderError;

    fn try_from(raw: RawDateRange) -> Result<Self, Self::Error> {
        DateRange::new(raw.from_date, raw.to_date)
    }
}

impl DateRange {
    /// Build a range, rejecting `from_date > to_date`.
    pub fn new(from_date: NaiveDate, to_date: NaiveDate) -> Result<Self, ReaderError> {
        if from_date > to_date {
            return Err(ReaderError::InvalidRange {
                from: from_date,
                to: to_date,
            });
        }
        Ok(Self { from_date, to_date })
    }

    /// Crate-internal constructor for bounds already known to be ordered.
    pub(crate) fn spanning(from_date: NaiveDate, to_date: NaiveDate) -> Self {
        debug_assert!(from_date <= to_date, "{from_date} > {to_date}");
        Self { from_date, to_date }
    }

    /// One-day range.
    pub fn single(date: NaiveDate) -> Self {
        Self {
            from_date: date,
            to_date: date,
        }
    }

    pub fn from_date(&self) -> NaiveDate {
        self.from_date
    }

    pub fn to_date(&self) -> NaiveDate {
        self.to_date
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from_date <= date && date <= self.to_date
    }

    /// Number of calendar days in the range, both ends included.
    pub fn days(&self) -> i64 {
        (self.to_date - self.from_date).num_days() + 1
    }

    /// Every calendar date in the range.
    pub fn iter_days(&self) -> impl Iterator<Item = NaiveDate> {
        let from = self.from_date;
        (0..self.days()).map(move |i| from + Duration::days(i))
    }

    /// Push the end date out to `to_date`; never shrinks the range.
    pub(crate) fn extend_to(&mut self, to_date: NaiveDate) {
        if to_date > self.to_date {
            self.to_date = to_date;
        }
    }

    /// Overlap of two ranges, if any.
    pub fn intersect(&self, other: &DateRange) -> Option<DateRange> {
        let from = self.from_date.max(other.from_date);
        let to = self.to_date.min(other.to_date);
        (from <= to).then_some(DateRange {
            from_date: from,
            to_date: to,
        })
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.from_date, self.to_date)
    }
}

/// What span of data a caller wants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum DateCriteria {
    ForDate(NaiveDate),
    DateRange(DateRange),
    /// Explicit days, in caller order (not necessarily sorted).
    MultiDates(Vec<NaiveDate>),
}

impl DateCriteria {
    /// Range criteria from two dates, validated.
    pub fn range(from_date: NaiveDate, to_date: NaiveDate) -> Result<Self, ReaderError> {
        DateRange::new(from_date, to_date).map(DateCriteria::DateRange)
    }

    /// Smallest range enclosing every requested date. `None` for an empty
    /// `MultiDates`.
    pub fn bounds(&self) -> Option<DateRange> {
        match self {
            DateCriteria::ForDate(d) => Some(DateRange::single(*d)),
            DateCriteria::DateRange(r) => Some(*r),
            DateCriteria::MultiDates(dates) => {
                let min = dates.iter().min()?;
                let max = dates.iter().max()?;
                Some(DateRange::spanning(*min, *max))
            }
        }
    }

    /// Whether `date` is part of the request.
    pub fn contains(&self, date: NaiveDate) -> bool {
        match self {
            DateCriteria::ForDate(d) => *d == date,
            DateCriteria::DateRange(r) => r.contains(date),
            DateCriteria::MultiDates(dates) => dates.contains(&date),
        }
    }
}

impl From<DateRange> for DateCriteria {
    fn from(range: DateRange) -> Self {
        DateCriteria::DateRange(range)
    }
}

impl fmt::Display for DateCriteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DateCriteria::ForDate(d) => write!(f, "for {d}"),
            DateCriteria::DateRange(r) => write!(f, "range {r}"),
            DateCriteria::MultiDates(dates) => write!(f, "{} dates", dates.len()),
        }
    }
}
