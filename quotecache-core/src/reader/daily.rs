//! Day-by-day source reader.
//!
//! Turns a [`DayFetcher`] into a range reader: one fetch per trading day,
//! failures logged and skipped, results concatenated in date order.

use super::{post_process, LocalSource, Reader, ReaderError};
use crate::availability::{resolve_criteria, AvailabilityReport, CoalescePolicy};
use crate::calendar::MarketCalendar;
use crate::domain::{DateCriteria, DateRange, Table};
use crate::fetch::{DayFetcher, FetchError};
use crate::filter::RowFilter;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Fixed multipliers applied to volume and turnover after a read, e.g.
/// turnover published in crores.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RescaleOptions {
    pub volume_scale: f64,
    pub turnover_scale: f64,
}

impl Default for RescaleOptions {
    fn default() -> Self {
        Self {
            volume_scale: 1.0,
            turnover_scale: 1.0,
        }
    }
}

/// Outcome of fetching a batch of days.
#[derive(Debug, Default)]
pub struct FetchSummary {
    pub requested: usize,
    pub succeeded: usize,
    pub failed: Vec<(NaiveDate, FetchError)>,
}

impl FetchSummary {
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Source reader backed by a single-day fetcher.
pub struct DailySourceReader<D> {
    name: String,
    prefix: String,
    fetcher: D,
    calendar: Arc<dyn MarketCalendar>,
    availability: Option<Vec<DateRange>>,
    policy: CoalescePolicy,
    rescale: RescaleOptions,
    filter: Option<RowFilter>,
    last_fetch: Option<FetchSummary>,
}

impl<D: DayFetcher> DailySourceReader<D> {
    pub fn new(name: impl Into<String>, fetcher: D, calendar: Arc<dyn MarketCalendar>) -> Self {
        Self {
            name: name.into(),
            prefix: String::new(),
            fetcher,
            calendar,
            availability: None,
            policy: CoalescePolicy::default(),
            rescale: RescaleOptions::default(),
            filter: None,
            last_fetch: None,
        }
    }

    pub fn with_column_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Declare the ranges the upstream is known to publish. Without a
    /// declaration `has_data` reports `Unknown`.
    pub fn with_availability(mut self, ranges: Vec<DateRange>) -> Self {
        self.availability = Some(ranges);
        self
    }

    pub fn with_policy(mut self, policy: CoalescePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_rescale(mut self, rescale: RescaleOptions) -> Self {
        self.rescale = rescale;
        self
    }

    /// Summary of the most recent `read`.
    pub fn last_fetch(&self) -> Option<&FetchSummary> {
        self.last_fetch.as_ref()
    }

    /// Trading days named by `criteria`, ascending and distinct.
    pub fn trading_days_for(&self, criteria: &DateCriteria) -> Vec<NaiveDate> {
        match criteria {
            DateCriteria::ForDate(date) => {
                if self.calendar.is_trading_day(*date) {
                    vec![*date]
                } else {
                    Vec::new()
                }
            }
            DateCriteria::DateRange(range) => self
                .calendar
                .trading_days(range.from_date(), range.to_date()),
            DateCriteria::MultiDates(dates) => {
                let mut days: Vec<NaiveDate> = dates
                    .iter()
                    .copied()
                    .filter(|d| self.calendar.is_trading_day(*d))
                    .collect();
                days.sort();
                days.dedup();
                days
            }
        }
    }

    /// Fetch each day independently. A failed day is logged and recorded in
    /// the summary; it never aborts the batch.
    pub fn fetch_days(&self, days: &[NaiveDate]) -> (Table, FetchSummary) {
        let mut summary = FetchSummary {
            requested: days.len(),
            ..FetchSummary::default()
        };
        let mut parts = Vec::with_capacity(days.len());

        for &day in days {
            match self.fetcher.fetch_one_day(day) {
                Ok(rows) => {
                    debug!(reader = %self.name, %day, rows = rows.len(), "fetched day");
                    summary.succeeded += 1;
                    parts.push(rows);
                }
                Err(e) => {
                    warn!(reader = %self.name, %day, error = %e, "Skipping day");
                    summary.failed.push((day, e));
                }
            }
        }

        let mut rows = Table::concat(parts);
        rows.sort_by_date();
        (rows, summary)
    }
}

impl<D: DayFetcher> Reader for DailySourceReader<D> {
    fn name(&self) -> &str {
        &self.name
    }

    fn column_prefix(&self) -> &str {
        &self.prefix
    }

    fn has_data(&self, criteria: &DateCriteria) -> AvailabilityReport {
        match &self.availability {
            Some(known) => resolve_criteria(known, criteria, self.calendar.as_ref(), self.policy),
            None => AvailabilityReport::unknown(),
        }
    }

    fn read(&mut self, criteria: &DateCriteria) -> Result<Table, ReaderError> {
        let days = self.trading_days_for(criteria);
        let (mut rows, summary) = self.fetch_days(&days);
        if !summary.all_succeeded() {
            warn!(
                reader = %self.name,
                %criteria,
                requested = summary.requested,
                failed = summary.failed.len(),
                "read finished with missing days"
            );
        }
        self.last_fetch = Some(summary);

        rows.rescale(self.rescale.volume_scale, self.rescale.turnover_scale);
        rows.derive_previous_close();
        Ok(post_process(rows, self.filter.as_ref()))
    }

    fn set_filter(&mut self, filter: Option<RowFilter>) {
        self.filter = filter;
    }
}

impl<D: DayFetcher> LocalSource for DailySourceReader<D> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::availability::AvailabilityStatus;
    use crate::calendar::WeekdayCalendar;
    use crate::domain::Row;
    use chrono::Datelike;

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, day).unwrap()
    }

    fn source_failing_on(
        broken: NaiveDate,
    ) -> DailySourceReader<impl Fn(NaiveDate) -> Result<Table, FetchError> + Send> {
        let calendar: Arc<dyn MarketCalendar> =
            Arc::new(WeekdayCalendar::with_holidays([d(1, 26)]));
        DailySourceReader::new(
            "nse_indices",
            move |date: NaiveDate| {
                if date == broken {
                    return Err(FetchError::NotFound { date });
                }
                let mut row = Row::new("NIFTY 50", date, 100.0 + f64::from(date.day0()));
                row.volume = 10.0;
                row.turnover = 2.5;
                Ok(Table::from_rows(vec![row]))
            },
            calendar,
        )
    }

    #[test]
    fn range_read_skips_closed_days_and_failures() {
        let mut reader = source_failing_on(d(1, 24));
        let rows = reader
            .read(&DateCriteria::range(d(1, 22), d(1, 28)).unwrap())
            .unwrap();
        assert_eq!(rows.distinct_dates(), vec![d(1, 22), d(1, 23), d(1, 25)]);

        let summary = reader.last_fetch().unwrap();
        assert_eq!(summary.requested, 4);
        assert_eq!(summary.succeeded, 3);
        assert_eq!(summary.failed.len(), 1);
        assert!(!summary.all_succeeded());
    }

    #[test]
    fn for_date_on_weekend_fetches_nothing() {
        let mut reader = source_failing_on(d(12, 31));
        let rows = reader.read(&DateCriteria::ForDate(d(1, 6))).unwrap();
        assert!(rows.is_empty());
        assert_eq!(reader.last_fetch().unwrap().requested, 0);
    }

    #[test]
    fn multi_dates_are_sorted_and_distinct() {
        let reader = source_failing_on(d(12, 31));
        let days = reader.trading_days_for(&DateCriteria::MultiDates(vec![
            d(1, 10),
            d(1, 2),
            d(1, 10),
            d(1, 7),
        ]));
        assert_eq!(days, vec![d(1, 2), d(1, 10)]);
    }

    #[test]
    fn rescale_and_previous_close_applied_after_read() {
        let mut reader = source_failing_on(d(12, 31)).with_rescale(RescaleOptions {
            volume_scale: 1.0,
            turnover_scale: 1e7,
        });
        let rows = reader
            .read(&DateCriteria::range(d(1, 2), d(1, 3)).unwrap())
            .unwrap();
        assert_eq!(rows.rows[0].turnover, 2.5e7);
        assert_eq!(rows.rows[0].previous_close, None);
        assert_eq!(rows.rows[1].previous_close, Some(rows.rows[0].close));
    }

    #[test]
    fn availability_is_unknown_unless_declared() {
        let criteria = DateCriteria::range(d(1, 1), d(1, 31)).unwrap();
        let reader = source_failing_on(d(12, 31));
        assert_eq!(reader.has_data(&criteria).status, AvailabilityStatus::Unknown);

        let reader = reader.with_availability(vec![DateRange::new(d(1, 15), d(12, 31)).unwrap()]);
        let report = reader.has_data(&criteria);
        assert_eq!(report.status, AvailabilityStatus::Partial);
        assert_eq!(report.missing, vec![DateRange::new(d(1, 1), d(1, 14)).unwrap()]);
    }
}
