//! Market calendar — which calendar days the exchange is open.
//!
//! Pure logic, no IO. Used to normalize requested ranges to trading-day
//! boundaries and to skip closed days when fetching a range day by day.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use std::collections::BTreeSet;

/// Trading-day queries consumed by the availability resolver and the
/// day-by-day readers.
pub trait MarketCalendar: Send + Sync {
    fn is_trading_day(&self, date: NaiveDate) -> bool;

    /// First trading day strictly after `date`.
    fn next_trading_day(&self, date: NaiveDate) -> NaiveDate {
        self.this_or_next_trading_day(date + Duration::days(1))
    }

    /// Last trading day strictly before `date`.
    fn previous_trading_day(&self, date: NaiveDate) -> NaiveDate {
        self.this_or_previous_trading_day(date - Duration::days(1))
    }

    fn this_or_next_trading_day(&self, date: NaiveDate) -> NaiveDate {
        let mut current = date;
        while !self.is_trading_day(current) {
            current += Duration::days(1);
        }
        current
    }

    fn this_or_previous_trading_day(&self, date: NaiveDate) -> NaiveDate {
        let mut current = date;
        while !self.is_trading_day(current) {
            current -= Duration::days(1);
        }
        current
    }

    /// Trading days in `[from, to]`, ascending. Empty when `from > to`.
    fn trading_days(&self, from: NaiveDate, to: NaiveDate) -> Vec<NaiveDate> {
        let mut days = Vec::new();
        let mut current = from;
        while current <= to {
            if self.is_trading_day(current) {
                days.push(current);
            }
            current += Duration::days(1);
        }
        days
    }
}

/// Monday–Friday exchange with an explicit holiday list.
#[derive(Debug, Clone, Default)]
pub struct WeekdayCalendar {
    holidays: BTreeSet<NaiveDate>,
}

impl WeekdayCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_holidays(holidays: impl IntoIterator<Item = NaiveDate>) -> Self {
        Self {
            holidays: holidays.into_iter().collect(),
        }
    }

    pub fn add_holiday(&mut self, date: NaiveDate) {
        self.holidays.insert(date);
    }

    pub fn holidays(&self) -> impl Iterator<Item = &NaiveDate> {
        self.holidays.iter()
    }
}

impl MarketCalendar for WeekdayCalendar {
    fn is_trading_day(&self, date: NaiveDate) -> bool {
        !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) && !self.holidays.contains(&date)
    }
}
