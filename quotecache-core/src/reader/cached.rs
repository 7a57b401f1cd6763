//! Caching local sources.
//!
//! A [`CachedStore`] holds rows plus the ranges those rows cover. [`Cached`]
//! turns any store into a [`LocalSource`]: availability comes from the
//! store's ranges, reads come from the store, and rows received from a
//! fallback are appended. A [`CachedReader`] is simply a [`ChainedReader`]
//! with such a local source.

use super::{ChainedReader, LocalSource, Reader, ReaderError};
use crate::availability::{resolve_criteria, AvailabilityReport, CoalescePolicy};
use crate::calendar::MarketCalendar;
use crate::domain::{DateCriteria, DateRange, Table};
use crate::filter::RowFilter;
use std::sync::Arc;

/// Backing storage of a cache.
pub trait CachedStore: Send {
    /// Stored rows matching `criteria`, date-sorted.
    fn read_cached_data(&self, criteria: &DateCriteria) -> Result<Table, ReaderError>;

    /// Add rows; afterwards [`CachedStore::known_ranges`] reflects every date
    /// now stored.
    fn append(&mut self, rows: &Table) -> Result<(), ReaderError>;

    /// Ranges the store can answer, merged under [`CachedStore::policy`].
    fn known_ranges(&self) -> &[DateRange];

    /// Everything stored, date-sorted.
    fn data(&self) -> &Table;

    fn policy(&self) -> CoalescePolicy;
}

/// [`LocalSource`] adapter over a [`CachedStore`].
pub struct Cached<S> {
    store: S,
    name: String,
    prefix: String,
    calendar: Arc<dyn MarketCalendar>,
    filter: Option<RowFilter>,
}

impl<S: CachedStore> Cached<S> {
    pub fn new(
        store: S,
        name: impl Into<String>,
        prefix: impl Into<String>,
        calendar: Arc<dyn MarketCalendar>,
    ) -> Self {
        Self {
            store,
            name: name.into(),
            prefix: prefix.into(),
            calendar,
            filter: None,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S: CachedStore> Reader for Cached<S> {
    fn name(&self) -> &str {
        &self.name
    }

    fn column_prefix(&self) -> &str {
        &self.prefix
    }

    fn has_data(&self, criteria: &DateCriteria) -> AvailabilityReport {
        resolve_criteria(
            self.store.known_ranges(),
            criteria,
            self.calendar.as_ref(),
            self.store.policy(),
        )
    }

    fn read(&mut self, criteria: &DateCriteria) -> Result<Table, ReaderError> {
        let rows = self.store.read_cached_data(criteria)?;
        Ok(match &self.filter {
            Some(filter) => filter.apply(rows),
            None => rows,
        })
    }

    fn set_filter(&mut self, filter: Option<RowFilter>) {
        self.filter = filter;
    }
}

impl<S: CachedStore> LocalSource for Cached<S> {
    fn on_received_more_data(&mut self, rows: &Table) -> Result<(), ReaderError> {
        self.store.append(rows)
    }

    fn seed_previous_close(&self, rows: &mut Table) {
        let data = self.store.data();
        for row in rows.rows.iter_mut().filter(|r| r.previous_close.is_none()) {
            let prior = self.calendar.previous_trading_day(row.date);
            row.previous_close = data.close_on(&row.identifier, prior);
        }
    }
}

/// A chained reader whose local side is a growing cache.
pub type CachedReader<S, F = Box<dyn Reader>> = ChainedReader<Cached<S>, F>;

impl<S: CachedStore, F: Reader> ChainedReader<Cached<S>, F> {
    /// Cache `fallback` in `store`. Name and column prefix are the
    /// fallback's.
    pub fn cached(store: S, fallback: F, calendar: Arc<dyn MarketCalendar>) -> Self {
        let local = Cached::new(store, fallback.name(), fallback.column_prefix(), calendar);
        ChainedReader::new(local, fallback)
    }

    /// Current known-availability set.
    pub fn known_ranges(&self) -> &[DateRange] {
        self.local().store().known_ranges()
    }

    pub fn store(&self) -> &S {
        self.local().store()
    }
}
