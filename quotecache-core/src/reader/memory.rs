//! In-process cache.

use super::{Cached, CachedReader, CachedStore, ChainedReader, Reader, ReaderError};
use crate::availability::{ranges_from_dates, CoalescePolicy};
use crate::calendar::MarketCalendar;
use crate::domain::{DateCriteria, DateRange, Table};
use std::sync::Arc;
use tracing::debug;

/// Growing, date-sorted table with the ranges its dates cover.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: Table,
    ranges: Vec<DateRange>,
    policy: CoalescePolicy,
}

impl MemoryStore {
    pub fn new(policy: CoalescePolicy) -> Self {
        Self {
            data: Table::new(),
            ranges: Vec::new(),
            policy,
        }
    }
}

impl CachedStore for MemoryStore {
    fn read_cached_data(&self, criteria: &DateCriteria) -> Result<Table, ReaderError> {
        Ok(self.data.filter_criteria(criteria))
    }

    fn append(&mut self, rows: &Table) -> Result<(), ReaderError> {
        if rows.is_empty() {
            return Ok(());
        }
        self.data.extend(rows.clone());
        self.data.sort_by_date();
        self.data.derive_previous_close();
        self.data.dedup();
        self.ranges = ranges_from_dates(&self.data.distinct_dates(), self.policy);
        debug!(
            rows = self.data.len(),
            ranges = self.ranges.len(),
            "memory cache extended"
        );
        Ok(())
    }

    fn known_ranges(&self) -> &[DateRange] {
        &self.ranges
    }

    fn data(&self) -> &Table {
        &self.data
    }

    fn policy(&self) -> CoalescePolicy {
        self.policy
    }
}

/// Chained reader over an in-process cache.
pub type MemoryCachedReader<F = Box<dyn Reader>> = CachedReader<MemoryStore, F>;

impl<F: Reader> ChainedReader<Cached<MemoryStore>, F> {
    pub fn in_memory(fallback: F, calendar: Arc<dyn MarketCalendar>) -> Self {
        Self::in_memory_with_policy(fallback, calendar, CoalescePolicy::default())
    }

    pub fn in_memory_with_policy(
        fallback: F,
        calendar: Arc<dyn MarketCalendar>,
        policy: CoalescePolicy,
    ) -> Self {
        Self::cached(MemoryStore::new(policy), fallback, calendar)
    }
}
