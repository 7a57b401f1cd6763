//! Local-first reading with fallback for the gaps.

use super::{post_process, LocalSource, Reader, ReaderError};
use crate::availability::{AvailabilityReport, AvailabilityStatus};
use crate::domain::{DateCriteria, Table};
use crate::filter::RowFilter;
use tracing::{debug, info, warn};

/// Serves what `local` already has and asks `fallback` for the rest.
///
/// Rows obtained from the fallback are handed to the local source through
/// [`LocalSource::on_received_more_data`] before being returned, so a caching
/// local source grows with every read.
pub struct ChainedReader<L, F = Box<dyn Reader>> {
    local: L,
    fallback: F,
    name: String,
    filter: Option<RowFilter>,
}

impl<L: LocalSource, F: Reader> ChainedReader<L, F> {
    /// The chain takes the local source's name.
    pub fn new(local: L, fallback: F) -> Self {
        let name = local.name().to_string();
        Self {
            local,
            fallback,
            name,
            filter: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn local(&self) -> &L {
        &self.local
    }

    pub fn fallback(&self) -> &F {
        &self.fallback
    }

    pub fn into_parts(self) -> (L, F) {
        (self.local, self.fallback)
    }

    /// Whole request goes to the fallback.
    fn read_through(&mut self, criteria: &DateCriteria) -> Result<Table, ReaderError> {
        debug!(
            reader = %self.name,
            fallback = %self.fallback.name(),
            %criteria,
            "delegating whole request"
        );
        let mut rows = self.fallback.read(criteria)?;
        rows.sort_by_date();
        self.local.seed_previous_close(&mut rows);
        if !rows.is_empty() {
            self.local.on_received_more_data(&rows)?;
        }
        Ok(rows)
    }

    /// Covered ranges from local, missing ranges from the fallback.
    fn read_partial(&mut self, report: &AvailabilityReport) -> Result<Table, ReaderError> {
        let mut local_parts = Vec::with_capacity(report.covered.len());
        for range in &report.covered {
            local_parts.push(self.local.read(&DateCriteria::from(*range))?);
        }

        let mut fetched_parts = Vec::with_capacity(report.missing.len());
        for range in &report.missing {
            debug!(
                reader = %self.name,
                fallback = %self.fallback.name(),
                %range,
                "delegating missing range"
            );
            match self.fallback.read(&DateCriteria::from(*range)) {
                Ok(rows) => fetched_parts.push(rows),
                Err(e) => warn!(
                    reader = %self.name,
                    %range,
                    error = %e,
                    "fallback failed for missing range, serving without it"
                ),
            }
        }

        let mut fetched = Table::concat(fetched_parts);
        fetched.sort_by_date();
        self.local.seed_previous_close(&mut fetched);
        if !fetched.is_empty() {
            self.local.on_received_more_data(&fetched)?;
        }

        let mut rows = Table::concat(local_parts);
        rows.extend(fetched);
        rows.sort_by_date();
        rows.derive_previous_close();
        Ok(rows)
    }
}

impl<L: LocalSource, F: Reader> Reader for ChainedReader<L, F> {
    fn name(&self) -> &str {
        &self.name
    }

    fn column_prefix(&self) -> &str {
        self.local.column_prefix()
    }

    fn has_data(&self, criteria: &DateCriteria) -> AvailabilityReport {
        self.local.has_data(criteria)
    }

    fn read(&mut self, criteria: &DateCriteria) -> Result<Table, ReaderError> {
        let report = self.local.has_data(criteria);
        info!(
            reader = %self.name,
            %criteria,
            status = ?report.status,
            covered = report.covered.len(),
            missing = report.missing.len(),
            "availability resolved"
        );

        let rows = match report.status {
            AvailabilityStatus::Complete => self.local.read(criteria)?,
            AvailabilityStatus::Partial => self.read_partial(&report)?,
            AvailabilityStatus::None | AvailabilityStatus::Unknown => self.read_through(criteria)?,
        };
        Ok(post_process(rows, self.filter.as_ref()))
    }

    fn set_filter(&mut self, filter: Option<RowFilter>) {
        self.filter = filter;
    }
}

/// A chain can itself be the local side of another chain; received rows go
/// to its own local source.
impl<L: LocalSource, F: Reader> LocalSource for ChainedReader<L, F> {
    fn on_received_more_data(&mut self, rows: &Table) -> Result<(), ReaderError> {
        self.local.on_received_more_data(rows)
    }

    fn seed_previous_close(&self, rows: &mut Table) {
        self.local.seed_previous_close(rows)
    }
}
