//! Whole-file CSV source, e.g. a manually maintained history archive.

use super::{post_process, LocalSource, Reader, ReaderError};
use crate::availability::{resolve_criteria, AvailabilityReport, CoalescePolicy};
use crate::calendar::MarketCalendar;
use crate::domain::{DateCriteria, DateRange, Table};
use crate::fetch::ColumnMapping;
use crate::filter::RowFilter;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Reads a dated CSV file and serves the rows inside the requested criteria.
///
/// A missing file reads as an empty table.
pub struct CsvFileReader {
    name: String,
    prefix: String,
    path: PathBuf,
    mapping: ColumnMapping,
    calendar: Arc<dyn MarketCalendar>,
    availability: Option<Vec<DateRange>>,
    policy: CoalescePolicy,
    filter: Option<RowFilter>,
}

impl CsvFileReader {
    pub fn new(
        name: impl Into<String>,
        path: impl Into<PathBuf>,
        mapping: ColumnMapping,
        calendar: Arc<dyn MarketCalendar>,
    ) -> Self {
        Self {
            name: name.into(),
            prefix: String::new(),
            path: path.into(),
            mapping,
            calendar,
            availability: None,
            policy: CoalescePolicy::default(),
            filter: None,
        }
    }

    pub fn with_column_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_availability(mut self, ranges: Vec<DateRange>) -> Self {
        self.availability = Some(ranges);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Table, ReaderError> {
        if !self.path.exists() {
            debug!(reader = %self.name, path = %self.path.display(), "no archive file");
            return Ok(Table::new());
        }
        let file = fs::File::open(&self.path)?;
        self.mapping
            .parse_csv(file, None)
            .map_err(|e| ReaderError::Csv(format!("{}: {e}", self.path.display())))
    }
}

impl Reader for CsvFileReader {
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
        let mut all = self.load()?;
        all.sort_by_date();
        all.derive_previous_close();
        Ok(post_process(all.filter_criteria(criteria), self.filter.as_ref()))
    }

    fn set_filter(&mut self, filter: Option<RowFilter>) {
        self.filter = filter;
    }
}

impl LocalSource for CsvFileReader {}
