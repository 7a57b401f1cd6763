//! The reader capability and its implementations.
//!
//! A [`Reader`] answers two questions for a [`DateCriteria`]: what it can
//! serve without delegating ([`Reader::has_data`]) and the rows themselves
//! ([`Reader::read`]). Readers compose by ownership:
//!
//! - [`ChainedReader`] serves what its local source covers and forwards the
//!   gaps to a fallback reader.
//! - [`MemoryCachedReader`] / [`ParquetCachedReader`] are chained readers whose
//!   local source is a cache that grows from what the fallback returns.
//! - [`DailySourceReader`] turns a single-day fetch into range reads.
//! - [`CompositeOpReader`] combines two readers with an elementwise operator.

pub mod cached;
pub mod chained;
pub mod composite;
pub mod csv_file;
pub mod daily;
pub mod memory;
pub mod parquet;

pub use cached::{Cached, CachedReader, CachedStore};
pub use chained::ChainedReader;
pub use composite::{combine, product, ratio, spread, sum, BinaryOp, CompositeOpReader};
pub use csv_file::CsvFileReader;
pub use daily::{DailySourceReader, FetchSummary, RescaleOptions};
pub use memory::{MemoryCachedReader, MemoryStore};
pub use parquet::{CacheMeta, ParquetCachedReader, ParquetStore};

use crate::availability::AvailabilityReport;
use crate::domain::{DateCriteria, Table};
use crate::fetch::FetchError;
use crate::filter::RowFilter;
use chrono::NaiveDate;
use thiserror::Error;

/// Errors surfaced by readers.
///
/// Upstream problems for a single day or sub-range are logged and swallowed
/// inside the readers; what reaches the caller is either an invariant
/// violation or a failure of the reader's own storage.
#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("invalid date range: {from} is after {to}")]
    InvalidRange { from: NaiveDate, to: NaiveDate },

    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("cache error: {0}")]
    Cache(String),

    #[error("parquet I/O error: {0}")]
    Parquet(String),

    #[error("csv error: {0}")]
    Csv(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Anything that can answer availability questions and produce rows.
pub trait Reader: Send {
    /// Stable identity, used for cache directories and composite names.
    fn name(&self) -> &str;

    /// Generic column prefix used when this reader's columns are joined with
    /// another reader's.
    fn column_prefix(&self) -> &str {
        ""
    }

    /// What portion of `criteria` this reader can serve without delegating.
    fn has_data(&self, criteria: &DateCriteria) -> AvailabilityReport;

    /// Rows for `criteria`.
    fn read(&mut self, criteria: &DateCriteria) -> Result<Table, ReaderError>;

    /// Row predicate applied after every read. `None` clears it.
    fn set_filter(&mut self, filter: Option<RowFilter>);
}

/// A reader that can sit on the local side of a [`ChainedReader`].
///
/// The chain hands every batch of rows obtained from its fallback to
/// [`LocalSource::on_received_more_data`]; the default is to ignore them.
pub trait LocalSource: Reader {
    fn on_received_more_data(&mut self, _rows: &Table) -> Result<(), ReaderError> {
        Ok(())
    }

    /// Fill missing `previous_close` on rows obtained elsewhere from the
    /// closes this source already holds. Sources holding nothing leave the
    /// rows alone.
    fn seed_previous_close(&self, _rows: &mut Table) {}
}

impl<R: Reader + ?Sized> Reader for Box<R> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn column_prefix(&self) -> &str {
        (**self).column_prefix()
    }

    fn has_data(&self, criteria: &DateCriteria) -> AvailabilityReport {
        (**self).has_data(criteria)
    }

    fn read(&mut self, criteria: &DateCriteria) -> Result<Table, ReaderError> {
        (**self).read(criteria)
    }

    fn set_filter(&mut self, filter: Option<RowFilter>) {
        (**self).set_filter(filter)
    }
}

impl<R: LocalSource + ?Sized> LocalSource for Box<R> {
    fn on_received_more_data(&mut self, rows: &Table) -> Result<(), ReaderError> {
        (**self).on_received_more_data(rows)
    }

    fn seed_previous_close(&self, rows: &mut Table) {
        (**self).seed_previous_close(rows)
    }
}

/// Cleanup applied to every read result: placeholder columns dropped,
/// duplicates removed, filter applied.
pub(crate) fn post_process(mut table: Table, filter: Option<&RowFilter>) -> Table {
    if table.is_empty() {
        return table;
    }
    table.drop_placeholder_columns();
    table.dedup();
    match filter {
        Some(f) => f.apply(table),
        None => table,
    }
}
