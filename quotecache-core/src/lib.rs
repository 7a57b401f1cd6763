//! quotecache core: range-aware caching and chained-fallback reading of daily
//! market rows.
//!
//! This crate contains:
//! - Domain types (date criteria, date ranges, rows, tables)
//! - Market calendar trait with a weekday + holiday implementation
//! - Availability algebra: interval merging with gap tolerance and
//!   covered/missing resolution
//! - The `Reader` capability, the chained local/fallback protocol, memory and
//!   parquet caches, day-by-day and CSV sources, and composite readers
//! - Single-day HTTP fetching with CSV column mapping
//! - Row filters and TOML configuration

pub mod availability;
pub mod calendar;
pub mod config;
pub mod domain;
pub mod fetch;
pub mod filter;
pub mod reader;

pub use availability::{AvailabilityReport, AvailabilityStatus, CoalescePolicy};
pub use calendar::{MarketCalendar, WeekdayCalendar};
pub use config::QuoteCacheConfig;
pub use domain::{DateCriteria, DateRange, Row, Table};
pub use filter::RowFilter;
pub use reader::{
    ChainedReader, CompositeOpReader, LocalSource, MemoryCachedReader, ParquetCachedReader,
    Reader, ReaderError,
};

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: values and readers can move to a worker thread.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        // Value types
        require_send::<DateRange>();
        require_sync::<DateRange>();
        require_send::<DateCriteria>();
        require_sync::<DateCriteria>();
        require_send::<AvailabilityReport>();
        require_sync::<AvailabilityReport>();
        require_send::<Table>();
        require_sync::<Table>();
        require_send::<RowFilter>();
        require_sync::<RowFilter>();
        require_send::<ReaderError>();
        require_sync::<ReaderError>();

        // Readers
        require_send::<MemoryCachedReader>();
        require_send::<ParquetCachedReader>();
        require_send::<CompositeOpReader>();
        require_send::<reader::CsvFileReader>();
        require_send::<reader::DailySourceReader<fetch::HttpDayFetcher>>();
    }
}
