//! Single-day fetch collaborators.
//!
//! A [`DayFetcher`] produces the rows published for one trading day. The
//! day-by-day readers in [`crate::reader::daily`] build range reads on top of
//! it; they never see URLs or file formats.

pub mod http;
pub mod mapping;

pub use http::{HttpDayFetcher, UrlTemplate};
pub use mapping::{ColumnMapping, FieldEquals};

use crate::domain::Table;
use chrono::NaiveDate;
use thiserror::Error;

/// Structured errors for a single-day fetch.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("no data published for {date}")]
    NotFound { date: NaiveDate },

    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    #[error("network unreachable: {0}")]
    Network(String),

    #[error("response format changed: {0}")]
    Parse(String),
}

/// Fetches the rows for exactly one day.
pub trait DayFetcher: Send {
    fn fetch_one_day(&self, date: NaiveDate) -> Result<Table, FetchError>;
}

impl<F> DayFetcher for F
where
    F: Fn(NaiveDate) -> Result<Table, FetchError> + Send,
{
    fn fetch_one_day(&self, date: NaiveDate) -> Result<Table, FetchError> {
        self(date)
    }
}
