//! Domain types: read criteria, date ranges, rows and tables.

pub mod criteria;
pub mod row;

pub use criteria::{DateCriteria, DateRange};
pub use row::{columns, Field, Row, Table};
