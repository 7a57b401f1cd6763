//! Row predicates applied after a read.
//!
//! Filters compose with [`RowFilter::and`] and render as a readable query
//! (`Identifier == 'NIFTY 50' & Date in 2024-01-01..=2024-01-31`) for logs.

use crate::domain::{columns, DateRange, Row, Table};
use std::fmt;
use std::sync::Arc;

#[derive(Clone)]
enum Predicate {
    Identifier(String),
    Identifiers(Vec<String>),
    DateRange(DateRange),
    Text { column: String, value: String },
    Custom {
        label: String,
        test: Arc<dyn Fn(&Row) -> bool + Send + Sync>,
    },
}

impl Predicate {
    fn matches(&self, row: &Row) -> bool {
        match self {
            Predicate::Identifier(id) => row.identifier == *id,
            Predicate::Identifiers(ids) => ids.iter().any(|id| *id == row.identifier),
            Predicate::DateRange(range) => range.contains(row.date),
            Predicate::Text { column, value } => {
                if column == columns::IDENTIFIER {
                    return row.identifier == *value;
                }
                row.extra
                    .get(column)
                    .and_then(|f| f.as_text())
                    .is_some_and(|s| s == value)
            }
            Predicate::Custom { test, .. } => test(row),
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Identifier(id) => write!(f, "{} == '{id}'", columns::IDENTIFIER),
            Predicate::Identifiers(ids) => {
                let quoted: Vec<String> = ids.iter().map(|id| format!("'{id}'")).collect();
                write!(f, "{} in [{}]", columns::IDENTIFIER, quoted.join(", "))
            }
            Predicate::DateRange(range) => write!(f, "{} in {range}", columns::DATE),
            Predicate::Text { column, value } => write!(f, "{column} == '{value}'"),
            Predicate::Custom { label, .. } => write!(f, "{label}"),
        }
    }
}

/// Conjunction of row predicates.
#[derive(Clone)]
pub struct RowFilter {
    predicates: Vec<Predicate>,
}

impl RowFilter {
    fn single(predicate: Predicate) -> Self {
        Self {
            predicates: vec![predicate],
        }
    }

    pub fn identifier(id: impl Into<String>) -> Self {
        Self::single(Predicate::Identifier(id.into()))
    }

    pub fn identifiers<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::single(Predicate::Identifiers(
            ids.into_iter().map(Into::into).collect(),
        ))
    }

    pub fn date_range(range: DateRange) -> Self {
        Self::single(Predicate::DateRange(range))
    }

    /// Text field equality, e.g. `InstrumentType == 'FUTIDX'`.
    pub fn text_field(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self::single(Predicate::Text {
            column: column.into(),
            value: value.into(),
        })
    }

    pub fn custom<F>(label: impl Into<String>, test: F) -> Self
    where
        F: Fn(&Row) -> bool + Send + Sync + 'static,
    {
        Self::single(Predicate::Custom {
            label: label.into(),
            test: Arc::new(test),
        })
    }

    pub fn and(mut self, other: RowFilter) -> Self {
        self.predicates.extend(other.predicates);
        self
    }

    pub fn matches(&self, row: &Row) -> bool {
        self.predicates.iter().all(|p| p.matches(row))
    }

    pub fn apply(&self, table: Table) -> Table {
        table.into_iter().filter(|row| self.matches(row)).collect()
    }
}

impl fmt::Display for RowFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, p) in self.predicates.iter().enumerate() {
            if i > 0 {
                f.write_str(" & ")?;
            }
            write!(f, "{p}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for RowFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RowFilter").field(&self.to_string()).finish()
    }
}
