//! Row and Table — one record per instrument per trading day.

use super::criteria::{DateCriteria, DateRange};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt::Write as _;

/// Canonical column names.
pub mod columns {
    pub const IDENTIFIER: &str = "Identifier";
    pub const DATE: &str = "Date";
    pub const OPEN: &str = "Open";
    pub const HIGH: &str = "High";
    pub const LOW: &str = "Low";
    pub const CLOSE: &str = "Close";
    pub const PREVIOUS_CLOSE: &str = "PreviousClose";
    pub const VOLUME: &str = "Volume";
    pub const TURNOVER: &str = "Turnover";

    /// Columns every row carries, in display order.
    pub const BASE: [&str; 9] = [
        IDENTIFIER,
        DATE,
        OPEN,
        HIGH,
        LOW,
        CLOSE,
        PREVIOUS_CLOSE,
        VOLUME,
        TURNOVER,
    ];

    /// Columns an elementwise operator is applied to.
    pub const PRICE: [&str; 4] = [OPEN, HIGH, LOW, CLOSE];
}

/// Extra (non-base) column value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Field {
    Number(f64),
    Text(String),
}

impl Field {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Field::Number(n) => Some(*n),
            Field::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Field::Text(s) => Some(s),
            Field::Number(_) => None,
        }
    }
}

/// Daily record for a single instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub identifier: String,
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub previous_close: Option<f64>,
    pub volume: f64,
    pub turnover: f64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, Field>,
}

impl Row {
    /// Row with every price at `close` and zero volume/turnover.
    pub fn new(identifier: impl Into<String>, date: NaiveDate, close: f64) -> Self {
        Self {
            identifier: identifier.into(),
            date,
            open: close,
            high: close,
            low: close,
            close,
            previous_close: None,
            volume: 0.0,
            turnover: 0.0,
            extra: BTreeMap::new(),
        }
    }

    /// Price column by canonical name.
    pub fn price(&self, column: &str) -> Option<f64> {
        match column {
            columns::OPEN => Some(self.open),
            columns::HIGH => Some(self.high),
            columns::LOW => Some(self.low),
            columns::CLOSE => Some(self.close),
            _ => None,
        }
    }

    pub fn set_price(&mut self, column: &str, value: f64) {
        match column {
            columns::OPEN => self.open = value,
            columns::HIGH => self.high = value,
            columns::LOW => self.low = value,
            columns::CLOSE => self.close = value,
            _ => {}
        }
    }

    /// Numeric value of a base or extra column.
    pub fn number(&self, column: &str) -> Option<f64> {
        match column {
            columns::PREVIOUS_CLOSE => self.previous_close,
            columns::VOLUME => Some(self.volume),
            columns::TURNOVER => Some(self.turnover),
            other => self
                .price(other)
                .or_else(|| self.extra.get(other).and_then(Field::as_number)),
        }
    }

    /// Exact-content key; NaN compares equal to NaN, as in a table dedup.
    fn content_key(&self) -> String {
        let mut key = String::with_capacity(96);
        let _ = write!(key, "{}\u{1f}{}", self.identifier, self.date);
        for v in [self.open, self.high, self.low, self.close, self.volume, self.turnover] {
            let _ = write!(key, "\u{1f}{:x}", canonical_bits(v));
        }
        match self.previous_close {
            Some(v) => {
                let _ = write!(key, "\u{1f}{:x}", canonical_bits(v));
            }
            None => key.push_str("\u{1f}-"),
        }
        for (name, field) in &self.extra {
            match field {
                Field::Number(n) => {
                    let _ = write!(key, "\u{1f}{name}={:x}", canonical_bits(*n));
                }
                Field::Text(s) => {
                    let _ = write!(key, "\u{1f}{name}={s}");
                }
            }
        }
        key
    }
}

fn canonical_bits(v: f64) -> u64 {
    if v.is_nan() {
        f64::NAN.to_bits()
    } else {
        v.to_bits()
    }
}

/// Ordered collection of rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub rows: Vec<Row>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rows(rows: Vec<Row>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Row> {
        self.rows.iter()
    }

    /// Concatenate tables in order.
    pub fn concat(tables: impl IntoIterator<Item = Table>) -> Table {
        let mut rows = Vec::new();
        for table in tables {
            rows.extend(table.rows);
        }
        Table { rows }
    }

    pub fn extend(&mut self, other: Table) {
        self.rows.extend(other.rows);
    }

    /// Stable sort by date; rows of one day keep their relative order.
    pub fn sort_by_date(&mut self) {
        self.rows.sort_by_key(|r| r.date);
    }

    /// Drop exact duplicate rows, keeping the first occurrence.
    pub fn dedup(&mut self) {
        let mut seen = HashSet::with_capacity(self.rows.len());
        self.rows.retain(|row| seen.insert(row.content_key()));
    }

    /// Remove placeholder columns (`Unnamed: 0` and friends) left behind by
    /// index-carrying CSV exports.
    pub fn drop_placeholder_columns(&mut self) {
        for row in &mut self.rows {
            row.extra.retain(|name, _| !name.starts_with("Unnamed"));
        }
    }

    /// Rows whose date lies in `range`.
    pub fn filter_dates(&self, range: &DateRange) -> Table {
        self.rows
            .iter()
            .filter(|r| range.contains(r.date))
            .cloned()
            .collect()
    }

    /// Rows whose date is part of `criteria`.
    pub fn filter_criteria(&self, criteria: &DateCriteria) -> Table {
        self.rows
            .iter()
            .filter(|r| criteria.contains(r.date))
            .cloned()
            .collect()
    }

    pub fn distinct_identifiers(&self) -> BTreeSet<&str> {
        self.rows.iter().map(|r| r.identifier.as_str()).collect()
    }

    /// Distinct dates, ascending.
    pub fn distinct_dates(&self) -> Vec<NaiveDate> {
        let dates: BTreeSet<NaiveDate> = self.rows.iter().map(|r| r.date).collect();
        dates.into_iter().collect()
    }

    /// Base columns followed by every extra column seen in any row.
    pub fn column_names(&self) -> Vec<String> {
        let extras: BTreeSet<&str> = self
            .rows
            .iter()
            .flat_map(|r| r.extra.keys().map(String::as_str))
            .collect();
        columns::BASE
            .iter()
            .map(|c| c.to_string())
            .chain(extras.into_iter().map(String::from))
            .collect()
    }

    /// Multiply volume and turnover by fixed factors.
    pub fn rescale(&mut self, volume_scale: f64, turnover_scale: f64) {
        if volume_scale == 1.0 && turnover_scale == 1.0 {
            return;
        }
        for row in &mut self.rows {
            row.volume *= volume_scale;
            row.turnover *= turnover_scale;
        }
    }

    /// Fill missing `previous_close` from the last close of the same
    /// identifier on an earlier date. Rows sharing a date see the same
    /// earlier close.
    pub fn derive_previous_close(&mut self) {
        let mut order: Vec<usize> = (0..self.rows.len()).collect();
        order.sort_by_key(|&i| self.rows[i].date);

        // identifier -> (latest date seen, close before that date, latest close)
        let mut history: HashMap<String, (NaiveDate, Option<f64>, f64)> = HashMap::new();
        for i in order {
            let row = &mut self.rows[i];
            let earlier = match history.get(&row.identifier) {
                Some((date, before, _)) if *date == row.date => *before,
                Some((_, _, close)) => Some(*close),
                None => None,
            };
            if row.previous_close.is_none() {
                row.previous_close = earlier;
            }
            history.insert(row.identifier.clone(), (row.date, earlier, row.close));
        }
    }

    /// Close of `identifier` on `date`. Assumes date-sorted rows.
    pub fn close_on(&self, identifier: &str, date: NaiveDate) -> Option<f64> {
        let start = self.rows.partition_point(|r| r.date < date);
        self.rows[start..]
            .iter()
            .take_while(|r| r.date == date)
            .find(|r| r.identifier == identifier)
            .map(|r| r.close)
    }
}

impl FromIterator<Row> for Table {
    fn from_iter<I: IntoIterator<Item = Row>>(iter: I) -> Self {
        Table {
            rows: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Table {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}
