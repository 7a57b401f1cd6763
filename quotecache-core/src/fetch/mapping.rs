//! Upstream CSV layout → canonical rows.

use super::FetchError;
use crate::domain::{columns, Field, Row, Table};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Read;
use tracing::warn;

/// Keep a record only when `column` equals `value` (after renaming).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldEquals {
    pub column: String,
    pub value: String,
}

/// How an upstream CSV file maps onto [`Row`]s.
///
/// Headers listed in `renames` are mapped to canonical column names; every
/// other header is kept as an extra field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    #[serde(default)]
    pub renames: BTreeMap<String, String>,

    /// Format of the `Date` column when the file carries one.
    #[serde(default = "default_date_format")]
    pub date_format: String,

    /// Identifier for files that describe a single instrument and have no
    /// identifier column.
    #[serde(default)]
    pub default_identifier: Option<String>,

    #[serde(default)]
    pub keep_rows_where: Vec<FieldEquals>,
}

fn default_date_format() -> String {
    "%Y-%m-%d".into()
}

impl Default for ColumnMapping {
    fn default() -> Self {
        Self {
            renames: BTreeMap::new(),
            date_format: default_date_format(),
            default_identifier: None,
            keep_rows_where: Vec::new(),
        }
    }
}

impl ColumnMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rename(mut self, upstream: impl Into<String>, canonical: impl Into<String>) -> Self {
        self.renames.insert(upstream.into(), canonical.into());
        self
    }

    pub fn with_date_format(mut self, format: impl Into<String>) -> Self {
        self.date_format = format.into();
        self
    }

    pub fn with_default_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.default_identifier = Some(identifier.into());
        self
    }

    pub fn keep_rows_where(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.keep_rows_where.push(FieldEquals {
            column: column.into(),
            value: value.into(),
        });
        self
    }

    fn canonical<'a>(&'a self, header: &'a str) -> &'a str {
        self.renames.get(header).map(String::as_str).unwrap_or(header)
    }

    /// Parse CSV text into rows.
    ///
    /// When `stamp` is given every row is dated with it and any `Date` column
    /// is ignored; otherwise the `Date` column is parsed with `date_format`.
    /// Records that cannot be turned into a row are skipped with a warning.
    pub fn parse_csv<R: Read>(
        &self,
        input: R,
        stamp: Option<NaiveDate>,
    ) -> Result<Table, FetchError> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(input);

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| FetchError::Parse(format!("unreadable header: {e}")))?
            .iter()
            .map(|h| self.canonical(h).to_string())
            .collect();

        let has = |name: &str| headers.iter().any(|h| h == name);
        if !has(columns::IDENTIFIER) && self.default_identifier.is_none() {
            return Err(FetchError::Parse(format!(
                "no {} column in {headers:?}",
                columns::IDENTIFIER
            )));
        }
        if !has(columns::CLOSE) {
            return Err(FetchError::Parse(format!(
                "no {} column in {headers:?}",
                columns::CLOSE
            )));
        }
        if stamp.is_none() && !has(columns::DATE) {
            return Err(FetchError::Parse(format!(
                "no {} column in {headers:?}",
                columns::DATE
            )));
        }

        let mut rows = Vec::new();
        for (line, record) in reader.records().enumerate() {
            let record =
                record.map_err(|e| FetchError::Parse(format!("record {}: {e}", line + 1)))?;
            let fields: BTreeMap<&str, &str> = headers
                .iter()
                .map(String::as_str)
                .zip(record.iter())
                .collect();

            let keep = self
                .keep_rows_where
                .iter()
                .all(|p| fields.get(p.column.as_str()) == Some(&p.value.as_str()));
            if !keep {
                continue;
            }

            match self.row_from_fields(&fields, stamp) {
                Ok(row) => rows.push(row),
                Err(reason) => warn!(line = line + 1, %reason, "Skipping invalid record"),
            }
        }
        Ok(Table::from_rows(rows))
    }

    fn row_from_fields(
        &self,
        fields: &BTreeMap<&str, &str>,
        stamp: Option<NaiveDate>,
    ) -> Result<Row, String> {
        let identifier = match fields.get(columns::IDENTIFIER) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => self
                .default_identifier
                .clone()
                .ok_or_else(|| "empty identifier".to_string())?,
        };

        let date = match stamp {
            Some(d) => d,
            None => {
                let raw = fields.get(columns::DATE).copied().unwrap_or_default();
                NaiveDate::parse_from_str(raw, &self.date_format)
                    .map_err(|e| format!("bad date '{raw}': {e}"))?
            }
        };

        let close = fields
            .get(columns::CLOSE)
            .and_then(|v| parse_number(v))
            .ok_or_else(|| "non-numeric close".to_string())?;

        let mut row = Row::new(identifier, date, close);
        for column in [columns::OPEN, columns::HIGH, columns::LOW] {
            if let Some(v) = fields.get(column).and_then(|v| parse_number(v)) {
                row.set_price(column, v);
            }
        }
        row.previous_close = fields
            .get(columns::PREVIOUS_CLOSE)
            .and_then(|v| parse_number(v));
        // absent → 0, present but unparsable → NaN
        row.volume = fields
            .get(columns::VOLUME)
            .map_or(0.0, |v| parse_number(v).unwrap_or(f64::NAN));
        row.turnover = fields
            .get(columns::TURNOVER)
            .map_or(0.0, |v| parse_number(v).unwrap_or(f64::NAN));

        for (name, value) in fields {
            if columns::BASE.contains(name) || value.is_empty() {
                continue;
            }
            let field = match parse_number(value) {
                Some(n) => Field::Number(n),
                None => Field::Text(value.to_string()),
            };
            row.extra.insert(name.to_string(), field);
        }
        Ok(row)
    }
}

/// Numeric cell, tolerating thousands separators. Blanks and dashes are not
/// numbers.
fn parse_number(raw: &str) -> Option<f64> {
    let cleaned = raw.replace(',', "");
    cleaned.trim().parse::<f64>().ok()
}
