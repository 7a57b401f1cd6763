//! Parquet-backed cache with Hive-style partitioning.
//!
//! Layout: `{cache_dir}/reader={NAME}/{year}.parquet`
//!
//! Features:
//! - Atomic writes (write to .tmp, rename into place)
//! - Only the year partitions touched by an append are rewritten
//! - Integrity validation on load (schema check, row count > 0)
//! - Quarantine for corrupt files ({filename}.quarantined)
//! - Metadata sidecar per reader (hash, date range, row count)
//!
//! Extra fields are persisted as one JSON object per row in the `extra`
//! column.

use super::{Cached, CachedReader, CachedStore, ChainedReader, Reader, ReaderError};
use crate::availability::{ranges_from_dates, CoalescePolicy};
use crate::calendar::MarketCalendar;
use crate::domain::{DateCriteria, DateRange, Field, Row, Table};
use chrono::{Datelike, NaiveDate};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Metadata sidecar for a cached reader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheMeta {
    pub reader: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub row_count: usize,
    pub ranges: Vec<DateRange>,
    pub data_hash: String,
    pub cached_at: chrono::NaiveDateTime,
}

/// On-disk [`CachedStore`]. Rows are also held in memory once loaded.
pub struct ParquetStore {
    dir: PathBuf,
    name: String,
    data: Table,
    ranges: Vec<DateRange>,
    policy: CoalescePolicy,
}

impl ParquetStore {
    /// Open (or start) the cache for `name` under `cache_dir`, loading every
    /// valid partition.
    pub fn open(
        cache_dir: impl AsRef<Path>,
        name: &str,
        policy: CoalescePolicy,
    ) -> Result<Self, ReaderError> {
        let dir = reader_dir(cache_dir.as_ref(), name);
        let data = load_partitions(&dir)?;
        let ranges = ranges_from_dates(&data.distinct_dates(), policy);

        if let Some(meta) = read_meta(&dir) {
            let hash = data_hash(&data)?;
            if meta.data_hash != hash {
                warn!(reader = name, dir = %dir.display(), "cache contents differ from meta.json");
            }
        }
        info!(
            reader = name,
            rows = data.len(),
            ranges = ranges.len(),
            "parquet cache opened"
        );

        Ok(Self {
            dir,
            name: name.to_string(),
            data,
            ranges,
            policy,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn meta(&self) -> Option<CacheMeta> {
        read_meta(&self.dir)
    }

    /// Metadata of every reader cached under `cache_dir`, by reader name.
    pub fn status(cache_dir: impl AsRef<Path>) -> Result<Vec<CacheMeta>, ReaderError> {
        let cache_dir = cache_dir.as_ref();
        if !cache_dir.exists() {
            return Ok(Vec::new());
        }
        let mut metas = Vec::new();
        for entry in fs::read_dir(cache_dir)? {
            let path = entry?.path();
            let is_reader_dir = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("reader="));
            if !is_reader_dir {
                continue;
            }
            if let Some(meta) = read_meta(&path) {
                metas.push(meta);
            }
        }
        metas.sort_by(|a, b| a.reader.cmp(&b.reader));
        Ok(metas)
    }

    fn write_years(&self, years: &BTreeSet<i32>) -> Result<(), ReaderError> {
        fs::create_dir_all(&self.dir)
            .map_err(|e| ReaderError::Cache(format!("failed to create dir: {e}")))?;

        let mut by_year: BTreeMap<i32, Vec<&Row>> = BTreeMap::new();
        for row in self.data.iter().filter(|r| years.contains(&r.date.year())) {
            by_year.entry(row.date.year()).or_default().push(row);
        }

        for (year, rows) in &by_year {
            let mut df = rows_to_dataframe(rows)?;
            let path = self.dir.join(format!("{year}.parquet"));
            let tmp_path = path.with_extension("parquet.tmp");

            write_parquet(&mut df, &tmp_path)?;
            fs::rename(&tmp_path, &path).map_err(|e| {
                let _ = fs::remove_file(&tmp_path);
                ReaderError::Cache(format!("atomic rename failed: {e}"))
            })?;
            debug!(reader = %self.name, year, rows = rows.len(), "partition written");
        }
        Ok(())
    }

    fn write_meta(&self) -> Result<(), ReaderError> {
        let (Some(first), Some(last)) = (self.data.rows.first(), self.data.rows.last()) else {
            return Ok(());
        };
        let meta = CacheMeta {
            reader: self.name.clone(),
            start_date: first.date,
            end_date: last.date,
            row_count: self.data.len(),
            ranges: self.ranges.clone(),
            data_hash: data_hash(&self.data)?,
            cached_at: chrono::Local::now().naive_local(),
        };
        let json = serde_json::to_string_pretty(&meta)
            .map_err(|e| ReaderError::Cache(format!("meta serialization: {e}")))?;
        fs::write(self.dir.join("meta.json"), json)
            .map_err(|e| ReaderError::Cache(format!("meta write: {e}")))?;
        Ok(())
    }
}

impl CachedStore for ParquetStore {
    fn read_cached_data(&self, criteria: &DateCriteria) -> Result<Table, ReaderError> {
        Ok(self.data.filter_criteria(criteria))
    }

    fn append(&mut self, rows: &Table) -> Result<(), ReaderError> {
        if rows.is_empty() {
            return Ok(());
        }
        let mut years: BTreeSet<i32> = rows.iter().map(|r| r.date.year()).collect();

        self.data.extend(rows.clone());
        self.data.sort_by_date();
        let unseeded: Vec<bool> = self.data.iter().map(|r| r.previous_close.is_none()).collect();
        self.data.derive_previous_close();
        // seeding may reach rows in partitions the new rows don't touch
        for (row, was_unseeded) in self.data.iter().zip(unseeded) {
            if was_unseeded && row.previous_close.is_some() {
                years.insert(row.date.year());
            }
        }
        self.data.dedup();
        self.ranges = ranges_from_dates(&self.data.distinct_dates(), self.policy);

        self.write_years(&years)?;
        self.write_meta()
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

/// Chained reader over an on-disk parquet cache.
pub type ParquetCachedReader<F = Box<dyn Reader>> = CachedReader<ParquetStore, F>;

impl<F: Reader> ChainedReader<Cached<ParquetStore>, F> {
    /// Cache `fallback` under `cache_dir/reader={fallback name}`.
    pub fn on_disk(
        cache_dir: impl AsRef<Path>,
        fallback: F,
        calendar: Arc<dyn MarketCalendar>,
        policy: CoalescePolicy,
    ) -> Result<Self, ReaderError> {
        let store = ParquetStore::open(cache_dir, fallback.name(), policy)?;
        Ok(Self::cached(store, fallback, calendar))
    }
}

fn reader_dir(cache_dir: &Path, name: &str) -> PathBuf {
    let safe: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    cache_dir.join(format!("reader={safe}"))
}

fn read_meta(dir: &Path) -> Option<CacheMeta> {
    let content = fs::read_to_string(dir.join("meta.json")).ok()?;
    serde_json::from_str(&content).ok()
}

fn data_hash(data: &Table) -> Result<String, ReaderError> {
    let bytes = serde_json::to_vec(data)
        .map_err(|e| ReaderError::Cache(format!("hash serialization: {e}")))?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

// ── Parquet I/O helpers ─────────────────────────────────────────────

const EXPECTED_COLUMNS: [&str; 9] = [
    "identifier",
    "date",
    "open",
    "high",
    "low",
    "close",
    "previous_close",
    "volume",
    "turnover",
];

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default()
}

fn rows_to_dataframe(rows: &[&Row]) -> Result<DataFrame, ReaderError> {
    let identifiers: Vec<&str> = rows.iter().map(|r| r.identifier.as_str()).collect();
    let dates: Vec<i32> = rows
        .iter()
        .map(|r| (r.date - epoch()).num_days() as i32)
        .collect();
    let opens: Vec<f64> = rows.iter().map(|r| r.open).collect();
    let highs: Vec<f64> = rows.iter().map(|r| r.high).collect();
    let lows: Vec<f64> = rows.iter().map(|r| r.low).collect();
    let closes: Vec<f64> = rows.iter().map(|r| r.close).collect();
    let previous: Vec<Option<f64>> = rows.iter().map(|r| r.previous_close).collect();
    let volumes: Vec<f64> = rows.iter().map(|r| r.volume).collect();
    let turnovers: Vec<f64> = rows.iter().map(|r| r.turnover).collect();
    let extras = rows
        .iter()
        .map(|r| encode_extra(&r.extra))
        .collect::<Result<Vec<Option<String>>, _>>()?;

    DataFrame::new(vec![
        Column::new("identifier".into(), identifiers),
        Column::new("date".into(), dates)
            .cast(&DataType::Date)
            .map_err(|e| ReaderError::Parquet(format!("date cast: {e}")))?,
        Column::new("open".into(), opens),
        Column::new("high".into(), highs),
        Column::new("low".into(), lows),
        Column::new("close".into(), closes),
        Column::new("previous_close".into(), previous),
        Column::new("volume".into(), volumes),
        Column::new("turnover".into(), turnovers),
        Column::new("extra".into(), extras),
    ])
    .map_err(|e| ReaderError::Parquet(format!("dataframe creation: {e}")))
}

fn encode_extra(extra: &BTreeMap<String, Field>) -> Result<Option<String>, ReaderError> {
    if extra.is_empty() {
        return Ok(None);
    }
    serde_json::to_string(extra)
        .map(Some)
        .map_err(|e| ReaderError::Parquet(format!("extra encode: {e}")))
}

/// Non-finite numbers are written as JSON null and read back as NaN.
fn decode_extra(text: &str) -> Result<BTreeMap<String, Field>, ReaderError> {
    let values: BTreeMap<String, serde_json::Value> = serde_json::from_str(text)
        .map_err(|e| ReaderError::Parquet(format!("extra decode: {e}")))?;
    Ok(values
        .into_iter()
        .map(|(name, value)| {
            let field = match value {
                serde_json::Value::String(s) => Field::Text(s),
                serde_json::Value::Number(n) => Field::Number(n.as_f64().unwrap_or(f64::NAN)),
                serde_json::Value::Null => Field::Number(f64::NAN),
                other => Field::Text(other.to_string()),
            };
            (name, field)
        })
        .collect())
}

fn write_parquet(df: &mut DataFrame, path: &Path) -> Result<(), ReaderError> {
    let file =
        fs::File::create(path).map_err(|e| ReaderError::Parquet(format!("create file: {e}")))?;
    ParquetWriter::new(file)
        .finish(df)
        .map_err(|e| ReaderError::Parquet(format!("write parquet: {e}")))?;
    Ok(())
}

/// Every valid partition in `dir`, date-sorted. Corrupt partitions are
/// renamed aside and skipped.
fn load_partitions(dir: &Path) -> Result<Table, ReaderError> {
    if !dir.exists() {
        return Ok(Table::new());
    }

    let mut table = Table::new();
    let entries =
        fs::read_dir(dir).map_err(|e| ReaderError::Cache(format!("read dir: {e}")))?;
    for entry in entries {
        let entry = entry.map_err(|e| ReaderError::Cache(format!("dir entry: {e}")))?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("parquet") {
            continue;
        }

        match load_and_validate_parquet(&path) {
            Ok(rows) => table.extend(rows),
            Err(e) => {
                let quarantine = path.with_extension("parquet.quarantined");
                warn!(path = %path.display(), error = %e, "quarantining corrupt cache file");
                let _ = fs::rename(&path, &quarantine);
            }
        }
    }

    table.sort_by_date();
    table.dedup();
    Ok(table)
}

fn load_and_validate_parquet(path: &Path) -> Result<Table, ReaderError> {
    let file = fs::File::open(path).map_err(|e| ReaderError::Parquet(format!("open: {e}")))?;
    let df = ParquetReader::new(file)
        .finish()
        .map_err(|e| ReaderError::Parquet(format!("read: {e}")))?;

    if df.height() == 0 {
        return Err(ReaderError::Cache("empty parquet file".into()));
    }
    for col_name in &EXPECTED_COLUMNS {
        if df.column(col_name).is_err() {
            return Err(ReaderError::Cache(format!("missing column '{col_name}'")));
        }
    }

    dataframe_to_rows(&df)
}

fn dataframe_to_rows(df: &DataFrame) -> Result<Table, ReaderError> {
    let col = |name: &str| {
        df.column(name)
            .map_err(|e| ReaderError::Parquet(format!("column read: {e}")))
    };
    let f64_col = |name: &str| -> Result<Float64Chunked, ReaderError> {
        col(name)?
            .f64()
            .cloned()
            .map_err(|e| ReaderError::Parquet(format!("{name} column type: {e}")))
    };

    let ids = col("identifier")?
        .str()
        .map_err(|e| ReaderError::Parquet(format!("identifier column type: {e}")))?;
    let dates = col("date")?
        .date()
        .map_err(|e| ReaderError::Parquet(format!("date column type: {e}")))?;
    let opens = f64_col("open")?;
    let highs = f64_col("high")?;
    let lows = f64_col("low")?;
    let closes = f64_col("close")?;
    let previous = f64_col("previous_close")?;
    let volumes = f64_col("volume")?;
    let turnovers = f64_col("turnover")?;
    // files written before extras were persisted have no `extra` column
    let extras = match df.column("extra") {
        Ok(column) => Some(
            column
                .str()
                .map_err(|e| ReaderError::Parquet(format!("extra column type: {e}")))?,
        ),
        Err(_) => None,
    };

    let mut rows = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let identifier = ids
            .get(i)
            .ok_or_else(|| ReaderError::Parquet(format!("null identifier at row {i}")))?;
        let days = dates
            .get(i)
            .ok_or_else(|| ReaderError::Parquet(format!("null date at row {i}")))?;
        let close = closes.get(i).unwrap_or(f64::NAN);

        let mut row = Row::new(identifier, epoch() + chrono::Duration::days(days as i64), close);
        row.open = opens.get(i).unwrap_or(f64::NAN);
        row.high = highs.get(i).unwrap_or(f64::NAN);
        row.low = lows.get(i).unwrap_or(f64::NAN);
        row.previous_close = previous.get(i);
        row.volume = volumes.get(i).unwrap_or(f64::NAN);
        row.turnover = turnovers.get(i).unwrap_or(f64::NAN);
        if let Some(text) = extras.and_then(|c| c.get(i)) {
            row.extra = decode_extra(text)?;
        }
        rows.push(row);
    }
    Ok(Table::from_rows(rows))
}
