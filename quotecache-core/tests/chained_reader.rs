//! Integration tests for reader chains: availability scenarios, memory and
//! parquet caches, a daily source over a CSV archive, and composites.

use chrono::NaiveDate;
use quotecache_core::availability::{resolve, AvailabilityStatus, CoalescePolicy};
use quotecache_core::calendar::{MarketCalendar, WeekdayCalendar};
use quotecache_core::domain::{DateCriteria, DateRange, Field, Row, Table};
use quotecache_core::fetch::{ColumnMapping, FetchError};
use quotecache_core::filter::RowFilter;
use quotecache_core::reader::{
    spread, ChainedReader, CsvFileReader, DailySourceReader, MemoryCachedReader,
    ParquetCachedReader, ParquetStore, Reader, ReaderError,
};
use quotecache_core::AvailabilityReport;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

// ── Helpers ──────────────────────────────────────────────────────────

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn r(from: NaiveDate, to: NaiveDate) -> DateRange {
    DateRange::new(from, to).unwrap()
}

fn calendar() -> Arc<dyn MarketCalendar> {
    Arc::new(WeekdayCalendar::new())
}

fn temp_path(label: &str) -> PathBuf {
    let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
    std::env::temp_dir().join(format!(
        "quotecache_{label}_{}_{id}",
        std::process::id()
    ))
}

/// Daily source emitting one row per identifier per trading day.
fn source(
    name: &str,
    prefix: &str,
    identifiers: &'static [&'static str],
    calls: Arc<AtomicUsize>,
) -> Box<dyn Reader> {
    Box::new(
        DailySourceReader::new(
            name,
            move |date: NaiveDate| -> Result<Table, FetchError> {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(identifiers
                    .iter()
                    .enumerate()
                    .map(|(i, id)| Row::new(*id, date, 100.0 * (i + 1) as f64))
                    .collect())
            },
            calendar(),
        )
        .with_column_prefix(prefix),
    )
}

fn indices(calls: Arc<AtomicUsize>) -> Box<dyn Reader> {
    source("nse_indices", "index-", &["NIFTY 50"], calls)
}

/// Upstream that rejects any request starting before `broken_before`.
struct Flaky {
    broken_before: NaiveDate,
    calls: Arc<AtomicUsize>,
}

impl Reader for Flaky {
    fn name(&self) -> &str {
        "flaky"
    }

    fn has_data(&self, _criteria: &DateCriteria) -> AvailabilityReport {
        AvailabilityReport::unknown()
    }

    fn read(&mut self, criteria: &DateCriteria) -> Result<Table, ReaderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let Some(bounds) = criteria.bounds() else {
            return Ok(Table::new());
        };
        if bounds.from_date() < self.broken_before {
            return Err(ReaderError::Csv("upstream unavailable".into()));
        }
        Ok(WeekdayCalendar::new()
            .trading_days(bounds.from_date(), bounds.to_date())
            .into_iter()
            .map(|date| Row::new("NIFTY 50", date, 100.0))
            .collect())
    }

    fn set_filter(&mut self, _filter: Option<RowFilter>) {}
}

// ── Availability scenarios ───────────────────────────────────────────

#[test]
fn year_boundary_gap_coalesces_to_complete() {
    let known = [r(d(2019, 1, 1), d(2019, 12, 29)), r(d(2020, 1, 2), d(2020, 7, 31))];
    let report = resolve(
        &known,
        &r(d(2020, 1, 1), d(2020, 7, 31)),
        &WeekdayCalendar::new(),
        CoalescePolicy::default(),
    );
    assert_eq!(report.status, AvailabilityStatus::Complete);
    assert!(report.missing.is_empty());
}

#[test]
fn missing_middle_year_is_partial() {
    let known = [r(d(2019, 1, 1), d(2019, 12, 31)), r(d(2021, 1, 1), d(2021, 12, 31))];
    let report = resolve(
        &known,
        &r(d(2019, 1, 1), d(2021, 12, 31)),
        &WeekdayCalendar::new(),
        CoalescePolicy::default(),
    );
    assert_eq!(report.status, AvailabilityStatus::Partial);
    assert_eq!(report.missing, vec![r(d(2020, 1, 1), d(2020, 12, 31))]);
}

#[test]
fn nothing_known_is_none_with_whole_request_missing() {
    let requested = r(d(2024, 3, 4), d(2024, 3, 29));
    let report = resolve(
        &[],
        &requested,
        &WeekdayCalendar::new(),
        CoalescePolicy::default(),
    );
    assert_eq!(report.status, AvailabilityStatus::None);
    assert!(report.covered.is_empty());
    assert_eq!(report.missing, vec![requested]);
}

#[test]
fn partial_reads_reconcile_in_either_order() {
    let early = DateCriteria::range(d(2019, 1, 1), d(2019, 3, 1)).unwrap();
    let late = DateCriteria::range(d(2019, 3, 1), d(2019, 3, 15)).unwrap();

    for order in [[&late, &early], [&early, &late]] {
        let mut reader =
            MemoryCachedReader::in_memory(indices(Arc::new(AtomicUsize::new(0))), calendar());
        for criteria in order {
            reader.read(criteria).unwrap();
        }
        assert_eq!(reader.known_ranges(), &[r(d(2019, 1, 1), d(2019, 3, 15))]);
    }
}

// ── Memory cache ─────────────────────────────────────────────────────

#[test]
fn widening_a_cached_read_fetches_only_the_gap() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut reader = MemoryCachedReader::in_memory(indices(calls.clone()), calendar());

    reader
        .read(&DateCriteria::range(d(2024, 1, 8), d(2024, 1, 12)).unwrap())
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 5);

    let january = DateCriteria::range(d(2024, 1, 1), d(2024, 1, 31)).unwrap();
    let report = reader.has_data(&january);
    assert_eq!(report.status, AvailabilityStatus::Partial);
    assert_eq!(report.covered, vec![r(d(2024, 1, 8), d(2024, 1, 12))]);

    let rows = reader.read(&january).unwrap();
    assert_eq!(rows.len(), 23);
    assert_eq!(calls.load(Ordering::SeqCst), 23);
    assert!(rows.rows.windows(2).all(|w| w[0].date < w[1].date));
    assert!(reader.has_data(&january).is_complete());
}

#[test]
fn failed_missing_range_does_not_sink_the_read() {
    let calls = Arc::new(AtomicUsize::new(0));
    let upstream = Flaky {
        broken_before: d(2024, 1, 10),
        calls: calls.clone(),
    };
    let mut reader = MemoryCachedReader::in_memory(Box::new(upstream), calendar());

    let middle = reader
        .read(&DateCriteria::range(d(2024, 1, 15), d(2024, 1, 19)).unwrap())
        .unwrap();
    assert_eq!(middle.len(), 5);

    let january = DateCriteria::range(d(2024, 1, 1), d(2024, 1, 31)).unwrap();
    let rows = reader.read(&january).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(rows.len(), 13);
    assert_eq!(rows.rows[0].date, d(2024, 1, 15));

    assert_eq!(reader.known_ranges(), &[r(d(2024, 1, 15), d(2024, 1, 31))]);
    let report = reader.has_data(&january);
    assert_eq!(report.status, AvailabilityStatus::Partial);
    assert_eq!(report.missing, vec![r(d(2024, 1, 1), d(2024, 1, 14))]);
}

#[test]
fn whole_request_failure_propagates_when_nothing_is_cached() {
    let upstream = Flaky {
        broken_before: d(2024, 1, 10),
        calls: Arc::new(AtomicUsize::new(0)),
    };
    let mut reader = MemoryCachedReader::in_memory(Box::new(upstream), calendar());
    let err = reader
        .read(&DateCriteria::range(d(2024, 1, 1), d(2024, 1, 31)).unwrap())
        .unwrap_err();
    assert!(matches!(err, ReaderError::Csv(_)));
    assert!(reader.known_ranges().is_empty());
}

// ── Daily source over a CSV archive ──────────────────────────────────

#[test]
fn daily_source_falls_back_to_archive_for_old_dates() {
    let archive = temp_path("archive").with_extension("csv");
    std::fs::write(
        &archive,
        "Identifier,Date,Open,High,Low,Close\n\
         NIFTY 50,27-12-2012,5860,5880,5830,5870\n\
         NIFTY 50,28-12-2012,5870,5910,5860,5908\n\
         NIFTY 50,31-12-2012,5910,5920,5890,5905\n",
    )
    .unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let live = DailySourceReader::new(
        "nse_indices",
        move |date: NaiveDate| -> Result<Table, FetchError> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Table::from_rows(vec![Row::new("NIFTY 50", date, 5950.0)]))
        },
        calendar(),
    )
    .with_availability(vec![r(d(2013, 1, 1), d(2013, 12, 31))]);
    let history = CsvFileReader::new(
        "nse_indices_archive",
        &archive,
        ColumnMapping::new().with_date_format("%d-%m-%Y"),
        calendar(),
    )
    .with_availability(vec![r(d(1990, 7, 3), d(2012, 12, 31))]);

    let mut reader = ChainedReader::new(live, history);
    assert_eq!(reader.name(), "nse_indices");

    let criteria = DateCriteria::range(d(2012, 12, 27), d(2013, 1, 4)).unwrap();
    assert_eq!(reader.has_data(&criteria).status, AvailabilityStatus::Partial);

    let rows = reader.read(&criteria).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert_eq!(rows.len(), 7);
    assert_eq!(rows.rows[0].date, d(2012, 12, 27));
    assert_eq!(rows.rows[0].close, 5870.0);
    assert_eq!(rows.rows[6].date, d(2013, 1, 4));

    let _ = std::fs::remove_file(&archive);
}

// ── Parquet cache ────────────────────────────────────────────────────

#[test]
fn parquet_cache_survives_reopen() {
    let cache_dir = temp_path("parquet");
    let _ = std::fs::remove_dir_all(&cache_dir);
    let january = DateCriteria::range(d(2024, 1, 1), d(2024, 1, 31)).unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let first = {
        let mut reader = ParquetCachedReader::on_disk(
            &cache_dir,
            indices(calls.clone()),
            calendar(),
            CoalescePolicy::default(),
        )
        .unwrap();
        reader.read(&january).unwrap()
    };
    assert_eq!(first.len(), 23);
    assert_eq!(calls.load(Ordering::SeqCst), 23);

    let calls_after_reopen = Arc::new(AtomicUsize::new(0));
    let mut reopened = ParquetCachedReader::on_disk(
        &cache_dir,
        indices(calls_after_reopen.clone()),
        calendar(),
        CoalescePolicy::default(),
    )
    .unwrap();
    assert!(reopened.has_data(&january).is_complete());

    let second = reopened.read(&january).unwrap();
    assert_eq!(calls_after_reopen.load(Ordering::SeqCst), 0);
    assert_eq!(second.distinct_dates(), first.distinct_dates());

    let status = ParquetStore::status(&cache_dir).unwrap();
    assert_eq!(status.len(), 1);
    assert_eq!(status[0].reader, "nse_indices");
    assert_eq!(status[0].row_count, 23);
    assert_eq!(status[0].ranges, vec![r(d(2024, 1, 1), d(2024, 1, 31))]);

    let _ = std::fs::remove_dir_all(&cache_dir);
}

// ── Composite readers ────────────────────────────────────────────────

#[test]
fn composite_prefixes_single_identifier_side_and_joins_on_date() {
    let index_calls = Arc::new(AtomicUsize::new(0));
    let vix_calls = Arc::new(AtomicUsize::new(0));
    let left = MemoryCachedReader::in_memory(
        source(
            "nse_indices",
            "index-",
            &["NIFTY 50", "NIFTY BANK"],
            index_calls.clone(),
        ),
        calendar(),
    );
    let right = MemoryCachedReader::in_memory(
        source("india_vix", "index-", &["INDIA VIX"], vix_calls.clone()),
        calendar(),
    );

    let mut reader = spread(left, right);
    assert_eq!(reader.name(), "nse_indices-india_vix");

    let criteria = DateCriteria::range(d(2024, 1, 2), d(2024, 1, 5)).unwrap();
    let rows = reader.read(&criteria).unwrap();

    // 4 trading days x 2 left identifiers, one VIX row per date each
    assert_eq!(rows.len(), 8);
    let first = &rows.rows[0];
    assert!(first.identifier.ends_with(" - INDIA VIX"));
    assert_eq!(first.extra.get("INDIA VIX-Close"), Some(&Field::Number(100.0)));
    assert!(first.extra.contains_key("index-Close"));
    assert!(first.extra.contains_key("index-Identifier"));
    assert!(first.volume.is_nan());

    reader.read(&criteria).unwrap();
    assert_eq!(index_calls.load(Ordering::SeqCst), 4);
    assert_eq!(vix_calls.load(Ordering::SeqCst), 4);
}
