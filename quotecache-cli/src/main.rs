//! quotecache CLI: availability checks, cached reads and composite reads.
//!
//! Commands:
//! - `availability`: resolve a request against a list of known ranges
//! - `read`: read rows from an HTTP daily source through the parquet cache
//! - `combine`: read two sources and combine their prices with an operator
//! - `cache status`: report cached readers, date ranges and row counts
//!
//! Rows are printed to stdout as JSON lines; logs go to stderr and are
//! controlled with `RUST_LOG`.

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use quotecache_core::availability::resolve_criteria;
use quotecache_core::calendar::MarketCalendar;
use quotecache_core::domain::{DateCriteria, DateRange, Table};
use quotecache_core::fetch::{ColumnMapping, HttpDayFetcher, UrlTemplate};
use quotecache_core::reader::{
    combine, BinaryOp, ChainedReader, CsvFileReader, DailySourceReader, ParquetCachedReader,
    ParquetStore, Reader,
};
use quotecache_core::{QuoteCacheConfig, RowFilter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(
    name = "quotecache",
    about = "quotecache CLI: range-aware cached readers for daily market data"
)]
struct Cli {
    /// Path to a TOML config file. Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a request against known ranges and print the report as JSON.
    Availability {
        #[command(flatten)]
        criteria: CriteriaArgs,

        /// Known range as FROM..TO (YYYY-MM-DD..YYYY-MM-DD). Repeatable.
        #[arg(long = "known", value_parser = parse_range)]
        known: Vec<DateRange>,
    },
    /// Read rows from a daily source, caching them as Parquet.
    Read {
        /// Source as NAME=URL_TEMPLATE, e.g. nse_indices=https://host/ind_close_all_{ddmmyyyy}.csv
        #[arg(long, value_parser = parse_source)]
        source: SourceSpec,

        #[command(flatten)]
        criteria: CriteriaArgs,

        #[command(flatten)]
        mapping: MappingArgs,

        #[command(flatten)]
        output: OutputArgs,

        /// CSV archive serving dates up to --archive-until.
        #[arg(long, requires = "archive_until")]
        archive: Option<PathBuf>,

        /// Last date served by the archive; the daily source covers later dates.
        #[arg(long)]
        archive_until: Option<NaiveDate>,

        /// Date format of the archive file.
        #[arg(long, default_value = "%Y-%m-%d")]
        archive_date_format: String,
    },
    /// Read two sources and combine them with an operator.
    Combine {
        /// Left source as NAME=URL_TEMPLATE.
        #[arg(long, value_parser = parse_source)]
        left: SourceSpec,

        /// Right source as NAME=URL_TEMPLATE.
        #[arg(long, value_parser = parse_source)]
        right: SourceSpec,

        /// Operator applied to Open/High/Low/Close.
        #[arg(long, value_enum, default_value_t = OpArg::Div)]
        op: OpArg,

        #[command(flatten)]
        criteria: CriteriaArgs,

        #[command(flatten)]
        mapping: MappingArgs,

        #[command(flatten)]
        output: OutputArgs,
    },
    /// Cache management commands.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Report cached readers, date ranges and row counts.
    Status {
        /// Cache directory. Defaults to the config's cache dir.
        #[arg(long)]
        cache_dir: Option<PathBuf>,
    },
}

#[derive(Args)]
struct CriteriaArgs {
    /// Start date (YYYY-MM-DD).
    #[arg(long, requires = "to", conflicts_with = "on")]
    from: Option<NaiveDate>,

    /// End date (YYYY-MM-DD).
    #[arg(long, requires = "from")]
    to: Option<NaiveDate>,

    /// Specific date(s) instead of a range. Repeatable.
    #[arg(long)]
    on: Vec<NaiveDate>,
}

impl CriteriaArgs {
    fn build(&self) -> Result<DateCriteria> {
        match (self.from, self.to, self.on.as_slice()) {
            (Some(from), Some(to), []) => Ok(DateCriteria::range(from, to)?),
            (None, None, [date]) => Ok(DateCriteria::ForDate(*date)),
            (None, None, []) => bail!("one of --from/--to or --on is required"),
            (None, None, dates) => Ok(DateCriteria::MultiDates(dates.to_vec())),
            _ => bail!("--from/--to and --on are mutually exclusive"),
        }
    }
}

#[derive(Args)]
struct MappingArgs {
    /// Date format of the upstream Date column.
    #[arg(long, default_value = "%Y-%m-%d")]
    date_format: String,

    /// Identifier used when the upstream file has no identifier column.
    #[arg(long)]
    default_identifier: Option<String>,

    /// Column rename as UPSTREAM=CANONICAL, e.g. "Index Name=Identifier". Repeatable.
    #[arg(long = "rename")]
    renames: Vec<String>,

    /// Keep only rows whose raw field matches, as COLUMN=VALUE. Repeatable.
    #[arg(long = "keep")]
    keep: Vec<String>,
}

impl MappingArgs {
    fn build(&self) -> Result<ColumnMapping> {
        let mut mapping = ColumnMapping::new().with_date_format(&self.date_format);
        if let Some(id) = &self.default_identifier {
            mapping = mapping.with_default_identifier(id);
        }
        for rename in &self.renames {
            let (from, to) = split_pair(rename, "--rename")?;
            mapping = mapping.rename(from, to);
        }
        for keep in &self.keep {
            let (column, value) = split_pair(keep, "--keep")?;
            mapping = mapping.keep_rows_where(column, value);
        }
        Ok(mapping)
    }
}

#[derive(Args)]
struct OutputArgs {
    /// Only print rows for these identifiers. Repeatable.
    #[arg(long = "identifier")]
    identifiers: Vec<String>,

    /// Cache directory. Defaults to the config's cache dir.
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Read straight from the source without the parquet cache.
    #[arg(long, default_value_t = false)]
    no_cache: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum OpArg {
    Add,
    Sub,
    Mul,
    Div,
}

impl From<OpArg> for BinaryOp {
    fn from(op: OpArg) -> Self {
        match op {
            OpArg::Add => BinaryOp::Add,
            OpArg::Sub => BinaryOp::Sub,
            OpArg::Mul => BinaryOp::Mul,
            OpArg::Div => BinaryOp::Div,
        }
    }
}

#[derive(Clone)]
struct SourceSpec {
    name: String,
    url: String,
}

fn parse_source(s: &str) -> Result<SourceSpec, String> {
    let (name, url) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=URL_TEMPLATE, got '{s}'"))?;
    if name.is_empty() || url.is_empty() {
        return Err(format!("expected NAME=URL_TEMPLATE, got '{s}'"));
    }
    Ok(SourceSpec {
        name: name.to_string(),
        url: url.to_string(),
    })
}

fn parse_range(s: &str) -> Result<DateRange, String> {
    let (from, to) = s
        .split_once("..")
        .ok_or_else(|| format!("expected FROM..TO, got '{s}'"))?;
    let parse = |v: &str| {
        NaiveDate::parse_from_str(v.trim(), "%Y-%m-%d").map_err(|e| format!("bad date '{v}': {e}"))
    };
    DateRange::new(parse(from)?, parse(to)?).map_err(|e| e.to_string())
}

fn split_pair<'a>(s: &'a str, flag: &str) -> Result<(&'a str, &'a str)> {
    s.split_once('=')
        .with_context(|| format!("{flag} expects KEY=VALUE, got '{s}'"))
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("quotecache_core=info")),
        )
        .init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => QuoteCacheConfig::from_file(path)?,
        None => QuoteCacheConfig::default(),
    };
    let calendar: Arc<dyn MarketCalendar> = Arc::new(config.calendar.build());

    match cli.command {
        Commands::Availability { criteria, known } => {
            run_availability(&config, calendar.as_ref(), &criteria, &known)
        }
        Commands::Read {
            source,
            criteria,
            mapping,
            output,
            archive,
            archive_until,
            archive_date_format,
        } => {
            let archive = match (archive, archive_until) {
                (Some(path), Some(until)) => Some((path, until, archive_date_format)),
                _ => None,
            };
            run_read(&config, calendar, &source, &criteria, &mapping, &output, archive)
        }
        Commands::Combine {
            left,
            right,
            op,
            criteria,
            mapping,
            output,
        } => run_combine(&config, calendar, &left, &right, op, &criteria, &mapping, &output),
        Commands::Cache { action } => match action {
            CacheAction::Status { cache_dir } => {
                run_cache_status(cache_dir.as_deref().unwrap_or(&config.cache.dir))
            }
        },
    }
}

fn run_availability(
    config: &QuoteCacheConfig,
    calendar: &dyn MarketCalendar,
    criteria: &CriteriaArgs,
    known: &[DateRange],
) -> Result<()> {
    let criteria = criteria.build()?;
    let report = resolve_criteria(known, &criteria, calendar, config.coalesce);
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn build_source(
    config: &QuoteCacheConfig,
    calendar: &Arc<dyn MarketCalendar>,
    source: &SourceSpec,
    mapping: &MappingArgs,
) -> Result<DailySourceReader<HttpDayFetcher>> {
    let fetcher = HttpDayFetcher::new(
        UrlTemplate::new(&source.url),
        mapping.build()?,
        &config.fetch,
    )?;
    Ok(DailySourceReader::new(&source.name, fetcher, calendar.clone()).with_policy(config.coalesce))
}

/// Wrap `reader` in the parquet cache unless disabled.
fn with_cache(
    config: &QuoteCacheConfig,
    calendar: &Arc<dyn MarketCalendar>,
    reader: Box<dyn Reader>,
    output: &OutputArgs,
) -> Result<Box<dyn Reader>> {
    if output.no_cache {
        return Ok(reader);
    }
    let cache_dir = output.cache_dir.as_deref().unwrap_or(&config.cache.dir);
    let cached =
        ParquetCachedReader::on_disk(cache_dir, reader, calendar.clone(), config.coalesce)?;
    info!(reader = cached.name(), known = cached.known_ranges().len(), "cache ready");
    Ok(Box::new(cached))
}

fn apply_output_filter(reader: &mut dyn Reader, output: &OutputArgs) {
    if !output.identifiers.is_empty() {
        reader.set_filter(Some(RowFilter::identifiers(output.identifiers.iter().cloned())));
    }
}

fn run_read(
    config: &QuoteCacheConfig,
    calendar: Arc<dyn MarketCalendar>,
    source: &SourceSpec,
    criteria: &CriteriaArgs,
    mapping: &MappingArgs,
    output: &OutputArgs,
    archive: Option<(PathBuf, NaiveDate, String)>,
) -> Result<()> {
    let criteria = criteria.build()?;
    let live = build_source(config, &calendar, source, mapping)?;

    let reader: Box<dyn Reader> = match archive {
        Some((path, until, date_format)) => {
            let Some(live_from) = until.succ_opt() else {
                bail!("--archive-until {until} leaves no dates for the live source");
            };
            let today = chrono::Local::now().date_naive();
            let live_to = today.max(live_from);
            let history = CsvFileReader::new(
                format!("{}_archive", source.name),
                path,
                mapping.build()?.with_date_format(date_format),
                calendar.clone(),
            )
            .with_availability(vec![DateRange::new(NaiveDate::MIN, until)?]);
            let live = live.with_availability(vec![DateRange::new(live_from, live_to)?]);
            Box::new(ChainedReader::new(live, history))
        }
        None => Box::new(live),
    };

    let mut reader = with_cache(config, &calendar, reader, output)?;
    apply_output_filter(reader.as_mut(), output);

    let report = reader.has_data(&criteria);
    info!(reader = reader.name(), %criteria, status = ?report.status, "reading");
    let rows = reader.read(&criteria)?;
    print_rows(&rows)
}

#[allow(clippy::too_many_arguments)]
fn run_combine(
    config: &QuoteCacheConfig,
    calendar: Arc<dyn MarketCalendar>,
    left: &SourceSpec,
    right: &SourceSpec,
    op: OpArg,
    criteria: &CriteriaArgs,
    mapping: &MappingArgs,
    output: &OutputArgs,
) -> Result<()> {
    let criteria = criteria.build()?;
    let left = with_cache(
        config,
        &calendar,
        Box::new(build_source(config, &calendar, left, mapping)?),
        output,
    )?;
    let right = with_cache(
        config,
        &calendar,
        Box::new(build_source(config, &calendar, right, mapping)?),
        output,
    )?;

    let mut reader = combine(left, right, op.into());
    apply_output_filter(&mut reader, output);
    let rows = reader.read(&criteria)?;
    info!(reader = reader.name(), rows = rows.len(), "combined");
    print_rows(&rows)
}

fn run_cache_status(cache_dir: &Path) -> Result<()> {
    let metas = ParquetStore::status(cache_dir)?;
    if metas.is_empty() {
        println!("Cache is empty: {}", cache_dir.display());
        return Ok(());
    }

    println!("Cache: {}", cache_dir.display());
    println!("Readers: {}", metas.len());
    println!();
    println!(
        "{:<24} {:<25} {:>8} {:>7}  {}",
        "Reader", "Date Range", "Rows", "Ranges", "Cached At"
    );
    println!("{}", "-".repeat(90));
    for meta in &metas {
        println!(
            "{:<24} {:<25} {:>8} {:>7}  {}",
            meta.reader,
            format!("{} to {}", meta.start_date, meta.end_date),
            meta.row_count,
            meta.ranges.len(),
            meta.cached_at.format("%Y-%m-%d %H:%M:%S"),
        );
    }
    Ok(())
}

fn print_rows(rows: &Table) -> Result<()> {
    for row in rows.iter() {
        println!("{}", serde_json::to_string(row)?);
    }
    Ok(())
}
