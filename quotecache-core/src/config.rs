//! TOML configuration.
//!
//! ```toml
//! [calendar]
//! holidays = ["2024-01-26", "2024-03-08"]
//!
//! [coalesce]
//! max_gap_days = 4
//!
//! [fetch]
//! timeout_secs = 5
//! user_agent = "quotecache/0.1"
//!
//! [cache]
//! dir = "data"
//! ```
//!
//! Every section is optional.

use crate::availability::CoalescePolicy;
use crate::calendar::WeekdayCalendar;
use crate::reader::ReaderError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuoteCacheConfig {
    pub calendar: CalendarConfig,
    pub coalesce: CoalescePolicy,
    pub fetch: FetchSettings,
    pub cache: CacheSettings,
}

/// Exchange holidays on top of weekends.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalendarConfig {
    pub holidays: Vec<NaiveDate>,
}

impl CalendarConfig {
    pub fn build(&self) -> WeekdayCalendar {
        WeekdayCalendar::with_holidays(self.holidays.iter().copied())
    }
}

/// Settings for the HTTP day fetcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchSettings {
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 5,
            user_agent: concat!("quotecache/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub dir: PathBuf,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self { dir: "data".into() }
    }
}

impl QuoteCacheConfig {
    /// Load a config from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ReaderError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ReaderError::Config(format!("read {}: {e}", path.display())))?;
        Self::from_toml(&content)
    }

    /// Parse a config from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ReaderError> {
        toml::from_str(content).map_err(|e| ReaderError::Config(format!("parse config TOML: {e}")))
    }

    pub fn to_toml(&self) -> Result<String, ReaderError> {
        toml::to_string_pretty(self)
            .map_err(|e| ReaderError::Config(format!("serialize config TOML: {e}")))
    }
}
