//! HTTP single-day fetcher for date-stamped archive files.

use super::{ColumnMapping, DayFetcher, FetchError};
use crate::config::FetchSettings;
use crate::domain::Table;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// URL with date placeholders.
///
/// Supported placeholders: `{year}`, `{month}` (`JAN`), `{day}` (`05`),
/// `{ddmmyyyy}` (`05012024`), `{ddMONyyyy}` (`05JAN2024`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UrlTemplate(String);

impl UrlTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self(template.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn render(&self, date: NaiveDate) -> String {
        let month = date.format("%b").to_string().to_uppercase();
        self.0
            .replace("{ddMONyyyy}", &date.format("%d%b%Y").to_string().to_uppercase())
            .replace("{ddmmyyyy}", &date.format("%d%m%Y").to_string())
            .replace("{year}", &date.format("%Y").to_string())
            .replace("{month}", &month)
            .replace("{day}", &date.format("%d").to_string())
    }
}

/// Downloads one CSV file per day and maps it to rows.
pub struct HttpDayFetcher {
    client: reqwest::blocking::Client,
    url: UrlTemplate,
    mapping: ColumnMapping,
}

impl HttpDayFetcher {
    pub fn new(
        url: UrlTemplate,
        mapping: ColumnMapping,
        settings: &FetchSettings,
    ) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .user_agent(settings.user_agent.clone())
            .build()
            .map_err(|e| FetchError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            url,
            mapping,
        })
    }

    pub fn url_template(&self) -> &UrlTemplate {
        &self.url
    }
}

impl DayFetcher for HttpDayFetcher {
    fn fetch_one_day(&self, date: NaiveDate) -> Result<Table, FetchError> {
        let url = self.url.render(date);
        debug!(%date, %url, "downloading day file");

        let resp = self
            .client
            .get(&url)
            .send()
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound { date });
        }
        if !status.is_success() {
            return Err(FetchError::Http {
                status: status.as_u16(),
                url,
            });
        }

        let body = resp
            .bytes()
            .map_err(|e| FetchError::Network(e.to_string()))?;
        self.mapping.parse_csv(body.as_ref(), Some(date))
    }
}
