// src/fetch/mod.rs
//
// The remote sheet source: a thin Google Sheets v4 API client that
// returns raw string grids, the error taxonomy the rest of the pipeline
// keys off (transient vs fatal vs tolerable), the non-data-sheet
// denylist, and the Config-sheet aggregation list.

pub mod grid;
pub mod retry;

pub use grid::RawGrid;
pub use retry::{with_backoff, BACKOFF_SCHEDULE};

use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

/// Sheets that never hold per-entity data, matched case-insensitively
/// against trimmed sheet titles.
pub const SHEET_DENYLIST: &[&str] = &["config", "config!", "readme", "financial", "kpi", "test"];

/// The auxiliary configuration sheet and its aggregation column.
pub const CONFIG_SHEET: &str = "Config";
pub const TOTALS_CONFIG_COLUMN: &str = "Totals_KPIs";

const API_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";

#[derive(Debug)]
pub enum FetchError {
    /// Rate-limit/quota signal from the API; the only retryable case.
    RateLimited,
    /// Missing or invalid credentials (HTTP 401/403). Not recoverable.
    Auth(u16),
    /// Any other non-2xx response.
    Http(u16),
    /// Transport-level failure (DNS, TLS, unreachable source).
    Network(String),
    /// The response body could not be deserialized.
    Decode(String),
    /// The backoff schedule ran out while the source kept rate limiting.
    RetriesExhausted,
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::RateLimited)
    }
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchError::RateLimited => write!(f, "rate limited by the sheet source"),
            FetchError::Auth(code) => write!(f, "authentication rejected (HTTP {})", code),
            FetchError::Http(code) => write!(f, "HTTP error {}", code),
            FetchError::Network(msg) => write!(f, "network error: {}", msg),
            FetchError::Decode(msg) => write!(f, "decode error: {}", msg),
            FetchError::RetriesExhausted => write!(f, "backoff retries exhausted"),
        }
    }
}

impl std::error::Error for FetchError {}

#[derive(Debug, Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Debug, Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
struct SheetProperties {
    title: String,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

/// Read-only client for one spreadsheet. Holds no mutable state; safe
/// to share across concurrent per-entity fetches.
pub struct SheetsClient {
    http: Client,
    spreadsheet_id: String,
    api_key: String,
}

impl SheetsClient {
    pub fn new(spreadsheet_id: impl Into<String>, api_key: impl Into<String>) -> Self {
        SheetsClient {
            http: Client::new(),
            spreadsheet_id: spreadsheet_id.into(),
            api_key: api_key.into(),
        }
    }

    fn endpoint(&self, suffix: &str, params: &[(&str, &str)]) -> Result<Url, FetchError> {
        let raw = format!("{}/{}{}", API_BASE, self.spreadsheet_id, suffix);
        let mut url = Url::parse(&raw).map_err(|e| FetchError::Decode(e.to_string()))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("key", &self.api_key);
            for (k, v) in params {
                query.append_pair(k, v);
            }
        }
        Ok(url)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: Url) -> Result<T, FetchError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        match status {
            429 => Err(FetchError::RateLimited),
            401 | 403 => Err(FetchError::Auth(status)),
            s if !(200..300).contains(&s) => Err(FetchError::Http(s)),
            _ => response
                .json::<T>()
                .await
                .map_err(|e| FetchError::Decode(e.to_string())),
        }
    }

    async fn get_json_with_backoff<T: serde::de::DeserializeOwned>(
        &self,
        url: Url,
    ) -> Result<T, FetchError> {
        with_backoff(
            &BACKOFF_SCHEDULE,
            FetchError::is_transient,
            || FetchError::RetriesExhausted,
            || self.get_json::<T>(url.clone()),
        )
        .await
    }

    /// Every sheet title in the spreadsheet, in tab order.
    pub async fn sheet_titles(&self) -> Result<Vec<String>, FetchError> {
        let url = self.endpoint("", &[("fields", "sheets.properties.title")])?;
        let meta: SpreadsheetMeta = self.get_json_with_backoff(url).await?;
        Ok(meta.sheets.into_iter().map(|s| s.properties.title).collect())
    }

    /// Sheet titles with the non-data sheets filtered out.
    pub async fn entity_sheets(&self) -> Result<Vec<String>, FetchError> {
        Ok(filter_data_sheets(self.sheet_titles().await?))
    }

    /// The raw grid of one sheet, cells rendered as the user sees them.
    pub async fn grid(&self, sheet: &str) -> Result<RawGrid, FetchError> {
        let suffix = format!("/values/{}", sheet.trim());
        let url = self.endpoint(&suffix, &[("valueRenderOption", "FORMATTED_VALUE")])?;
        let range: ValueRange = self.get_json_with_backoff(url).await?;
        Ok(range
            .values
            .into_iter()
            .map(|row| row.iter().map(cell_to_string).collect())
            .collect())
    }

    /// Indicator names listed in the Config sheet's `Totals_KPIs` column.
    /// A missing Config sheet or column is tolerable and yields an empty
    /// list; fatal errors still propagate.
    pub async fn totals_kpis(&self) -> Result<Vec<String>, FetchError> {
        match self.grid(CONFIG_SHEET).await {
            Ok(grid) => Ok(parse_totals_column(&grid)),
            Err(FetchError::Http(code)) => {
                debug!(code, "no Config sheet, defaulting every indicator to average");
                Ok(Vec::new())
            }
            Err(err) => Err(err),
        }
    }
}

/// Drop conventionally non-data sheets (config, readme, ...) from a
/// title list, preserving order.
pub fn filter_data_sheets(titles: Vec<String>) -> Vec<String> {
    titles
        .into_iter()
        .filter(|t| {
            let name = t.trim().to_lowercase();
            let denied = SHEET_DENYLIST.contains(&name.as_str());
            if denied {
                debug!(sheet = %t, "skipping non-data sheet");
            }
            !denied
        })
        .collect()
}

/// Extract the `Totals_KPIs` column from a Config-sheet grid: the first
/// row is the header, and every non-blank cell below the matching
/// header is an indicator name.
pub fn parse_totals_column(grid: &[Vec<String>]) -> Vec<String> {
    let Some(header) = grid.first() else {
        return Vec::new();
    };
    let Some(col) = header.iter().position(|h| h.trim() == TOTALS_CONFIG_COLUMN) else {
        warn!(column = TOTALS_CONFIG_COLUMN, "Config sheet has no aggregation column");
        return Vec::new();
    };
    grid[1..]
        .iter()
        .filter_map(|row| row.get(col))
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect()
}

fn cell_to_string(cell: &Value) -> String {
    match cell {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
