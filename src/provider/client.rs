// =============================================================================
// Financial Modeling Prep client — intraday historical bars
// =============================================================================
//
// SECURITY: the API key travels only as the `apikey` query parameter. It is
// never logged, never serialised, and stripped from transport errors (which
// would otherwise echo the full request URL).
//
// Endpoint:
//   GET {base_url}/api/v3/historical-chart/{interval}/{symbol}?apikey=...
//   -> [{ "date": "YYYY-MM-DD HH:MM:SS", open, high, low, close, volume }]
//      newest first
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::market_data::{Bar, PriceSeries};
use crate::provider::rate_limit::RateLimiter;
use crate::runtime_config::ProviderConfig;

/// Intervals the historical-chart endpoint accepts.
pub const SUPPORTED_INTERVALS: [&str; 6] = ["1min", "5min", "15min", "30min", "1hour", "4hour"];

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("no provider API key configured (set FMP_KEY)")]
    MissingApiKey,
    #[error("invalid symbol '{0}'")]
    InvalidSymbol(String),
    #[error("unsupported interval '{0}'")]
    UnsupportedInterval(String),
    #[error("http transport error: {0}")]
    Http(#[source] reqwest::Error),
    #[error("provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("provider error: {0}")]
    Api(String),
    #[error("malformed provider response: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e.without_url())
    }
}

/// One row of the historical-chart payload.
#[derive(Debug, Clone, Deserialize)]
pub struct ChartRow {
    pub date: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: f64,
}

/// Rate-limited FMP REST client.
#[derive(Clone)]
pub struct FmpClient {
    api_key: String,
    base_url: String,
    default_interval: String,
    client: reqwest::Client,
    limiter: Arc<RateLimiter>,
}

impl FmpClient {
    // -------------------------------------------------------------------------
    // Construction
    // -------------------------------------------------------------------------

    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        if !config.has_api_key() {
            return Err(ProviderError::MissingApiKey);
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()?;

        debug!(base_url = %config.base_url, rate_limit = config.rate_limit_per_minute, "FmpClient initialised");

        Ok(Self {
            api_key: config.api_key.trim().to_string(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            default_interval: config.default_interval.clone(),
            client,
            limiter: Arc::new(RateLimiter::new(config.rate_limit_per_minute)),
        })
    }

    pub fn default_interval(&self) -> &str {
        &self.default_interval
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    // -------------------------------------------------------------------------
    // Historical chart
    // -------------------------------------------------------------------------

    /// Fetch intraday bars for `symbol`, oldest first.
    #[instrument(skip(self), name = "fmp::historical_chart")]
    pub async fn historical_chart(&self, symbol: &str, interval: Option<&str>) -> Result<PriceSeries, ProviderError> {
        let symbol = normalize_symbol(symbol)?;
        let interval = interval.unwrap_or(self.default_interval.as_str());
        if !SUPPORTED_INTERVALS.contains(&interval) {
            return Err(ProviderError::UnsupportedInterval(interval.to_string()));
        }

        self.limiter.acquire().await;

        let url = format!("{}/api/v3/historical-chart/{}/{}", self.base_url, interval, symbol);
        let resp = self
            .client
            .get(&url)
            .query(&[("apikey", self.api_key.as_str())])
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body: truncate(&body, 200),
            });
        }

        let rows = parse_chart_body(&body)?;
        let series = rows_to_series(rows);
        debug!(symbol = %symbol, interval, bars = series.len(), "historical chart fetched");
        Ok(series)
    }
}

impl std::fmt::Debug for FmpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FmpClient")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("default_interval", &self.default_interval)
            .field("limiter", &self.limiter)
            .finish()
    }
}

// =============================================================================
// Parsing helpers
// =============================================================================

/// Upper-case and validate a ticker (letters, digits, `.`, `-`, `^`).
pub fn normalize_symbol(symbol: &str) -> Result<String, ProviderError> {
    let s = symbol.trim().to_uppercase();
    let valid = !s.is_empty()
        && s.len() <= 15
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '^'));
    if valid {
        Ok(s)
    } else {
        Err(ProviderError::InvalidSymbol(symbol.to_string()))
    }
}

/// Decode the endpoint body. FMP reports some failures as a 200 with an
/// `{"Error Message": ...}` object.
pub fn parse_chart_body(body: &str) -> Result<Vec<ChartRow>, ProviderError> {
    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| ProviderError::Parse(e.to_string()))?;

    if let Some(msg) = value
        .get("Error Message")
        .or_else(|| value.get("error"))
        .and_then(|m| m.as_str())
    {
        return Err(ProviderError::Api(msg.to_string()));
    }
    if !value.is_array() {
        return Err(ProviderError::Parse("expected a JSON array of bars".into()));
    }

    serde_json::from_value(value).map_err(|e| ProviderError::Parse(e.to_string()))
}

/// Convert rows to a series, dropping rows with unreadable dates or invalid
/// prices. Rows arrive newest first; the series is chronological.
pub fn rows_to_series(rows: Vec<ChartRow>) -> PriceSeries {
    let total = rows.len();
    let bars: Vec<Bar> = rows
        .into_iter()
        .filter_map(|row| {
            let Some(timestamp) = parse_timestamp_ms(&row.date) else {
                warn!(date = %row.date, "skipping row with unreadable date");
                return None;
            };
            Some(Bar {
                timestamp,
                open: row.open,
                high: row.high,
                low: row.low,
                close: row.close,
                volume: row.volume,
            })
        })
        .collect();

    if bars.len() < total {
        debug!(total, parsed = bars.len(), "some chart rows were skipped");
    }
    PriceSeries::sanitized(bars)
}

/// Milliseconds since the epoch, reading the naive timestamp as UTC.
pub fn parse_timestamp_ms(date: &str) -> Option<i64> {
    let date = date.trim();
    NaiveDateTime::parse_from_str(date, DATETIME_FORMAT)
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(date, DATE_FORMAT)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .map(|dt| dt.and_utc().timestamp_millis())
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}
