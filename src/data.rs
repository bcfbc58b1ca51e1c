//! History fetching
//!
//! Providers return OHLCV histories for a ticker, frequency and date range.
//! Two are available: the public Yahoo chart API over blocking HTTP, and a
//! directory of CSV files for offline runs.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration as StdDuration;
use tracing::{debug, info, warn};

use crate::error::ProviderError;
use crate::frequency::{DateRange, Frequency};
use crate::types::{Candle, HistorySeries, Ticker};

// =============================================================================
// Constants
// =============================================================================

pub const YAHOO_CHART_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Accepted names for the time column, in lookup order
const TIME_COLUMNS: &[&str] = &["datetime", "date", "timestamp", "time"];

// =============================================================================
// Provider interface
// =============================================================================

/// Market data source
pub trait HistoryProvider: Send + Sync {
    /// Rows for `ticker` at `frequency`. `range.start == None` asks for the
    /// maximum available history up to `range.end`.
    fn fetch_history(
        &self,
        ticker: &Ticker,
        frequency: Frequency,
        range: &DateRange,
    ) -> Result<HistorySeries, ProviderError>;
}

/// Fetch a history through `provider`. Errors propagate unchanged.
pub fn fetch(
    provider: &dyn HistoryProvider,
    ticker: &Ticker,
    frequency: Frequency,
    range: &DateRange,
) -> Result<HistorySeries, ProviderError> {
    debug!("Fetching {} at {} ({})", ticker, frequency, range);
    let series = provider.fetch_history(ticker, frequency, range)?;
    debug!("Fetched {} rows for {}", series.len(), ticker);
    Ok(series)
}

// =============================================================================
// Yahoo chart API
// =============================================================================

/// Blocking client for the Yahoo chart endpoint
pub struct YahooProvider {
    client: reqwest::blocking::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct YahooResponse {
    chart: ChartEnvelope,
}

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    result: Option<Vec<ChartData>>,
    error: Option<YahooError>,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<Quote>,
}

#[derive(Debug, Deserialize)]
struct Quote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct YahooError {
    code: String,
    description: String,
}

impl YahooProvider {
    pub fn new(
        base_url: impl Into<String>,
        timeout: StdDuration,
        user_agent: &str,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    /// Query string for a range: `range=max` for full history, else a start
    /// epoch. The end epoch is always sent.
    pub fn query_params(frequency: Frequency, range: &DateRange) -> Vec<(String, String)> {
        let mut params = vec![("interval".to_string(), frequency.as_str().to_string())];
        match range.start {
            None => params.push(("range".to_string(), "max".to_string())),
            Some(start) => params.push(("period1".to_string(), start.timestamp().to_string())),
        }
        params.push(("period2".to_string(), range.end.timestamp().to_string()));
        params
    }

    fn parse_chart(
        body: YahooResponse,
        ticker: &Ticker,
        frequency: Frequency,
    ) -> Result<HistorySeries, ProviderError> {
        if let Some(error) = body.chart.error {
            return Err(if error.code.eq_ignore_ascii_case("Not Found") {
                ProviderError::UnknownTicker(ticker.to_string())
            } else {
                ProviderError::Api(format!("{} - {}", error.code, error.description))
            });
        }

        let data = body
            .chart
            .result
            .and_then(|r| r.into_iter().next())
            .ok_or_else(|| ProviderError::NoData {
                ticker: ticker.to_string(),
                frequency,
            })?;

        // A valid symbol with no rows in range comes back without timestamps
        let timestamps = data.timestamp.unwrap_or_default();
        let quote = match data.indicators.quote.into_iter().next() {
            Some(q) => q,
            None if timestamps.is_empty() => return Ok(HistorySeries::default()),
            None => return Err(ProviderError::Parse("missing quote block".to_string())),
        };

        let mut dropped = 0usize;
        let mut candles = Vec::with_capacity(timestamps.len());
        for (i, ts) in timestamps.iter().enumerate() {
            let row = (
                DateTime::from_timestamp(*ts, 0),
                quote.open.get(i).copied().flatten(),
                quote.high.get(i).copied().flatten(),
                quote.low.get(i).copied().flatten(),
                quote.close.get(i).copied().flatten(),
                quote.volume.get(i).copied().flatten(),
            );
            match row {
                (Some(dt), Some(o), Some(h), Some(l), Some(c), Some(v)) => {
                    candles.push(Candle::new(dt, o, h, l, c, v))
                }
                _ => dropped += 1,
            }
        }

        if dropped > 0 {
            debug!("Dropped {} incomplete rows for {}", dropped, ticker);
        }

        Ok(HistorySeries::new(candles))
    }
}

impl HistoryProvider for YahooProvider {
    fn fetch_history(
        &self,
        ticker: &Ticker,
        frequency: Frequency,
        range: &DateRange,
    ) -> Result<HistorySeries, ProviderError> {
        let url = format!("{}/{}", self.base_url, ticker);
        let response = self
            .client
            .get(&url)
            .query(&Self::query_params(frequency, range))
            .send()?;

        match response.status() {
            reqwest::StatusCode::TOO_MANY_REQUESTS => return Err(ProviderError::RateLimited),
            reqwest::StatusCode::NOT_FOUND => {
                return Err(ProviderError::UnknownTicker(ticker.to_string()))
            }
            status if !status.is_success() && !status.is_client_error() => {
                return Err(ProviderError::Api(format!("API returned status: {}", status)))
            }
            _ => {}
        }

        let body: YahooResponse = response
            .json()
            .map_err(|e| ProviderError::Parse(e.to_string()))?;
        let series = Self::parse_chart(body, ticker, frequency)?;
        Ok(within(series, range))
    }
}

// =============================================================================
// CSV histories
// =============================================================================

/// Serves `{TICKER}_{frequency}.csv` files from a directory
#[derive(Debug, Clone)]
pub struct CsvProvider {
    data_dir: PathBuf,
}

impl CsvProvider {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
        }
    }

    pub fn path_for(&self, ticker: &Ticker, frequency: Frequency) -> PathBuf {
        self.data_dir.join(csv_filename(ticker, frequency))
    }
}

impl HistoryProvider for CsvProvider {
    fn fetch_history(
        &self,
        ticker: &Ticker,
        frequency: Frequency,
        range: &DateRange,
    ) -> Result<HistorySeries, ProviderError> {
        let path = self.path_for(ticker, frequency);
        if !path.exists() {
            warn!("Data file not found: {}", path.display());
            return Err(ProviderError::UnknownTicker(ticker.to_string()));
        }

        Ok(within(load_csv(&path)?, range))
    }
}

/// Rows of `series` inside `range`; an open start keeps everything up to `end`
pub fn within(series: HistorySeries, range: &DateRange) -> HistorySeries {
    let mut candles = series.into_candles();
    candles.retain(|c| c.datetime <= range.end && range.start.map_or(true, |s| c.datetime >= s));
    HistorySeries::new(candles)
}

pub fn csv_filename(ticker: &Ticker, frequency: Frequency) -> String {
    format!("{}_{}.csv", ticker, frequency)
}

/// Column positions resolved from a CSV header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Columns {
    time: usize,
    open: usize,
    high: usize,
    low: usize,
    close: usize,
    volume: usize,
}

/// Resolve the time column (`Date`, `Datetime`, ...) and OHLCV columns by name
fn normalize_columns(headers: &csv::StringRecord) -> Result<Columns, ProviderError> {
    let lower: Vec<String> = headers.iter().map(|h| h.trim().to_lowercase()).collect();
    let find = |name: &str| {
        lower
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| ProviderError::Parse(format!("missing column: {}", name)))
    };

    let time = TIME_COLUMNS
        .iter()
        .find_map(|name| lower.iter().position(|h| h == name))
        .ok_or_else(|| ProviderError::Parse("missing time column".to_string()))?;

    Ok(Columns {
        time,
        open: find("open")?,
        high: find("high")?,
        low: find("low")?,
        close: find("close")?,
        volume: find("volume")?,
    })
}

/// Parse RFC 3339, `%Y-%m-%d %H:%M:%S`, bare dates, or epoch seconds
pub fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%z") {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(ndt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(ndt.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|ndt| ndt.and_utc());
    }
    raw.parse::<i64>()
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
}

/// Load an OHLCV history from a CSV file with a header row
pub fn load_csv(path: impl AsRef<Path>) -> Result<HistorySeries, ProviderError> {
    let mut reader = csv::Reader::from_path(path.as_ref())?;
    let columns = normalize_columns(reader.headers()?)?;

    let mut candles = Vec::new();
    for (row_idx, result) in reader.records().enumerate() {
        let record = result?;
        let field = |idx: usize, name: &str| {
            record.get(idx).ok_or_else(|| {
                ProviderError::Parse(format!("row {}: missing {} column", row_idx + 1, name))
            })
        };
        let number = |idx: usize, name: &str| -> Result<f64, ProviderError> {
            field(idx, name)?.trim().parse::<f64>().map_err(|e| {
                ProviderError::Parse(format!("row {}: invalid {}: {}", row_idx + 1, name, e))
            })
        };

        let raw_time = field(columns.time, "time")?;
        let datetime = parse_datetime(raw_time).ok_or_else(|| {
            ProviderError::Parse(format!("row {}: invalid datetime '{}'", row_idx + 1, raw_time))
        })?;

        candles.push(Candle::new(
            datetime,
            number(columns.open, "open")?,
            number(columns.high, "high")?,
            number(columns.low, "low")?,
            number(columns.close, "close")?,
            number(columns.volume, "volume")?,
        ));
    }

    Ok(HistorySeries::new(candles))
}

/// Write a history as `datetime,open,high,low,close,volume`
pub fn save_csv(series: &HistorySeries, path: impl AsRef<Path>) -> Result<PathBuf, ProviderError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["datetime", "open", "high", "low", "close", "volume"])?;
    for candle in series.candles() {
        writer.write_record(&[
            candle.datetime.to_rfc3339(),
            candle.open.to_string(),
            candle.high.to_string(),
            candle.low.to_string(),
            candle.close.to_string(),
            candle.volume.to_string(),
        ])?;
    }
    writer.flush()?;

    info!("Saved {} rows to {}", series.len(), path.display());
    Ok(path.to_path_buf())
}

// =============================================================================
// Tests
// =============================================================================
