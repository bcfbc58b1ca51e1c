//! Core data types shared by the generation pipeline

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::chart::ChartKind;
use crate::frequency::Frequency;

/// OHLCV row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub datetime: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn new(
        datetime: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            datetime,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Value of one of the price fields
    pub fn price(&self, field: PriceField) -> f64 {
        match field {
            PriceField::Open => self.open,
            PriceField::High => self.high,
            PriceField::Low => self.low,
            PriceField::Close => self.close,
        }
    }
}

/// Price columns a line chart may plot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PriceField {
    Open,
    High,
    Low,
    Close,
}

impl PriceField {
    pub const ALL: [PriceField; 4] = [
        PriceField::Open,
        PriceField::High,
        PriceField::Low,
        PriceField::Close,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PriceField::Open => "Open",
            PriceField::High => "High",
            PriceField::Low => "Low",
            PriceField::Close => "Close",
        }
    }
}

impl std::fmt::Display for PriceField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ticker symbol using Arc<str> for cheap cloning
///
/// Tickers travel with every record and error context, so clones stay O(1).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ticker(#[serde(with = "arc_str_serde")] std::sync::Arc<str>);

mod arc_str_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::sync::Arc;

    pub fn serialize<S>(value: &Arc<str>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(value)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Arc<str>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Arc::from(s.as_str()))
    }
}

impl Ticker {
    pub fn new(s: impl AsRef<str>) -> Self {
        Ticker(std::sync::Arc::from(s.as_ref().trim().to_uppercase().as_str()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Ticker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Price history ordered by `datetime`, ascending and unique.
///
/// Gaps are allowed; completeness is the calendar validator's concern.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistorySeries {
    candles: Vec<Candle>,
}

impl HistorySeries {
    /// Build a series, sorting by time and dropping duplicate timestamps
    pub fn new(mut candles: Vec<Candle>) -> Self {
        candles.sort_by_key(|c| c.datetime);
        candles.dedup_by_key(|c| c.datetime);
        Self { candles }
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn first(&self) -> Option<&Candle> {
        self.candles.first()
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    /// Distinct calendar dates present in the series
    pub fn dates(&self) -> BTreeSet<NaiveDate> {
        self.candles.iter().map(|c| c.datetime.date_naive()).collect()
    }

    pub fn into_candles(self) -> Vec<Candle> {
        self.candles
    }
}

/// Non-empty contiguous window of a [`HistorySeries`], indexed from 0
#[derive(Debug, Clone, PartialEq)]
pub struct WindowSlice {
    offset: usize,
    candles: Vec<Candle>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl WindowSlice {
    /// `None` for an empty window
    pub(crate) fn new(offset: usize, candles: Vec<Candle>) -> Option<Self> {
        let start = candles.first()?.datetime;
        let end = candles.last()?.datetime;
        Some(Self {
            offset,
            candles,
            start,
            end,
        })
    }

    /// Position of the first row in the source series
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }
}

/// Metadata for one rendered image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRecord {
    pub image_id: Uuid,
    pub ticker: Ticker,
    pub chart_kind: ChartKind,
    pub frequency: Frequency,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn candle_at(day: i64) -> Candle {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 14, 30, 0).unwrap();
        Candle::new(base + Duration::days(day), 1.0, 2.0, 0.5, 1.5, 100.0)
    }

    #[test]
    fn test_series_sorted_and_deduplicated() {
        let series = HistorySeries::new(vec![candle_at(2), candle_at(0), candle_at(2), candle_at(1)]);

        assert_eq!(series.len(), 3);
        let times: Vec<_> = series.candles().iter().map(|c| c.datetime).collect();
        assert!(times.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_series_dates() {
        let series = HistorySeries::new(vec![candle_at(0), candle_at(1)]);
        let dates = series.dates();
        assert_eq!(dates.len(), 2);
        assert!(dates.contains(&NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()));
    }

    #[test]
    fn test_window_bounds() {
        let window = WindowSlice::new(4, vec![candle_at(4), candle_at(5), candle_at(6)]).unwrap();
        assert_eq!(window.offset(), 4);
        assert_eq!(window.start(), candle_at(4).datetime);
        assert_eq!(window.end(), candle_at(6).datetime);
        assert!(WindowSlice::new(0, Vec::new()).is_none());
    }

    #[test]
    fn test_ticker_normalized() {
        assert_eq!(Ticker::new(" aapl ").as_str(), "AAPL");
    }

    #[test]
    fn test_price_field() {
        let c = candle_at(0);
        assert_eq!(c.price(PriceField::Open), 1.0);
        assert_eq!(c.price(PriceField::Close), 1.5);
    }
}
