//! Sampling frequency catalog and date range resolution
//!
//! Providers cap how much history is available at fine granularities, so each
//! frequency maps to a lookback window. Frequencies without one request the
//! full available history.

use chrono::{DateTime, Duration, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// Sampling granularity of a history request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Frequency {
    #[serde(rename = "1m")]
    Min1,
    #[serde(rename = "2m")]
    Min2,
    #[serde(rename = "5m")]
    Min5,
    #[serde(rename = "15m")]
    Min15,
    #[serde(rename = "30m")]
    Min30,
    #[serde(rename = "60m")]
    Min60,
    #[serde(rename = "90m")]
    Min90,
    #[serde(rename = "1h")]
    Hour1,
    #[serde(rename = "1d")]
    Day1,
    #[serde(rename = "5d")]
    Day5,
    #[serde(rename = "1wk")]
    Week1,
    #[serde(rename = "1mo")]
    Month1,
    #[serde(rename = "3mo")]
    Month3,
}

impl Frequency {
    /// Full catalog, finest first
    pub const CATALOG: [Frequency; 13] = [
        Frequency::Min1,
        Frequency::Min2,
        Frequency::Min5,
        Frequency::Min15,
        Frequency::Min30,
        Frequency::Min60,
        Frequency::Min90,
        Frequency::Hour1,
        Frequency::Day1,
        Frequency::Day5,
        Frequency::Week1,
        Frequency::Month1,
        Frequency::Month3,
    ];

    /// Provider interval token
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Min1 => "1m",
            Frequency::Min2 => "2m",
            Frequency::Min5 => "5m",
            Frequency::Min15 => "15m",
            Frequency::Min30 => "30m",
            Frequency::Min60 => "60m",
            Frequency::Min90 => "90m",
            Frequency::Hour1 => "1h",
            Frequency::Day1 => "1d",
            Frequency::Day5 => "5d",
            Frequency::Week1 => "1wk",
            Frequency::Month1 => "1mo",
            Frequency::Month3 => "3mo",
        }
    }

    /// True for bars wider than one trading day
    pub fn is_coarser_than_daily(&self) -> bool {
        matches!(
            self,
            Frequency::Day5 | Frequency::Week1 | Frequency::Month1 | Frequency::Month3
        )
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Frequency::CATALOG
            .iter()
            .copied()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| {
                format!(
                    "unknown frequency '{}', expected one of: {}",
                    s,
                    Frequency::CATALOG.map(|f| f.as_str()).join(", ")
                )
            })
    }
}

/// Pick a frequency uniformly from the catalog
pub fn resolve_frequency<R: Rng + ?Sized>(rng: &mut R) -> Frequency {
    *Frequency::CATALOG
        .choose(rng)
        .unwrap_or(&Frequency::Day1)
}

/// Days of history the provider serves per frequency
pub type LookbackTable = HashMap<Frequency, i64>;

/// Lookback limits of the public chart API.
///
/// `60m` has no entry and requests full history.
pub const DEFAULT_LOOKBACK_DAYS: &[(Frequency, i64)] = &[
    (Frequency::Min1, 6),
    (Frequency::Min2, 59),
    (Frequency::Min5, 59),
    (Frequency::Min15, 59),
    (Frequency::Min30, 59),
    (Frequency::Min90, 59),
    (Frequency::Hour1, 300),
];

/// Longest lookback a table entry may hold
pub const MAX_LOOKBACK_DAYS: i64 = 365 * 200;

pub fn default_lookback_table() -> LookbackTable {
    DEFAULT_LOOKBACK_DAYS.iter().copied().collect()
}

/// Requested history span; `start == None` means "maximum available"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Option<DateTime<Utc>>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn is_full_history(&self) -> bool {
        self.start.is_none()
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.start {
            Some(start) => write!(
                f,
                "{} to {}",
                start.format("%Y-%m-%d"),
                self.end.format("%Y-%m-%d")
            ),
            None => write!(f, "max to {}", self.end.format("%Y-%m-%d")),
        }
    }
}

/// Resolve the request range for `freq` using the default lookback table
pub fn resolve_range(freq: Frequency, now: DateTime<Utc>) -> DateRange {
    resolve_range_with(&default_lookback_table(), freq, now)
}

/// Resolve the request range for `freq` using a configured lookback table.
///
/// Entries outside `1..=MAX_LOOKBACK_DAYS` fall back to full history.
pub fn resolve_range_with(table: &LookbackTable, freq: Frequency, now: DateTime<Utc>) -> DateRange {
    let start = table.get(&freq).and_then(|&days| {
        let start = lookback_start(now, days);
        if start.is_none() {
            warn!("Ignoring lookback of {} days for {}", days, freq);
        }
        start
    });
    DateRange { start, end: now }
}

fn lookback_start(now: DateTime<Utc>, days: i64) -> Option<DateTime<Utc>> {
    if !(1..=MAX_LOOKBACK_DAYS).contains(&days) {
        return None;
    }
    Duration::try_days(days).and_then(|span| now.checked_sub_signed(span))
}

/// Check every entry lies in `1..=MAX_LOOKBACK_DAYS`
pub fn validate_lookback(table: &LookbackTable) -> Result<(), String> {
    let mut invalid: Vec<_> = table
        .iter()
        .filter(|(_, days)| !(1..=MAX_LOOKBACK_DAYS).contains(*days))
        .collect();
    invalid.sort();
    match invalid.first() {
        None => Ok(()),
        Some((freq, days)) => Err(format!(
            "lookback for {} must be between 1 and {} days, got {}",
            freq, MAX_LOOKBACK_DAYS, days
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 14, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_unbounded_frequencies_request_full_history() {
        for freq in [
            Frequency::Min60,
            Frequency::Day1,
            Frequency::Day5,
            Frequency::Week1,
            Frequency::Month1,
            Frequency::Month3,
        ] {
            let range = resolve_range(freq, now());
            assert!(range.is_full_history(), "{} should be unbounded", freq);
            assert_eq!(range.end, now());
        }
    }

    #[test]
    fn test_bounded_frequencies_use_lookback() {
        for (freq, days) in DEFAULT_LOOKBACK_DAYS {
            let range = resolve_range(*freq, now());
            assert_eq!(range.start, Some(now() - Duration::days(*days)));
        }
    }

    #[test]
    fn test_configured_table_matches_default() {
        let table = default_lookback_table();
        for freq in Frequency::CATALOG {
            assert_eq!(resolve_range_with(&table, freq, now()), resolve_range(freq, now()));
        }
    }

    #[test]
    fn test_out_of_range_lookback_requests_full_history() {
        let mut table = LookbackTable::new();
        table.insert(Frequency::Day1, 100_000_000);
        table.insert(Frequency::Min5, -30);
        table.insert(Frequency::Min1, 0);

        for freq in [Frequency::Day1, Frequency::Min5, Frequency::Min1] {
            let range = resolve_range_with(&table, freq, now());
            assert!(range.is_full_history());
            assert_eq!(range.end, now());
        }
    }

    #[test]
    fn test_validate_lookback() {
        assert!(validate_lookback(&default_lookback_table()).is_ok());

        let mut table = default_lookback_table();
        table.insert(Frequency::Day1, -30);
        let err = validate_lookback(&table).unwrap_err();
        assert!(err.contains("1d"));

        table.insert(Frequency::Day1, MAX_LOOKBACK_DAYS + 1);
        assert!(validate_lookback(&table).is_err());
    }

    #[test]
    fn test_parse_round_trip() {
        for freq in Frequency::CATALOG {
            assert_eq!(freq.as_str().parse::<Frequency>().unwrap(), freq);
        }
        assert!("2h".parse::<Frequency>().is_err());
    }

    #[test]
    fn test_resolve_frequency_is_seed_deterministic() {
        let mut a = ChaCha8Rng::seed_from_u64(7);
        let mut b = ChaCha8Rng::seed_from_u64(7);
        let first: Vec<_> = (0..20).map(|_| resolve_frequency(&mut a)).collect();
        let second: Vec<_> = (0..20).map(|_| resolve_frequency(&mut b)).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_serde_tokens() {
        let json = serde_json::to_string(&Frequency::Week1).unwrap();
        assert_eq!(json, "\"1wk\"");
        let table: LookbackTable = serde_json::from_str(r#"{"1m": 7, "1h": 100}"#).unwrap();
        assert_eq!(table.get(&Frequency::Min1), Some(&7));
    }
}
