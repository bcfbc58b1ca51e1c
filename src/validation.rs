//! Trading-calendar completeness check for fetched histories

use chrono::NaiveDate;

use crate::calendar::BusinessCalendar;
use crate::error::CalendarValidationError;
use crate::types::HistorySeries;

/// Outcome of a completeness check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    pub first: Option<NaiveDate>,
    pub last: Option<NaiveDate>,
    pub expected_days: usize,
    pub missing: Vec<NaiveDate>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.missing.is_empty()
    }

    /// Convert a failed check into an error
    pub fn into_result(self) -> Result<(), CalendarValidationError> {
        match (self.first, self.last) {
            (Some(first), Some(last)) if !self.missing.is_empty() => Err(CalendarValidationError {
                first,
                last,
                missing: self.missing,
            }),
            _ => Ok(()),
        }
    }
}

/// Check that every trading date between the first and last row is present.
///
/// An empty series, or one covering no business day, passes trivially.
pub fn validate(series: &HistorySeries, calendar: &dyn BusinessCalendar) -> ValidationResult {
    let (first, last) = match (series.first(), series.last()) {
        (Some(first), Some(last)) => (first.datetime.date_naive(), last.datetime.date_naive()),
        _ => {
            return ValidationResult {
                first: None,
                last: None,
                expected_days: 0,
                missing: Vec::new(),
            }
        }
    };

    let expected = calendar.trading_dates(first, last);
    let observed = series.dates();
    let missing: Vec<NaiveDate> = expected.difference(&observed).copied().collect();

    ValidationResult {
        first: Some(first),
        last: Some(last),
        expected_days: expected.len(),
        missing,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::UsFederalCalendar;
    use crate::types::Candle;
    use chrono::{Duration, TimeZone, Utc};

    fn series_on(dates: &[NaiveDate]) -> HistorySeries {
        HistorySeries::new(
            dates
                .iter()
                .map(|d| {
                    let ts = Utc.from_utc_datetime(&d.and_hms_opt(14, 30, 0).unwrap());
                    Candle::new(ts, 10.0, 11.0, 9.0, 10.5, 1_000.0)
                })
                .collect(),
        )
    }

    fn business_days(start: NaiveDate, count: usize) -> Vec<NaiveDate> {
        let calendar = UsFederalCalendar::new();
        calendar
            .trading_dates(start, start + Duration::days(count as i64 * 2 + 10))
            .into_iter()
            .take(count)
            .collect()
    }

    #[test]
    fn test_complete_series_passes() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let series = series_on(&business_days(start, 40));

        let result = validate(&series, &UsFederalCalendar::new());
        assert!(result.is_valid());
        assert_eq!(result.expected_days, 40);
        assert!(result.into_result().is_ok());
    }

    #[test]
    fn test_missing_dates_fail() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let mut days = business_days(start, 40);
        let removed: Vec<_> = vec![days.remove(30), days.remove(20), days.remove(10)];

        let result = validate(&series_on(&days), &UsFederalCalendar::new());
        assert!(!result.is_valid());
        assert_eq!(result.missing.len(), 3);
        for day in removed {
            assert!(result.missing.contains(&day));
        }

        let err = result.into_result().unwrap_err();
        assert_eq!(err.missing.len(), 3);
        assert_eq!(err.first, start);
    }

    #[test]
    fn test_intraday_rows_count_once_per_day() {
        let day = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        let base = Utc.from_utc_datetime(&day.and_hms_opt(14, 30, 0).unwrap());
        let series = HistorySeries::new(
            (0..78)
                .map(|i| Candle::new(base + Duration::minutes(5 * i), 1.0, 1.0, 1.0, 1.0, 1.0))
                .collect(),
        );

        let result = validate(&series, &UsFederalCalendar::new());
        assert!(result.is_valid());
        assert_eq!(result.expected_days, 1);
    }

    #[test]
    fn test_weekend_only_span_passes() {
        let sat = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        let sun = NaiveDate::from_ymd_opt(2024, 6, 16).unwrap();
        let result = validate(&series_on(&[sat, sun]), &UsFederalCalendar::new());
        assert!(result.is_valid());
        assert_eq!(result.expected_days, 0);
    }

    #[test]
    fn test_empty_series_passes() {
        let result = validate(&HistorySeries::default(), &UsFederalCalendar::new());
        assert!(result.is_valid());
        assert!(result.into_result().is_ok());
    }
}
