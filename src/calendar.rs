//! Business-day calendars
//!
//! A calendar answers which dates a market is open between two dates. The
//! default is the US federal holiday calendar: weekdays minus federal
//! holidays, with fixed-date holidays observed on the nearest weekday.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use std::collections::BTreeSet;

/// Source of valid trading dates
pub trait BusinessCalendar: Send + Sync {
    /// Ordered trading dates in `[start, end]`. Empty when `start > end`.
    fn trading_dates(&self, start: NaiveDate, end: NaiveDate) -> BTreeSet<NaiveDate>;
}

/// Monday to Friday, no holidays
#[derive(Debug, Clone, Copy, Default)]
pub struct WeekdayCalendar;

impl BusinessCalendar for WeekdayCalendar {
    fn trading_dates(&self, start: NaiveDate, end: NaiveDate) -> BTreeSet<NaiveDate> {
        start
            .iter_days()
            .take_while(|d| *d <= end)
            .filter(|d| !is_weekend(*d))
            .collect()
    }
}

/// Weekdays minus US federal holidays and any configured closures
#[derive(Debug, Clone, Default)]
pub struct UsFederalCalendar {
    extra_holidays: BTreeSet<NaiveDate>,
}

impl UsFederalCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add market closures that are not federal holidays
    pub fn with_extra_holidays(mut self, dates: impl IntoIterator<Item = NaiveDate>) -> Self {
        self.extra_holidays.extend(dates);
        self
    }

    /// Observed federal holidays whose rule belongs to `year`.
    ///
    /// New Year's Day falling on a Saturday is observed on Dec 31 of the
    /// previous year, so results may fall outside `year`.
    pub fn federal_holidays(year: i32) -> Vec<NaiveDate> {
        let mut days = Vec::with_capacity(11);

        let mut fixed = |month: u32, day: u32| {
            if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
                days.push(nearest_workday(date));
            }
        };
        fixed(1, 1);
        if year >= 2021 {
            fixed(6, 19);
        }
        fixed(7, 4);
        fixed(11, 11);
        fixed(12, 25);

        if year >= 1986 {
            days.extend(nth_weekday(year, 1, Weekday::Mon, 3));
        }
        if year >= 1971 {
            days.extend(nth_weekday(year, 2, Weekday::Mon, 3));
            days.extend(last_weekday(year, 5, Weekday::Mon));
            days.extend(nth_weekday(year, 10, Weekday::Mon, 2));
        }
        days.extend(nth_weekday(year, 9, Weekday::Mon, 1));
        days.extend(nth_weekday(year, 11, Weekday::Thu, 4));

        days.sort();
        days
    }

    fn holidays_between(&self, start: NaiveDate, end: NaiveDate) -> BTreeSet<NaiveDate> {
        let mut holidays: BTreeSet<NaiveDate> = (start.year() - 1..=end.year() + 1)
            .flat_map(Self::federal_holidays)
            .collect();
        holidays.extend(self.extra_holidays.iter().copied());
        holidays
    }

    pub fn is_trading_day(&self, date: NaiveDate) -> bool {
        !is_weekend(date) && !self.holidays_between(date, date).contains(&date)
    }
}

impl BusinessCalendar for UsFederalCalendar {
    fn trading_dates(&self, start: NaiveDate, end: NaiveDate) -> BTreeSet<NaiveDate> {
        if start > end {
            return BTreeSet::new();
        }
        let holidays = self.holidays_between(start, end);
        start
            .iter_days()
            .take_while(|d| *d <= end)
            .filter(|d| !is_weekend(*d) && !holidays.contains(d))
            .collect()
    }
}

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Saturday holidays move to Friday, Sunday holidays to Monday
fn nearest_workday(date: NaiveDate) -> NaiveDate {
    match date.weekday() {
        Weekday::Sat => date - Duration::days(1),
        Weekday::Sun => date + Duration::days(1),
        _ => date,
    }
}

fn nth_weekday(year: i32, month: u32, weekday: Weekday, n: u8) -> Option<NaiveDate> {
    NaiveDate::from_weekday_of_month_opt(year, month, weekday, n)
}

fn last_weekday(year: i32, month: u32, weekday: Weekday) -> Option<NaiveDate> {
    let first_of_next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    let mut date = first_of_next - Duration::days(1);
    while date.weekday() != weekday {
        date -= Duration::days(1);
    }
    Some(date)
}
