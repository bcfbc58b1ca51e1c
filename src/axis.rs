//! Axis tick format selection
//!
//! Coarser time spans get coarser labels so ticks stay readable. This is a
//! heuristic: nothing prevents neighbouring labels from overlapping.

use chrono::Datelike;
use itertools::Itertools;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::types::WindowSlice;

pub const YEAR_FORMAT: &str = "%Y";
pub const MONTH_FORMATS: [&str; 3] = ["%b %Y", "%Y %b", "%Y-%m"];
pub const SUBDAY_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M", "%H:%M %b %d, %Y"];

pub const MIN_TICKS: usize = 5;
pub const MAX_TICKS: usize = 10;

/// Spans above this many distinct years (or year-months) switch to the coarser branch
const DISTINCT_LIMIT: usize = 5;

/// Label granularity chosen for a window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    Year,
    Month,
    SubDay,
}

/// Tick label format and target tick count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisFormat {
    pub granularity: Granularity,
    pub format: &'static str,
    pub tick_count: usize,
}

/// Tick positions (row indices) with their labels
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickLayout {
    pub positions: Vec<usize>,
    pub labels: Vec<String>,
}

/// Choose a label format from the window's time span
pub fn select_format<R: Rng + ?Sized>(slice: &WindowSlice, rng: &mut R) -> AxisFormat {
    let tick_count = rng.gen_range(MIN_TICKS..=MAX_TICKS);

    let years = slice
        .candles()
        .iter()
        .map(|c| c.datetime.year())
        .unique()
        .count();
    let year_months = slice
        .candles()
        .iter()
        .map(|c| (c.datetime.year(), c.datetime.month()))
        .unique()
        .count();

    let (granularity, format) = if years > DISTINCT_LIMIT {
        (Granularity::Year, YEAR_FORMAT)
    } else if year_months > DISTINCT_LIMIT {
        (Granularity::Month, *MONTH_FORMATS.choose(rng).unwrap_or(&MONTH_FORMATS[0]))
    } else {
        (Granularity::SubDay, *SUBDAY_FORMATS.choose(rng).unwrap_or(&SUBDAY_FORMATS[0]))
    };

    AxisFormat {
        granularity,
        format,
        tick_count,
    }
}

/// Evenly spaced ticks at stride `max(1, len / tick_count)`
pub fn tick_layout(slice: &WindowSlice, format: &AxisFormat) -> TickLayout {
    let stride = (slice.len() / format.tick_count.max(1)).max(1);

    let (positions, labels) = slice
        .candles()
        .iter()
        .enumerate()
        .step_by(stride)
        .map(|(i, c)| (i, c.datetime.format(format.format).to_string()))
        .unzip();

    TickLayout { positions, labels }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Candle;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn window(start: DateTime<Utc>, step: Duration, len: usize) -> WindowSlice {
        let candles = (0..len)
            .map(|i| Candle::new(start + step * i as i32, 1.0, 2.0, 0.5, 1.5, 10.0))
            .collect();
        WindowSlice::new(0, candles).unwrap()
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2015, 1, 5, 14, 30, 0).unwrap()
    }

    #[test]
    fn test_multi_year_span_uses_year_format() {
        let slice = window(start(), Duration::days(30), 100);
        for seed in 0..20 {
            let fmt = select_format(&slice, &mut ChaCha8Rng::seed_from_u64(seed));
            assert_eq!(fmt.granularity, Granularity::Year);
            assert_eq!(fmt.format, YEAR_FORMAT);
        }
    }

    #[test]
    fn test_multi_month_span_uses_month_format() {
        let slice = window(start(), Duration::days(1), 250);
        for seed in 0..20 {
            let fmt = select_format(&slice, &mut ChaCha8Rng::seed_from_u64(seed));
            assert_eq!(fmt.granularity, Granularity::Month);
            assert!(MONTH_FORMATS.contains(&fmt.format));
        }
    }

    #[test]
    fn test_short_span_uses_subday_format() {
        let slice = window(start(), Duration::minutes(5), 200);
        for seed in 0..20 {
            let fmt = select_format(&slice, &mut ChaCha8Rng::seed_from_u64(seed));
            assert_eq!(fmt.granularity, Granularity::SubDay);
            assert!(SUBDAY_FORMATS.contains(&fmt.format));
        }
    }

    #[test]
    fn test_tick_count_in_range() {
        let slice = window(start(), Duration::days(1), 50);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        for _ in 0..200 {
            let fmt = select_format(&slice, &mut rng);
            assert!((MIN_TICKS..=MAX_TICKS).contains(&fmt.tick_count));
        }
    }

    #[test]
    fn test_tick_layout_stride() {
        let slice = window(start(), Duration::days(1), 100);
        let fmt = AxisFormat {
            granularity: Granularity::Month,
            format: "%Y-%m",
            tick_count: 8,
        };

        let layout = tick_layout(&slice, &fmt);
        // stride = 100 / 8 = 12
        assert_eq!(layout.positions[..3], [0, 12, 24]);
        assert_eq!(layout.positions.len(), 9);
        assert_eq!(layout.labels[0], "2015-01");
        assert_eq!(layout.positions.len(), layout.labels.len());
    }

    #[test]
    fn test_tick_layout_short_window() {
        let slice = window(start(), Duration::hours(1), 3);
        let fmt = AxisFormat {
            granularity: Granularity::SubDay,
            format: "%H:%M %b %d, %Y",
            tick_count: 10,
        };

        let layout = tick_layout(&slice, &fmt);
        assert_eq!(layout.positions, vec![0, 1, 2]);
        assert_eq!(layout.labels[0], "14:30 Jan 05, 2015");
    }
}
