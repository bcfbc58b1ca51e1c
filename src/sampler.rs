//! Random contiguous window selection

use rand::Rng;

use crate::error::InsufficientData;
use crate::types::{HistorySeries, WindowSlice};

/// Take `rows` contiguous rows starting at a uniform offset in `[0, len - rows)`.
///
/// # Errors
/// [`InsufficientData`] when `rows == 0` or `rows >= series.len()`.
pub fn sample<R: Rng + ?Sized>(
    series: &HistorySeries,
    rows: usize,
    rng: &mut R,
) -> Result<WindowSlice, InsufficientData> {
    let available = series.len();
    if rows == 0 || rows >= available {
        return Err(InsufficientData {
            required: rows,
            available,
        });
    }

    let start = rng.gen_range(0..available - rows);
    let candles = series.candles()[start..start + rows].to_vec();
    WindowSlice::new(start, candles).ok_or(InsufficientData {
        required: rows,
        available,
    })
}

/// Rows a window needs for a nominal threshold and chart multiplier
pub fn window_rows(threshold: usize, multiplier: usize) -> usize {
    if multiplier == 0 {
        return 0;
    }
    (threshold as f64 / multiplier as f64).round() as usize
}
