//! Command implementations for the CLI

pub mod calendar;
pub mod fetch;
pub mod generate;

use anyhow::Result;
use chart_synth::Ticker;

/// Parse a comma-separated ticker list, skipping blanks
pub fn parse_tickers(raw: &str) -> Result<Vec<Ticker>> {
    let tickers: Vec<Ticker> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(Ticker::new)
        .collect();

    if tickers.is_empty() {
        anyhow::bail!("No tickers given");
    }
    Ok(tickers)
}
