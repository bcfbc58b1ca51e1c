//! Calendar command implementation

use anyhow::{Context, Result};
use chart_synth::{BusinessCalendar, Config, UsFederalCalendar};
use chrono::NaiveDate;
use tracing::info;

pub fn run(config_path: String, start: String, end: String) -> Result<()> {
    let config = Config::load_or_default(&config_path)?;
    let start = NaiveDate::parse_from_str(&start, "%Y-%m-%d")
        .with_context(|| format!("Invalid start date: {}", start))?;
    let end = NaiveDate::parse_from_str(&end, "%Y-%m-%d")
        .with_context(|| format!("Invalid end date: {}", end))?;
    if start > end {
        anyhow::bail!("Start date {} is after end date {}", start, end);
    }

    let calendar = UsFederalCalendar::new().with_extra_holidays(config.calendar.extra_holidays);
    let dates = calendar.trading_dates(start, end);

    for date in &dates {
        println!("{}", date.format("%Y-%m-%d %a"));
    }
    info!("{} trading date(s) between {} and {}", dates.len(), start, end);
    Ok(())
}
