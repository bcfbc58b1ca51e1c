//! Fetch command implementation

use anyhow::{Context, Result};
use chart_synth::data::{self, csv_filename, save_csv};
use chart_synth::frequency::resolve_range_with;
use chart_synth::{Config, Frequency, YahooProvider};
use chrono::Utc;
use std::path::PathBuf;
use tracing::{error, info};

use super::parse_tickers;

pub fn run(config_path: String, tickers: String, frequency: String, output: String) -> Result<()> {
    let config = Config::load_or_default(&config_path)?;
    let frequency: Frequency = frequency.parse().map_err(anyhow::Error::msg)?;
    let tickers = parse_tickers(&tickers)?;

    let provider = YahooProvider::new(
        &config.provider.base_url,
        config.provider.timeout(),
        &config.provider.user_agent,
    )?;
    let range = resolve_range_with(&config.generation.lookback_days, frequency, Utc::now());
    info!("Downloading {} ticker(s) at {} over {}", tickers.len(), frequency, range);

    let output_dir = PathBuf::from(&output);
    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("Failed to create output directory {}", output))?;

    let mut saved = 0;
    for ticker in &tickers {
        match data::fetch(&provider, ticker, frequency, &range) {
            Ok(series) => {
                let path = output_dir.join(csv_filename(ticker, frequency));
                save_csv(&series, &path)
                    .with_context(|| format!("Failed to save {}", path.display()))?;
                println!("  {:<8} {:>7} rows -> {}", ticker, series.len(), path.display());
                saved += 1;
            }
            Err(e) => error!("Failed to fetch {}: {}", ticker, e),
        }
    }

    info!("Saved {} of {} histories to {}", saved, tickers.len(), output);
    if saved == 0 {
        anyhow::bail!("No histories downloaded");
    }
    Ok(())
}
