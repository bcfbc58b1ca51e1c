//! Generate command implementation

use anyhow::{Context, Result};
use chart_synth::config::MetadataSink;
use chart_synth::{
    ChartGenerator, Config, CsvProvider, CsvSink, Frequency, GeneratorSettings, HistoryProvider,
    KindSelection, PlottersRenderer, RecordSink, Ticker, UsFederalCalendar, YahooProvider,
};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{error, info};

use super::parse_tickers;

#[derive(Debug)]
pub struct GenerateArgs {
    pub config_path: String,
    pub tickers: String,
    pub count: usize,
    pub threshold: Option<usize>,
    pub seed: Option<u64>,
    pub kind: Option<String>,
    pub frequency: Option<String>,
    pub sink: Option<String>,
    pub jobs: Option<usize>,
}

/// Counts and sink left after a batch
struct BatchOutcome<S> {
    generated: usize,
    failed: usize,
    sink: S,
}

pub fn run(args: GenerateArgs) -> Result<()> {
    info!("Starting chart generation");

    let mut config = Config::load_or_default(&args.config_path)?;
    info!("Loaded configuration from: {}", args.config_path);

    if let Some(threshold) = args.threshold {
        info!("Overriding threshold to: {}", threshold);
        config.generation.threshold = threshold;
    }

    if let Some(seed) = args.seed {
        info!("Overriding seed to: {}", seed);
        config.generation.seed = seed;
    }

    if let Some(kind) = &args.kind {
        let selection: KindSelection = kind.parse().map_err(anyhow::Error::msg)?;
        info!("Overriding chart kind selection to: {:?}", selection);
        config.generation.kind_selection = selection;
    }

    if let Some(frequency) = &args.frequency {
        let frequency: Frequency = frequency.parse().map_err(anyhow::Error::msg)?;
        info!("Overriding frequency to: {}", frequency);
        config.generation.frequency = Some(frequency);
    }

    if let Some(sink) = &args.sink {
        let sink: MetadataSink = sink.parse().map_err(anyhow::Error::msg)?;
        info!("Overriding metadata sink to: {:?}", sink);
        config.output.metadata_sink = sink;
    }

    if let Some(jobs) = args.jobs {
        rayon::ThreadPoolBuilder::new()
            .num_threads(jobs.max(1))
            .build_global()
            .context("Failed to configure worker pool")?;
    }

    let tickers = parse_tickers(&args.tickers)?;
    info!("Images go to: {}", config.output.image_dir);
    info!(
        "Metadata goes to: {} ({:?} sink)",
        config.output.metadata_path, config.output.metadata_sink
    );

    match config.provider.data_dir.clone() {
        Some(dir) => {
            info!("Reading histories from: {}", dir);
            generate_with(CsvProvider::new(dir), &config, &tickers, args.count)
        }
        None => {
            info!("Fetching histories from: {}", config.provider.base_url);
            let provider = YahooProvider::new(
                &config.provider.base_url,
                config.provider.timeout(),
                &config.provider.user_agent,
            )?;
            generate_with(provider, &config, &tickers, args.count)
        }
    }
}

fn generate_with<P: HistoryProvider + 'static>(
    provider: P,
    config: &Config,
    tickers: &[Ticker],
    count: usize,
) -> Result<()> {
    print_header(config, tickers, count);

    let (generated, failed) = match config.output.metadata_sink {
        MetadataSink::Csv => {
            let sink = CsvSink::open(&config.output.metadata_path).with_context(|| {
                format!("Failed to open metadata log {}", config.output.metadata_path)
            })?;
            let mut outcome = generate_batch(provider, sink, config, tickers, count)?;
            outcome.sink.flush()?;

            println!("Records written:    {}", outcome.sink.written());
            println!("Metadata:           {}", outcome.sink.path().display());
            (outcome.generated, outcome.failed)
        }
        MetadataSink::Memory => {
            let sink = config.output.memory_sink();
            let outcome = generate_batch(provider, sink, config, tickers, count)?;
            let path = outcome
                .sink
                .export_csv(&config.output.metadata_path)
                .with_context(|| format!("Failed to export metadata to {}", config.output.metadata_path))?;

            println!("Records exported:   {}", outcome.sink.len());
            println!("Records evicted:    {}", outcome.sink.evicted());
            println!("Metadata:           {}", path.display());
            (outcome.generated, outcome.failed)
        }
    };
    println!("{}", "=".repeat(70));

    info!("Generated {} of {} images ({} failed)", generated, count, failed);
    if generated == 0 && count > 0 {
        anyhow::bail!("No images generated");
    }
    Ok(())
}

fn print_header(config: &Config, tickers: &[Ticker], count: usize) {
    println!("\n{}", "=".repeat(70));
    println!("CHART GENERATION");
    println!("{}", "=".repeat(70));
    println!("  Tickers:       {}", tickers.iter().map(|t| t.as_str()).collect::<Vec<_>>().join(", "));
    println!("  Images:        {}", count);
    println!("  Threshold:     {}", config.generation.threshold);
    println!("  Base seed:     {}", config.generation.seed);
    println!("  Kind:          {:?}", config.generation.kind_selection);
    println!("  Output:        {}", config.output.image_dir);
    println!("{}\n", "=".repeat(70));
}

/// Run `count` requests in parallel; image `i` uses `seed + i` and ticker `i % n`
fn generate_batch<P, S>(
    provider: P,
    sink: S,
    config: &Config,
    tickers: &[Ticker],
    count: usize,
) -> Result<BatchOutcome<S>>
where
    P: HistoryProvider + 'static,
    S: RecordSink,
{
    let calendar = UsFederalCalendar::new().with_extra_holidays(config.calendar.extra_holidays.clone());
    let renderer = PlottersRenderer::new(config.output.width, config.output.height);
    let generator = ChartGenerator::new(
        provider,
        calendar,
        renderer,
        sink,
        GeneratorSettings::from_config(config),
    );

    let threshold = config.generation.threshold;
    let base_seed = config.generation.seed;

    let pb = ProgressBar::new(count as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{percent:>3}%|{bar:40}| {pos}/{len} [{elapsed}<{eta}, {per_sec:.2}] {msg}")
            .context("Invalid progress bar template")?
            .progress_chars("█░ "),
    );

    let failed = AtomicUsize::new(0);
    let generated: usize = (0..count)
        .into_par_iter()
        .map(|i| {
            let ticker = &tickers[i % tickers.len()];
            let seed = base_seed.wrapping_add(i as u64);
            let outcome = generator.generate(ticker, threshold, seed);
            pb.inc(1);
            match outcome {
                Ok(_) => 1,
                Err(e) => {
                    error!("{:#}", anyhow::Error::new(e));
                    let failures = failed.fetch_add(1, Ordering::Relaxed) + 1;
                    pb.set_message(format!("{} failed", failures));
                    0
                }
            }
        })
        .sum();

    let failed = failed.load(Ordering::Relaxed);
    pb.finish_with_message(format!("{} failed", failed));

    println!("\n{}", "=".repeat(70));
    println!("GENERATION RESULTS");
    println!("{}", "=".repeat(70));
    println!("Generated:          {}", generated);
    println!("Failed:             {}", failed);

    Ok(BatchOutcome {
        generated,
        failed,
        sink: generator.into_sink()?,
    })
}
