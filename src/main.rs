//! Chart Synth - main entry point
//!
//! This binary provides three subcommands:
//! - generate: Render chart images and write their metadata
//! - fetch: Download price histories to CSV
//! - calendar: List trading dates between two days

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "chart-synth")]
#[command(about = "Synthetic chart image generation from market price history", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate chart images
    Generate {
        /// Path to configuration file (defaults apply when missing)
        #[arg(short, long, default_value = "configs/default.json")]
        config: String,

        /// Tickers to draw from (comma-separated). E.g., "AAPL,MSFT,SPY"
        #[arg(short, long, default_value = "AAPL")]
        tickers: String,

        /// Number of images to generate
        #[arg(short = 'n', long, default_value = "1")]
        count: usize,

        /// Nominal window size before the chart multiplier (overrides config)
        #[arg(long)]
        threshold: Option<usize>,

        /// Base seed; image i uses seed + i (overrides config)
        #[arg(long)]
        seed: Option<u64>,

        /// Chart kind: candlestick, line, barline, seeded or entropy (overrides config)
        #[arg(short, long)]
        kind: Option<String>,

        /// Fixed frequency, e.g. "1d" (overrides config)
        #[arg(short, long)]
        frequency: Option<String>,

        /// Metadata sink: csv or memory (overrides config)
        #[arg(long)]
        sink: Option<String>,

        /// Worker threads (defaults to all cores)
        #[arg(short, long)]
        jobs: Option<usize>,
    },

    /// Download price history to CSV
    Fetch {
        /// Path to configuration file (defaults apply when missing)
        #[arg(short, long, default_value = "configs/default.json")]
        config: String,

        /// Tickers to download (comma-separated)
        #[arg(short, long, default_value = "AAPL")]
        tickers: String,

        /// Bar frequency, e.g. "1d", "60m"
        #[arg(short, long, default_value = "1d")]
        frequency: String,

        /// Output directory
        #[arg(short, long, default_value = "data")]
        output: String,
    },

    /// List expected trading dates
    Calendar {
        /// Path to configuration file (defaults apply when missing)
        #[arg(short, long, default_value = "configs/default.json")]
        config: String,

        /// Start date (YYYY-MM-DD)
        #[arg(long)]
        start: String,

        /// End date (YYYY-MM-DD)
        #[arg(long)]
        end: String,
    },
}

/// Log directory, overridable with `CHART_SYNTH_LOG_DIR`
fn log_dir() -> PathBuf {
    std::env::var("CHART_SYNTH_LOG_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("logs"))
}

/// Console plus `{log_dir}/{command}_{timestamp}.log`. Batch runs log to the
/// file only so the progress bar stays readable.
fn setup_logging(verbose: bool, command_name: &str, file_only: bool) -> Result<PathBuf> {
    let dir = log_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create log directory {}", dir.display()))?;

    let log_filename = format!(
        "{}_{}.log",
        command_name,
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    );
    let log_path = dir.join(&log_filename);

    // HTTP internals stay at warn unless RUST_LOG says otherwise
    let level = if verbose { "debug" } else { "info" };
    let filter_str = format!(
        "{},hyper=warn,hyper_util=warn,reqwest=warn,rustls=warn,h2=warn",
        level
    );
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(tracing_appender::rolling::never(&dir, &log_filename))
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(false);

    let console_layer = (!file_only).then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_line_number(false)
            .with_ansi(true)
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    info!(
        "chart-synth {} {} (log file: {})",
        env!("CARGO_PKG_VERSION"),
        command_name,
        log_path.display()
    );
    Ok(log_path)
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let (command_name, file_only) = match &cli.command {
        Commands::Generate { count, .. } => ("generate", *count > 1),
        Commands::Fetch { .. } => ("fetch", false),
        Commands::Calendar { .. } => ("calendar", false),
    };

    let log_path = setup_logging(cli.verbose, command_name, file_only)?;
    if file_only {
        println!("Logging to {}", log_path.display());
    }

    match cli.command {
        Commands::Generate {
            config,
            tickers,
            count,
            threshold,
            seed,
            kind,
            frequency,
            sink,
            jobs,
        } => commands::generate::run(commands::generate::GenerateArgs {
            config_path: config,
            tickers,
            count,
            threshold,
            seed,
            kind,
            frequency,
            sink,
            jobs,
        }),

        Commands::Fetch {
            config,
            tickers,
            frequency,
            output,
        } => commands::fetch::run(config, tickers, frequency, output),

        Commands::Calendar { config, start, end } => commands::calendar::run(config, start, end),
    }
}
