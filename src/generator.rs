//! Generation orchestrator
//!
//! One request walks `Start -> Fetched -> Validated -> Sampled -> Rendered ->
//! Recorded`. A calendar validation failure sends the request back to
//! `Start` with the threshold halved, at most once. Every other failure
//! aborts the request with its stage and context.
//!
//! Each request owns a `ChaCha8Rng` seeded with the caller's seed, so the
//! frequency, window offset, label format, tick count and line field are
//! reproducible. The chart kind follows the configured [`KindSelection`].

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::axis::{self, AxisFormat};
use crate::calendar::BusinessCalendar;
use crate::chart::{self, ChartKind, ChartRenderer, KindSelection, RenderRequest};
use crate::config::Config;
use crate::data::{self, HistoryProvider};
use crate::error::{ErrorKind, GenerationError, SinkError, Stage};
use crate::frequency::{self, DateRange, Frequency, LookbackTable};
use crate::sampler;
use crate::sink::RecordSink;
use crate::types::{GenerationRecord, HistorySeries, PriceField, Ticker, WindowSlice};
use crate::validation;

pub const DEFAULT_THRESHOLD: usize = 250;
pub const DEFAULT_SEED: u64 = 0;

/// Pipeline settings independent of the collaborators
#[derive(Debug, Clone)]
pub struct GeneratorSettings {
    pub image_dir: PathBuf,
    pub kind_selection: KindSelection,
    pub frequency: Option<Frequency>,
    pub lookback_days: LookbackTable,
    pub skip_coarse_validation: bool,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            image_dir: PathBuf::from("images"),
            kind_selection: KindSelection::Entropy,
            frequency: None,
            lookback_days: frequency::default_lookback_table(),
            skip_coarse_validation: false,
        }
    }
}

impl GeneratorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            image_dir: PathBuf::from(&config.output.image_dir),
            kind_selection: config.generation.kind_selection,
            frequency: config.generation.frequency,
            lookback_days: config.generation.lookback_days.clone(),
            skip_coarse_validation: config.generation.skip_coarse_validation,
        }
    }
}

/// Choices made at `Start`
#[derive(Debug, Clone, Copy)]
struct Plan {
    kind: ChartKind,
    multiplier: usize,
    frequency: Frequency,
    range: DateRange,
}

enum State {
    Start,
    Fetched { plan: Plan, series: HistorySeries },
    Validated { plan: Plan, series: HistorySeries },
    Sampled { plan: Plan, window: WindowSlice },
    Rendered { plan: Plan, window: WindowSlice, image_id: Uuid },
}

/// Generates chart images and records their metadata
pub struct ChartGenerator<S> {
    provider: Box<dyn HistoryProvider>,
    calendar: Box<dyn BusinessCalendar>,
    renderer: Box<dyn ChartRenderer>,
    sink: Mutex<S>,
    settings: GeneratorSettings,
    clock: fn() -> DateTime<Utc>,
}

impl<S: RecordSink> ChartGenerator<S> {
    pub fn new(
        provider: impl HistoryProvider + 'static,
        calendar: impl BusinessCalendar + 'static,
        renderer: impl ChartRenderer + 'static,
        sink: S,
        settings: GeneratorSettings,
    ) -> Self {
        Self {
            provider: Box::new(provider),
            calendar: Box::new(calendar),
            renderer: Box::new(renderer),
            sink: Mutex::new(sink),
            settings,
            clock: Utc::now,
        }
    }

    /// Replace the wall clock used to resolve date ranges
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    pub fn settings(&self) -> &GeneratorSettings {
        &self.settings
    }

    pub fn image_path(&self, image_id: &Uuid) -> PathBuf {
        image_path(&self.settings.image_dir, image_id)
    }

    /// Run `f` against the locked sink
    pub fn with_sink<T>(&self, f: impl FnOnce(&mut S) -> T) -> Result<T, SinkError> {
        let mut guard = self.sink.lock().map_err(|_| SinkError::Poisoned)?;
        Ok(f(&mut guard))
    }

    pub fn into_sink(self) -> Result<S, SinkError> {
        self.sink.into_inner().map_err(|_| SinkError::Poisoned)
    }

    /// [`generate`](Self::generate) with the default threshold and seed
    pub fn generate_default(&self, ticker: &Ticker) -> Result<GenerationRecord, GenerationError> {
        self.generate(ticker, DEFAULT_THRESHOLD, DEFAULT_SEED)
    }

    /// Produce one chart image for `ticker` and record it.
    ///
    /// `threshold` is the nominal window size before the chart kind's
    /// multiplier is applied.
    pub fn generate(
        &self,
        ticker: &Ticker,
        threshold: usize,
        seed: u64,
    ) -> Result<GenerationRecord, GenerationError> {
        let mut threshold = threshold;
        let mut retried = false;
        let mut frequency: Option<Frequency> = None;
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut state = State::Start;

        let fail = |stage: Stage, frequency: Option<Frequency>, threshold: usize, kind: ErrorKind| {
            GenerationError {
                ticker: ticker.clone(),
                frequency,
                threshold,
                stage,
                kind,
            }
        };

        loop {
            state = match state {
                State::Start => {
                    rng = ChaCha8Rng::seed_from_u64(seed);
                    let plan = self.plan(&mut rng);
                    frequency = Some(plan.frequency);
                    debug!(
                        "{}: {} (x{}) at {} over {}",
                        ticker, plan.kind, plan.multiplier, plan.frequency, plan.range
                    );

                    let series = data::fetch(self.provider.as_ref(), ticker, plan.frequency, &plan.range)
                        .map_err(|e| fail(Stage::Fetch, frequency, threshold, e.into()))?;
                    State::Fetched { plan, series }
                }

                State::Fetched { plan, series } => {
                    if self.settings.skip_coarse_validation && plan.frequency.is_coarser_than_daily() {
                        debug!("{}: skipping calendar validation at {}", ticker, plan.frequency);
                        State::Validated { plan, series }
                    } else {
                        match validation::validate(&series, self.calendar.as_ref()).into_result() {
                            Ok(()) => State::Validated { plan, series },
                            Err(err) if !retried => {
                                warn!(
                                    "{}: {} at {}, retrying with threshold {}",
                                    ticker,
                                    err,
                                    plan.frequency,
                                    threshold / 2
                                );
                                retried = true;
                                threshold /= 2;
                                State::Start
                            }
                            Err(err) => {
                                return Err(fail(Stage::Validate, frequency, threshold, err.into()))
                            }
                        }
                    }
                }

                State::Validated { plan, series } => {
                    let rows = sampler::window_rows(threshold, plan.multiplier);
                    let window = sampler::sample(&series, rows, &mut rng)
                        .map_err(|e| fail(Stage::Sample, frequency, threshold, e.into()))?;
                    debug!(
                        "{}: sampled rows {}..{} of {}",
                        ticker,
                        window.offset(),
                        window.offset() + window.len(),
                        series.len()
                    );
                    State::Sampled { plan, window }
                }

                State::Sampled { plan, window } => {
                    let image_id = Uuid::new_v4();
                    self.render(ticker, &plan, &window, &image_id, &mut rng)
                        .map_err(|e| fail(Stage::Render, frequency, threshold, e))?;
                    State::Rendered {
                        plan,
                        window,
                        image_id,
                    }
                }

                State::Rendered {
                    plan,
                    window,
                    image_id,
                } => {
                    let record = GenerationRecord {
                        image_id,
                        ticker: ticker.clone(),
                        chart_kind: plan.kind,
                        frequency: plan.frequency,
                        window_start: window.start(),
                        window_end: window.end(),
                    };

                    self.with_sink(|sink| sink.append(record.clone()))
                        .and_then(|appended| appended)
                        .map_err(|e| fail(Stage::Record, frequency, threshold, e.into()))?;

                    info!(
                        "Generated {} {} chart for {} ({} rows, {} to {}): {}",
                        plan.frequency,
                        plan.kind,
                        ticker,
                        window.len(),
                        record.window_start.format("%Y-%m-%d %H:%M"),
                        record.window_end.format("%Y-%m-%d %H:%M"),
                        image_id
                    );
                    return Ok(record);
                }
            };
        }
    }

    fn plan(&self, rng: &mut ChaCha8Rng) -> Plan {
        let (kind, multiplier) = chart::dispatch(self.settings.kind_selection, rng);
        let frequency = self
            .settings
            .frequency
            .unwrap_or_else(|| frequency::resolve_frequency(rng));
        let range = frequency::resolve_range_with(&self.settings.lookback_days, frequency, (self.clock)());
        Plan {
            kind,
            multiplier,
            frequency,
            range,
        }
    }

    fn render(
        &self,
        ticker: &Ticker,
        plan: &Plan,
        window: &WindowSlice,
        image_id: &Uuid,
        rng: &mut ChaCha8Rng,
    ) -> Result<(), ErrorKind> {
        let format: AxisFormat = axis::select_format(window, rng);
        let ticks = axis::tick_layout(window, &format);

        let price_field = match plan.kind {
            ChartKind::Line => Some(*PriceField::ALL.choose(rng).unwrap_or(&PriceField::Close)),
            _ => None,
        };
        let y_axis_title = match price_field {
            Some(field) => field.to_string(),
            None => ticker.to_string(),
        };

        let output_path = self.image_path(image_id);
        let request = RenderRequest {
            kind: plan.kind,
            window,
            ticker,
            frequency: plan.frequency,
            output_path: &output_path,
            ticks: &ticks,
            y_axis_title,
            price_field,
        };

        self.renderer.render(&request)?;
        Ok(())
    }
}

/// `{image_dir}/{image_id}.png`
pub fn image_path(image_dir: &Path, image_id: &Uuid) -> PathBuf {
    image_dir.join(format!("{}.png", image_id))
}
