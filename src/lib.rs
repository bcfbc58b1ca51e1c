//! Chart Synth
//!
//! Generates labelled chart images from historical OHLCV market data:
//! fetch a series, check it against a trading calendar, sample a window,
//! render it as a candlestick, line or bar+line chart and record what was
//! drawn.

pub mod axis;
pub mod calendar;
pub mod chart;
pub mod config;
pub mod data;
pub mod error;
pub mod frequency;
pub mod generator;
pub mod render;
pub mod sampler;
pub mod sink;
pub mod types;
pub mod validation;

pub use calendar::{BusinessCalendar, UsFederalCalendar, WeekdayCalendar};
pub use chart::{ChartKind, ChartRenderer, KindSelection, RenderRequest};
pub use config::Config;
pub use data::{CsvProvider, HistoryProvider, YahooProvider};
pub use error::{GenerationError, ProviderError, Stage};
pub use frequency::{DateRange, Frequency};
pub use generator::{ChartGenerator, GeneratorSettings, DEFAULT_SEED, DEFAULT_THRESHOLD};
pub use render::PlottersRenderer;
pub use sink::{CsvSink, MemorySink, RecordSink, SharedSink};
pub use types::*;
