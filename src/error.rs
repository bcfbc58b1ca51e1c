//! Error taxonomy for the generation pipeline

use chrono::NaiveDate;
use std::fmt;
use thiserror::Error;

use crate::frequency::Frequency;
use crate::types::Ticker;

/// Market data provider failures. Never retried by the pipeline.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("unknown ticker: {0}")]
    UnknownTicker(String),

    #[error("rate limit exceeded")]
    RateLimited,

    #[error("no data for {ticker} at {frequency}")]
    NoData { ticker: String, frequency: Frequency },

    #[error("network error: {0}")]
    Network(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

impl From<csv::Error> for ProviderError {
    fn from(err: csv::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

/// Expected trading dates missing from a fetched series
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{} expected trading date(s) missing between {first} and {last}", .missing.len())]
pub struct CalendarValidationError {
    pub first: NaiveDate,
    pub last: NaiveDate,
    pub missing: Vec<NaiveDate>,
}

/// Chart drawing or persistence failures
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("invalid data shape: {0}")]
    InvalidData(String),

    #[error("drawing failed: {0}")]
    Draw(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Record sink failures
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink lock poisoned")]
    Poisoned,

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Pipeline stage a request failed in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetch,
    Validate,
    Sample,
    Render,
    Record,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Fetch => "fetch",
            Stage::Validate => "validate",
            Stage::Sample => "sample",
            Stage::Render => "render",
            Stage::Record => "record",
        };
        f.write_str(name)
    }
}

/// Failure cause of a generation request
#[derive(Debug, Error)]
pub enum ErrorKind {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    CalendarValidation(#[from] CalendarValidationError),

    #[error(transparent)]
    InsufficientData(#[from] InsufficientData),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Sink(#[from] SinkError),
}

/// A failed generation request with enough context to decide on a retry
#[derive(Debug, Error)]
#[error("{stage} failed for {ticker} (frequency: {}, threshold: {threshold}): {kind}", .frequency.map(|f| f.as_str()).unwrap_or("-"))]
pub struct GenerationError {
    pub ticker: Ticker,
    pub frequency: Option<Frequency>,
    pub threshold: usize,
    pub stage: Stage,
    #[source]
    pub kind: ErrorKind,
}

impl GenerationError {
    pub fn is_provider(&self) -> bool {
        matches!(self.kind, ErrorKind::Provider(_))
    }

    pub fn is_calendar_validation(&self) -> bool {
        matches!(self.kind, ErrorKind::CalendarValidation(_))
    }

    pub fn is_insufficient_data(&self) -> bool {
        matches!(self.kind, ErrorKind::InsufficientData(_))
    }
}

/// Window cannot be sampled: `required` rows must be positive and below `available`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("insufficient data: cannot sample {required} rows from {available}")]
pub struct InsufficientData {
    pub required: usize,
    pub available: usize,
}
