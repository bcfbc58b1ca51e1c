//! Configuration management
//!
//! Handles loading and parsing of JSON configuration files with environment
//! variable overrides for paths and the provider endpoint.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::chart::KindSelection;
use crate::data::{DEFAULT_TIMEOUT_SECS, DEFAULT_USER_AGENT, YAHOO_CHART_URL};
use crate::frequency::{default_lookback_table, validate_lookback, Frequency, LookbackTable};
use crate::generator::{DEFAULT_SEED, DEFAULT_THRESHOLD};
use crate::sink::{MemorySink, DEFAULT_CAPACITY};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub provider: ProviderConfig,
    pub output: OutputConfig,
    pub generation: GenerationConfig,
    pub calendar: CalendarConfig,
}

impl Config {
    /// Load configuration from JSON file, then apply environment overrides
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref()).context("Failed to read config file")?;
        let mut config: Config =
            serde_json::from_str(&contents).context("Failed to parse config JSON")?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Load `path` when it exists, otherwise defaults
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        if path.as_ref().exists() {
            Self::from_file(path)
        } else {
            let mut config = Config::default();
            config.apply_env();
            config.validate()?;
            Ok(config)
        }
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        validate_lookback(&self.generation.lookback_days)
            .map_err(anyhow::Error::msg)
            .context("Invalid generation.lookback_days")?;

        if self.output.width == 0 || self.output.height == 0 {
            anyhow::bail!(
                "Invalid output size {}x{}: width and height must be positive",
                self.output.width,
                self.output.height
            );
        }
        if self.output.buffer_capacity == 0 {
            anyhow::bail!("Invalid output.buffer_capacity: must be positive");
        }
        Ok(())
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("CHART_SYNTH_PROVIDER_URL") {
            self.provider.base_url = url;
        }
        if let Ok(dir) = std::env::var("CHART_SYNTH_DATA_DIR") {
            self.provider.data_dir = Some(dir);
        }
        if let Ok(dir) = std::env::var("CHART_SYNTH_IMAGE_DIR") {
            self.output.image_dir = dir;
        }
        if let Ok(path) = std::env::var("CHART_SYNTH_METADATA_PATH") {
            self.output.metadata_path = path;
        }
    }
}

/// Market data provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    pub user_agent: String,
    /// Serve histories from `{TICKER}_{freq}.csv` files instead of HTTP
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
}

impl ProviderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        ProviderConfig {
            base_url: YAHOO_CHART_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            data_dir: None,
        }
    }
}

/// Where generation records go during a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetadataSink {
    /// Append each record to `metadata_path` as it is produced
    #[default]
    Csv,
    /// Buffer up to `buffer_capacity` records, export to `metadata_path` at the end
    Memory,
}

impl FromStr for MetadataSink {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(MetadataSink::Csv),
            "memory" => Ok(MetadataSink::Memory),
            other => Err(format!("unknown metadata sink '{}', expected csv or memory", other)),
        }
    }
}

/// Image and metadata output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub image_dir: String,
    pub metadata_path: String,
    pub metadata_sink: MetadataSink,
    pub width: u32,
    pub height: u32,
    /// Maximum records held by the memory sink before the oldest are evicted
    pub buffer_capacity: usize,
}

impl OutputConfig {
    /// In-memory record buffer bounded by `buffer_capacity`
    pub fn memory_sink(&self) -> MemorySink {
        MemorySink::new(self.buffer_capacity)
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            image_dir: "images".to_string(),
            metadata_path: "images/metadata.csv".to_string(),
            metadata_sink: MetadataSink::Csv,
            width: 1200,
            height: 700,
            buffer_capacity: DEFAULT_CAPACITY,
        }
    }
}

/// Pipeline parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub threshold: usize,
    pub seed: u64,
    pub kind_selection: KindSelection,
    /// Fixed frequency; random from the catalog when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency: Option<Frequency>,
    pub lookback_days: LookbackTable,
    /// Skip calendar validation for bars wider than a day
    pub skip_coarse_validation: bool,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        GenerationConfig {
            threshold: DEFAULT_THRESHOLD,
            seed: DEFAULT_SEED,
            kind_selection: KindSelection::Entropy,
            frequency: None,
            lookback_days: default_lookback_table(),
            skip_coarse_validation: false,
        }
    }
}

/// Trading calendar configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CalendarConfig {
    /// Market closures in addition to US federal holidays
    pub extra_holidays: Vec<NaiveDate>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::ChartKind;

    #[test]
    fn test_partial_config_uses_defaults() {
        let json = r#"{
            "output": { "image_dir": "out" },
            "generation": { "threshold": 120, "kind_selection": { "fixed": "line" }, "frequency": "1d" }
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();

        assert_eq!(config.output.image_dir, "out");
        assert_eq!(config.output.width, 1200);
        assert_eq!(config.generation.threshold, 120);
        assert_eq!(config.generation.seed, DEFAULT_SEED);
        assert_eq!(config.generation.frequency, Some(Frequency::Day1));
        assert_eq!(
            config.generation.kind_selection,
            KindSelection::Fixed(ChartKind::Line)
        );
        assert_eq!(config.provider.base_url, YAHOO_CHART_URL);
    }

    #[test]
    fn test_lookback_override_replaces_table() {
        let json = r#"{ "generation": { "lookback_days": { "60m": 700 } } }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.generation.lookback_days.len(), 1);
        assert_eq!(config.generation.lookback_days.get(&Frequency::Min60), Some(&700));
    }

    #[test]
    fn test_out_of_range_lookback_rejected_on_load() {
        for days in ["100000000", "-30", "0"] {
            let path = std::env::temp_dir().join(format!("chart-synth-config-{}.json", uuid::Uuid::new_v4()));
            fs::write(&path, format!(r#"{{ "generation": {{ "lookback_days": {{ "1d": {} }} }} }}"#, days)).unwrap();

            let err = Config::from_file(&path).unwrap_err();
            assert!(format!("{:#}", err).contains("lookback"), "{} days accepted", days);
            fs::remove_file(path).ok();
        }
    }

    #[test]
    fn test_memory_sink_sized_from_config() {
        let json = r#"{ "output": { "metadata_sink": "memory", "buffer_capacity": 2 } }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.output.metadata_sink, MetadataSink::Memory);

        let sink = config.output.memory_sink();
        assert_eq!(sink.capacity(), 2);
        assert_eq!(Config::default().output.memory_sink().capacity(), DEFAULT_CAPACITY);
        assert_eq!(Config::default().output.metadata_sink, MetadataSink::Csv);
    }

    #[test]
    fn test_parse_metadata_sink() {
        assert_eq!("Memory".parse::<MetadataSink>().unwrap(), MetadataSink::Memory);
        assert_eq!("csv".parse::<MetadataSink>().unwrap(), MetadataSink::Csv);
        assert!("sqlite".parse::<MetadataSink>().is_err());
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_calendar_holidays_parse() {
        let json = r#"{ "calendar": { "extra_holidays": ["2024-03-29"] } }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(
            config.calendar.extra_holidays,
            vec![NaiveDate::from_ymd_opt(2024, 3, 29).unwrap()]
        );
    }

    #[test]
    fn test_default_round_trip() {
        let json = serde_json::to_string(&Config::default()).unwrap();
        let parsed: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.generation.lookback_days, default_lookback_table());
        assert_eq!(parsed.output.buffer_capacity, DEFAULT_CAPACITY);
    }
}
