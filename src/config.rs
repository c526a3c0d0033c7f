//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and `AGESCOPE_*` environment variable overrides.

use crate::histogram::{
    hourly_buckets, tiered_buckets, AgeBucket, AgeHistogram, DEFAULT_HOURLY_BUCKETS,
    DEFAULT_TIERED_DAYS,
};
use crate::promql::{parse_duration, EngineOpts};
use crate::report::ReportFormat;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub profiler: ProfilerConfig,

    #[serde(default)]
    pub buckets: BucketsConfig,

    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Replay pool and output settings
#[derive(Debug, Clone, Deserialize)]
pub struct ProfilerConfig {
    /// Maximum number of queries replayed at once
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    #[serde(default)]
    pub report_format: ReportFormat,
}

fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            report_format: ReportFormat::default(),
        }
    }
}

/// Histogram bucket layout
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "layout", rename_all = "lowercase")]
pub enum BucketsConfig {
    /// `count` one-hour buckets
    Hourly {
        #[serde(default = "default_hourly_count")]
        count: usize,
    },
    /// `[0, 13h)`, `[12h, 24h)`, then daily buckets out to `days`
    Tiered {
        #[serde(default = "default_tiered_days")]
        days: usize,
    },
    /// Explicit buckets with Prometheus-style durations
    Custom { buckets: Vec<CustomBucket> },
}

fn default_hourly_count() -> usize {
    DEFAULT_HOURLY_BUCKETS
}

fn default_tiered_days() -> usize {
    DEFAULT_TIERED_DAYS
}

impl Default for BucketsConfig {
    fn default() -> Self {
        Self::Tiered {
            days: default_tiered_days(),
        }
    }
}

/// One configured bucket, e.g. `{ start = "12h", end = "1d" }`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CustomBucket {
    pub start: String,
    /// Omitted for an open-ended last bucket
    pub end: Option<String>,
}

impl BucketsConfig {
    /// Resolve the layout into concrete buckets
    pub fn resolve(&self) -> Result<Vec<AgeBucket>, ConfigError> {
        match self {
            Self::Hourly { count } => Ok(hourly_buckets(*count)),
            Self::Tiered { days } => Ok(tiered_buckets(*days)),
            Self::Custom { buckets } => buckets
                .iter()
                .map(|b| {
                    let start = config_duration("buckets.start", &b.start)?;
                    match &b.end {
                        Some(end) => Ok(AgeBucket::new(start, config_duration("buckets.end", end)?)),
                        None => Ok(AgeBucket::open(start)),
                    }
                })
                .collect(),
        }
    }

    /// Build an empty histogram with this layout
    pub fn build(&self) -> Result<AgeHistogram, ConfigError> {
        AgeHistogram::new(self.resolve()?).map_err(|e| ConfigError::InvalidBuckets(e.to_string()))
    }
}

fn config_duration(field: &'static str, value: &str) -> Result<chrono::Duration, ConfigError> {
    parse_duration(value)
        .map(chrono::Duration::milliseconds)
        .map_err(|_| ConfigError::InvalidDuration {
            field,
            value: value.to_string(),
        })
}

/// Evaluation engine settings
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_lookback_delta")]
    pub lookback_delta_secs: u64,

    /// Step of subqueries that do not give one
    #[serde(default = "default_subquery_step")]
    pub subquery_step_secs: u64,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Unlimited when absent
    pub max_samples: Option<usize>,
}

fn default_lookback_delta() -> u64 {
    300
}

fn default_subquery_step() -> u64 {
    60
}

fn default_timeout() -> u64 {
    60
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lookback_delta_secs: default_lookback_delta(),
            subquery_step_secs: default_subquery_step(),
            timeout_secs: default_timeout(),
            max_samples: None,
        }
    }
}

impl EngineConfig {
    pub fn engine_opts(&self) -> EngineOpts {
        EngineOpts {
            lookback_delta: secs(self.lookback_delta_secs),
            no_step_subquery_interval: secs(self.subquery_step_secs),
            timeout: std::time::Duration::from_secs(self.timeout_secs),
            max_samples: self.max_samples.unwrap_or(usize::MAX),
        }
    }
}

fn secs(s: u64) -> chrono::Duration {
    chrono::Duration::seconds(i64::try_from(s).unwrap_or(i64::MAX).min(i64::MAX / 1000))
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Default config file locations, in search order
    pub fn default_paths() -> Vec<PathBuf> {
        dirs::config_dir()
            .map(|p| p.join("agescope").join("config.toml"))
            .into_iter()
            .chain(std::iter::once(PathBuf::from("./agescope.toml")))
            .collect()
    }

    /// Load the first existing file among `candidates`, or the environment
    /// alone when none exists
    ///
    /// A file that exists but cannot be loaded is an error.
    pub fn load_first(candidates: &[PathBuf]) -> Result<(Self, Option<PathBuf>), ConfigError> {
        match candidates.iter().find(|path| path.exists()) {
            Some(path) => Ok((Self::load_with_env(path)?, Some(path.clone()))),
            None => Ok((Self::from_env(), None)),
        }
    }

    /// Load from default locations or environment
    pub fn load_default() -> Result<(Self, Option<PathBuf>), ConfigError> {
        Self::load_first(&Self::default_paths())
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        // Profiler overrides
        if let Some(n) = var("AGESCOPE_CONCURRENCY").and_then(|v| v.parse().ok()) {
            self.profiler.concurrency = n;
        }

        // Engine overrides
        if let Some(secs) = var("AGESCOPE_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.engine.timeout_secs = secs;
        }
        if let Some(n) = var("AGESCOPE_MAX_SAMPLES").and_then(|v| v.parse().ok()) {
            self.engine.max_samples = Some(n);
        }

        // Logging overrides
        if let Some(level) = var("AGESCOPE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = var("AGESCOPE_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Invalid duration for {field}: {value:?}")]
    InvalidDuration { field: &'static str, value: String },

    #[error("Invalid bucket configuration: {0}")]
    InvalidBuckets(String),
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# agescope configuration
#
# Environment variables override these settings:
# - AGESCOPE_CONCURRENCY
# - AGESCOPE_TIMEOUT_SECS
# - AGESCOPE_MAX_SAMPLES
# - AGESCOPE_LOG_LEVEL
# - AGESCOPE_LOG_FORMAT

[profiler]
# Queries replayed at once (defaults to the number of CPUs)
# concurrency = 8

# Histogram report format: csv or json
report_format = "csv"

[buckets]
# hourly: `count` one-hour buckets
# tiered: [0, 13h), [12h, 24h), then one bucket per day out to `days`
# custom: explicit list, e.g.
#   layout = "custom"
#   buckets = [{ start = "0s", end = "2h" }, { start = "2h" }]
layout = "tiered"
days = 395

[engine]
# How far back instant selectors look for a sample (seconds)
lookback_delta_secs = 300

# Step of subqueries without an explicit one (seconds)
subquery_step_secs = 60

# Per-query evaluation timeout (seconds)
timeout_secs = 60

# Samples one query may load; unlimited when unset
# max_samples = 50000000

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}
