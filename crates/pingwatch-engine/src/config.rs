use serde::{Deserialize, Deserializer};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(3);
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(1000);
pub const DEFAULT_MAX_CONCURRENCY: usize = 32;
pub const DEFAULT_HISTORY_WINDOW: usize = 20;
pub const DEFAULT_SMOOTHING_ALPHA: f64 = 0.3;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Everything a monitoring session needs to know up front.
///
/// On disk (JSON) the durations are plain integers: `interval_secs` and
/// `probe_timeout_ms`. Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MonitorConfig {
    pub targets: Vec<String>,
    #[serde(rename = "interval_secs", deserialize_with = "duration_from_secs")]
    pub interval: Duration,
    #[serde(rename = "probe_timeout_ms", deserialize_with = "duration_from_millis")]
    pub probe_timeout: Duration,
    pub max_concurrency: usize,
    pub history_window: usize,
    pub smoothing_alpha: f64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            targets: Vec::new(),
            interval: DEFAULT_INTERVAL,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            history_window: DEFAULT_HISTORY_WINDOW,
            smoothing_alpha: DEFAULT_SMOOTHING_ALPHA,
        }
    }
}

fn duration_from_secs<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    u64::deserialize(deserializer).map(Duration::from_secs)
}

fn duration_from_millis<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    u64::deserialize(deserializer).map(Duration::from_millis)
}

impl MonitorConfig {
    pub fn new<I, S>(targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            targets: targets.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    pub fn with_history_window(mut self, history_window: usize) -> Self {
        self.history_window = history_window;
        self
    }

    pub fn with_smoothing_alpha(mut self, alpha: f64) -> Self {
        self.smoothing_alpha = alpha;
        self
    }

    /// Targets with duplicates removed, keeping the first occurrence.
    pub fn distinct_targets(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.targets
            .iter()
            .filter(|target| seen.insert(target.as_str()))
            .cloned()
            .collect()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.targets.is_empty() {
            return Err(ConfigError::Invalid("no targets configured".to_string()));
        }
        if self.interval.is_zero() {
            return Err(ConfigError::Invalid("interval must be positive".to_string()));
        }
        if self.probe_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "probe timeout must be positive".to_string(),
            ));
        }
        if self.probe_timeout >= self.interval {
            return Err(ConfigError::Invalid(format!(
                "probe timeout ({} ms) must be shorter than the interval ({} ms)",
                self.probe_timeout.as_millis(),
                self.interval.as_millis()
            )));
        }
        if self.max_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "max concurrency must be at least 1".to_string(),
            ));
        }
        if self.history_window == 0 {
            return Err(ConfigError::Invalid(
                "history window must be at least 1".to_string(),
            ));
        }
        if !(self.smoothing_alpha > 0.0 && self.smoothing_alpha <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "smoothing alpha must be in (0, 1], got {}",
                self.smoothing_alpha
            )));
        }
        Ok(())
    }
}
