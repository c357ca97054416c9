use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;
use url::Url;

use crate::errors::{AppError, AppResult};

pub mod defaults;
pub mod duration_serde;

use defaults::*;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub endpoints: EndpointsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Timing and sampling behaviour of the two loops
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Seconds between config source fetches
    #[serde(default = "default_config_refresh_interval")]
    pub config_refresh_interval: u64,

    /// Seconds between monitor ticks
    #[serde(default = "default_monitor_interval")]
    pub monitor_interval: u64,

    /// Delay between the two counter snapshots of one sample
    #[serde(default = "default_sampling_delay", with = "duration_serde::duration")]
    pub sampling_delay: Duration,

    /// Upper bound on samples taken in parallel within one tick
    #[serde(default = "default_max_concurrent_samples")]
    pub max_concurrent_samples: usize,

    /// Match watched names against executables case-sensitively
    #[serde(default = "default_case_sensitive_match")]
    pub case_sensitive_match: bool,

    #[serde(default)]
    pub memory_metric: MemoryMetric,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointsConfig {
    #[serde(default = "default_config_url")]
    pub config_url: String,
    #[serde(default = "default_results_url")]
    pub results_url: String,
    #[serde(default = "default_request_timeout", with = "duration_serde::duration")]
    pub request_timeout: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

/// Which memory counter is reported as `Memory`. Both are in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryMetric {
    /// Virtual memory size (`vsize`)
    #[default]
    Virtual,
    /// Resident set size (`rss`)
    Resident,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Raw command-line values layered over the file configuration.
///
/// Kept as strings so a malformed value degrades to the default instead of
/// aborting argument parsing.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub config_refresh_interval: Option<String>,
    pub monitor_interval: Option<String>,
    pub config_url: Option<String>,
    pub results_url: Option<String>,
    pub log_level: Option<String>,
}

fn default_config_refresh_interval() -> u64 {
    DEFAULT_CONFIG_REFRESH_INTERVAL_SECS
}

fn default_monitor_interval() -> u64 {
    DEFAULT_MONITOR_INTERVAL_SECS
}

fn default_sampling_delay() -> Duration {
    DEFAULT_SAMPLING_DELAY
}

fn default_max_concurrent_samples() -> usize {
    DEFAULT_MAX_CONCURRENT_SAMPLES
}

fn default_case_sensitive_match() -> bool {
    DEFAULT_CASE_SENSITIVE_MATCH
}

fn default_config_url() -> String {
    DEFAULT_CONFIG_URL.to_string()
}

fn default_results_url() -> String {
    DEFAULT_RESULTS_URL.to_string()
}

fn default_request_timeout() -> Duration {
    DEFAULT_REQUEST_TIMEOUT
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            config_refresh_interval: default_config_refresh_interval(),
            monitor_interval: default_monitor_interval(),
            sampling_delay: default_sampling_delay(),
            max_concurrent_samples: default_max_concurrent_samples(),
            case_sensitive_match: default_case_sensitive_match(),
            memory_metric: MemoryMetric::default(),
        }
    }
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            config_url: default_config_url(),
            results_url: default_results_url(),
            request_timeout: default_request_timeout(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

impl AgentConfig {
    pub fn config_refresh_period(&self) -> Duration {
        Duration::from_secs(self.config_refresh_interval)
    }

    pub fn monitor_period(&self) -> Duration {
        Duration::from_secs(self.monitor_interval)
    }
}

/// Parse a loop interval in whole seconds, rejecting anything outside
/// `MIN_INTERVAL_SECS..=MAX_INTERVAL_SECS`.
pub fn parse_interval(raw: &str) -> Option<u64> {
    raw.trim()
        .parse::<u64>()
        .ok()
        .filter(|secs| (MIN_INTERVAL_SECS..=MAX_INTERVAL_SECS).contains(secs))
}

fn valid_endpoint(raw: &str) -> bool {
    matches!(Url::parse(raw), Ok(url) if matches!(url.scheme(), "http" | "https"))
}

impl Config {
    /// Which file to read: an explicit path wins, then `$EPMON_CONFIG_FILE`,
    /// then `epmon.toml` in the working directory.
    pub fn resolve_path(explicit: Option<PathBuf>) -> PathBuf {
        explicit.unwrap_or_else(|| {
            std::env::var(CONFIG_FILE_ENV)
                .unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string())
                .into()
        })
    }

    /// Read `config_file` if it exists, otherwise fall back to defaults.
    ///
    /// Only a file that exists but cannot be read or parsed is an error.
    pub fn load_from_file<P: AsRef<Path>>(config_file: P) -> AppResult<Self> {
        let path = config_file.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::configuration(format!("failed to read {}: {}", path.display(), e))
        })?;
        toml::from_str(&contents).map_err(|e| {
            AppError::configuration(format!("failed to parse {}: {}", path.display(), e))
        })
    }

    /// Layer command-line values over the loaded configuration. Values that
    /// don't parse are dropped with a warning and the current value is kept.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(raw) = &overrides.config_refresh_interval {
            match parse_interval(raw) {
                Some(secs) => self.agent.config_refresh_interval = secs,
                None => warn!(
                    "Ignoring invalid config refresh interval '{}' (expected {}-{} seconds)",
                    raw, MIN_INTERVAL_SECS, MAX_INTERVAL_SECS
                ),
            }
        }
        if let Some(raw) = &overrides.monitor_interval {
            match parse_interval(raw) {
                Some(secs) => self.agent.monitor_interval = secs,
                None => warn!(
                    "Ignoring invalid monitor interval '{}' (expected {}-{} seconds)",
                    raw, MIN_INTERVAL_SECS, MAX_INTERVAL_SECS
                ),
            }
        }
        if let Some(url) = &overrides.config_url {
            self.endpoints.config_url = url.clone();
        }
        if let Some(url) = &overrides.results_url {
            self.endpoints.results_url = url.clone();
        }
        if let Some(level) = &overrides.log_level {
            self.logging.level = level.clone();
        }
    }

    /// Replace every out-of-range value with its default. Never fails; each
    /// replacement is reported with a warning.
    pub fn sanitize(&mut self) {
        let agent = &mut self.agent;

        if !(MIN_INTERVAL_SECS..=MAX_INTERVAL_SECS).contains(&agent.config_refresh_interval) {
            warn!(
                "config_refresh_interval {}s out of range {}-{}s, using default {}s",
                agent.config_refresh_interval,
                MIN_INTERVAL_SECS,
                MAX_INTERVAL_SECS,
                DEFAULT_CONFIG_REFRESH_INTERVAL_SECS
            );
            agent.config_refresh_interval = DEFAULT_CONFIG_REFRESH_INTERVAL_SECS;
        }

        if !(MIN_INTERVAL_SECS..=MAX_INTERVAL_SECS).contains(&agent.monitor_interval) {
            warn!(
                "monitor_interval {}s out of range {}-{}s, using default {}s",
                agent.monitor_interval,
                MIN_INTERVAL_SECS,
                MAX_INTERVAL_SECS,
                DEFAULT_MONITOR_INTERVAL_SECS
            );
            agent.monitor_interval = DEFAULT_MONITOR_INTERVAL_SECS;
        }

        if !(MIN_SAMPLING_DELAY..=MAX_SAMPLING_DELAY).contains(&agent.sampling_delay) {
            warn!(
                "sampling_delay {:?} out of range {:?}-{:?}, using default {:?}",
                agent.sampling_delay, MIN_SAMPLING_DELAY, MAX_SAMPLING_DELAY, DEFAULT_SAMPLING_DELAY
            );
            agent.sampling_delay = DEFAULT_SAMPLING_DELAY;
        }

        if !(1..=MAX_CONCURRENT_SAMPLES).contains(&agent.max_concurrent_samples) {
            warn!(
                "max_concurrent_samples {} out of range 1-{}, using default {}",
                agent.max_concurrent_samples, MAX_CONCURRENT_SAMPLES, DEFAULT_MAX_CONCURRENT_SAMPLES
            );
            agent.max_concurrent_samples = DEFAULT_MAX_CONCURRENT_SAMPLES;
        }

        let endpoints = &mut self.endpoints;
        if !valid_endpoint(&endpoints.config_url) {
            warn!(
                "config_url '{}' is not a valid http(s) URL, using default {}",
                endpoints.config_url, DEFAULT_CONFIG_URL
            );
            endpoints.config_url = DEFAULT_CONFIG_URL.to_string();
        }
        if !valid_endpoint(&endpoints.results_url) {
            warn!(
                "results_url '{}' is not a valid http(s) URL, using default {}",
                endpoints.results_url, DEFAULT_RESULTS_URL
            );
            endpoints.results_url = DEFAULT_RESULTS_URL.to_string();
        }
        if endpoints.request_timeout.is_zero() {
            warn!(
                "request_timeout must be non-zero, using default {:?}",
                DEFAULT_REQUEST_TIMEOUT
            );
            endpoints.request_timeout = DEFAULT_REQUEST_TIMEOUT;
        }

        if self.logging.level.parse::<tracing::Level>().is_err() {
            warn!(
                "Unknown log level '{}', using '{}'",
                self.logging.level, DEFAULT_LOG_LEVEL
            );
            self.logging.level = DEFAULT_LOG_LEVEL.to_string();
        }
    }
}
