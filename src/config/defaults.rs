/// Configuration default values
///
/// This module contains all the default values and accepted ranges for
/// configuration options, kept in one place so deployments can see them at a
/// glance.
use std::time::Duration;

// Config refresh loop
pub const DEFAULT_CONFIG_REFRESH_INTERVAL_SECS: u64 = 10;
pub const MIN_INTERVAL_SECS: u64 = 1;
pub const MAX_INTERVAL_SECS: u64 = 600;

// Monitor loop
pub const DEFAULT_MONITOR_INTERVAL_SECS: u64 = 4;

// Process sampling
pub const DEFAULT_SAMPLING_DELAY: Duration = Duration::from_secs(1);
pub const MIN_SAMPLING_DELAY: Duration = Duration::from_millis(10);
pub const MAX_SAMPLING_DELAY: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_CONCURRENT_SAMPLES: usize = 1;
pub const MAX_CONCURRENT_SAMPLES: usize = 64;
pub const DEFAULT_CASE_SENSITIVE_MATCH: bool = false;

// Remote endpoints
pub const DEFAULT_CONFIG_URL: &str = "http://localhost:8080/config";
pub const DEFAULT_RESULTS_URL: &str = "http://localhost:8080/results";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// Logging
pub const DEFAULT_LOG_LEVEL: &str = "info";

// Config file lookup
pub const DEFAULT_CONFIG_FILE: &str = "epmon.toml";
pub const CONFIG_FILE_ENV: &str = "EPMON_CONFIG_FILE";
