//! Domain and wire types shared by the sampler and the two loops.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// ctime(3) layout without the trailing newline, e.g. `Sat Oct 17 04:04:00 2026`
pub const CTIME_FORMAT: &str = "%a %b %e %H:%M:%S %Y";

/// Outcome of one sampling attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleStatus {
    /// Both snapshots were captured and the usage figures are real
    Measured,
    /// No running process matched the watched name
    NotRunning,
    /// A process matched but exited before the second snapshot
    Exited,
    /// The process listing could not be read at all
    ProcUnavailable,
    /// A process matched but its counters could not be read or parsed
    CountersUnreadable,
}

/// One measurement of one watched name.
///
/// Unresolved samples carry no pid and zeroed usage figures.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessSample {
    pub name: String,
    pub pid: Option<u32>,
    /// User-mode CPU (self + reaped children) as a percentage of all CPU time
    pub cpu_percent: f64,
    /// System-mode CPU (self + reaped children), same normalization
    pub system_cpu_percent: f64,
    /// Bytes, virtual or resident depending on configuration
    pub memory_bytes: f64,
    pub captured_at: DateTime<Local>,
    pub status: SampleStatus,
}

impl ProcessSample {
    /// A zero-valued sample for a name that could not be measured
    pub fn unresolved(name: impl Into<String>, status: SampleStatus) -> Self {
        Self {
            name: name.into(),
            pid: None,
            cpu_percent: 0.0,
            system_cpu_percent: 0.0,
            memory_bytes: 0.0,
            captured_at: Local::now(),
            status,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.status == SampleStatus::Measured && self.pid.is_some()
    }

    /// Wire form of a measured sample; `None` for anything unresolved
    pub fn to_entry(&self) -> Option<HealthcheckEntry> {
        if !self.is_resolved() {
            return None;
        }
        let pid = self.pid?;
        Some(HealthcheckEntry {
            app: self.name.clone(),
            timestamp: self.captured_at.format(CTIME_FORMAT).to_string(),
            pid,
            cpu: self.cpu_percent,
            memory: self.memory_bytes,
        })
    }
}

/// Body returned by the config source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppListPayload {
    pub applications: Vec<String>,
}

/// One entry of the `healthcheck` array
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthcheckEntry {
    pub app: String,
    pub timestamp: String,
    #[serde(rename = "PID")]
    pub pid: u32,
    #[serde(rename = "CPU")]
    pub cpu: f64,
    #[serde(rename = "Memory")]
    pub memory: f64,
}

/// Body POSTed to the results collector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthcheckReport {
    pub healthcheck: Vec<HealthcheckEntry>,
}

impl HealthcheckReport {
    /// Build a report from the measured samples only; `None` when nothing
    /// was measured, since an empty report is never sent.
    pub fn from_samples<'a, I>(samples: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a ProcessSample>,
    {
        let healthcheck: Vec<_> = samples
            .into_iter()
            .filter_map(ProcessSample::to_entry)
            .collect();
        if healthcheck.is_empty() {
            None
        } else {
            Some(Self { healthcheck })
        }
    }

    pub fn len(&self) -> usize {
        self.healthcheck.len()
    }

    pub fn is_empty(&self) -> bool {
        self.healthcheck.is_empty()
    }
}
