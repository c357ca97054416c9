//! Process sampling
//!
//! Resolves a watched name to a live process and measures it with two counter
//! snapshots taken `sampling_delay` apart. CPU utilization is
//!
//! ```text
//! cpu% = 100 * ((utime2 + cutime2) - (utime1 + cutime1)) / (total_cpu2 - total_cpu1)
//! ```
//!
//! where `total_cpu` is the sum of the machine-wide `cpu` counters, so the
//! figure is a share of all CPU time across all cores. Memory is taken from
//! the second snapshot.

pub mod procfs;

use chrono::Local;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::config::{AgentConfig, MemoryMetric};
use crate::errors::{SamplerError, SamplerResult};
use crate::models::{ProcessSample, SampleStatus};

pub use procfs::{LinuxProcFs, ProcSource, ProcessEntry, RawProcSnapshot};

/// CPU shares derived from a pair of snapshots
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CpuUsage {
    pub user_percent: f64,
    pub system_percent: f64,
}

/// Compute user and system CPU percentages between two snapshots.
///
/// A zero (or backwards) machine-wide tick delta yields 0.0 for both, with a
/// warning. A negative per-process delta, which only happens if the pid was
/// reused between snapshots, clamps to 0.0.
pub fn cpu_usage(before: &RawProcSnapshot, after: &RawProcSnapshot) -> CpuUsage {
    if after.total_cpu <= before.total_cpu {
        warn!(
            "Total CPU tick delta is zero between snapshots ({} -> {}), reporting 0% CPU",
            before.total_cpu, after.total_cpu
        );
        return CpuUsage {
            user_percent: 0.0,
            system_percent: 0.0,
        };
    }

    let total_delta = (after.total_cpu - before.total_cpu) as f64;
    let share = |now: u64, then: u64| -> f64 {
        let delta = now as f64 - then as f64;
        (100.0 * delta / total_delta).max(0.0)
    };

    CpuUsage {
        user_percent: share(after.utime + after.cutime, before.utime + before.cutime),
        system_percent: share(after.stime + after.cstime, before.stime + before.cstime),
    }
}

/// Substring match of a watched name against an executable name.
///
/// An empty or blank needle never matches.
pub fn name_matches(executable: &str, needle: &str, case_sensitive: bool) -> bool {
    if needle.trim().is_empty() {
        return false;
    }
    if case_sensitive {
        executable.contains(needle)
    } else {
        executable.to_lowercase().contains(&needle.to_lowercase())
    }
}

fn status_for(err: &SamplerError) -> SampleStatus {
    match err {
        SamplerError::ProcUnavailable { .. } => SampleStatus::ProcUnavailable,
        SamplerError::NotFound { .. } => SampleStatus::NotRunning,
        SamplerError::ProcessExited { .. } => SampleStatus::Exited,
        SamplerError::CountersUnreadable { .. } | SamplerError::MalformedCounters { .. } => {
            SampleStatus::CountersUnreadable
        }
    }
}

/// Measures watched processes. Holds no state between calls.
#[derive(Clone)]
pub struct ProcessSampler {
    source: Arc<dyn ProcSource>,
    delay: Duration,
    case_sensitive: bool,
    memory_metric: MemoryMetric,
}

impl ProcessSampler {
    pub fn new(source: Arc<dyn ProcSource>, delay: Duration) -> Self {
        Self {
            source,
            delay,
            case_sensitive: false,
            memory_metric: MemoryMetric::Virtual,
        }
    }

    pub fn from_config(source: Arc<dyn ProcSource>, config: &AgentConfig) -> Self {
        Self::new(source, config.sampling_delay)
            .with_case_sensitive(config.case_sensitive_match)
            .with_memory_metric(config.memory_metric)
    }

    pub fn with_case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    pub fn with_memory_metric(mut self, memory_metric: MemoryMetric) -> Self {
        self.memory_metric = memory_metric;
        self
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Resolve a watched name to the first matching pid in enumeration order.
    pub fn resolve(&self, name: &str) -> SamplerResult<u32> {
        self.source
            .processes()?
            .into_iter()
            .find(|entry| name_matches(&entry.executable, name, self.case_sensitive))
            .map(|entry| entry.pid)
            .ok_or_else(|| SamplerError::NotFound {
                name: name.to_string(),
            })
    }

    /// Take one sample of `name`. Never fails: anything that prevents a
    /// measurement produces a zero-valued sample with a non-`Measured` status.
    pub async fn sample(&self, name: &str) -> ProcessSample {
        let pid = match self.resolve(name) {
            Ok(pid) => pid,
            Err(e) => return self.unresolved(name, None, e),
        };

        let before = match self.source.snapshot(pid) {
            Ok(snapshot) => snapshot,
            Err(e) => return self.unresolved(name, Some(pid), e),
        };

        tokio::time::sleep(self.delay).await;

        let after = match self.source.snapshot(pid) {
            Ok(snapshot) => snapshot,
            Err(e) => return self.unresolved(name, Some(pid), e),
        };

        let usage = cpu_usage(&before, &after);
        let memory_bytes = match self.memory_metric {
            MemoryMetric::Virtual => after.vsize,
            MemoryMetric::Resident => after.rss,
        } as f64;

        debug!(
            "Sampled '{}' (pid {}): user cpu {:.3}%, system cpu {:.3}%, memory {} bytes",
            name, pid, usage.user_percent, usage.system_percent, memory_bytes
        );

        ProcessSample {
            name: name.to_string(),
            pid: Some(pid),
            cpu_percent: usage.user_percent,
            system_cpu_percent: usage.system_percent,
            memory_bytes,
            captured_at: Local::now(),
            status: SampleStatus::Measured,
        }
    }

    fn unresolved(&self, name: &str, pid: Option<u32>, err: SamplerError) -> ProcessSample {
        let status = status_for(&err);
        if err.is_systemic() {
            error!("Cannot sample '{}': process listing unavailable: {}", name, err);
            return ProcessSample::unresolved(name, status);
        }
        match status {
            SampleStatus::NotRunning => debug!("No running process matches '{}'", name),
            SampleStatus::Exited => {
                debug!("Process for '{}' ({:?}) exited while sampling", name, pid)
            }
            _ => warn!("Cannot sample '{}' ({:?}): {}", name, pid, err),
        }
        ProcessSample::unresolved(name, status)
    }
}
