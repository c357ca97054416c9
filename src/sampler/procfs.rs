//! Process table access via the `/proc` pseudo-filesystem
//!
//! Reads, per process:
//! - `/proc/{pid}/cmdline` - executable name used for matching
//! - `/proc/{pid}/stat`    - utime, stime, cutime, cstime, vsize, rss
//!
//! and machine-wide:
//! - `/proc/stat`          - aggregate `cpu` line, summed into one tick total

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::trace;

use crate::errors::{SamplerError, SamplerResult};

/// A running process as seen during enumeration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEntry {
    pub pid: u32,
    /// First command-line argument, cut at the first space
    pub executable: String,
}

/// Kernel counters for one process at one instant, plus the machine-wide
/// CPU tick total read alongside them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawProcSnapshot {
    pub utime: u64,
    pub stime: u64,
    pub cutime: u64,
    pub cstime: u64,
    /// Virtual memory size in bytes
    pub vsize: u64,
    /// Resident set size in bytes
    pub rss: u64,
    pub total_cpu: u64,
}

/// Source of process listings and counter snapshots.
///
/// `processes` must report entries in enumeration order; the sampler takes
/// the first match.
pub trait ProcSource: Send + Sync {
    fn processes(&self) -> SamplerResult<Vec<ProcessEntry>>;

    fn snapshot(&self, pid: u32) -> SamplerResult<RawProcSnapshot>;
}

/// `ProcSource` backed by a procfs mount
#[derive(Debug, Clone)]
pub struct LinuxProcFs {
    root: PathBuf,
    page_size: u64,
}

impl Default for LinuxProcFs {
    fn default() -> Self {
        Self::new()
    }
}

impl LinuxProcFs {
    pub fn new() -> Self {
        Self::with_root("/proc")
    }

    /// Use a procfs mounted somewhere other than `/proc`
    pub fn with_root<P: Into<PathBuf>>(root: P) -> Self {
        Self {
            root: root.into(),
            page_size: page_size(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn read_pid_stat(&self, pid: u32) -> SamplerResult<PidStat> {
        let path = self.root.join(pid.to_string()).join("stat");
        let raw = fs::read(&path).map_err(|e| {
            if process_gone(&e) {
                SamplerError::ProcessExited { pid }
            } else {
                SamplerError::CountersUnreadable {
                    path: path.clone(),
                    source: e,
                }
            }
        })?;
        // comm is arbitrary bytes; only the numeric fields after it matter
        let content = String::from_utf8_lossy(&raw);
        parse_pid_stat(&content).map_err(|message| SamplerError::malformed(&path, message))
    }

    fn read_total_cpu(&self) -> SamplerResult<u64> {
        let path = self.root.join("stat");
        let content = fs::read_to_string(&path).map_err(|e| SamplerError::ProcUnavailable {
            path: path.clone(),
            source: e,
        })?;
        parse_total_cpu(&content).map_err(|message| SamplerError::malformed(&path, message))
    }
}

impl ProcSource for LinuxProcFs {
    fn processes(&self) -> SamplerResult<Vec<ProcessEntry>> {
        let dir = fs::read_dir(&self.root).map_err(|e| SamplerError::ProcUnavailable {
            path: self.root.clone(),
            source: e,
        })?;

        let mut entries = Vec::new();
        for dir_entry in dir.flatten() {
            let Some(pid) = dir_entry
                .file_name()
                .to_str()
                .and_then(|name| name.parse::<u32>().ok())
            else {
                continue;
            };
            if !dir_entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                continue;
            }

            // Processes can vanish mid-scan, and some cmdlines are unreadable
            // without privileges; both are simply skipped.
            let Ok(cmdline) = fs::read(dir_entry.path().join("cmdline")) else {
                trace!("Skipping pid {}: cmdline unreadable", pid);
                continue;
            };
            if let Some(executable) = executable_name(&cmdline) {
                entries.push(ProcessEntry { pid, executable });
            }
        }
        Ok(entries)
    }

    fn snapshot(&self, pid: u32) -> SamplerResult<RawProcSnapshot> {
        let stat = self.read_pid_stat(pid)?;
        let total_cpu = self.read_total_cpu()?;
        Ok(RawProcSnapshot {
            utime: stat.utime,
            stime: stat.stime,
            cutime: stat.cutime,
            cstime: stat.cstime,
            vsize: stat.vsize,
            rss: stat.rss_pages.saturating_mul(self.page_size),
            total_cpu,
        })
    }
}

/// ENOENT once the pid directory is gone, ESRCH while the task is being reaped
fn process_gone(err: &std::io::Error) -> bool {
    if err.kind() == ErrorKind::NotFound {
        return true;
    }
    #[cfg(unix)]
    if err.raw_os_error() == Some(libc::ESRCH) {
        return true;
    }
    false
}

#[cfg(unix)]
fn page_size() -> u64 {
    // SAFETY: sysconf has no preconditions and _SC_PAGESIZE is always valid
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 {
        size as u64
    } else {
        4096
    }
}

#[cfg(not(unix))]
fn page_size() -> u64 {
    4096
}

/// Extract the executable name from raw `/proc/{pid}/cmdline` bytes.
///
/// Arguments are NUL-separated; only the first is used, truncated at the
/// first space. Kernel threads have an empty cmdline and yield `None`.
pub fn executable_name(cmdline: &[u8]) -> Option<String> {
    let argv0 = cmdline.split(|b| *b == 0).next().unwrap_or_default();
    let argv0 = argv0.split(|b| *b == b' ').next().unwrap_or_default();
    if argv0.is_empty() {
        None
    } else {
        Some(String::from_utf8_lossy(argv0).into_owned())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PidStat {
    utime: u64,
    stime: u64,
    cutime: u64,
    cstime: u64,
    vsize: u64,
    rss_pages: u64,
}

/// Parse the content of `/proc/{pid}/stat`.
///
/// Format: pid (comm) state ppid pgrp session tty_nr tpgid flags minflt cminflt majflt cmajflt
///         utime stime cutime cstime priority nice num_threads itrealvalue starttime vsize rss ...
fn parse_pid_stat(content: &str) -> Result<PidStat, String> {
    // comm may itself contain spaces and parentheses
    let comm_end = content
        .rfind(')')
        .ok_or_else(|| "no closing paren after comm".to_string())?;
    let fields: Vec<&str> = content[comm_end + 1..].split_whitespace().collect();
    if fields.len() < 22 {
        return Err(format!("expected 22+ fields after comm, got {}", fields.len()));
    }

    let unsigned = |idx: usize, name: &str| -> Result<u64, String> {
        fields[idx]
            .parse::<u64>()
            .map_err(|_| format!("failed to parse {name} from '{}'", fields[idx]))
    };
    // cutime/cstime are signed in the kernel ABI
    let signed = |idx: usize, name: &str| -> Result<u64, String> {
        fields[idx]
            .parse::<i64>()
            .map(|v| v.max(0) as u64)
            .map_err(|_| format!("failed to parse {name} from '{}'", fields[idx]))
    };

    Ok(PidStat {
        utime: unsigned(11, "utime")?,
        stime: unsigned(12, "stime")?,
        cutime: signed(13, "cutime")?,
        cstime: signed(14, "cstime")?,
        vsize: unsigned(20, "vsize")?,
        rss_pages: signed(21, "rss")?,
    })
}

/// Sum the first ten counters of the aggregate `cpu` line of `/proc/stat`.
fn parse_total_cpu(content: &str) -> Result<u64, String> {
    let line = content
        .lines()
        .find(|line| line.split_whitespace().next() == Some("cpu"))
        .ok_or_else(|| "no aggregate cpu line".to_string())?;

    let mut total: u64 = 0;
    for field in line.split_whitespace().skip(1).take(10) {
        let ticks = field
            .parse::<u64>()
            .map_err(|_| format!("failed to parse cpu counter '{field}'"))?;
        total = total.saturating_add(ticks);
    }
    Ok(total)
}
