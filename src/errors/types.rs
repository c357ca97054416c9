//! Error type definitions for the epmon agent
//!
//! Errors are split by the layer that produces them: remote endpoints
//! (`SourceError`), process inspection (`SamplerError`) and the top-level
//! `AppError` for startup and refresh failures. None of them is fatal once
//! the agent is running; the loops log them and carry on.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level application error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Remote config source or results collector errors
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Errors talking to the config source or the results collector
#[derive(Error, Debug)]
pub enum SourceError {
    /// Non-success HTTP status
    #[error("HTTP error: {url} returned {status}")]
    Http { url: String, status: u16 },

    /// Response body did not have the expected shape
    #[error("Parse error: {source_type} - {message}")]
    ParseError { source_type: String, message: String },

    /// Request timed out
    #[error("Connection timeout: {url}")]
    Timeout { url: String },

    /// Transport-level failure (DNS, refused connection, TLS...)
    #[error("Unreachable: {url} - {message}")]
    Unreachable { url: String, message: String },
}

/// Errors raised while resolving or measuring a process
#[derive(Error, Debug)]
pub enum SamplerError {
    /// The process listing facility itself could not be read
    #[error("Process listing unavailable at {path:?}: {source}")]
    ProcUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No running process matches the watched name
    #[error("No running process matches '{name}'")]
    NotFound { name: String },

    /// The process went away while it was being measured
    #[error("Process {pid} exited")]
    ProcessExited { pid: u32 },

    /// Counter files exist but could not be read
    #[error("Counters unreadable at {path:?}: {source}")]
    CountersUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Counter files were read but did not parse
    #[error("Malformed counters in {path:?}: {message}")]
    MalformedCounters { path: PathBuf, message: String },
}

impl AppError {
    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

impl SourceError {
    /// Create a parse error
    pub fn parse_error<S: Into<String>, M: Into<String>>(source_type: S, message: M) -> Self {
        Self::ParseError {
            source_type: source_type.into(),
            message: message.into(),
        }
    }

    /// Classify a reqwest failure against the URL it was sent to
    pub fn from_transport(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                url: url.to_string(),
            }
        } else if let Some(status) = err.status() {
            Self::Http {
                url: url.to_string(),
                status: status.as_u16(),
            }
        } else if err.is_decode() {
            Self::parse_error(url, err.to_string())
        } else {
            Self::Unreachable {
                url: url.to_string(),
                message: err.to_string(),
            }
        }
    }
}

impl SamplerError {
    /// Create a malformed counters error
    pub fn malformed<P: Into<PathBuf>, M: Into<String>>(path: P, message: M) -> Self {
        Self::MalformedCounters {
            path: path.into(),
            message: message.into(),
        }
    }

    /// True when the error signals a fault of the whole process listing
    /// rather than of one process
    pub fn is_systemic(&self) -> bool {
        matches!(self, Self::ProcUnavailable { .. })
    }
}
