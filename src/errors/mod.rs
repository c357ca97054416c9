//! Centralized error handling for the epmon agent
//!
//! # Error Categories
//!
//! - **Source Errors**: config source and results collector connectivity and parsing
//! - **Sampler Errors**: `/proc` access, missing processes, malformed counters
//! - **Configuration Errors**: unreadable configuration files
//!
//! # Usage
//!
//! ```rust
//! use epmon::errors::{AppError, AppResult};
//!
//! fn example_function() -> AppResult<String> {
//!     Err(AppError::configuration("no endpoints configured"))
//! }
//! ```

pub mod types;

pub use types::*;

/// Convenience type alias for Results using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Convenience type alias for Source Results
pub type SourceResult<T> = Result<T, SourceError>;

/// Convenience type alias for Sampler Results
pub type SamplerResult<T> = Result<T, SamplerError>;
