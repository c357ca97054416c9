//! epmon: a host agent that samples CPU and memory usage of a remotely
//! configured set of applications and reports them to a collector.

pub mod config;
pub mod errors;
pub mod models;
pub mod sampler;
pub mod services;
pub mod watch_list;
