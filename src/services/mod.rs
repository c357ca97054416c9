//! Remote endpoints and the two periodic loops of the agent

pub mod config_refresher;
pub mod config_source;
pub mod monitor_loop;
pub mod report_sink;

use reqwest::Client;

use crate::config::EndpointsConfig;
use crate::errors::AppResult;

pub use config_refresher::ConfigRefresher;
pub use config_source::{AppListSource, HttpAppListSource};
pub use monitor_loop::{MonitorLoop, TickOutcome};
pub use report_sink::{HttpReportSink, ReportSink};

/// User agent sent with every request
pub const USER_AGENT: &str = concat!("epmon/", env!("CARGO_PKG_VERSION"));

/// Build the HTTP client shared by the config source and the report sink
pub fn build_http_client(endpoints: &EndpointsConfig) -> AppResult<Client> {
    let client = Client::builder()
        .timeout(endpoints.request_timeout)
        .user_agent(USER_AGENT)
        .build()?;
    Ok(client)
}
