//! Remote collector for healthcheck reports

use async_trait::async_trait;
use reqwest::Client;

use crate::errors::{SourceError, SourceResult};
use crate::models::HealthcheckReport;

/// Where reports go
#[async_trait]
pub trait ReportSink: Send + Sync {
    /// Deliver one report. No retries; a failure is final for this report.
    async fn send(&self, report: &HealthcheckReport) -> SourceResult<()>;

    fn describe(&self) -> String;
}

/// `ReportSink` that POSTs the report as JSON
#[derive(Clone)]
pub struct HttpReportSink {
    client: Client,
    url: String,
}

impl HttpReportSink {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl ReportSink for HttpReportSink {
    async fn send(&self, report: &HealthcheckReport) -> SourceResult<()> {
        self.client
            .post(&self.url)
            .json(report)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| SourceError::from_transport(&self.url, e))?;
        Ok(())
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}
