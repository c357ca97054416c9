//! Remote source of the application names to watch

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::errors::{SourceError, SourceResult};
use crate::models::AppListPayload;

/// Where the watch list comes from
#[async_trait]
pub trait AppListSource: Send + Sync {
    /// Fetch the current list of application names.
    ///
    /// Any transport failure or body that is not shaped like
    /// `{"applications": [string, ...]}` is an error.
    async fn fetch(&self) -> SourceResult<Vec<String>>;

    /// Human-readable location, used in log lines
    fn describe(&self) -> String;
}

/// `AppListSource` that GETs a JSON document over HTTP
#[derive(Clone)]
pub struct HttpAppListSource {
    client: Client,
    url: String,
}

impl HttpAppListSource {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl AppListSource for HttpAppListSource {
    async fn fetch(&self) -> SourceResult<Vec<String>> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| SourceError::from_transport(&self.url, e))?;

        let payload: AppListPayload = response
            .error_for_status()
            .map_err(|e| SourceError::from_transport(&self.url, e))?
            .json()
            .await
            .map_err(|e| SourceError::from_transport(&self.url, e))?;

        debug!(
            "Config source {} returned {} applications",
            self.url,
            payload.applications.len()
        );
        Ok(payload.applications)
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}
