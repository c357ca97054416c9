//! Periodic refresh of the watch list from the config source

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::config_source::AppListSource;
use crate::errors::AppResult;
use crate::watch_list::WatchList;

/// Fetches the application list every `interval` and swaps it into the
/// shared [`WatchList`]. A failed fetch leaves the current list in place.
pub struct ConfigRefresher {
    source: Arc<dyn AppListSource>,
    watch_list: WatchList,
    interval: Duration,
}

impl ConfigRefresher {
    pub fn new(source: Arc<dyn AppListSource>, watch_list: WatchList, interval: Duration) -> Self {
        Self {
            source,
            watch_list,
            interval,
        }
    }

    /// One fetch-and-apply pass. Returns the number of names applied.
    pub async fn refresh(&self) -> AppResult<usize> {
        let names = self.source.fetch().await?;
        let count = names.len();
        let changed = self.watch_list.replace(names).await;
        info!("Received {} apps to monitor", count);
        if changed {
            debug!("Watch list updated from {}", self.source.describe());
        }
        Ok(count)
    }

    /// Refresh until cancelled
    pub async fn run(&self, cancellation_token: CancellationToken) {
        info!(
            "Starting config refresher: {} every {}s",
            self.source.describe(),
            self.interval.as_secs()
        );

        loop {
            if cancellation_token.is_cancelled() {
                break;
            }

            let result = tokio::select! {
                result = self.refresh() => result,
                _ = cancellation_token.cancelled() => break,
            };
            if let Err(e) = result {
                let kept = self.watch_list.len().await;
                error!(
                    "Failed to fetch application list from {}, keeping {} previous entries: {}",
                    self.source.describe(),
                    kept,
                    e
                );
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = cancellation_token.cancelled() => break,
            }
        }

        info!("Config refresher stopped");
    }
}
