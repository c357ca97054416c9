//! Periodic sampling of the watched applications and delivery of the results

use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::report_sink::ReportSink;
use crate::models::{HealthcheckReport, ProcessSample};
use crate::sampler::ProcessSampler;
use crate::watch_list::WatchList;

/// What one monitor tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The watch list was empty, nothing sampled
    EmptyWatchList,
    /// No watched application was running
    NoResults,
    /// A report with this many entries was delivered
    Reported(usize),
    /// A report with this many entries was built but delivery failed
    ReportFailed(usize),
    /// Cancelled before or during sampling
    Cancelled,
}

pub struct MonitorLoop {
    sampler: ProcessSampler,
    sink: Arc<dyn ReportSink>,
    watch_list: WatchList,
    interval: Duration,
    max_concurrent: usize,
}

impl MonitorLoop {
    pub fn new(
        sampler: ProcessSampler,
        sink: Arc<dyn ReportSink>,
        watch_list: WatchList,
        interval: Duration,
    ) -> Self {
        Self {
            sampler,
            sink,
            watch_list,
            interval,
            max_concurrent: 1,
        }
    }

    /// Sample up to `max_concurrent` names at once; report order still
    /// follows the watch list.
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    /// One snapshot, sample and report pass
    pub async fn tick(&self, cancellation_token: &CancellationToken) -> TickOutcome {
        if cancellation_token.is_cancelled() {
            return TickOutcome::Cancelled;
        }

        let names = self.watch_list.snapshot().await;
        if names.is_empty() {
            warn!("No apps specified, nothing to monitor");
            return TickOutcome::EmptyWatchList;
        }
        debug!("Sampling {} watched apps", names.len());

        let sampling = stream::iter(names.iter().cloned())
            .map(|name| async move { self.sampler.sample(&name).await })
            .buffered(self.max_concurrent)
            .collect::<Vec<ProcessSample>>();

        let samples = tokio::select! {
            samples = sampling => samples,
            _ = cancellation_token.cancelled() => {
                debug!("Monitor tick cancelled while sampling");
                return TickOutcome::Cancelled;
            }
        };

        for sample in samples.iter().filter(|s| !s.is_resolved()) {
            warn!("Process '{}' not found ({:?})", sample.name, sample.status);
        }

        let Some(report) = HealthcheckReport::from_samples(&samples) else {
            warn!("No results to send");
            return TickOutcome::NoResults;
        };

        let count = report.len();
        match self.sink.send(&report).await {
            Ok(()) => {
                info!("Sent {} results to {}", count, self.sink.describe());
                TickOutcome::Reported(count)
            }
            Err(e) => {
                error!(
                    "Failed to send {} results to {}: {}",
                    count,
                    self.sink.describe(),
                    e
                );
                TickOutcome::ReportFailed(count)
            }
        }
    }

    /// Tick until cancelled
    pub async fn run(&self, cancellation_token: CancellationToken) {
        info!(
            "Starting monitor loop: every {}s, up to {} concurrent samples",
            self.interval.as_secs(),
            self.max_concurrent
        );

        loop {
            if self.tick(&cancellation_token).await == TickOutcome::Cancelled {
                break;
            }

            debug!("Sleeping for {} seconds", self.interval.as_secs());
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = cancellation_token.cancelled() => break,
            }
        }

        info!("Monitor loop stopped");
    }
}
