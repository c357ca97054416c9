use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use epmon::config::EndpointsConfig;
use epmon::errors::{AppError, SamplerError, SamplerResult, SourceError};
use epmon::sampler::{ProcSource, ProcessEntry, ProcessSampler, RawProcSnapshot};
use epmon::services::{
    build_http_client, ConfigRefresher, HttpAppListSource, HttpReportSink, MonitorLoop,
    TickOutcome,
};
use epmon::watch_list::WatchList;

/// In-process stand-in for the config source and the results collector
#[derive(Clone)]
struct Collector {
    config_response: Arc<Mutex<(StatusCode, String)>>,
    results_status: Arc<Mutex<StatusCode>>,
    received: Arc<Mutex<Vec<Value>>>,
}

impl Collector {
    fn new(config_body: Value) -> Self {
        Self {
            config_response: Arc::new(Mutex::new((StatusCode::OK, config_body.to_string()))),
            results_status: Arc::new(Mutex::new(StatusCode::OK)),
            received: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn set_config_response(&self, status: StatusCode, body: &str) {
        *self.config_response.lock().unwrap() = (status, body.to_string());
    }

    fn set_results_status(&self, status: StatusCode) {
        *self.results_status.lock().unwrap() = status;
    }

    fn received(&self) -> Vec<Value> {
        self.received.lock().unwrap().clone()
    }
}

async fn config_handler(State(collector): State<Collector>) -> (StatusCode, String) {
    collector.config_response.lock().unwrap().clone()
}

async fn results_handler(
    State(collector): State<Collector>,
    Json(body): Json<Value>,
) -> StatusCode {
    collector.received.lock().unwrap().push(body);
    *collector.results_status.lock().unwrap()
}

async fn serve(collector: Collector) -> SocketAddr {
    let app = Router::new()
        .route("/config", get(config_handler))
        .route("/results", post(results_handler))
        .with_state(collector);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Each snapshot advances the process 10 ticks and the machine 1000
struct SteadyProcTable {
    processes: Vec<ProcessEntry>,
    reads: Mutex<HashMap<u32, u64>>,
}

impl SteadyProcTable {
    fn with(processes: &[(u32, &str)]) -> Arc<Self> {
        Arc::new(Self {
            processes: processes
                .iter()
                .map(|(pid, exe)| ProcessEntry {
                    pid: *pid,
                    executable: exe.to_string(),
                })
                .collect(),
            reads: Mutex::new(HashMap::new()),
        })
    }
}

impl ProcSource for SteadyProcTable {
    fn processes(&self) -> SamplerResult<Vec<ProcessEntry>> {
        Ok(self.processes.clone())
    }

    fn snapshot(&self, pid: u32) -> SamplerResult<RawProcSnapshot> {
        if !self.processes.iter().any(|p| p.pid == pid) {
            return Err(SamplerError::ProcessExited { pid });
        }
        let mut reads = self.reads.lock().unwrap();
        let n = reads.entry(pid).or_insert(0);
        *n += 1;
        Ok(RawProcSnapshot {
            utime: 10 * *n,
            total_cpu: 1000 * *n,
            vsize: 13852672,
            rss: 5279744,
            ..Default::default()
        })
    }
}

struct Agent {
    watch_list: WatchList,
    refresher: ConfigRefresher,
    monitor: MonitorLoop,
}

fn agent(config_url: String, results_url: String, table: Arc<SteadyProcTable>) -> Agent {
    let client = build_http_client(&EndpointsConfig {
        config_url: config_url.clone(),
        results_url: results_url.clone(),
        request_timeout: Duration::from_secs(2),
    })
    .unwrap();
    let watch_list = WatchList::new();

    let refresher = ConfigRefresher::new(
        Arc::new(HttpAppListSource::new(client.clone(), config_url)),
        watch_list.clone(),
        Duration::from_secs(10),
    );
    let monitor = MonitorLoop::new(
        ProcessSampler::new(table, Duration::from_millis(10)),
        Arc::new(HttpReportSink::new(client, results_url)),
        watch_list.clone(),
        Duration::from_secs(4),
    );

    Agent {
        watch_list,
        refresher,
        monitor,
    }
}

fn agent_for(addr: SocketAddr, table: Arc<SteadyProcTable>) -> Agent {
    agent(
        format!("http://{}/config", addr),
        format!("http://{}/results", addr),
        table,
    )
}

#[tokio::test]
async fn test_refresh_then_tick_posts_healthcheck() {
    let collector = Collector::new(json!({"applications": ["bash", "ghost"]}));
    let addr = serve(collector.clone()).await;
    let agent = agent_for(
        addr,
        SteadyProcTable::with(&[(1, "/sbin/init"), (2544, "/bin/bash")]),
    );

    assert_eq!(agent.refresher.refresh().await.unwrap(), 2);
    assert_eq!(agent.watch_list.len().await, 2);

    let outcome = agent.monitor.tick(&CancellationToken::new()).await;
    assert_eq!(outcome, TickOutcome::Reported(1));

    let received = collector.received();
    assert_eq!(received.len(), 1);
    let entries = received[0]["healthcheck"].as_array().unwrap();
    assert_eq!(entries.len(), 1);

    let entry = &entries[0];
    assert_eq!(entry["app"], "bash");
    assert_eq!(entry["PID"], 2544);
    assert_eq!(entry["CPU"].as_f64().unwrap(), 1.0);
    assert_eq!(entry["Memory"].as_f64().unwrap(), 13852672.0);
    let timestamp = entry["timestamp"].as_str().unwrap();
    assert!(!timestamp.ends_with('\n'));
    assert_eq!(timestamp.split_whitespace().count(), 5);
}

#[tokio::test]
async fn test_bad_config_responses_keep_watch_list() {
    let collector = Collector::new(json!({"applications": ["bash"]}));
    let addr = serve(collector.clone()).await;
    let agent = agent_for(addr, SteadyProcTable::with(&[(2544, "/bin/bash")]));

    agent.refresher.refresh().await.unwrap();

    collector.set_config_response(StatusCode::OK, r#"{"apps": ["firefox"]}"#);
    assert!(matches!(
        agent.refresher.refresh().await,
        Err(AppError::Source(SourceError::ParseError { .. }))
    ));

    collector.set_config_response(StatusCode::OK, r#"{"applications": [1, 2]}"#);
    assert!(agent.refresher.refresh().await.is_err());

    collector.set_config_response(StatusCode::OK, "");
    assert!(agent.refresher.refresh().await.is_err());

    collector.set_config_response(StatusCode::INTERNAL_SERVER_ERROR, "oops");
    assert!(matches!(
        agent.refresher.refresh().await,
        Err(AppError::Source(SourceError::Http { status: 500, .. }))
    ));

    assert_eq!(
        &*agent.watch_list.snapshot().await,
        ["bash".to_string()].as_slice()
    );
}

#[tokio::test]
async fn test_collector_rejection_is_report_failed() {
    let collector = Collector::new(json!({"applications": ["bash"]}));
    collector.set_results_status(StatusCode::SERVICE_UNAVAILABLE);
    let addr = serve(collector.clone()).await;
    let agent = agent_for(addr, SteadyProcTable::with(&[(2544, "/bin/bash")]));

    agent.refresher.refresh().await.unwrap();
    let token = CancellationToken::new();
    assert_eq!(agent.monitor.tick(&token).await, TickOutcome::ReportFailed(1));

    // nothing is queued for the next tick
    collector.set_results_status(StatusCode::OK);
    assert_eq!(agent.monitor.tick(&token).await, TickOutcome::Reported(1));
    let received = collector.received();
    assert_eq!(received.len(), 2);
    assert_eq!(received[1]["healthcheck"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_unreachable_endpoints() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let agent = agent_for(addr, SteadyProcTable::with(&[(2544, "/bin/bash")]));
    assert!(matches!(
        agent.refresher.refresh().await,
        Err(AppError::Source(SourceError::Unreachable { .. }))
    ));

    agent.watch_list.replace(vec!["bash".to_string()]).await;
    assert_eq!(
        agent.monitor.tick(&CancellationToken::new()).await,
        TickOutcome::ReportFailed(1)
    );
}

#[tokio::test]
async fn test_loops_run_together_until_cancelled() {
    let collector = Collector::new(json!({"applications": ["bash"]}));
    let addr = serve(collector.clone()).await;
    let Agent {
        refresher, monitor, ..
    } = agent_for(addr, SteadyProcTable::with(&[(2544, "/bin/bash")]));

    let token = CancellationToken::new();
    let refresher_handle = {
        let token = token.clone();
        tokio::spawn(async move { refresher.run(token).await })
    };
    let monitor_handle = {
        let token = token.clone();
        tokio::spawn(async move { monitor.run(token).await })
    };

    // the first monitor tick may race the first refresh; the second one at
    // ~4s cannot
    tokio::time::timeout(Duration::from_secs(10), async {
        while collector.received().is_empty() {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .unwrap();

    token.cancel();
    tokio::time::timeout(Duration::from_secs(5), async {
        refresher_handle.await.unwrap();
        monitor_handle.await.unwrap();
    })
    .await
    .unwrap();

    assert_eq!(collector.received()[0]["healthcheck"][0]["app"], "bash");
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_samples_real_process_table() {
    use epmon::models::SampleStatus;
    use epmon::sampler::LinuxProcFs;

    let sampler = ProcessSampler::new(Arc::new(LinuxProcFs::new()), Duration::from_millis(50));
    let own_pid = std::process::id();
    let own_exe = LinuxProcFs::new()
        .processes()
        .unwrap()
        .into_iter()
        .find(|p| p.pid == own_pid)
        .map(|p| p.executable)
        .unwrap();

    let sample = sampler.sample(&own_exe).await;
    assert_eq!(sample.status, SampleStatus::Measured);
    assert!(sample.pid.is_some());
    assert!(sample.cpu_percent >= 0.0);
    assert!(sample.memory_bytes > 0.0);
}
