use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use epmon::{
    config::{defaults::DEFAULT_LOG_LEVEL, Config, ConfigOverrides, LogFormat},
    sampler::{LinuxProcFs, ProcessSampler},
    services::{
        build_http_client, ConfigRefresher, HttpAppListSource, HttpReportSink, MonitorLoop,
    },
    watch_list::WatchList,
};

#[derive(Parser)]
#[command(name = "epmon")]
#[command(version)]
#[command(about = "Samples CPU and memory of remotely configured applications and reports them")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path (falls back to $EPMON_CONFIG_FILE, then epmon.toml)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log level
    #[arg(short = 'v', long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Log output format
    #[arg(long, value_enum, value_name = "FORMAT")]
    log_format: Option<CliLogFormat>,

    /// Seconds between config fetches (1-600)
    #[arg(long, value_name = "SECS")]
    config_interval: Option<String>,

    /// Seconds between monitor ticks (1-600)
    #[arg(long, value_name = "SECS")]
    monitor_interval: Option<String>,

    /// URL the application list is fetched from
    #[arg(long, value_name = "URL")]
    config_url: Option<String>,

    /// URL results are posted to
    #[arg(long, value_name = "URL")]
    results_url: Option<String>,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum CliLogFormat {
    Text,
    Json,
}

impl From<CliLogFormat> for LogFormat {
    fn from(format: CliLogFormat) -> Self {
        match format {
            CliLogFormat::Text => LogFormat::Text,
            CliLogFormat::Json => LogFormat::Json,
        }
    }
}

fn init_logging(level: &str, format: LogFormat) {
    let level = if level.parse::<tracing::Level>().is_ok() {
        level
    } else {
        DEFAULT_LOG_LEVEL
    };
    let log_filter = format!("epmon={}", level);
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| log_filter.into());

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

#[cfg(unix)]
async fn shutdown_signal() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm =
        signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
    let mut sigint =
        signal(SignalKind::interrupt()).context("failed to install SIGINT handler")?;

    tokio::select! {
        _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
        _ = sigint.recv() => info!("Received SIGINT (Ctrl+C), shutting down"),
    }
    Ok(())
}

#[cfg(not(unix))]
async fn shutdown_signal() -> Result<()> {
    tokio::signal::ctrl_c()
        .await
        .context("failed to install Ctrl+C handler")?;
    info!("Received Ctrl+C, shutting down");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = Config::resolve_path(cli.config.clone());
    let mut config = Config::load_from_file(&config_path)
        .with_context(|| format!("failed to load configuration from {}", config_path.display()))?;

    let log_level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    let log_format = cli.log_format.map(LogFormat::from).unwrap_or(config.logging.format);
    init_logging(&log_level, log_format);

    info!("Starting epmon v{}", env!("CARGO_PKG_VERSION"));
    if config_path.exists() {
        info!("Configuration loaded from: {}", config_path.display());
    } else {
        info!(
            "No configuration file at {}, using defaults",
            config_path.display()
        );
    }

    config.apply_overrides(&ConfigOverrides {
        config_refresh_interval: cli.config_interval,
        monitor_interval: cli.monitor_interval,
        config_url: cli.config_url,
        results_url: cli.results_url,
        log_level: cli.log_level,
    });
    config.logging.format = log_format;
    config.sanitize();

    info!(
        "Config source {} every {}s, results to {} every {}s",
        config.endpoints.config_url,
        config.agent.config_refresh_interval,
        config.endpoints.results_url,
        config.agent.monitor_interval
    );

    let client = build_http_client(&config.endpoints)?;
    let watch_list = WatchList::new();
    let cancellation_token = CancellationToken::new();

    let refresher = ConfigRefresher::new(
        Arc::new(HttpAppListSource::new(
            client.clone(),
            config.endpoints.config_url.clone(),
        )),
        watch_list.clone(),
        config.agent.config_refresh_period(),
    );

    let sampler = ProcessSampler::from_config(Arc::new(LinuxProcFs::new()), &config.agent);
    let monitor = MonitorLoop::new(
        sampler,
        Arc::new(HttpReportSink::new(
            client,
            config.endpoints.results_url.clone(),
        )),
        watch_list,
        config.agent.monitor_period(),
    )
    .with_max_concurrent(config.agent.max_concurrent_samples);

    let refresher_handle = {
        let token = cancellation_token.clone();
        tokio::spawn(async move { refresher.run(token).await })
    };
    let monitor_handle = {
        let token = cancellation_token.clone();
        tokio::spawn(async move { monitor.run(token).await })
    };

    if let Err(e) = shutdown_signal().await {
        error!("Signal handling failed, shutting down: {}", e);
    }
    cancellation_token.cancel();

    let (refresher_result, monitor_result) = tokio::join!(refresher_handle, monitor_handle);
    if let Err(e) = refresher_result {
        error!("Config refresher task failed: {}", e);
    }
    if let Err(e) = monitor_result {
        error!("Monitor loop task failed: {}", e);
    }

    info!("epmon stopped");
    Ok(())
}
