// SPDX-License-Identifier: MIT
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use vigil::classifier::FingerprintClassifier;
use vigil::config::VigilConfig;
use vigil::remote::RemoteClient;
use vigil::retry::RetryConfig;
use vigil::store::RecordStore;
use vigil::sync::sync_cycle;
use vigil::ScanPipeline;

#[derive(Parser)]
#[command(
    name = "vigild",
    about = "vigil: real-time file scan pipeline with offline-first sync",
    version
)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Data directory for config, logs, and the SQLite queue
    #[arg(long, env = "VIGIL_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "VIGIL_LOG")]
    log: Option<String>,

    /// Write logs to this file path (rotated daily). Optional.
    #[arg(long, env = "VIGIL_LOG_FILE")]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scan pipeline in the foreground (default when no subcommand
    /// given). Ctrl-C shuts down cleanly.
    Run,
    /// Run one sync cycle against the backend and exit.
    Sync,
    /// Print queue counts and backend reachability.
    Status,
    /// Fetch scan history from the backend.
    History {
        /// Number of records to fetch (1-100)
        #[arg(long, default_value_t = 10)]
        limit: u32,
        /// Pagination offset
        #[arg(long, default_value_t = 0)]
        offset: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let data_dir = args
        .data_dir
        .clone()
        .unwrap_or_else(VigilConfig::default_data_dir);
    let config = VigilConfig::load_or_create(&data_dir)?;

    let log_level = args.log.clone().unwrap_or_else(|| config.log.level.clone());
    let log_file = args.log_file.clone().or_else(|| config.log.file.clone());
    let _log_guard = setup_logging(&log_level, log_file.as_deref(), &config.log.format);

    match args.command {
        None | Some(Command::Run) => run_pipeline(config).await,
        Some(Command::Sync) => run_sync_once(config).await,
        Some(Command::Status) => print_status(config).await,
        Some(Command::History { limit, offset }) => print_history(config, limit, offset).await,
    }
}

async fn run_pipeline(config: VigilConfig) -> Result<()> {
    let stats_interval = Duration::from_secs(60);

    // Detection callback: the notification layer in the desktop build; here
    // it surfaces on the log.
    let on_detection: vigil::worker::DetectionHook = Arc::new(|path, outcome| {
        warn!(
            path = %path.display(),
            fingerprint = %outcome.fingerprint,
            "MALWARE DETECTED"
        );
    });

    let pipeline = ScanPipeline::start(
        config,
        Box::new(FingerprintClassifier),
        Some(on_detection),
    )
    .await?;

    let mut ticker = tokio::time::interval(stats_interval);
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {
                let stats = pipeline.stats();
                info!(
                    scanned = stats.scans.files_scanned,
                    malware = stats.scans.malware_detected,
                    duplicates = stats.scans.duplicates,
                    errors = stats.scans.scan_errors,
                    queue = stats.queue_depth,
                    drops = stats.queue_drops,
                    "pipeline stats"
                );
            }
        }
    }

    pipeline.stop().await;
    Ok(())
}

async fn run_sync_once(config: VigilConfig) -> Result<()> {
    let store = RecordStore::open(&config.data_dir).await?;
    let client = build_client(&config)?;
    let result = sync_cycle(
        &store,
        &client,
        config.sync.batch_size,
        config.sync_pacing(),
    )
    .await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn print_status(config: VigilConfig) -> Result<()> {
    use vigil::remote::RemoteApi as _;

    let store = RecordStore::open(&config.data_dir).await?;
    let client = build_client(&config)?;
    let status = serde_json::json!({
        "backend_url": config.backend.url,
        "online": client.is_online().await,
        "counts": store.counts().await?,
    });
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

async fn print_history(config: VigilConfig, limit: u32, offset: u32) -> Result<()> {
    let client = build_client(&config)?;
    let history = client
        .scan_history(limit, offset)
        .await
        .context("failed to fetch scan history")?;
    println!("{}", serde_json::to_string_pretty(&history)?);
    Ok(())
}

fn build_client(config: &VigilConfig) -> Result<RemoteClient> {
    RemoteClient::new(
        &config.backend.url,
        config.request_timeout(),
        config.health_timeout(),
        RetryConfig::with_attempts(config.backend.retry_attempts),
    )
    .context("failed to build backend client")
}

/// Initialize the tracing subscriber.
/// If `log_file` is set, logs go to both stdout and a daily-rolling file.
/// Returns a `WorkerGuard` that must stay alive for the process lifetime.
///
/// If the log directory cannot be created, falls back to stdout-only logging
/// with a warning instead of panicking.
fn setup_logging(
    log_level: &str,
    log_file: Option<&std::path::Path>,
    log_format: &str,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let use_json = log_format == "json";

    if let Some(path) = log_file {
        let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
        let filename = path
            .file_name()
            .unwrap_or_else(|| std::ffi::OsStr::new("vigild.log"));

        // Ensure the directory exists before tracing-appender tries to open it.
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!(
                "warn: could not create log directory '{}': {e}; falling back to stdout",
                dir.display()
            );
            if use_json {
                tracing_subscriber::fmt().json().with_env_filter(log_level).init();
            } else {
                tracing_subscriber::fmt().with_env_filter(log_level).compact().init();
            }
            return None;
        }

        let appender = tracing_appender::rolling::daily(dir, filename);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);

        if use_json {
            tracing_subscriber::registry()
                .with(EnvFilter::new(log_level))
                .with(fmt::layer().json())
                .with(fmt::layer().json().with_writer(non_blocking))
                .init();
        } else {
            tracing_subscriber::registry()
                .with(EnvFilter::new(log_level))
                .with(fmt::layer().compact())
                .with(fmt::layer().with_writer(non_blocking))
                .init();
        }

        Some(guard)
    } else if use_json {
        tracing_subscriber::fmt().json().with_env_filter(log_level).init();
        None
    } else {
        tracing_subscriber::fmt().with_env_filter(log_level).compact().init();
        None
    }
}
