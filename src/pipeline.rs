// SPDX-License-Identifier: MIT
//! Pipeline assembly.
//!
//! [`ScanPipeline`] is the explicit context object that owns every
//! component: admission filter, seen-path cache, scan queue, record store,
//! remote client, and the background loops (watcher intake, scan worker,
//! cache janitor, sync engine). There is no global state: construct it,
//! `start` it, `stop` it.
//!
//! Startup is fatal if the record store cannot be opened or the classifier
//! handle cannot be taken: those are broken preconditions, not transient
//! conditions. Everything downstream degrades gracefully instead.

use std::sync::Arc;

use anyhow::{Context as _, Result};
use notify::RecommendedWatcher;
use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::admission::AdmissionFilter;
use crate::cache::{self, SeenCache};
use crate::classifier::Classifier;
use crate::config::VigilConfig;
use crate::queue::ScanQueue;
use crate::remote::{RemoteApi, RemoteClient};
use crate::retry::RetryConfig;
use crate::store::RecordStore;
use crate::sync::{sync_cycle, SyncCycleResult, SyncEngine, SyncStatusReport};
use crate::worker::{DetectionHook, ScanStats, ScanWorker, StatsSnapshot};

/// Combined live-pipeline statistics.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStats {
    #[serde(flatten)]
    pub scans: StatsSnapshot,
    pub queue_depth: usize,
    /// Admissions discarded because the queue was full.
    pub queue_drops: u64,
    pub cache_size: usize,
}

pub struct ScanPipeline {
    config: Arc<VigilConfig>,
    admission: Arc<AdmissionFilter>,
    cache: Arc<SeenCache>,
    queue: Arc<ScanQueue>,
    store: RecordStore,
    remote: Arc<dyn RemoteApi>,
    stats: Arc<ScanStats>,
    shutdown_tx: watch::Sender<bool>,
    // Dropping the watcher stops event delivery; kept until `stop`.
    watcher: Option<RecommendedWatcher>,
    tasks: Vec<JoinHandle<()>>,
}

impl ScanPipeline {
    /// Build and start the whole pipeline.
    ///
    /// The classifier handle is owned by the scan worker behind a mutex for
    /// the lifetime of the pipeline.
    pub async fn start(
        config: VigilConfig,
        classifier: Box<dyn Classifier>,
        on_detection: Option<DetectionHook>,
    ) -> Result<Self> {
        let config = Arc::new(config);

        let store = RecordStore::open(&config.data_dir)
            .await
            .context("failed to initialize record store")?;

        let remote: Arc<dyn RemoteApi> = Arc::new(
            RemoteClient::new(
                &config.backend.url,
                config.request_timeout(),
                config.health_timeout(),
                RetryConfig::with_attempts(config.backend.retry_attempts),
            )
            .context("failed to build backend client")?,
        );

        let admission = Arc::new(AdmissionFilter::new(
            config.monitor.whitelist_paths.iter().cloned(),
            config.monitor.whitelist_extensions.iter().cloned(),
        ));
        let cache = Arc::new(SeenCache::new(config.monitor.cache_capacity));
        let queue = Arc::new(ScanQueue::new(config.queue_capacity()));
        let stats = Arc::new(ScanStats::default());

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut tasks = Vec::new();

        let worker = ScanWorker::new(
            queue.clone(),
            cache.clone(),
            store.clone(),
            Arc::new(Mutex::new(classifier)),
            on_detection,
            stats.clone(),
            config.scan_delay(),
        );
        tasks.push(worker.spawn(shutdown_rx.clone()));

        tasks.push(cache::spawn_janitor(cache.clone(), shutdown_rx.clone()));

        if config.sync.enabled {
            let engine = SyncEngine::new(
                store.clone(),
                remote.clone(),
                config.sync.batch_size,
                config.sync_pacing(),
                config.sync_interval(),
                config.sync.retention_days,
            );
            tasks.push(engine.spawn(shutdown_rx));
        } else {
            info!("background sync disabled by config");
        }

        let roots = config.monitored_roots();
        let watcher = crate::watch::start_watcher(
            &roots,
            admission.clone(),
            cache.clone(),
            queue.clone(),
        )
        .context("failed to start filesystem watcher")?;

        info!(
            roots = roots.len(),
            scan_delay_secs = config.monitor.scan_delay_secs,
            backend = %config.backend.url,
            "pipeline started"
        );

        Ok(Self {
            config,
            admission,
            cache,
            queue,
            store,
            remote,
            stats,
            shutdown_tx,
            watcher: Some(watcher),
            tasks,
        })
    }

    /// Stop event intake, signal every loop, and wait for them to exit.
    ///
    /// Each loop observes the flag at its suspension points, so joining is
    /// bounded by the loops' own poll granularity (seconds, not minutes).
    pub async fn stop(mut self) {
        info!("stopping pipeline");
        // Stop producing events first, then drain the loops.
        self.watcher.take();
        let _ = self.shutdown_tx.send(true);
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!(err = %e, "pipeline task did not shut down cleanly");
            }
        }
        info!("pipeline stopped");
    }

    /// Run one sync cycle immediately, independent of the interval loop.
    pub async fn sync_now(&self) -> Result<SyncCycleResult> {
        sync_cycle(
            &self.store,
            self.remote.as_ref(),
            self.config.sync.batch_size,
            self.config.sync_pacing(),
        )
        .await
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            scans: self.stats.snapshot(),
            queue_depth: self.queue.len(),
            queue_drops: self.queue.drops(),
            cache_size: self.cache.len(),
        }
    }

    pub async fn sync_status(&self) -> Result<SyncStatusReport> {
        Ok(SyncStatusReport {
            online: self.remote.is_online().await,
            counts: self.store.counts().await?,
        })
    }

    /// Whitelists are mutable while the pipeline runs.
    pub fn admission(&self) -> &AdmissionFilter {
        &self.admission
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }
}
