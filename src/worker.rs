// SPDX-License-Identifier: MIT
//! Scan worker: the queue's single consumer.
//!
//! Dequeues with a short poll timeout so the loop observes shutdown, waits
//! out the dwell delay (lets rapidly-modified files settle), re-checks
//! existence, classifies under the shared classifier mutex, raises
//! detections, and persists the outcome. Classifier failures are logged and
//! skipped; they never terminate the loop and never become a stored
//! verdict.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::SeenCache;
use crate::classifier::{Classifier, ScanOutcome, Verdict};
use crate::queue::{ScanQueue, ScanRequest};
use crate::store::RecordStore;

/// How long one `dequeue` poll blocks before the loop re-checks shutdown.
const DEQUEUE_POLL: Duration = Duration::from_secs(1);

/// Invoked with `(path, outcome)` on every Malware verdict. The
/// notification/UI layer supplies this.
pub type DetectionHook = Arc<dyn Fn(&Path, &ScanOutcome) + Send + Sync>;

/// Aggregate scan counters. Fields on the worker, not module state; read via
/// [`ScanStats::snapshot`].
#[derive(Default)]
pub struct ScanStats {
    files_scanned: AtomicU64,
    malware_detected: AtomicU64,
    duplicates: AtomicU64,
    scan_errors: AtomicU64,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct StatsSnapshot {
    pub files_scanned: u64,
    pub malware_detected: u64,
    /// Outcomes whose fingerprint was already recorded (same content under
    /// another path).
    pub duplicates: u64,
    pub scan_errors: u64,
}

impl ScanStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            files_scanned: self.files_scanned.load(Ordering::Relaxed),
            malware_detected: self.malware_detected.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            scan_errors: self.scan_errors.load(Ordering::Relaxed),
        }
    }
}

pub struct ScanWorker {
    queue: Arc<ScanQueue>,
    cache: Arc<SeenCache>,
    store: RecordStore,
    /// The classifier's inference session is not assumed reentrant; every
    /// call happens under this mutex.
    classifier: Arc<Mutex<Box<dyn Classifier>>>,
    on_detection: Option<DetectionHook>,
    stats: Arc<ScanStats>,
    scan_delay: Duration,
}

impl ScanWorker {
    pub fn new(
        queue: Arc<ScanQueue>,
        cache: Arc<SeenCache>,
        store: RecordStore,
        classifier: Arc<Mutex<Box<dyn Classifier>>>,
        on_detection: Option<DetectionHook>,
        stats: Arc<ScanStats>,
        scan_delay: Duration,
    ) -> Self {
        Self {
            queue,
            cache,
            store,
            classifier,
            on_detection,
            stats,
            scan_delay,
        }
    }

    /// Spawn the worker loop.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!("scan worker started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            let request = tokio::select! {
                req = self.queue.dequeue(DEQUEUE_POLL) => req,
                _ = shutdown.changed() => continue,
            };
            let Some(request) = request else { continue };
            self.process(request, &mut shutdown).await;
        }
        info!("scan worker stopped");
    }

    async fn process(&self, request: ScanRequest, shutdown: &mut watch::Receiver<bool>) {
        // Dwell: let writes settle before reading the file.
        let elapsed = request.enqueued_at.elapsed();
        if elapsed < self.scan_delay {
            tokio::select! {
                _ = tokio::time::sleep(self.scan_delay - elapsed) => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return;
                    }
                }
            }
        }

        // The file may have been deleted during the wait.
        if !request.path.exists() {
            debug!(path = %request.path.display(), "file vanished before scan");
            return;
        }

        debug!(path = %request.path.display(), priority = ?request.priority, "scanning");
        let outcome = {
            let mut classifier = self.classifier.lock().await;
            classifier.classify(&request.path).await
        };

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(path = %request.path.display(), err = %e, "classification failed, skipping");
                self.stats.scan_errors.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };

        self.stats.files_scanned.fetch_add(1, Ordering::Relaxed);
        self.cache.mark_seen(&request.path);

        if outcome.verdict == Verdict::Malware {
            self.stats.malware_detected.fetch_add(1, Ordering::Relaxed);
            warn!(
                path = %request.path.display(),
                fingerprint = %outcome.fingerprint,
                "malware detected"
            );
            if let Some(hook) = &self.on_detection {
                hook(&request.path, &outcome);
            }
        } else {
            debug!(path = %request.path.display(), "clean");
        }

        match self
            .store
            .insert(&outcome.file_name, outcome.verdict.as_str(), &outcome.fingerprint)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                // Same content was already recorded under another path.
                self.stats.duplicates.fetch_add(1, Ordering::Relaxed);
                debug!(fingerprint = %outcome.fingerprint, "content already recorded");
            }
            Err(e) => {
                warn!(path = %request.path.display(), err = %e, "failed to persist scan record");
            }
        }
    }
}
