// SPDX-License-Identifier: MIT
//! Sync engine: drains unsynced records to the backend.
//!
//! One sync cycle is a pure function over the store and the remote client:
//! no UI dependency, no internal state. The interval loop and the manual
//! "sync now" path both call [`sync_cycle`], so there is exactly one
//! implementation of sync semantics.
//!
//! Per-record failures never abort a batch: the record's attempt counter is
//! bumped and the cycle moves on. Failed records are retried on later
//! cycles indefinitely; only the retention sweep ever removes them.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::remote::{RemoteApi, ScanResultUpload};
use crate::store::{RecordStore, StoreCounts};

/// Retention sweep cadence inside the engine loop.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Outcome classification of one sync cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Backend unreachable; nothing was attempted or mutated.
    Offline,
    /// Backend reachable but no pending records.
    Idle,
    /// At least one upload was attempted.
    Synced,
}

/// Result of one sync cycle, consumed by status reporting only.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SyncCycleResult {
    pub status: SyncStatus,
    pub synced: u32,
    pub failed: u32,
}

/// Run one sync cycle: probe the backend, fetch up to `batch_size` pending
/// records oldest-first, upload each, and summarize.
///
/// A successful acknowledgment marks the record synced; any failure bumps
/// its attempt counter and the loop continues with the next record. A small
/// `pacing` delay between uploads keeps the backend unsaturated.
pub async fn sync_cycle(
    store: &RecordStore,
    remote: &dyn RemoteApi,
    batch_size: u32,
    pacing: Duration,
) -> Result<SyncCycleResult> {
    if !remote.is_online().await {
        debug!("backend offline, skipping sync cycle");
        return Ok(SyncCycleResult {
            status: SyncStatus::Offline,
            synced: 0,
            failed: 0,
        });
    }

    let pending = store.list_pending(batch_size).await?;
    if pending.is_empty() {
        debug!("no pending records to sync");
        return Ok(SyncCycleResult {
            status: SyncStatus::Idle,
            synced: 0,
            failed: 0,
        });
    }

    info!(count = pending.len(), "syncing pending scan records");
    let mut synced = 0u32;
    let mut failed = 0u32;

    let last = pending.len() - 1;
    for (i, record) in pending.iter().enumerate() {
        let upload = ScanResultUpload {
            file_name: &record.file_name,
            label: &record.label,
            fingerprint: &record.fingerprint,
        };
        match remote.push_scan_result(upload).await {
            Ok(()) => {
                store.mark_synced(record.id).await?;
                synced += 1;
                debug!(id = record.id, file = %record.file_name, "record synced");
            }
            Err(e) => {
                store.increment_attempts(record.id).await?;
                failed += 1;
                warn!(id = record.id, file = %record.file_name, err = %e, "record sync failed");
            }
        }
        // Pace between uploads, not after the final one.
        if !pacing.is_zero() && i < last {
            tokio::time::sleep(pacing).await;
        }
    }

    info!(synced, failed, "sync cycle complete");
    Ok(SyncCycleResult {
        status: SyncStatus::Synced,
        synced,
        failed,
    })
}

/// Current sync surface for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct SyncStatusReport {
    pub online: bool,
    pub counts: StoreCounts,
}

/// Background engine: runs [`sync_cycle`] on a fixed interval and the
/// retention sweep on an hourly cadence.
pub struct SyncEngine {
    store: RecordStore,
    remote: Arc<dyn RemoteApi>,
    batch_size: u32,
    pacing: Duration,
    interval: Duration,
    retention_days: u32,
}

impl SyncEngine {
    pub fn new(
        store: RecordStore,
        remote: Arc<dyn RemoteApi>,
        batch_size: u32,
        pacing: Duration,
        interval: Duration,
        retention_days: u32,
    ) -> Self {
        Self {
            store,
            remote,
            batch_size,
            pacing,
            interval,
            retention_days,
        }
    }

    /// Spawn the engine loop. Exits promptly when the shutdown flag flips.
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(interval_secs = self.interval.as_secs(), "sync engine started");
            let mut ticker = tokio::time::interval(self.interval);
            let mut last_sweep: Option<tokio::time::Instant> = None;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let due = last_sweep.map_or(true, |t| t.elapsed() >= SWEEP_INTERVAL);
                        if due {
                            match self.store.sweep_old(self.retention_days).await {
                                Ok(0) => {}
                                Ok(n) => info!(deleted = n, "retention sweep removed old synced records"),
                                Err(e) => warn!(err = %e, "retention sweep failed"),
                            }
                            last_sweep = Some(tokio::time::Instant::now());
                        }
                        // A cycle against a slow backend can run for a long
                        // time; the shutdown flag must still be honored, so
                        // an in-flight cycle is abandoned rather than drained.
                        tokio::select! {
                            result = sync_cycle(
                                &self.store,
                                self.remote.as_ref(),
                                self.batch_size,
                                self.pacing,
                            ) => {
                                if let Err(e) = result {
                                    warn!(err = %e, "sync cycle failed");
                                }
                            }
                            _ = shutdown.changed() => {
                                if *shutdown.borrow() {
                                    debug!("shutdown during sync cycle, abandoning");
                                    break;
                                }
                            }
                        }
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("sync engine stopped");
        })
    }
}
