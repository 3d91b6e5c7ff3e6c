// SPDX-License-Identifier: MIT
//! Filesystem event intake.
//!
//! A recursive `notify` watcher over the configured roots. Created files
//! map to High priority, modifications to Normal. Events pass through the
//! admission filter and the seen-path cache on the watcher's callback
//! thread before a scan request is enqueued; the queue itself applies the
//! drop policy under load.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, info, warn};

use crate::admission::AdmissionFilter;
use crate::cache::SeenCache;
use crate::queue::{ScanPriority, ScanQueue};

/// Start watching `roots` recursively, feeding qualifying events into
/// `queue`. Returns the watcher handle; dropping it stops the watch.
///
/// A root that cannot be watched is logged and skipped (removable media may
/// come and go); zero watchable roots is a startup error.
pub fn start_watcher(
    roots: &[PathBuf],
    admission: Arc<AdmissionFilter>,
    cache: Arc<SeenCache>,
    queue: Arc<ScanQueue>,
) -> Result<RecommendedWatcher> {
    let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
        match result {
            Ok(event) => handle_event(&event, &admission, &cache, &queue),
            Err(e) => warn!(err = %e, "file watcher error"),
        }
    })?;

    let mut watched = 0usize;
    for root in roots {
        match watcher.watch(root, RecursiveMode::Recursive) {
            Ok(()) => {
                info!(root = %root.display(), "monitoring");
                watched += 1;
            }
            Err(e) => warn!(root = %root.display(), err = %e, "failed to watch root"),
        }
    }
    if watched == 0 {
        bail!("no monitored roots could be watched");
    }

    Ok(watcher)
}

fn handle_event(
    event: &Event,
    admission: &AdmissionFilter,
    cache: &SeenCache,
    queue: &ScanQueue,
) {
    let priority = match event.kind {
        EventKind::Create(_) => ScanPriority::High,
        EventKind::Modify(_) => ScanPriority::Normal,
        _ => return,
    };
    for path in &event.paths {
        intake(path, priority, admission, cache, queue);
    }
}

/// Admission pathway for one path. Split out so tests can drive it without
/// a live watcher.
pub fn intake(
    path: &Path,
    priority: ScanPriority,
    admission: &AdmissionFilter,
    cache: &SeenCache,
    queue: &ScanQueue,
) {
    if cache.seen(path) {
        debug!(path = %path.display(), "skipping recently scanned path");
        return;
    }
    if !admission.should_enqueue(path) {
        return;
    }
    if queue.enqueue(path.to_path_buf(), priority) {
        debug!(path = %path.display(), ?priority, "queued for scan");
    } else {
        // Backpressure is a drop policy: producers are never blocked.
        debug!(path = %path.display(), "scan queue full, dropping");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn fixture() -> (tempfile::TempDir, Arc<AdmissionFilter>, Arc<SeenCache>, Arc<ScanQueue>) {
        let dir = tempfile::tempdir().unwrap();
        (
            dir,
            Arc::new(AdmissionFilter::new([], [])),
            Arc::new(SeenCache::new(100)),
            Arc::new(ScanQueue::new(8)),
        )
    }

    fn write_file(dir: &tempfile::TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::File::create(&path)
            .unwrap()
            .write_all(b"x")
            .unwrap();
        path
    }

    #[test]
    fn intake_enqueues_admissible_path() {
        let (dir, admission, cache, queue) = fixture();
        let file = write_file(&dir, "fresh.bin");
        intake(&file, ScanPriority::High, &admission, &cache, &queue);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn intake_skips_seen_path() {
        let (dir, admission, cache, queue) = fixture();
        let file = write_file(&dir, "seen.bin");
        cache.mark_seen(&file);
        intake(&file, ScanPriority::Normal, &admission, &cache, &queue);
        assert!(queue.is_empty());
    }

    #[test]
    fn intake_skips_whitelisted_path() {
        let (dir, admission, cache, queue) = fixture();
        let file = write_file(&dir, "allowed.bin");
        admission.add_path(file.clone());
        intake(&file, ScanPriority::High, &admission, &cache, &queue);
        assert!(queue.is_empty());
    }

    #[test]
    fn watcher_requires_at_least_one_root() {
        let (_dir, admission, cache, queue) = fixture();
        let missing = vec![PathBuf::from("/definitely/not/a/real/root")];
        assert!(start_watcher(&missing, admission, cache, queue).is_err());
    }
}
