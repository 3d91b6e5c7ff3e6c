// SPDX-License-Identifier: MIT
//! Recently-scanned path cache.
//!
//! Prevents the same path from being re-admitted while it is still fresh.
//! The janitor clears the whole set once it grows past its soft capacity.
//! Deliberately cruder than per-entry expiry: a short burst of re-admissible
//! paths is harmless because the record store's fingerprint uniqueness is
//! the actual dedup backstop. This cache is a liveness optimization only.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// How often the janitor checks the cache size.
const JANITOR_INTERVAL: Duration = Duration::from_secs(60);

/// Soft-capacity set of recently scanned paths.
pub struct SeenCache {
    paths: Mutex<HashSet<PathBuf>>,
    capacity: usize,
}

impl SeenCache {
    /// `capacity` is a soft bound: the set may exceed it between janitor
    /// runs, at which point it is cleared wholesale.
    pub fn new(capacity: usize) -> Self {
        Self {
            paths: Mutex::new(HashSet::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn seen(&self, path: &Path) -> bool {
        self.lock().contains(path)
    }

    pub fn mark_seen(&self, path: &Path) {
        self.lock().insert(path.to_path_buf());
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn over_capacity(&self) -> bool {
        self.len() > self.capacity
    }

    /// Drop every cached path.
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<PathBuf>> {
        self.paths.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Spawn the cache janitor loop.
///
/// Checks every minute; when the cache has grown past its soft capacity the
/// whole set is cleared. Exits when the shutdown flag flips.
pub fn spawn_janitor(
    cache: Arc<SeenCache>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        debug!("cache janitor started");
        let mut interval = tokio::time::interval(JANITOR_INTERVAL);
        // The first tick fires immediately; skip it so a freshly started
        // pipeline doesn't clear a cache it just populated.
        interval.tick().await;
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if cache.over_capacity() {
                        let size = cache.len();
                        cache.clear();
                        info!(size, "seen-path cache cleared");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        debug!("cache janitor stopped");
    })
}
