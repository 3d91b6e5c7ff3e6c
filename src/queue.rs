// SPDX-License-Identifier: MIT
//! Bounded, priority-ordered scan queue.
//!
//! Requests are dequeued in ascending priority order (`High` before
//! `Normal`); ties are broken by enqueue order (FIFO within a tier). The
//! queue is the only hand-off point between the filesystem-event intake
//! thread and the async scan worker, so `enqueue` is a plain synchronous
//! call while `dequeue` is async with a poll timeout.
//!
//! Backpressure is a drop policy: when the queue is at capacity, `enqueue`
//! returns `false` and the event is discarded; producers are never blocked.
//! Dropped admissions are counted so operators can see the lossy boundary.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio::sync::Notify;

/// Scan priority. Lower rank dequeues first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanPriority {
    /// Newly created files.
    High = 1,
    /// Modified files.
    Normal = 2,
}

impl ScanPriority {
    fn rank(self) -> u8 {
        self as u8
    }
}

/// A pending request to scan one path. Created by the admission pathway,
/// consumed and discarded by the scan worker.
#[derive(Debug, Clone)]
pub struct ScanRequest {
    pub path: PathBuf,
    pub priority: ScanPriority,
    /// When the request entered the queue; the worker uses this to enforce
    /// the dwell delay.
    pub enqueued_at: Instant,
    /// Monotonic enqueue sequence, used as the FIFO tie-breaker.
    seq: u64,
}

impl Ord for ScanRequest {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap: cmp returning Greater means self pops
        // first. Lower priority rank → pops first.
        other
            .priority
            .rank()
            .cmp(&self.priority.rank())
            // FIFO within the same tier: earlier enqueued → pops first.
            .then(other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for ScanRequest {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for ScanRequest {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for ScanRequest {}

struct Inner {
    heap: BinaryHeap<ScanRequest>,
    next_seq: u64,
    drops: u64,
}

/// Thread-safe bounded priority queue of pending scans.
pub struct ScanQueue {
    inner: Mutex<Inner>,
    notify: Notify,
    capacity: usize,
}

impl ScanQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                heap: BinaryHeap::new(),
                next_seq: 0,
                drops: 0,
            }),
            notify: Notify::new(),
            capacity: capacity.max(1),
        }
    }

    /// Add a path to the queue. Returns `false` (and drops the request)
    /// when the queue is at capacity. Never blocks; safe to call from the
    /// watcher callback thread.
    pub fn enqueue(&self, path: PathBuf, priority: ScanPriority) -> bool {
        {
            let mut inner = self.lock();
            if inner.heap.len() >= self.capacity {
                inner.drops += 1;
                return false;
            }
            let seq = inner.next_seq;
            inner.next_seq += 1;
            inner.heap.push(ScanRequest {
                path,
                priority,
                enqueued_at: Instant::now(),
                seq,
            });
        }
        self.notify.notify_one();
        true
    }

    /// Remove and return the highest-priority request, waiting up to
    /// `timeout` for one to arrive. Returns `None` on timeout so the caller
    /// can observe its shutdown signal.
    pub async fn dequeue(&self, timeout: Duration) -> Option<ScanRequest> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            // Register interest before re-checking, so a concurrent enqueue
            // between the check and the await cannot be missed.
            let notified = self.notify.notified();
            if let Some(req) = self.pop() {
                return Some(req);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.pop();
            }
        }
    }

    /// Non-blocking pop.
    pub fn pop(&self) -> Option<ScanRequest> {
        self.lock().heap.pop()
    }

    /// Current queue depth.
    pub fn len(&self) -> usize {
        self.lock().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lifetime count of requests discarded because the queue was full.
    pub fn drops(&self) -> u64 {
        self.lock().drops
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned lock only means another thread panicked mid-operation;
        // the heap itself is still structurally valid.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
