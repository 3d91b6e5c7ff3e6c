// SPDX-License-Identifier: MIT
//! vigil: event-driven file scan pipeline with offline-first sync.
//!
//! Filesystem events flow through an admission filter and a seen-path cache
//! into a bounded priority queue; a single scan worker classifies each file
//! and persists the outcome to a local SQLite queue; a background sync
//! engine drains unsynced records to a remote backend whenever it is
//! reachable. The backend may be offline for arbitrary periods; records
//! wait locally and are retried until acknowledged.

pub mod admission;
pub mod cache;
pub mod classifier;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod queue;
pub mod remote;
pub mod retry;
pub mod store;
pub mod sync;
pub mod watch;
pub mod worker;

pub use classifier::{Classifier, FingerprintClassifier, ScanOutcome, Verdict};
pub use config::VigilConfig;
pub use pipeline::ScanPipeline;
pub use sync::{SyncCycleResult, SyncStatus};
