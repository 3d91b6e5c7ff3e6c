// SPDX-License-Identifier: MIT
//! Daemon configuration (`config.toml` in the data dir).
//!
//! Every section has serde defaults, so a missing or partial file always
//! yields a runnable config. A default file is written on first run.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

const CONFIG_FILE: &str = "config.toml";

/// Hard ceiling on the scan queue, whatever the config says.
const QUEUE_CAPACITY_CEILING: usize = 10_000;

// ─── MonitorConfig ───────────────────────────────────────────────────────────

/// Filesystem monitoring (`[monitor]`).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Roots to watch recursively. Empty = platform user directories
    /// (Downloads, Desktop, Documents, removable media mounts).
    pub roots: Vec<PathBuf>,
    /// Dwell delay in seconds before a queued file is scanned, letting
    /// rapid writes settle.
    pub scan_delay_secs: u64,
    /// Scan queue capacity; admissions beyond it are dropped.
    pub queue_capacity: usize,
    /// Soft capacity of the seen-path cache.
    pub cache_capacity: usize,
    /// Paths (exact or directory prefix) exempt from scanning.
    pub whitelist_paths: Vec<PathBuf>,
    /// Extensions exempt from scanning (empty = no extension is exempt).
    pub whitelist_extensions: Vec<String>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            scan_delay_secs: 15,
            queue_capacity: 2048,
            cache_capacity: 1000,
            whitelist_paths: Vec::new(),
            whitelist_extensions: Vec::new(),
        }
    }
}

// ─── SyncConfig ──────────────────────────────────────────────────────────────

/// Background sync (`[sync]`).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SyncConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    /// Records fetched per cycle.
    pub batch_size: u32,
    /// Delay between consecutive uploads within one cycle.
    pub pacing_ms: u64,
    /// Synced records older than this are removed by the retention sweep.
    pub retention_days: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 30,
            batch_size: 50,
            pacing_ms: 100,
            retention_days: 30,
        }
    }
}

// ─── BackendConfig ───────────────────────────────────────────────────────────

/// Sync backend endpoint (`[backend]`).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackendConfig {
    pub url: String,
    pub timeout_secs: u64,
    /// Fast liveness-probe timeout, distinct from `timeout_secs` so a hung
    /// backend cannot stall the online check.
    pub health_timeout_secs: u64,
    pub retry_attempts: u32,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8000".to_string(),
            timeout_secs: 10,
            health_timeout_secs: 3,
            retry_attempts: 3,
        }
    }
}

// ─── LogConfig ───────────────────────────────────────────────────────────────

/// Logging (`[log]`).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level filter (trace, debug, info, warn, error).
    pub level: String,
    /// Optional log file (daily-rolling) in addition to stdout.
    pub file: Option<PathBuf>,
    /// `"pretty"` or `"json"`.
    pub format: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            format: "pretty".to_string(),
        }
    }
}

// ─── VigilConfig ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct VigilConfig {
    #[serde(skip)]
    pub data_dir: PathBuf,
    pub monitor: MonitorConfig,
    pub sync: SyncConfig,
    pub backend: BackendConfig,
    pub log: LogConfig,
}

impl VigilConfig {
    /// Load `config.toml` from `data_dir`, writing a default file first if
    /// none exists.
    pub fn load_or_create(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("failed to create data dir {}", data_dir.display()))?;
        let path = data_dir.join(CONFIG_FILE);

        let mut config: VigilConfig = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            toml::from_str(&raw).with_context(|| format!("invalid config {}", path.display()))?
        } else {
            let config = VigilConfig::default();
            let raw = toml::to_string_pretty(&config)?;
            std::fs::write(&path, raw)
                .with_context(|| format!("failed to write default config {}", path.display()))?;
            info!(path = %path.display(), "wrote default config");
            config
        };
        config.data_dir = data_dir.to_path_buf();
        Ok(config)
    }

    /// Default data dir: the platform data directory, or `.vigil` in the
    /// current directory when none is known.
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .map(|d| d.join("vigil"))
            .unwrap_or_else(|| PathBuf::from(".vigil"))
    }

    pub fn scan_delay(&self) -> Duration {
        Duration::from_secs(self.monitor.scan_delay_secs)
    }

    /// Configured capacity, clamped to a sane ceiling.
    pub fn queue_capacity(&self) -> usize {
        self.monitor.queue_capacity.clamp(1, QUEUE_CAPACITY_CEILING)
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync.interval_secs.max(1))
    }

    pub fn sync_pacing(&self) -> Duration {
        Duration::from_millis(self.sync.pacing_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.backend.timeout_secs.max(1))
    }

    pub fn health_timeout(&self) -> Duration {
        Duration::from_secs(self.backend.health_timeout_secs.max(1))
    }

    /// Configured roots, or the platform defaults when none are set.
    /// Only roots that currently exist are returned.
    pub fn monitored_roots(&self) -> Vec<PathBuf> {
        let candidates = if self.monitor.roots.is_empty() {
            default_monitor_roots()
        } else {
            self.monitor.roots.clone()
        };
        candidates.into_iter().filter(|p| p.exists()).collect()
    }
}

/// Platform defaults: user directories plus removable-media mount points.
fn default_monitor_roots() -> Vec<PathBuf> {
    let mut roots: Vec<PathBuf> = [dirs::download_dir(), dirs::desktop_dir(), dirs::document_dir()]
        .into_iter()
        .flatten()
        .collect();

    #[cfg(target_os = "linux")]
    {
        roots.push(PathBuf::from("/media"));
        roots.push(PathBuf::from("/mnt"));
    }
    #[cfg(target_os = "macos")]
    {
        roots.push(PathBuf::from("/Volumes"));
    }

    roots
}
