// SPDX-License-Identifier: MIT
//! Classifier boundary.
//!
//! The pipeline only knows this trait and the fixed [`ScanOutcome`] shape;
//! file→input encoding and inference live behind it. Any format translation
//! a model needs happens inside its adapter, never in the pipeline.
//!
//! Implementations are not assumed safe for concurrent use; the scan
//! worker holds the handle behind a mutex and `classify` takes `&mut self`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::ClassifyError;

/// Classification verdict for one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Verdict {
    Benign,
    Malware,
}

impl Verdict {
    /// Label string as stored and uploaded.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Benign => "Benign",
            Self::Malware => "Malware",
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of classifying one file. Immutable once produced.
#[derive(Debug, Clone, Serialize)]
pub struct ScanOutcome {
    pub verdict: Verdict,
    /// Raw model output scores, one per class.
    pub raw_scores: Vec<f32>,
    /// SHA-256 content digest, lowercase hex.
    pub fingerprint: String,
    pub file_name: String,
    pub file_size_bytes: u64,
    pub produced_at: DateTime<Utc>,
    /// Where inference ran (e.g. `"cpu"`, a GPU name).
    pub device_descriptor: String,
}

/// Content classifier contract.
///
/// `classify` must be callable from the single scan-worker context; it may
/// block internally (file I/O, inference) as long as it does so off the
/// async executor (`spawn_blocking`).
#[async_trait]
pub trait Classifier: Send {
    async fn classify(&mut self, path: &Path) -> Result<ScanOutcome, ClassifyError>;
}

/// Streaming SHA-256 of a file's contents, lowercase hex.
pub fn fingerprint_file(path: &Path) -> std::io::Result<String> {
    use std::io::Read;

    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Fingerprint-only classifier.
///
/// Used by `vigild` when no inference model is wired in: hashes the file and
/// records it as benign, so the rest of the pipeline (dedup, store, sync) is
/// fully exercised. A real model adapter replaces this at construction time.
pub struct FingerprintClassifier;

#[async_trait]
impl Classifier for FingerprintClassifier {
    async fn classify(&mut self, path: &Path) -> Result<ScanOutcome, ClassifyError> {
        let owned: PathBuf = path.to_path_buf();
        let hashed = tokio::task::spawn_blocking(
            move || -> Result<(String, u64), (PathBuf, std::io::Error)> {
                let size = std::fs::metadata(&owned).map_err(|e| (owned.clone(), e))?.len();
                let digest = fingerprint_file(&owned).map_err(|e| (owned.clone(), e))?;
                Ok((digest, size))
            },
        )
        .await
        .map_err(|e| ClassifyError::Inference(format!("hash task panicked: {e}")))?;
        let (fingerprint, size) =
            hashed.map_err(|(path, source)| ClassifyError::Read { path, source })?;

        Ok(ScanOutcome {
            verdict: Verdict::Benign,
            raw_scores: vec![1.0, 0.0],
            fingerprint,
            file_name: file_name_of(path),
            file_size_bytes: size,
            produced_at: Utc::now(),
            device_descriptor: "cpu".to_string(),
        })
    }
}

/// Final path component as a string, falling back to the full path display.
pub fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
