// SPDX-License-Identifier: MIT
//! Typed errors for the pipeline's external seams.
//!
//! Call sites choose explicitly whether to log-and-continue or propagate;
//! there is no catch-all. Admission failures (stat/permission) are not an
//! error type at all; the filter treats them as "skip" and logs at debug.

use std::path::PathBuf;
use thiserror::Error;

/// Failure produced by a [`crate::classifier::Classifier`] implementation.
///
/// Always non-fatal to the scan worker: the item is logged and skipped,
/// never stored as a verdict.
#[derive(Debug, Error)]
pub enum ClassifyError {
    /// The file could not be read (deleted mid-scan, permission denied, ...).
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The file could not be converted into the model's input representation.
    #[error("could not convert {path} into model input: {reason}")]
    Convert { path: PathBuf, reason: String },
    /// The underlying inference session failed.
    #[error("inference failed: {0}")]
    Inference(String),
}

/// Transport-level failure talking to the sync backend.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection-level failure (refused, DNS, TLS, broken pipe).
    #[error("connection failed: {0}")]
    Connect(reqwest::Error),
    /// The request exceeded its timeout.
    #[error("request timed out")]
    Timeout,
    /// The server answered with a non-success status code.
    #[error("server returned HTTP {0}")]
    Status(u16),
    /// The response body could not be decoded. Not retryable: the server
    /// answered, it just sent something unusable.
    #[error("failed to decode response body: {0}")]
    Decode(String),
}

impl TransportError {
    /// Whether a retry has any chance of succeeding.
    ///
    /// Connection failures and timeouts are always retryable. For HTTP
    /// statuses only 429 and 5xx are; a 4xx other than 429 will not get
    /// better by asking again, and neither will a body that failed to
    /// decode.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connect(_) | Self::Timeout => true,
            Self::Status(code) => *code == 429 || *code >= 500,
            Self::Decode(_) => false,
        }
    }

    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Connect(err)
        }
    }
}
