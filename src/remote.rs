// SPDX-License-Identifier: MIT
//! HTTP client for the sync backend.
//!
//! One `reqwest::Client` for connection reuse; uploads and history reads go
//! through [`crate::retry::retry_with_backoff`] and retry only transport
//! failures, timeouts and 429/5xx. The health probe has its own short
//! timeout so a slow or hung backend cannot stall the sync engine's online
//! check.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::TransportError;
use crate::retry::{retry_with_backoff, RetryConfig};

/// Payload for `POST /scan-results`. Idempotent on `fingerprint` server-side.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResultUpload<'a> {
    pub file_name: &'a str,
    pub label: &'a str,
    pub fingerprint: &'a str,
}

/// One entry from `GET /history`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    #[serde(default)]
    pub file_name: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub fingerprint: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Outbound API surface the sync engine depends on.
///
/// A trait so the engine can be exercised against a scripted remote in
/// tests; [`RemoteClient`] is the real implementation.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Cheap, short-timeout liveness probe. Never retries.
    async fn is_online(&self) -> bool;

    /// Upload one scan result. A successful acknowledgment means the record
    /// may be marked synced.
    async fn push_scan_result(
        &self,
        upload: ScanResultUpload<'_>,
    ) -> Result<(), TransportError>;
}

pub struct RemoteClient {
    http: reqwest::Client,
    base_url: String,
    health_timeout: Duration,
    retry: RetryConfig,
}

impl RemoteClient {
    pub fn new(
        base_url: &str,
        request_timeout: Duration,
        health_timeout: Duration,
        retry: RetryConfig,
    ) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(TransportError::Connect)?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            health_timeout,
            retry,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `GET /health` with the full request timeout, returning the backend's
    /// health document.
    pub async fn health(&self) -> Result<serde_json::Value, TransportError> {
        let url = format!("{}/health", self.base_url);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(TransportError::from_reqwest)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }
        resp.json().await.map_err(TransportError::from_reqwest)
    }

    /// `GET /history?limit&offset`. Retried like any idempotent read.
    pub async fn scan_history(
        &self,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<HistoryEntry>, TransportError> {
        let url = format!("{}/history", self.base_url);
        retry_with_backoff(&self.retry, TransportError::is_retryable, || async {
            let resp = self
                .http
                .get(&url)
                .query(&[("limit", limit.min(100)), ("offset", offset)])
                .send()
                .await
                .map_err(TransportError::from_reqwest)?;
            let status = resp.status();
            if !status.is_success() {
                return Err(TransportError::Status(status.as_u16()));
            }
            resp.json().await.map_err(TransportError::from_reqwest)
        })
        .await
    }
}

#[async_trait]
impl RemoteApi for RemoteClient {
    async fn is_online(&self) -> bool {
        let url = format!("{}/health", self.base_url);
        // Separate, shorter timeout than regular requests: this probe gates
        // every sync cycle and must fail fast when the backend is down.
        let result = self
            .http
            .get(&url)
            .timeout(self.health_timeout)
            .send()
            .await;
        match result {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                debug!(err = %e, "health probe failed");
                false
            }
        }
    }

    async fn push_scan_result(
        &self,
        upload: ScanResultUpload<'_>,
    ) -> Result<(), TransportError> {
        let url = format!("{}/scan-results", self.base_url);
        // POST is idempotent here: the backend dedups on fingerprint.
        retry_with_backoff(&self.retry, TransportError::is_retryable, || async {
            let resp = self
                .http
                .post(&url)
                .json(&upload)
                .send()
                .await
                .map_err(TransportError::from_reqwest)?;
            let status = resp.status();
            if !status.is_success() {
                return Err(TransportError::Status(status.as_u16()));
            }
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_payload_uses_wire_field_names() {
        let upload = ScanResultUpload {
            file_name: "a.exe",
            label: "Malware",
            fingerprint: "deadbeef",
        };
        let json = serde_json::to_value(&upload).unwrap();
        assert_eq!(json["fileName"], "a.exe");
        assert_eq!(json["label"], "Malware");
        assert_eq!(json["fingerprint"], "deadbeef");
    }

    #[test]
    fn base_url_is_normalized() {
        let client = RemoteClient::new(
            "http://localhost:8000/",
            Duration::from_secs(10),
            Duration::from_secs(3),
            RetryConfig::default(),
        )
        .unwrap();
        assert_eq!(client.base_url(), "http://localhost:8000");
    }
}
