// SPDX-License-Identifier: MIT
//! Durable record store: the local SQLite table of scan outcomes pending or
//! already delivered to the backend.
//!
//! The store exclusively owns record identity and the fingerprint-uniqueness
//! invariant: uniqueness is enforced by the storage layer (UNIQUE column),
//! not in application code, so concurrent inserts stay safe. The scan worker
//! inserts; the sync engine flips `synced` and bumps attempt counters; the
//! retention sweep is the only delete path.

use anyhow::{Context as _, Result};
use chrono::Utc;
use sqlx::{sqlite::SqliteConnectOptions, SqlitePool};
use std::path::Path;
use std::str::FromStr;

/// One persisted scan outcome.
#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct QueueRecord {
    pub id: i64,
    pub file_name: String,
    pub label: String,
    /// SHA-256 content digest, lowercase hex. Unique across the table.
    pub fingerprint: String,
    /// RFC 3339 UTC timestamp.
    pub created_at: String,
    pub synced: bool,
    pub sync_attempts: i64,
    pub last_sync_attempt: Option<String>,
}

/// Aggregate table counts for status reporting.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct StoreCounts {
    pub total: i64,
    pub pending: i64,
    pub synced: i64,
}

#[derive(Clone)]
pub struct RecordStore {
    pool: SqlitePool,
}

impl RecordStore {
    /// Open (or create) `vigil.db` under `data_dir` and run migrations.
    ///
    /// Failure here is fatal to pipeline startup; a broken store is a
    /// broken precondition, not a transient condition.
    pub async fn open(data_dir: &Path) -> Result<Self> {
        tokio::fs::create_dir_all(data_dir)
            .await
            .with_context(|| format!("failed to create data dir {}", data_dir.display()))?;
        let db_path = data_dir.join("vigil.db");
        let opts =
            SqliteConnectOptions::from_str(&format!("sqlite://{}?mode=rwc", db_path.display()))?
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
                .create_if_missing(true);

        let pool = SqlitePool::connect_with(opts).await?;
        sqlx::migrate!("src/store/migrations")
            .run(&pool)
            .await
            .context("failed to run database migrations")?;
        Ok(Self { pool })
    }

    /// Record one scan outcome.
    ///
    /// Returns `Ok(false)` when a record with the same fingerprint already
    /// exists. Expected, not an error: identical content was already
    /// evaluated, possibly under a different path. First write wins.
    pub async fn insert(&self, file_name: &str, label: &str, fingerprint: &str) -> Result<bool> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "INSERT INTO scan_queue (file_name, label, fingerprint, created_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(file_name)
        .bind(label)
        .bind(fingerprint)
        .bind(&now)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(true),
            Err(e) => {
                let is_duplicate = e
                    .as_database_error()
                    .is_some_and(|db| db.is_unique_violation());
                if is_duplicate {
                    Ok(false)
                } else {
                    Err(e).context("failed to insert scan record")
                }
            }
        }
    }

    /// Unsynced records, oldest first, at most `limit`.
    pub async fn list_pending(&self, limit: u32) -> Result<Vec<QueueRecord>> {
        Ok(sqlx::query_as(
            "SELECT * FROM scan_queue WHERE synced = 0 ORDER BY created_at ASC, id ASC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Flip a record to synced. Terminal: a synced record is never re-sent.
    pub async fn mark_synced(&self, id: i64) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query("UPDATE scan_queue SET synced = 1, last_sync_attempt = ? WHERE id = ?")
            .bind(&now)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Bump the attempt counter after a failed upload.
    pub async fn increment_attempts(&self, id: i64) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "UPDATE scan_queue
             SET sync_attempts = sync_attempts + 1, last_sync_attempt = ?
             WHERE id = ?",
        )
        .bind(&now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get(&self, id: i64) -> Result<Option<QueueRecord>> {
        Ok(sqlx::query_as("SELECT * FROM scan_queue WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn counts(&self) -> Result<StoreCounts> {
        let (total, pending, synced): (i64, i64, i64) = sqlx::query_as(
            "SELECT COUNT(*),
                    COALESCE(SUM(CASE WHEN synced = 0 THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN synced = 1 THEN 1 ELSE 0 END), 0)
             FROM scan_queue",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(StoreCounts {
            total,
            pending,
            synced,
        })
    }

    /// Delete synced records older than `days`. Returns the number removed.
    ///
    /// Pending records are never swept; an unreachable backend must not
    /// cause data loss. RFC 3339 UTC strings compare lexicographically, so a
    /// plain `<` against the cutoff is correct.
    pub async fn sweep_old(&self, days: u32) -> Result<u64> {
        let cutoff = (Utc::now() - chrono::Duration::days(i64::from(days))).to_rfc3339();
        let result = sqlx::query("DELETE FROM scan_queue WHERE synced = 1 AND created_at < ?")
            .bind(&cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Clone of the underlying pool (Arc-backed, cheap).
    pub fn pool(&self) -> SqlitePool {
        self.pool.clone()
    }
}
