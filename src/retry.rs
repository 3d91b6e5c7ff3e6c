// SPDX-License-Identifier: MIT
//! Exponential backoff retry for backend calls.
//!
//! [`retry_with_backoff`] retries a fallible async operation with
//! exponentially increasing delays, but only while `should_retry` says the
//! error is worth another attempt. A 404 from the backend fails immediately;
//! a connection refusal gets the full backoff schedule.

use std::time::Duration;
use tracing::{debug, warn};

/// Configuration for [`retry_with_backoff`].
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the first try).
    ///
    /// Default: 3
    pub max_attempts: u32,
    /// Delay before the second attempt; each subsequent delay is multiplied
    /// by `multiplier`.
    ///
    /// Default: 1 s (so 1 s, 2 s, 4 s, ...)
    pub initial_delay: Duration,
    /// Upper bound on the delay between attempts.
    ///
    /// Default: 30 s
    pub max_delay: Duration,
    /// Multiplier applied to the previous delay on each retry.
    ///
    /// Default: 2.0
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Config with `attempts` tries and the default backoff schedule.
    pub fn with_attempts(attempts: u32) -> Self {
        Self {
            max_attempts: attempts.max(1),
            ..Self::default()
        }
    }

    /// Config suitable for quick unit tests (no real waiting).
    pub fn instant() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            multiplier: 2.0,
        }
    }
}

/// Retry an async operation with exponential backoff.
///
/// Calls `f()` up to `config.max_attempts` times. After a failure the error
/// is passed to `should_retry`; a `false` answer returns the error
/// immediately without sleeping. Otherwise the loop waits for the current
/// backoff delay (starting at `initial_delay`, multiplied by `multiplier`
/// each round, capped at `max_delay`) and tries again.
///
/// Returns `Ok(value)` on the first success, or the last error once attempts
/// are exhausted or the error is declared non-retryable.
pub async fn retry_with_backoff<F, Fut, T, E>(
    config: &RetryConfig,
    should_retry: impl Fn(&E) -> bool,
    mut f: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Debug,
{
    let max_attempts = config.max_attempts.max(1);
    let mut delay = config.initial_delay;
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        match f().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(attempt, "retry succeeded");
                }
                return Ok(value);
            }
            Err(e) => {
                if !should_retry(&e) {
                    debug!(attempt, err = ?e, "error is not retryable, giving up");
                    return Err(e);
                }
                if attempt >= max_attempts {
                    warn!(attempt, max = max_attempts, err = ?e, "all retry attempts exhausted");
                    return Err(e);
                }
                warn!(
                    attempt,
                    max = max_attempts,
                    delay_ms = delay.as_millis(),
                    err = ?e,
                    "attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
                let next_ms = (delay.as_millis() as f64 * config.multiplier) as u128;
                delay = Duration::from_millis(next_ms.min(config.max_delay.as_millis()) as u64);
            }
        }
    }
}
