//! Bounded exponential-backoff retry for idempotent render-service reads.
//!
//! The default policy makes a single attempt. Raising
//! [`RetryConfig::max_attempts`] lets history queries and artifact
//! downloads ride out transient network failures; submissions are never
//! retried because a second `POST /prompt` would queue a second job.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::api::ComfyUIApiError;

/// Tunable parameters for the exponential-backoff strategy.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts including the first. `0` and `1` both mean no retry.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
    /// Factor by which the delay grows after each failure.
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Default backoff with `max_attempts` total attempts.
    pub fn with_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }
}

/// Calculate the next backoff delay from the current delay and config.
///
/// The result is clamped to [`RetryConfig::max_delay`].
pub fn next_delay(current: Duration, config: &RetryConfig) -> Duration {
    let next_ms = (current.as_millis() as f64 * config.multiplier) as u64;
    Duration::from_millis(next_ms).min(config.max_delay)
}

/// Run `op` until it succeeds, fails with a non-transient error, or
/// `config.max_attempts` is exhausted.
pub async fn retry_transient<T, F, Fut>(
    config: &RetryConfig,
    operation: &'static str,
    op: F,
) -> Result<T, ComfyUIApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ComfyUIApiError>>,
{
    retry_transient_until(config, operation, None, op).await
}

/// Like [`retry_transient`], but backoff sleeps never run past
/// `deadline`. Once the deadline is reached the last error is returned.
pub async fn retry_transient_until<T, F, Fut>(
    config: &RetryConfig,
    operation: &'static str,
    deadline: Option<Instant>,
    mut op: F,
) -> Result<T, ComfyUIApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ComfyUIApiError>>,
{
    let mut delay = config.initial_delay;
    let mut attempt = 1u32;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < config.max_attempts => {
                let sleep_for = match deadline {
                    Some(deadline) => {
                        let remaining = deadline.saturating_duration_since(Instant::now());
                        if remaining.is_zero() {
                            tracing::warn!(operation, attempt, error = %e, "Retry budget exhausted");
                            return Err(e);
                        }
                        delay.min(remaining)
                    }
                    None => delay,
                };
                tracing::warn!(
                    operation,
                    attempt,
                    delay_ms = sleep_for.as_millis() as u64,
                    error = %e,
                    "Transient render service failure, retrying",
                );
                tokio::time::sleep(sleep_for).await;
                delay = next_delay(delay, config);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
