//! Retry with exponential backoff for C2's provider client (§4.2, §8 property 7).
//!
//! `RetryConfig` plus [`retry_with_backoff`] drive the client's non-streaming
//! call retry loop. Retryability is delegated entirely to
//! [`ErrorKind::is_retryable`](crate::ErrorKind::is_retryable) — this module
//! does not re-derive classification from status codes or error text.
//!
//! Streaming requests are never retried once bytes have started arriving
//! (§4.2); callers only feed this loop the initial connection attempt.

use crate::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Configuration for retry behavior: initial delay D, multiplier m, cap N,
/// ceiling C (§8 property 7).
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first (N).
    pub max_attempts: u32,
    /// Initial delay before the first retry (D).
    pub initial_delay: Duration,
    /// Ceiling on any single delay (C).
    pub max_delay: Duration,
    /// Exponential multiplier (m).
    pub backoff_multiplier: f64,
    /// Random jitter applied to each delay, as a fraction of it (0.0 to 1.0).
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    pub fn with_jitter_factor(mut self, jitter: f64) -> Self {
        self.jitter_factor = jitter.clamp(0.0, 1.0);
        self
    }

    /// Delay before retry attempt `attempt` (0-indexed): `D * m^attempt`,
    /// capped at `max_delay`, with symmetric jitter applied.
    fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_delay_ms = self.initial_delay.as_millis() as f64;
        let exponential_delay = base_delay_ms * self.backoff_multiplier.powi(attempt as i32);
        let capped_delay = exponential_delay.min(self.max_delay.as_millis() as f64);

        let jitter_range = capped_delay * self.jitter_factor;
        let jitter = rand::random::<f64>() * jitter_range;
        let final_delay = capped_delay + jitter - (jitter_range / 2.0);

        Duration::from_millis(final_delay.max(0.0) as u64)
    }
}

/// Retries `operation` up to `config.max_attempts` times, backing off between
/// retryable failures. Stops immediately on a non-retryable error, and on
/// cancellation of `cancelled` (checked before each attempt and during the
/// backoff wait).
pub async fn retry_with_backoff<F, Fut, T>(
    config: &RetryConfig,
    cancelled: &tokio_util::sync::CancellationToken,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_error: Option<Error> = None;

    for attempt in 0..config.max_attempts {
        if cancelled.is_cancelled() {
            return Err(last_error.unwrap_or_else(|| Error::unknown("operation cancelled")));
        }

        match operation().await {
            Ok(result) => return Ok(result),
            Err(err) => {
                if !err.is_retryable() {
                    return Err(err);
                }

                last_error = Some(err);

                if attempt < config.max_attempts - 1 {
                    let delay = config.calculate_delay(attempt);
                    tokio::select! {
                        _ = sleep(delay) => {}
                        _ = cancelled.cancelled() => {
                            return Err(last_error.unwrap_or_else(|| Error::unknown("operation cancelled")));
                        }
                    }
                }
            }
        }
    }

    Err(last_error.unwrap_or_else(|| Error::unknown("retry failed with no error")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn never_cancelled() -> tokio_util::sync::CancellationToken {
        tokio_util::sync::CancellationToken::new()
    }

    #[test]
    fn test_retry_config_builder() {
        let config = RetryConfig::new()
            .with_max_attempts(5)
            .with_initial_delay(Duration::from_millis(500))
            .with_max_delay(Duration::from_secs(30))
            .with_backoff_multiplier(1.5)
            .with_jitter_factor(0.2);

        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.backoff_multiplier, 1.5);
        assert_eq!(config.jitter_factor, 0.2);
    }

    #[test]
    fn test_calculate_delay_grows_exponentially() {
        let config = RetryConfig::new()
            .with_initial_delay(Duration::from_secs(1))
            .with_backoff_multiplier(2.0)
            .with_jitter_factor(0.0);

        assert!(config.calculate_delay(1) > config.calculate_delay(0));
        assert!(config.calculate_delay(2) > config.calculate_delay(1));
    }

    #[tokio::test]
    async fn test_retry_success_on_first_attempt() {
        let config = RetryConfig::new().with_max_attempts(3);
        let token = never_cancelled();
        let call_count = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let count_clone = call_count.clone();

        let result = retry_with_backoff(&config, &token, move || {
            count_clone.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            async { Ok::<i32, Error>(42) }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(call_count.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_success_after_transient_failures() {
        let config = RetryConfig::new()
            .with_max_attempts(3)
            .with_initial_delay(Duration::from_millis(5));
        let token = never_cancelled();
        let call_count = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let count_clone = call_count.clone();

        let result = retry_with_backoff(&config, &token, move || {
            let count = count_clone.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
            async move {
                if count < 3 {
                    Err(Error::timeout("slow"))
                } else {
                    Ok::<i32, Error>(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(call_count.load(std::sync::atomic::Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_does_not_retry_non_retryable() {
        let config = RetryConfig::new().with_max_attempts(5);
        let token = never_cancelled();
        let call_count = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let count_clone = call_count.clone();

        let result: Result<i32> = retry_with_backoff(&config, &token, move || {
            count_clone.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            async { Err(Error::authentication("bad key")) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(call_count.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_exhausts_attempts() {
        let config = RetryConfig::new()
            .with_max_attempts(2)
            .with_initial_delay(Duration::from_millis(5));
        let token = never_cancelled();
        let call_count = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let count_clone = call_count.clone();

        let result: Result<i32> = retry_with_backoff(&config, &token, move || {
            count_clone.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            async { Err(Error::server_error("boom")) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(call_count.load(std::sync::atomic::Ordering::SeqCst), 2);
    }
}
