//! Retry policies for transient failures.
//!
//! Two shapes of retry exist in the pipeline: bounded retries for database
//! writes (exhaustion dead-letters the event) and unbounded retries for
//! publishes that happen after a successful database write (abandoned only
//! when the worker shuts down).

use std::fmt::Display;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Configuration for bounded retry with exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Default policy with an overridden attempt budget (`MAX_RETRIES`).
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    fn next_delay(&self, delay: Duration) -> Duration {
        std::cmp::min(
            Duration::from_millis((delay.as_millis() as f64 * self.backoff_multiplier) as u64),
            self.max_delay,
        )
    }
}

/// Retry an operation with exponential backoff, bounded by `max_attempts`.
pub async fn retry_with_backoff<F, Fut, T, E>(
    operation: F,
    config: &RetryConfig,
    operation_name: &str,
) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: Display,
{
    let mut delay = config.initial_delay;
    let mut last_error = None;

    for attempt in 1..=config.max_attempts {
        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    info!(
                        operation = operation_name,
                        attempt, "operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(err) => {
                if attempt < config.max_attempts {
                    warn!(
                        operation = operation_name,
                        attempt,
                        max_attempts = config.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "operation failed, retrying"
                    );
                    last_error = Some(err);
                    sleep(delay).await;
                    delay = config.next_delay(delay);
                } else {
                    error!(
                        operation = operation_name,
                        attempt,
                        error = %err,
                        "operation failed after all retry attempts"
                    );
                    last_error = Some(err);
                }
            }
        }
    }

    // max_attempts >= 1, so at least one error was recorded.
    Err(last_error.unwrap())
}

/// Retry an operation indefinitely with exponential backoff until it
/// succeeds or the shutdown token fires. Returns `None` when abandoned.
pub async fn retry_until_cancelled<F, Fut, T, E>(
    operation: F,
    shutdown: &CancellationToken,
    config: &RetryConfig,
    operation_name: &str,
) -> Option<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: Display,
{
    let mut delay = config.initial_delay;
    let mut attempt: u64 = 0;

    loop {
        if shutdown.is_cancelled() {
            warn!(
                operation = operation_name,
                attempt, "abandoning retries, worker is shutting down"
            );
            return None;
        }

        attempt += 1;
        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    info!(
                        operation = operation_name,
                        attempt, "operation succeeded after retry"
                    );
                }
                return Some(result);
            }
            Err(err) => {
                warn!(
                    operation = operation_name,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "operation failed, retrying until shutdown"
                );
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        warn!(
                            operation = operation_name,
                            attempt, "abandoning retries, worker is shutting down"
                        );
                        return None;
                    }
                    _ = sleep(delay) => {}
                }
                delay = config.next_delay(delay);
            }
        }
    }
}
