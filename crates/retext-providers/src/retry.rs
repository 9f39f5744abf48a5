//! Retry logic with exponential backoff for upstream calls
//!
//! Only the establishment of a call is retried: a unary request up to its
//! parsed body, or a streaming request up to its response headers. Bytes
//! already relayed to a client are never replayed.

use crate::error::BackendError;
use std::future::Future;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

/// Configuration for retry behavior with exponential backoff
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the initial one)
    pub max_attempts: u32,
    /// Delay in milliseconds before the first retry
    pub initial_delay_ms: u64,
    /// Maximum delay in milliseconds between retries
    pub max_delay_ms: u64,
    /// Multiplier applied to the delay after each failed attempt
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1000,
            max_delay_ms: 60_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Same attempt budget, no waiting between attempts.
    pub fn immediate() -> Self {
        Self {
            initial_delay_ms: 0,
            ..Self::default()
        }
    }

    /// A single attempt; used by probes that must report the first failure.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay after failed attempt number `attempt` (1-based).
    pub fn calculate_delay(&self, attempt: u32) -> u64 {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let base_delay = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(exponent);
        base_delay.min(self.max_delay_ms as f64) as u64
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// the attempt budget is spent. The last error is returned unchanged.
pub async fn with_retry<T, F, Fut>(
    config: &RetryConfig,
    label: &str,
    mut operation: F,
) -> Result<T, BackendError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, BackendError>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        debug!(operation = label, attempt, max_attempts, "Attempting upstream call");

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    debug!(operation = label, attempt, "Upstream call succeeded after retry");
                }
                return Ok(result);
            }
            Err(err) => {
                let kind = err.kind().map(|k| k.as_str()).unwrap_or("configuration");
                let category = err
                    .classification()
                    .map(|c| c.category.as_str())
                    .unwrap_or("incomplete");

                if !err.is_retryable() {
                    warn!(
                        operation = label,
                        attempt,
                        kind,
                        category,
                        detail = %err.detail(),
                        "Upstream call failed with a non-retryable error"
                    );
                    return Err(err);
                }

                if attempt >= max_attempts {
                    warn!(
                        operation = label,
                        attempt,
                        max_attempts,
                        kind,
                        category,
                        detail = %err.detail(),
                        "Max retry attempts reached, failing"
                    );
                    return Err(err);
                }

                let delay_ms = config.calculate_delay(attempt);
                warn!(
                    operation = label,
                    attempt,
                    max_attempts,
                    delay_ms,
                    kind,
                    category,
                    detail = %err.detail(),
                    "Upstream call failed, retrying after delay"
                );

                sleep(Duration::from_millis(delay_ms)).await;
                attempt += 1;
            }
        }
    }
}
