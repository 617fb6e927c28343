//! Automatic retry of commands that lost a race.
//!
//! Only [`MarketplaceError::Conflict`] is retried: the operation is run
//! again from scratch, so it must rebuild its command from a fresh read of
//! the ledger. Every other error is returned immediately.
//!
//! # Example
//!
//! ```rust
//! use marketplace_runtime::retry::{RetryPolicy, retry_on_conflict};
//!
//! # async fn example() -> Result<(), marketplace_core::MarketplaceError> {
//! let value = retry_on_conflict(RetryPolicy::conflicts(1), || async {
//!     Ok::<_, marketplace_core::MarketplaceError>(42)
//! })
//! .await?;
//! assert_eq!(value, 42);
//! # Ok(())
//! # }
//! ```

use marketplace_core::MarketplaceError;
use marketplace_fulfillment::MarketplaceConfig;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Retry policy with exponential backoff.
///
/// # Default Values
///
/// - `max_retries`: 1
/// - `initial_delay`: 10ms
/// - `max_delay`: 200ms
/// - `multiplier`: 2.0
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Cap on the delay between retries
    pub max_delay: Duration,
    /// Backoff multiplier
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::conflicts(1)
    }
}

impl RetryPolicy {
    /// Short backoff suited to in-process conflicts
    #[must_use]
    pub const fn conflicts(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(200),
            multiplier: 2.0,
        }
    }

    /// Conflict policy with the configured retry count
    #[must_use]
    pub const fn from_config(config: &MarketplaceConfig) -> Self {
        Self::conflicts(config.conflict_retries)
    }

    /// Delay before retry number `attempt` (0-based):
    /// `initial_delay * multiplier ^ attempt`, capped at `max_delay`.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        if !delay.is_finite() || delay >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(delay)
    }
}

/// Runs `operation`, re-running it while it fails with a retryable error
/// and retries remain.
///
/// # Errors
///
/// The operation's last error.
pub async fn retry_on_conflict<F, Fut, T>(
    policy: RetryPolicy,
    mut operation: F,
) -> Result<T, MarketplaceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, MarketplaceError>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!(attempt, "Command succeeded after retry");
                }
                return Ok(result);
            },
            Err(err) if !err.is_retryable() => return Err(err),
            Err(err) if attempt >= policy.max_retries => {
                tracing::warn!(attempt, error = %err, "Conflict persisted, giving up");
                return Err(err);
            },
            Err(err) => {
                let delay = policy.delay_for_attempt(attempt);
                tracing::debug!(
                    attempt,
                    delay_ms = delay.as_millis(),
                    error = %err,
                    "Conflict, retrying"
                );
                sleep(delay).await;
                attempt += 1;
            },
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used)] // Test code can use unwrap/expect

    use super::*;
    use marketplace_core::{ConflictError, ValidationError};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn conflict() -> MarketplaceError {
        ConflictError::Concurrent {
            stream: "payouts-x".into(),
        }
        .into()
    }

    #[test]
    fn test_delay_is_capped() {
        let policy = RetryPolicy::conflicts(5);
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(10));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(20));
        assert_eq!(policy.delay_for_attempt(10), Duration::from_millis(200));
    }

    #[test]
    fn test_policy_follows_configured_retries() {
        let config = MarketplaceConfig {
            conflict_retries: 3,
            ..MarketplaceConfig::default()
        };
        assert_eq!(RetryPolicy::from_config(&config).max_retries, 3);
        assert_eq!(
            RetryPolicy::from_config(&MarketplaceConfig::default()),
            RetryPolicy::default()
        );
    }

    #[tokio::test]
    async fn test_conflict_is_retried_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let result = retry_on_conflict(RetryPolicy::conflicts(1), move || {
            let counter = Arc::clone(&counter);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(conflict())
                } else {
                    Ok("second try")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "second try");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let result: Result<(), _> = retry_on_conflict(RetryPolicy::conflicts(1), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err(conflict()) }
        })
        .await;

        assert!(result.unwrap_err().is_retryable());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_business_errors_are_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let result: Result<(), _> = retry_on_conflict(RetryPolicy::conflicts(3), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err(ValidationError::InvalidCode.into()) }
        })
        .await;

        assert_eq!(result.unwrap_err().code(), "VALIDATION_ERROR");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
