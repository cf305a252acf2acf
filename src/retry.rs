//! Explicit retry loop for the remote extraction call.
//!
//! Only failures whose [`StatementImportError::retry_class`] is `Some` are
//! retried. Quota exhaustion backs off with a larger multiplier than a
//! transient overload. The original error is returned once the attempt
//! bound is reached.

use crate::config::RetryConfig;
use crate::error::{Result, RetryClass, StatementImportError};
use log::{info, warn};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total calls, the first one included.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub quota_multiplier: f64,
    pub overload_multiplier: f64,
    pub max_delay: Duration,
    /// Adds up to 25% on top of each computed delay.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: config.base_delay(),
            quota_multiplier: config.quota_multiplier,
            overload_multiplier: config.overload_multiplier,
            max_delay: config.max_delay(),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Same bounds, no waiting. Used where the caller drives time itself.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: false,
            ..Self::default()
        }
    }

    pub fn multiplier(&self, class: RetryClass) -> f64 {
        match class {
            RetryClass::Quota => self.quota_multiplier,
            RetryClass::Overload => self.overload_multiplier,
        }
    }

    /// Wait before retrying after the `attempt`-th failed call (1-based):
    /// `base * multiplier^attempt`, capped at `max_delay`.
    pub fn delay_for(&self, class: RetryClass, attempt: u32) -> Duration {
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let raw = self.base_delay.as_millis() as f64 * self.multiplier(class).powi(exponent);
        let capped = raw.min(self.max_delay.as_millis() as f64).max(0.0) as u64;

        let mut delay = Duration::from_millis(capped);
        if self.jitter && capped > 0 {
            let extra = (capped as f64 * 0.25 * rand::thread_rng().gen::<f64>()) as u64;
            delay += Duration::from_millis(extra);
        }
        delay
    }
}

/// Runs `operation` until it succeeds, fails with a non-retryable error, or
/// the attempt bound is reached.
pub async fn retry_with_policy<F, Fut, T>(
    policy: &RetryPolicy,
    operation_name: &str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;

    loop {
        let error: StatementImportError = match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    info!("{} succeeded on attempt {}", operation_name, attempt);
                }
                return Ok(value);
            }
            Err(e) => e,
        };

        let Some(class) = error.retry_class() else {
            return Err(error);
        };

        if attempt >= policy.max_attempts {
            warn!(
                "{} failed after {} attempts: {}",
                operation_name, attempt, error
            );
            return Err(error);
        }

        let delay = policy.delay_for(class, attempt);
        warn!(
            "{} attempt {}/{} failed ({:?}): {}. Retrying in {:?}",
            operation_name, attempt, policy.max_attempts, class, error, delay
        );
        sleep(delay).await;
        attempt += 1;
    }
}
