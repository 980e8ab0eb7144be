//! Caller-side retry.
//!
//! Indirections never retry on their own. Callers that want to ride out a
//! flapping master wrap the call in [`RetryPolicy::run`], which retries only
//! errors that report themselves retryable.

use indirector_core::{ConfigError, IndirectorResult};
use std::future::Future;
use std::time::Duration;

/// Exponential backoff with a ceiling.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_multiplier: f32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// A policy that runs the operation exactly once.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backoff_multiplier.is_nan() || self.backoff_multiplier < 1.0 {
            return Err(ConfigError::InvalidValue {
                field: "backoff_multiplier".to_string(),
                value: self.backoff_multiplier.to_string(),
                reason: "must be >= 1.0".to_string(),
            });
        }
        if self.max_backoff < self.initial_backoff {
            return Err(ConfigError::InvalidValue {
                field: "max_backoff".to_string(),
                value: format!("{:?}", self.max_backoff),
                reason: "must be >= initial_backoff".to_string(),
            });
        }
        Ok(())
    }

    /// Delay before retry number `retry` (1-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
        let factor = f64::from(self.backoff_multiplier).powi(exponent);
        let nanos = self.initial_backoff.as_nanos() as f64 * factor;
        if !nanos.is_finite() || nanos >= self.max_backoff.as_nanos() as f64 {
            return self.max_backoff;
        }
        Duration::from_nanos(nanos as u64)
    }

    /// Run `operation`, retrying retryable failures up to `max_retries` times.
    pub async fn run<T, F, Fut>(&self, mut operation: F) -> IndirectorResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = IndirectorResult<T>>,
    {
        let mut retry = 0;
        loop {
            match operation().await {
                Err(err) if err.is_retryable() && retry < self.max_retries => {
                    retry += 1;
                    let delay = self.backoff(retry);
                    tracing::warn!(
                        error = %err,
                        retry,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "Retrying indirection call"
                    );
                    tokio::time::sleep(delay).await;
                }
                result => return result,
            }
        }
    }
}
