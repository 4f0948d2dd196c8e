//! Retry driver for exports.
//!
//! The exporter itself makes exactly one attempt per call and reports whether
//! a failure is retryable. [`RetryPolicy`] owns the loop: exponential backoff,
//! server throttle hints, a total time budget and cancellation.

use crate::config::RetryConfig;
use crate::exporter::ExportError;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Retries an export according to a [`RetryConfig`].
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Creates a policy from configuration.
    ///
    /// A multiplier below 1.0, or one that is not finite, is treated as 1.0.
    pub fn new(config: RetryConfig) -> Self {
        if !(config.multiplier.is_finite() && config.multiplier >= 1.0) {
            tracing::warn!(
                multiplier = config.multiplier,
                "Retry multiplier must be a finite value of at least 1.0, using 1.0"
            );
        }
        Self { config }
    }

    /// Runs `attempt` until it succeeds, fails permanently, or the budget runs out.
    ///
    /// # Errors
    ///
    /// Returns the last attempt's error, or [`ExportError::Cancelled`] when
    /// `cancel` fires while waiting between attempts.
    pub async fn execute<F, Fut>(
        &self,
        cancel: &CancellationToken,
        mut attempt: F,
    ) -> Result<(), ExportError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(), ExportError>>,
    {
        let start = Instant::now();
        let mut backoff = self.config.initial_interval;
        let mut attempts = 0u32;

        loop {
            attempts += 1;

            let err = match attempt().await {
                Ok(()) => return Ok(()),
                Err(err) => err,
            };

            if !self.config.enabled {
                return Err(err);
            }

            if !err.is_retryable() {
                tracing::error!(
                    error = %err,
                    attempts,
                    "Export failed with non-retryable error, not retrying"
                );
                return Err(err);
            }

            let delay = self.delay(backoff, err.retry_after());
            if start.elapsed() + delay > self.config.max_elapsed_time {
                tracing::warn!(
                    error = %err,
                    attempts,
                    max_elapsed_time = ?self.config.max_elapsed_time,
                    "Retry budget exhausted, giving up"
                );
                return Err(err);
            }

            tracing::warn!(attempts, error = %err, ?delay, "Export attempt failed, retrying");

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ExportError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }

            backoff = self.next_backoff(backoff);
        }
    }

    fn delay(&self, backoff: Duration, hint: Option<Duration>) -> Duration {
        let delay = backoff.min(self.config.max_interval);
        match hint {
            Some(hint) if hint > delay => hint,
            _ => delay,
        }
    }

    fn multiplier(&self) -> f64 {
        let multiplier = self.config.multiplier;
        if multiplier.is_finite() && multiplier >= 1.0 {
            multiplier
        } else {
            1.0
        }
    }

    fn next_backoff(&self, backoff: Duration) -> Duration {
        let next = backoff.as_secs_f64() * self.multiplier();
        if next.is_finite() && next < self.config.max_interval.as_secs_f64() {
            Duration::from_secs_f64(next)
        } else {
            self.config.max_interval
        }
    }
}
