//! Retry orchestration with bounded attempts and exponential backoff
//!
//! This module retries transient, idempotent operations:
//! - Bounded attempts: initial call + `max_retries` retries
//! - Exponential backoff: 1s, 2s, 4s, 8s, 16s maximum, never shrinking
//! - Per-retry callback for silent telemetry
//! - Cooperative cancellation through a `CancellationToken`
//!
//! The last error is handed back exactly as the operation produced it;
//! classification and user notification are the caller's job.

use crate::core_types::AppError;
use crate::error::{BreakerError, ResilienceError, ResilienceResult, RetryError};
use crate::logging::{log_debug, log_error, log_info};

use std::fmt::Debug;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// Backoff settings shared by every retried operation
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RetryPolicy {
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries (before jitter)
    pub max_delay: Duration,
    /// Multiplier for exponential backoff, at least 1.0
    pub backoff_multiplier: f64,
    /// Upper bound of the random extra delay, as a fraction of the delay
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(16),
            backoff_multiplier: 2.0,
            jitter: 0.1, // Up to 10% jitter
        }
    }
}

impl RetryPolicy {
    pub fn validate(&self) -> ResilienceResult<()> {
        if self.backoff_multiplier.is_nan() || self.backoff_multiplier < 1.0 {
            return Err(ResilienceError::configuration_error(
                "retry.backoff_multiplier must be at least 1.0",
            ));
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(ResilienceError::configuration_error(
                "retry.jitter must be between 0.0 and 1.0",
            ));
        }
        if self.initial_delay > self.max_delay {
            return Err(ResilienceError::configuration_error(
                "retry.initial_delay must not exceed retry.max_delay",
            ));
        }
        Ok(())
    }
}

type RetryCallback<'a, E> = Box<dyn FnMut(u32, &E) + Send + 'a>;
type RetryPredicate<'a, E> = Box<dyn Fn(&E) -> bool + Send + Sync + 'a>;

/// Per-call retry options
pub struct RetryOptions<'a, E> {
    /// Retries after the initial attempt
    pub max_retries: u32,
    /// Label of the calling feature, for logs
    pub context: Option<String>,
    /// Aborts the wait for the next attempt, and the attempt in flight
    pub cancel: Option<CancellationToken>,
    on_retry: Option<RetryCallback<'a, E>>,
    retry_if: Option<RetryPredicate<'a, E>>,
}

impl<E> Default for RetryOptions<'_, E> {
    fn default() -> Self {
        Self {
            max_retries: 3,
            context: None,
            cancel: None,
            on_retry: None,
            retry_if: None,
        }
    }
}

impl<'a, E> RetryOptions<'a, E> {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Called before each retry with the retry number (1-based) and the
    /// error that triggered it.
    pub fn on_retry(mut self, callback: impl FnMut(u32, &E) + Send + 'a) -> Self {
        self.on_retry = Some(Box::new(callback));
        self
    }

    /// Only errors for which `predicate` returns true are retried; others are
    /// returned after the attempt that produced them.
    pub fn retry_if(mut self, predicate: impl Fn(&E) -> bool + Send + Sync + 'a) -> Self {
        self.retry_if = Some(Box::new(predicate));
        self
    }

    fn should_retry(&self, error: &E) -> bool {
        self.retry_if.as_ref().map_or(true, |predicate| predicate(error))
    }
}

impl<'a> RetryOptions<'a, AppError> {
    /// Retry only failures whose category a retry can plausibly fix.
    pub fn recoverable_only(self) -> Self {
        self.retry_if(|error: &AppError| error.category().is_recoverable())
    }
}

impl<'a> RetryOptions<'a, BreakerError<AppError>> {
    /// Retry recoverable operation failures; stop on an open circuit or a
    /// cancelled call.
    pub fn recoverable_only(self) -> Self {
        self.retry_if(|error: &BreakerError<AppError>| {
            error
                .as_inner()
                .is_some_and(|inner| inner.category().is_recoverable())
        })
    }
}

/// Retries operations according to a [`RetryPolicy`]
#[derive(Debug, Clone, Default)]
pub struct RetryOrchestrator {
    pub(crate) policy: RetryPolicy,
}

impl RetryOrchestrator {
    /// Create a new orchestrator with the given policy
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `operation`, retrying failures up to `options.max_retries` times.
    ///
    /// An always-failing operation is invoked exactly `max_retries + 1`
    /// times and the last error comes back in [`RetryError::Failed`].
    /// Cancellation yields [`RetryError::Cancelled`] and schedules nothing
    /// further.
    pub async fn retry_with_policy<F, Fut, T, E>(
        &self,
        mut operation: F,
        mut options: RetryOptions<'_, E>,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Debug,
    {
        let cancel = options.cancel.clone();
        let mut attempt: u32 = 0;
        let mut previous_delay = Duration::ZERO;

        loop {
            if cancel.as_ref().is_some_and(CancellationToken::is_cancelled) {
                return Err(self.cancelled(attempt, &options));
            }

            attempt += 1;
            log_debug!(
                attempt = attempt,
                max_retries = options.max_retries,
                context = ?options.context,
                "Executing operation with retry policy"
            );

            let result = match &cancel {
                Some(token) => {
                    tokio::select! {
                        biased;
                        result = operation() => result,
                        _ = token.cancelled() => return Err(self.cancelled(attempt, &options)),
                    }
                }
                None => operation().await,
            };

            let error = match result {
                Ok(value) => {
                    if attempt > 1 {
                        log_info!(
                            attempts = attempt,
                            context = ?options.context,
                            "Operation succeeded after retry"
                        );
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            if attempt > options.max_retries || !options.should_retry(&error) {
                log_error!(
                    attempts = attempt,
                    context = ?options.context,
                    error = ?error,
                    "Operation failed after all retry attempts"
                );
                return Err(RetryError::Failed {
                    attempts: attempt,
                    error,
                });
            }

            if let Some(callback) = options.on_retry.as_mut() {
                callback(attempt, &error);
            }

            let delay = self.next_delay(attempt, previous_delay);
            previous_delay = delay;
            log_debug!(
                attempt = attempt,
                delay_ms = delay.as_millis(),
                context = ?options.context,
                error = ?error,
                "Operation failed, retrying after delay"
            );

            match &cancel {
                Some(token) => {
                    tokio::select! {
                        _ = sleep(delay) => {}
                        _ = token.cancelled() => return Err(self.cancelled(attempt, &options)),
                    }
                }
                None => sleep(delay).await,
            }
        }
    }

    fn cancelled<E>(&self, attempts: u32, options: &RetryOptions<'_, E>) -> RetryError<E> {
        log_info!(
            attempts = attempts,
            context = ?options.context,
            "Retry cancelled by caller"
        );
        RetryError::Cancelled { attempts }
    }

    /// Base delay before retry number `attempt` (1-based), without jitter
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay_seconds =
            self.policy.initial_delay.as_secs_f64() * self.policy.backoff_multiplier.powi(exponent);

        Duration::try_from_secs_f64(delay_seconds.min(self.policy.max_delay.as_secs_f64()))
            .unwrap_or(self.policy.max_delay)
    }

    /// Jittered delay, never shorter than the previous one
    pub(crate) fn next_delay(&self, attempt: u32, previous: Duration) -> Duration {
        let base = self.calculate_delay(attempt);

        // Add jitter to prevent thundering herd
        let jitter = fastrand::f64() * self.policy.jitter;
        let jittered = Duration::try_from_secs_f64(base.as_secs_f64() * (1.0 + jitter))
            .unwrap_or(self.policy.max_delay);
        jittered.max(base).max(previous)
    }
}
