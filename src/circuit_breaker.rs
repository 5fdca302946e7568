//! Circuit breaker guarding one class of remote operation.
//!
//! The breaker has three states:
//!
//! - **Closed**: normal operation, calls pass through
//! - **Open**: the operation is known to be failing, calls are rejected
//!   immediately without invoking it
//! - **HalfOpen**: trial period after the recovery timeout; a run of
//!   successes closes the circuit, any failure reopens it
//!
//! Bookkeeping happens under a short-lived lock that is never held while the
//! wrapped operation runs, so unrelated concurrent calls are not serialized.

use crate::config::CircuitBreakerConfig;
use crate::error::BreakerError;
use crate::logging::{log_debug, log_info, log_warn};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitBreakerState {
    /// Normal operation - calls pass through.
    Closed,
    /// Operation is failing - calls are rejected.
    Open,
    /// Testing recovery - calls pass through on probation.
    HalfOpen,
}

/// Read-only snapshot of a breaker's counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerStats {
    pub name: String,
    pub state: CircuitBreakerState,
    /// Reset on every transition and on a closed-window rollover.
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    /// Trial successes counted towards `success_threshold`.
    pub half_open_successes: u32,
    pub last_failure_time: Option<DateTime<Utc>>,
    pub last_success_time: Option<DateTime<Utc>>,
    /// Lifetime totals, never reset.
    pub total_requests: u64,
    pub total_failures: u64,
    pub total_successes: u64,
    pub total_rejections: u64,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitBreakerState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    half_open_successes: u32,
    last_failure_at: Option<Instant>,
    last_failure_time: Option<DateTime<Utc>>,
    last_success_time: Option<DateTime<Utc>>,
    window_started: Instant,
    total_requests: u64,
    total_failures: u64,
    total_successes: u64,
    total_rejections: u64,
}

impl BreakerInner {
    fn new() -> Self {
        Self {
            state: CircuitBreakerState::Closed,
            consecutive_failures: 0,
            consecutive_successes: 0,
            half_open_successes: 0,
            last_failure_at: None,
            last_failure_time: None,
            last_success_time: None,
            window_started: Instant::now(),
            total_requests: 0,
            total_failures: 0,
            total_successes: 0,
            total_rejections: 0,
        }
    }

    fn reset_counters(&mut self) {
        self.consecutive_failures = 0;
        self.consecutive_successes = 0;
        self.half_open_successes = 0;
    }
}

/// Circuit breaker for a single operation class.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker in the `Closed` state.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(BreakerInner::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Run `operation` through the breaker.
    ///
    /// While open and inside the recovery timeout the operation is never
    /// invoked and [`BreakerError::Open`] is returned. Otherwise the
    /// operation's own error is returned unchanged in
    /// [`BreakerError::Operation`] after the failure has been recorded.
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.acquire()?;
        let result = operation().await;
        self.complete(result)
    }

    /// Like [`execute`](Self::execute), but gives up when `cancel` fires.
    ///
    /// A call cancelled before the operation completes is charged neither a
    /// success nor a failure. An operation that finishes before the
    /// cancellation is observed is recorded normally.
    pub async fn execute_with_cancel<F, Fut, T, E>(
        &self,
        cancel: &CancellationToken,
        operation: F,
    ) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if cancel.is_cancelled() {
            return Err(self.cancelled());
        }
        self.acquire()?;

        tokio::select! {
            biased;
            result = operation() => self.complete(result),
            _ = cancel.cancelled() => Err(self.cancelled()),
        }
    }

    pub fn state(&self) -> CircuitBreakerState {
        self.lock().state
    }

    /// Remaining time before an open breaker admits a trial call; `None`
    /// unless open.
    pub fn time_until_trial(&self) -> Option<Duration> {
        let inner = self.lock();
        if inner.state != CircuitBreakerState::Open {
            return None;
        }
        let elapsed = inner
            .last_failure_at
            .map_or(self.config.recovery_timeout, |at| at.elapsed());
        Some(self.config.recovery_timeout.saturating_sub(elapsed))
    }

    pub fn stats(&self) -> CircuitBreakerStats {
        let inner = self.lock();
        CircuitBreakerStats {
            name: self.config.name.clone(),
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            consecutive_successes: inner.consecutive_successes,
            half_open_successes: inner.half_open_successes,
            last_failure_time: inner.last_failure_time,
            last_success_time: inner.last_success_time,
            total_requests: inner.total_requests,
            total_failures: inner.total_failures,
            total_successes: inner.total_successes,
            total_rejections: inner.total_rejections,
        }
    }

    /// Force the circuit open; the recovery timeout starts now.
    pub fn force_open(&self) {
        let mut inner = self.lock();
        inner.last_failure_at = Some(Instant::now());
        self.transition(&mut inner, CircuitBreakerState::Open, "forced");
    }

    /// Force the circuit closed and start a fresh monitoring window.
    pub fn force_close(&self) {
        let mut inner = self.lock();
        self.transition(&mut inner, CircuitBreakerState::Closed, "forced");
    }

    /// Force a trial period.
    pub fn force_half_open(&self) {
        let mut inner = self.lock();
        self.transition(&mut inner, CircuitBreakerState::HalfOpen, "forced");
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn cancelled<E>(&self) -> BreakerError<E> {
        log_debug!(breaker = %self.config.name, "Call cancelled before completion");
        BreakerError::Cancelled {
            name: self.config.name.clone(),
        }
    }

    /// State check before invoking the operation.
    fn acquire<E>(&self) -> Result<(), BreakerError<E>> {
        let mut inner = self.lock();
        inner.total_requests += 1;

        if inner.state != CircuitBreakerState::Open {
            return Ok(());
        }

        let elapsed = inner
            .last_failure_at
            .map_or(self.config.recovery_timeout, |at| at.elapsed());

        if elapsed >= self.config.recovery_timeout {
            self.transition(&mut inner, CircuitBreakerState::HalfOpen, "recovery timeout elapsed");
            return Ok(());
        }

        inner.total_rejections += 1;
        let retry_after = self.config.recovery_timeout.saturating_sub(elapsed);
        log_debug!(
            breaker = %self.config.name,
            retry_after_ms = retry_after.as_millis(),
            "Circuit open, rejecting call"
        );
        Err(BreakerError::Open {
            name: self.config.name.clone(),
            retry_after,
        })
    }

    fn complete<T, E>(&self, result: Result<T, E>) -> Result<T, BreakerError<E>> {
        match result {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(error) => {
                self.on_failure();
                Err(BreakerError::Operation(error))
            }
        }
    }

    fn on_success(&self) {
        let mut inner = self.lock();
        inner.total_successes += 1;
        inner.consecutive_successes += 1;
        inner.consecutive_failures = 0;
        inner.last_success_time = Some(Utc::now());

        match inner.state {
            CircuitBreakerState::HalfOpen => {
                inner.half_open_successes += 1;
                if inner.half_open_successes >= self.config.success_threshold {
                    self.transition(&mut inner, CircuitBreakerState::Closed, "trial succeeded");
                }
            }
            CircuitBreakerState::Closed => {
                if inner.window_started.elapsed() >= self.config.monitoring_period {
                    inner.reset_counters();
                    inner.window_started = Instant::now();
                    log_debug!(
                        breaker = %self.config.name,
                        monitoring_period_ms = self.config.monitoring_period.as_millis(),
                        "Monitoring window rolled over"
                    );
                }
            }
            CircuitBreakerState::Open => {
                // A call admitted before the trip finished late; the trip stands.
            }
        }
    }

    fn on_failure(&self) {
        let mut inner = self.lock();
        inner.total_failures += 1;
        inner.consecutive_failures += 1;
        inner.consecutive_successes = 0;
        inner.last_failure_at = Some(Instant::now());
        inner.last_failure_time = Some(Utc::now());

        match inner.state {
            CircuitBreakerState::Closed => {
                if inner.consecutive_failures >= self.config.failure_threshold {
                    self.transition(&mut inner, CircuitBreakerState::Open, "failure threshold reached");
                }
            }
            CircuitBreakerState::HalfOpen => {
                self.transition(&mut inner, CircuitBreakerState::Open, "trial call failed");
            }
            CircuitBreakerState::Open => {}
        }
    }

    fn transition(&self, inner: &mut BreakerInner, to: CircuitBreakerState, reason: &str) {
        let from = inner.state;
        inner.state = to;
        inner.reset_counters();
        if to == CircuitBreakerState::Closed {
            inner.window_started = Instant::now();
        }

        match to {
            CircuitBreakerState::Open => log_warn!(
                breaker = %self.config.name,
                from = ?from,
                to = ?to,
                reason = reason,
                failure_threshold = self.config.failure_threshold,
                recovery_timeout_ms = self.config.recovery_timeout.as_millis(),
                "Circuit breaker opened"
            ),
            CircuitBreakerState::HalfOpen | CircuitBreakerState::Closed => log_info!(
                breaker = %self.config.name,
                from = ?from,
                to = ?to,
                reason = reason,
                "Circuit breaker state changed"
            ),
        }
    }
}
