//! Test helper utilities for console-resilience tests
//!
//! Reusable fixtures shared by several test modules.
//!
//! IMPORTANT: These helpers are test-only and should NEVER be used in production code.

#![allow(dead_code)]

use crate::circuit_breaker::CircuitBreaker;
use crate::config::{CircuitBreakerConfig, MetricsConfig, ReportingConfig};
use crate::core_types::{AppError, ErrorCategory, ErrorSeverity};
use crate::error::BreakerError;
use crate::reporting::{ErrorReport, ErrorSink};
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use std::time::Duration;

mockall::mock! {
    pub Sink {}

    #[async_trait]
    impl ErrorSink for Sink {
        async fn capture(&self, report: ErrorReport) -> anyhow::Result<()>;
    }
}

/// Breaker config with millisecond recovery timeout and a long monitoring
/// period, so window rollover never interferes unless a test wants it.
pub fn create_test_breaker_config(
    name: &str,
    failure_threshold: u32,
    recovery_timeout_ms: u64,
    success_threshold: u32,
) -> CircuitBreakerConfig {
    CircuitBreakerConfig {
        name: name.to_string(),
        failure_threshold,
        recovery_timeout: Duration::from_millis(recovery_timeout_ms),
        monitoring_period: Duration::from_secs(3600),
        success_threshold,
    }
}

/// Fast, jitter-free policy: 10ms, 20ms, 40ms, capped at 50ms.
pub fn create_fast_test_retry_policy() -> RetryPolicy {
    RetryPolicy {
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(50),
        backoff_multiplier: 2.0,
        jitter: 0.0,
    }
}

pub fn create_test_metrics_config() -> MetricsConfig {
    MetricsConfig {
        report_interval: Duration::from_secs(1),
        ..MetricsConfig::default()
    }
}

pub fn create_test_reporting_config() -> ReportingConfig {
    ReportingConfig {
        environment: "test".to_string(),
        ..ReportingConfig::default()
    }
}

pub fn create_test_error(category: ErrorCategory, severity: ErrorSeverity, context: &str) -> AppError {
    AppError::new(format!("{category} failure in {context}"), category, severity).with_context(context)
}

/// Drive one failing call through `breaker`.
pub async fn fail_once(breaker: &CircuitBreaker) -> BreakerError<&'static str> {
    match breaker.execute(|| async { Err::<(), _>("boom") }).await {
        Err(error) => error,
        Ok(()) => panic!("failing operation unexpectedly succeeded"),
    }
}

/// Drive one successful call through `breaker`.
pub async fn succeed_once(breaker: &CircuitBreaker) -> Result<u32, BreakerError<&'static str>> {
    breaker.execute(|| async { Ok::<_, &'static str>(42) }).await
}
