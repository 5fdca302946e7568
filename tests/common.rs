//! Test helper utilities for console-resilience integration tests
//!
//! Shared fixtures for end-to-end flows across the breaker, retry,
//! classification, metrics and reporting components.
//!
//! IMPORTANT: These helpers are test-only and should NEVER be used in production code.

// Allow dead code in test utilities - functions are used across different test files
#![allow(dead_code)]

use async_trait::async_trait;
use console_resilience::config::{CircuitBreakerOverrides, ReportingConfig};
use console_resilience::{
    CircuitBreakerRegistry, ErrorReport, ErrorSink, RawError, RetryPolicy, TransportCategory,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Sink that keeps every report it receives.
#[derive(Default)]
pub struct RecordingSink {
    reports: Mutex<Vec<ErrorReport>>,
}

impl RecordingSink {
    pub fn reports(&self) -> Vec<ErrorReport> {
        self.reports.lock().expect("sink lock").clone()
    }
}

#[async_trait]
impl ErrorSink for RecordingSink {
    async fn capture(&self, report: ErrorReport) -> anyhow::Result<()> {
        self.reports.lock().expect("sink lock").push(report);
        Ok(())
    }
}

/// Sink whose backend is always down.
pub struct FailingSink;

#[async_trait]
impl ErrorSink for FailingSink {
    async fn capture(&self, _report: ErrorReport) -> anyhow::Result<()> {
        anyhow::bail!("tracking backend unreachable")
    }
}

/// Jitter-free policy so paused-clock timings are exact.
pub fn create_fast_test_retry_policy() -> RetryPolicy {
    RetryPolicy {
        initial_delay: Duration::from_millis(100),
        max_delay: Duration::from_millis(400),
        backoff_multiplier: 2.0,
        jitter: 0.0,
    }
}

pub fn create_test_reporting_config() -> ReportingConfig {
    ReportingConfig {
        environment: "integration".to_string(),
        ..ReportingConfig::default()
    }
}

/// Registry with one API breaker for `name` tripping after `threshold`
/// failures and recovering after one second.
pub fn create_api_registry_with(name: &str, threshold: u32) -> Arc<CircuitBreakerRegistry> {
    let registry = Arc::new(CircuitBreakerRegistry::default());
    registry.api().create_breaker(
        name,
        CircuitBreakerOverrides::default()
            .failure_threshold(threshold)
            .recovery_timeout(Duration::from_secs(1)),
    );
    registry
}

pub fn service_unavailable() -> RawError {
    RawError::new("Service temporarily unavailable")
        .with_transport_category(TransportCategory::Server)
        .with_status(503)
}
