//! # console-resilience
//!
//! Client-side resilience and error observability for applications that talk
//! to a remote API.
//!
//! ## Key Features
//!
//! - **Circuit Breakers**: Per-operation breakers that fail fast while a
//!   remote operation is known to be failing, with a named registry
//! - **Retries**: Exponential backoff with jitter, predicates and cancellation
//! - **Classification**: One presentation directive and a friendly message
//!   for every failure
//! - **Metrics**: Rolling error statistics and a coarse health verdict
//! - **Reporting**: Throttled, fire-and-forget forwarding to an external
//!   error-tracking service
//!
//! ## Example
//!
//! ```rust,no_run
//! use console_resilience::{
//!     BreakerError, CircuitBreakerOverrides, CircuitBreakerRegistry, ErrorCategory, RawError,
//! };
//!
//! # async fn example() {
//! let registry = CircuitBreakerRegistry::default();
//! let breaker = registry.api().create_breaker(
//!     "shelters.list",
//!     CircuitBreakerOverrides::default().failure_threshold(2),
//! );
//!
//! let result = breaker
//!     .execute(|| async {
//!         Err::<(), _>(RawError::new("connection reset").with_category(ErrorCategory::Network))
//!     })
//!     .await;
//!
//! if let Err(BreakerError::Open { retry_after, .. }) = result {
//!     println!("Failing fast, next trial in {retry_after:?}");
//! }
//! # }
//! ```

#![allow(clippy::missing_errors_doc)]

// Failure taxonomy shared by every component
pub mod core_types;

// Logging utilities (re-exports tracing with log_* naming) - internal only
pub(crate) mod logging;

pub mod circuit_breaker;
pub mod classifier;
pub mod config;
pub mod error;
pub mod handler;
pub mod internals;
pub mod metrics;
pub mod registry;
pub mod reporting;
pub mod throttle;

pub use internals::retry;

#[cfg(test)]
pub mod tests;

// Re-export main types
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerState, CircuitBreakerStats};
pub use classifier::{
    classify, classify_app_error, friendly_message, PresentationDirective,
    PresentationPreferences, Surface,
};
pub use config::{
    CircuitBreakerConfig, CircuitBreakerOverrides, MetricsConfig, ReportingConfig,
    ResilienceConfig, ThrottleConfig,
};
pub use error::{BreakerError, ResilienceError, ResilienceResult, RetryError};
pub use handler::{ErrorHandler, HandledError};
pub use metrics::{ErrorMetrics, ErrorStats, MetricsHealth, MetricsHealthStatus};
pub use registry::{ApiBreakerFactory, CircuitBreakerRegistry, HealthSummary, HealthVerdict};
pub use reporting::{ErrorReport, ErrorReporter, ErrorSink, ReportDecision};
pub use retry::{RetryOptions, RetryOrchestrator, RetryPolicy};
pub use throttle::{FaultKind, ReportThrottle};

pub use core_types::{AppError, ErrorCategory, ErrorSeverity, RawError, TransportCategory};
