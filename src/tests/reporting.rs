// Unit Tests for ErrorReporter
//
// UNIT UNDER TEST: ErrorReporter (with a mocked ErrorSink)
//
// BUSINESS RESPONSIBILITY:
//   - Forwards significant errors to the external tracking service
//   - Never forwards in development mode or below the severity floor
//   - Throttles repeated low-level faults
//   - Never lets a failing sink or a full queue affect the caller
//
// TEST COVERAGE:
//   - Severity floor and development mode gating
//   - Delivery of report fields and environment tag
//   - Sink failures are swallowed and later reports still delivered
//   - Fault throttling and queue overflow
//   - Shutdown drains the queue and closes the reporter
//   - A dead delivery worker is reported as closed, not as an error

use crate::config::ReportingConfig;
use crate::core_types::{ErrorCategory, ErrorSeverity};
use crate::error::ResilienceError;
use crate::reporting::{ErrorReport, ErrorReporter, ErrorSink, ReportDecision};
use crate::tests::helpers::{create_test_error, create_test_reporting_config, MockSink};
use crate::throttle::{FaultKind, ReportThrottle};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

fn spawn_reporter(sink: &Arc<MockSink>, config: ReportingConfig) -> ErrorReporter {
    let sink: Arc<dyn ErrorSink> = Arc::clone(sink) as Arc<dyn ErrorSink>;
    ErrorReporter::spawn(sink, config, ReportThrottle::default()).expect("reporter should start")
}

/// Sink whose client library blows up, taking the delivery worker with it.
struct PanickingSink;

#[async_trait]
impl ErrorSink for PanickingSink {
    async fn capture(&self, _report: ErrorReport) -> anyhow::Result<()> {
        panic!("tracking client crashed");
    }
}

#[cfg(test)]
mod report_gating_tests {
    use super::*;

    #[tokio::test]
    async fn test_high_severity_error_is_delivered_with_tags() {
        // Test verifies reports carry the error's identity and environment

        // Arrange
        let error = create_test_error(ErrorCategory::Server, ErrorSeverity::High, "checkout");
        let expected_id = error.correlation_id().to_string();
        let mut mock = MockSink::new();
        mock.expect_capture()
            .withf(move |report| {
                report.correlation_id.as_deref() == Some(expected_id.as_str())
                    && report.category == ErrorCategory::Server
                    && report.context.as_deref() == Some("checkout")
                    && report.tags.get("environment").map(String::as_str) == Some("test")
                    && report.fault.is_none()
            })
            .times(1)
            .returning(|_| Ok(()));
        let sink = Arc::new(mock);
        let reporter = spawn_reporter(&sink, create_test_reporting_config());

        // Act
        let decision = reporter.report(&error);
        reporter.shutdown().await;

        // Assert
        assert_eq!(decision, ReportDecision::Queued);
    }

    #[tokio::test]
    async fn test_errors_below_floor_are_not_forwarded() {
        // Arrange
        let mut mock = MockSink::new();
        mock.expect_capture().times(0);
        let sink = Arc::new(mock);
        let reporter = spawn_reporter(&sink, create_test_reporting_config());

        // Act
        let decision = reporter.report(&create_test_error(
            ErrorCategory::Validation,
            ErrorSeverity::Medium,
            "adopt-form",
        ));
        reporter.shutdown().await;

        // Assert
        assert_eq!(decision, ReportDecision::BelowSeverityFloor);
    }

    #[tokio::test]
    async fn test_development_mode_never_forwards() {
        // Arrange
        let mut mock = MockSink::new();
        mock.expect_capture().times(0);
        let sink = Arc::new(mock);
        let reporter = spawn_reporter(
            &sink,
            ReportingConfig {
                development_mode: true,
                ..create_test_reporting_config()
            },
        );

        // Act
        let decision = reporter.report(&create_test_error(
            ErrorCategory::Server,
            ErrorSeverity::Critical,
            "checkout",
        ));
        let fault = reporter.report_fault(FaultKind::UncaughtException, "boom", None);
        reporter.shutdown().await;

        // Assert
        assert_eq!(decision, ReportDecision::DevelopmentMode);
        assert_eq!(fault, ReportDecision::DevelopmentMode);
    }

    #[tokio::test]
    async fn test_lower_floor_forwards_medium_errors() {
        // Arrange
        let mut mock = MockSink::new();
        mock.expect_capture().times(1).returning(|_| Ok(()));
        let sink = Arc::new(mock);
        let reporter = spawn_reporter(
            &sink,
            ReportingConfig {
                min_severity: ErrorSeverity::Medium,
                ..create_test_reporting_config()
            },
        );

        // Act
        let decision = reporter.report(&create_test_error(
            ErrorCategory::Business,
            ErrorSeverity::Medium,
            "pet-detail",
        ));
        reporter.shutdown().await;

        // Assert
        assert_eq!(decision, ReportDecision::Queued);
    }
}

#[cfg(test)]
mod delivery_tests {
    use super::*;

    #[tokio::test]
    async fn test_sink_failure_is_swallowed() {
        // Test verifies a failing sink neither propagates nor stops delivery

        // Arrange
        let mut mock = MockSink::new();
        let mut sequence = mockall::Sequence::new();
        mock.expect_capture()
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|_| Err(anyhow::anyhow!("tracking service unavailable")));
        mock.expect_capture()
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|_| Ok(()));
        let sink = Arc::new(mock);
        let reporter = spawn_reporter(&sink, create_test_reporting_config());

        // Act
        let first = reporter.report(&create_test_error(ErrorCategory::Server, ErrorSeverity::High, "a"));
        let second = reporter.report(&create_test_error(ErrorCategory::Server, ErrorSeverity::High, "b"));
        reporter.shutdown().await;

        // Assert
        assert_eq!(first, ReportDecision::Queued);
        assert_eq!(second, ReportDecision::Queued);
    }

    #[tokio::test]
    async fn test_repeated_faults_are_throttled() {
        // Arrange
        let mut mock = MockSink::new();
        mock.expect_capture()
            .withf(|report| {
                report.fault == Some(FaultKind::UncaughtException)
                    && report.tags.get("source").map(String::as_str) == Some("app.js:42")
            })
            .times(3)
            .returning(|_| Ok(()));
        let sink = Arc::new(mock);
        let reporter = spawn_reporter(&sink, create_test_reporting_config());

        // Act
        let decisions: Vec<ReportDecision> = (0..5)
            .map(|_| reporter.report_fault(FaultKind::UncaughtException, "x is undefined", Some("app.js:42")))
            .collect();
        reporter.shutdown().await;

        // Assert
        assert_eq!(
            decisions,
            vec![
                ReportDecision::Queued,
                ReportDecision::Queued,
                ReportDecision::Queued,
                ReportDecision::Throttled,
                ReportDecision::Throttled,
            ]
        );
        assert_eq!(
            reporter
                .throttle()
                .suppressed("uncaught_exception:x is undefined:app.js:42"),
            2
        );
    }

    #[tokio::test]
    async fn test_resource_faults_fall_below_default_floor() {
        // Arrange
        let mut mock = MockSink::new();
        mock.expect_capture().times(0);
        let sink = Arc::new(mock);
        let reporter = spawn_reporter(&sink, create_test_reporting_config());

        // Act
        let decision = reporter.report_fault(FaultKind::ResourceLoad, "failed to load", Some("/logo.png"));
        reporter.shutdown().await;

        // Assert
        assert_eq!(decision, ReportDecision::BelowSeverityFloor);
    }

    #[tokio::test]
    async fn test_full_queue_drops_reports() {
        // Test verifies overflow drops instead of blocking the caller

        // Arrange
        let mut mock = MockSink::new();
        mock.expect_capture().times(1).returning(|_| Ok(()));
        let sink = Arc::new(mock);
        let reporter = spawn_reporter(
            &sink,
            ReportingConfig {
                queue_capacity: 1,
                ..create_test_reporting_config()
            },
        );
        let error = create_test_error(ErrorCategory::Server, ErrorSeverity::Critical, "checkout");

        // Act - the worker has not run yet on this single-threaded runtime
        let first = reporter.report(&error);
        let second = reporter.report(&error);
        reporter.shutdown().await;

        // Assert
        assert_eq!(first, ReportDecision::Queued);
        assert_eq!(second, ReportDecision::QueueFull);
    }
}

#[cfg(test)]
mod lifecycle_tests {
    use super::*;

    #[tokio::test]
    async fn test_reports_after_shutdown_are_closed() {
        // Arrange
        let mut mock = MockSink::new();
        mock.expect_capture().times(0);
        let sink = Arc::new(mock);
        let reporter = spawn_reporter(&sink, create_test_reporting_config());
        reporter.shutdown().await;

        // Act
        let decision = reporter.report(&create_test_error(
            ErrorCategory::Server,
            ErrorSeverity::Critical,
            "checkout",
        ));

        // Assert
        assert_eq!(decision, ReportDecision::Closed);
    }

    #[tokio::test]
    async fn test_reports_after_worker_died_are_closed() {
        // Arrange
        let reporter = ErrorReporter::spawn(
            Arc::new(PanickingSink),
            create_test_reporting_config(),
            ReportThrottle::default(),
        )
        .expect("reporter should start");
        let error = create_test_error(ErrorCategory::Server, ErrorSeverity::Critical, "checkout");
        assert_eq!(reporter.report(&error), ReportDecision::Queued);
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Act
        let decision = reporter.report(&error);
        reporter.shutdown().await;

        // Assert
        assert_eq!(decision, ReportDecision::Closed, "Caller is never handed an error");
    }

    #[test]
    fn test_spawn_outside_runtime_is_a_configuration_error() {
        // Arrange
        let sink: Arc<dyn ErrorSink> = Arc::new(MockSink::new());

        // Act
        let result = ErrorReporter::spawn(sink, ReportingConfig::default(), ReportThrottle::default());

        // Assert
        assert!(matches!(result, Err(ResilienceError::ConfigurationError { .. })));
    }

    #[tokio::test]
    async fn test_zero_capacity_is_rejected() {
        // Arrange
        let sink: Arc<dyn ErrorSink> = Arc::new(MockSink::new());
        let config = ReportingConfig {
            queue_capacity: 0,
            ..ReportingConfig::default()
        };

        // Act
        let result = ErrorReporter::spawn(sink, config, ReportThrottle::default());

        // Assert
        assert!(result.is_err());
    }
}
