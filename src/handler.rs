//! Single entry point for failures that reach the UI boundary.
//!
//! Every handled error is recorded once in the metrics aggregator, offered to
//! the reporter (which applies its own severity floor), and classified into
//! exactly one presentation directive.

use crate::classifier::{classify_app_error, friendly_message, PresentationDirective, PresentationPreferences};
use crate::core_types::{AppError, RawError};
use crate::error::BreakerError;
use crate::logging::log_debug;
use crate::metrics::ErrorMetrics;
use crate::reporting::{ErrorReporter, ReportDecision};
use serde::Serialize;
use std::sync::Arc;

/// A handled failure, ready for the presentation layer.
#[derive(Debug, Clone, Serialize)]
pub struct HandledError {
    pub error: AppError,
    pub directive: PresentationDirective,
    pub user_message: String,
    /// `None` when no reporter is configured.
    #[serde(skip)]
    pub report: Option<ReportDecision>,
}

#[derive(Debug)]
pub struct ErrorHandler {
    metrics: Arc<ErrorMetrics>,
    reporter: Option<Arc<ErrorReporter>>,
}

impl ErrorHandler {
    pub fn new(metrics: Arc<ErrorMetrics>, reporter: Option<Arc<ErrorReporter>>) -> Self {
        Self { metrics, reporter }
    }

    pub fn metrics(&self) -> &Arc<ErrorMetrics> {
        &self.metrics
    }

    pub fn handle(&self, error: AppError, preferences: &PresentationPreferences) -> HandledError {
        self.metrics.record(&error);

        let report = self.reporter.as_ref().map(|reporter| reporter.report(&error));

        let directive = classify_app_error(&error, preferences);
        let user_message = friendly_message(error.category(), error.severity()).to_string();

        log_debug!(
            correlation_id = %error.correlation_id(),
            category = %error.category(),
            severity = %error.severity(),
            context = ?error.context(),
            report = ?report,
            "Handled error"
        );

        HandledError {
            error,
            directive,
            user_message,
            report,
        }
    }

    /// Normalize a transport-level error raised by the feature `context`,
    /// then handle it.
    pub fn handle_raw(
        &self,
        raw: RawError,
        context: Option<&str>,
        preferences: &PresentationPreferences,
    ) -> HandledError {
        self.handle(AppError::from_raw(raw, context), preferences)
    }

    /// Handle the outcome of a breaker-guarded call.
    ///
    /// Circuit-open rejections become a network error flagged as circuit
    /// open. Returns `None` for cancelled calls, which are not failures.
    pub fn handle_breaker_error(
        &self,
        error: BreakerError<AppError>,
        context: Option<&str>,
        preferences: &PresentationPreferences,
    ) -> Option<HandledError> {
        let error = match error {
            BreakerError::Open { name, retry_after } => {
                let error = AppError::circuit_open(&name, retry_after);
                match context {
                    Some(context) => error.with_context(context),
                    None => error,
                }
            }
            BreakerError::Cancelled { name } => {
                log_debug!(breaker = %name, "Cancelled call, nothing to handle");
                return None;
            }
            BreakerError::Operation(error) => error,
        };
        Some(self.handle(error, preferences))
    }
}
