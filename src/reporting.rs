//! Best-effort dispatch to the external error-tracking service.
//!
//! Reports go through a bounded queue drained by a background task, so the
//! caller never waits on the sink and a failing sink never surfaces as an
//! error. Reports are dropped (with a warning) when the queue is full.

use crate::config::ReportingConfig;
use crate::core_types::{AppError, ErrorCategory, ErrorSeverity};
use crate::error::{ResilienceError, ResilienceResult};
use crate::logging::{log_debug, log_warn};
use crate::throttle::{fault_key, FaultKind, ReportThrottle};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// The external error-tracking service.
#[async_trait]
pub trait ErrorSink: Send + Sync {
    /// Deliver one report. Errors are logged by the reporter and dropped.
    async fn capture(&self, report: ErrorReport) -> anyhow::Result<()>;
}

/// What the sink receives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub correlation_id: Option<String>,
    pub message: String,
    pub category: ErrorCategory,
    pub severity: ErrorSeverity,
    pub context: Option<String>,
    pub status: Option<u16>,
    pub fault: Option<FaultKind>,
    pub tags: BTreeMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

/// Why a report was or was not queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportDecision {
    Queued,
    /// Local development never reports.
    DevelopmentMode,
    BelowSeverityFloor,
    /// The duplicate-report throttler withheld it.
    Throttled,
    QueueFull,
    Closed,
}

/// Fire-and-forget front of an [`ErrorSink`].
#[derive(Debug)]
pub struct ErrorReporter {
    config: ReportingConfig,
    throttle: ReportThrottle,
    sender: mpsc::Sender<ErrorReport>,
    shutdown: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ErrorReporter {
    /// Start the delivery worker on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ResilienceError::ConfigurationError`] when called outside a
    /// tokio runtime or with a zero queue capacity.
    pub fn spawn(
        sink: Arc<dyn ErrorSink>,
        config: ReportingConfig,
        throttle: ReportThrottle,
    ) -> ResilienceResult<Self> {
        if config.queue_capacity == 0 {
            return Err(ResilienceError::configuration_error(
                "reporting.queue_capacity must be at least 1",
            ));
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            ResilienceError::configuration_error("Error reporter requires a tokio runtime")
        })?;

        let (sender, receiver) = mpsc::channel(config.queue_capacity);
        let shutdown = CancellationToken::new();
        let worker = runtime.spawn(deliver_reports(sink, receiver, shutdown.clone()));

        log_debug!(
            queue_capacity = config.queue_capacity,
            min_severity = %config.min_severity,
            development_mode = config.development_mode,
            "Error reporter started"
        );

        Ok(Self {
            config,
            throttle,
            sender,
            shutdown,
            worker: Mutex::new(Some(worker)),
        })
    }

    pub fn config(&self) -> &ReportingConfig {
        &self.config
    }

    pub fn throttle(&self) -> &ReportThrottle {
        &self.throttle
    }

    /// Queue a classified error for the sink if it clears the severity floor.
    pub fn report(&self, error: &AppError) -> ReportDecision {
        if let Some(skip) = self.gate(error.severity()) {
            return skip;
        }
        self.enqueue(ErrorReport {
            correlation_id: Some(error.correlation_id().to_string()),
            message: error.message().to_string(),
            category: error.category(),
            severity: error.severity(),
            context: error.context().map(str::to_string),
            status: error.status(),
            fault: None,
            tags: self.tags(),
            timestamp: error.timestamp(),
        })
    }

    /// Queue a low-level runtime fault, subject to duplicate throttling.
    ///
    /// `source` is the script location for exceptions or the URL for failed
    /// loads and requests.
    pub fn report_fault(&self, kind: FaultKind, message: &str, source: Option<&str>) -> ReportDecision {
        let (category, severity) = match kind {
            FaultKind::UncaughtException | FaultKind::UnhandledRejection => {
                (ErrorCategory::Unknown, ErrorSeverity::High)
            }
            FaultKind::ResourceLoad | FaultKind::NetworkRequest => {
                (ErrorCategory::Network, ErrorSeverity::Medium)
            }
        };
        if let Some(skip) = self.gate(severity) {
            return skip;
        }
        if !self.throttle.should_report(&fault_key(kind, message, source)) {
            return ReportDecision::Throttled;
        }

        let mut tags = self.tags();
        if let Some(source) = source {
            tags.insert("source".to_string(), source.to_string());
        }
        self.enqueue(ErrorReport {
            correlation_id: None,
            message: message.to_string(),
            category,
            severity,
            context: None,
            status: None,
            fault: Some(kind),
            tags,
            timestamp: Utc::now(),
        })
    }

    /// Stop accepting reports, deliver what is already queued, and wait for
    /// the worker to finish.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                log_warn!(error = %e, "Error reporter worker ended abnormally");
            }
        }
    }

    fn gate(&self, severity: ErrorSeverity) -> Option<ReportDecision> {
        if self.config.development_mode {
            return Some(ReportDecision::DevelopmentMode);
        }
        if severity < self.config.min_severity {
            return Some(ReportDecision::BelowSeverityFloor);
        }
        None
    }

    fn tags(&self) -> BTreeMap<String, String> {
        BTreeMap::from([("environment".to_string(), self.config.environment.clone())])
    }

    fn enqueue(&self, report: ErrorReport) -> ReportDecision {
        if self.shutdown.is_cancelled() {
            return ReportDecision::Closed;
        }
        match self.sender.try_send(report) {
            Ok(()) => ReportDecision::Queued,
            Err(TrySendError::Full(report)) => {
                log_warn!(
                    message = %report.message,
                    queue_capacity = self.config.queue_capacity,
                    "Error report queue full, dropping report"
                );
                ReportDecision::QueueFull
            }
            Err(TrySendError::Closed(report)) => {
                log_warn!(
                    message = %report.message,
                    "Error reporter worker gone, dropping report"
                );
                ReportDecision::Closed
            }
        }
    }
}

impl Drop for ErrorReporter {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn deliver_reports(
    sink: Arc<dyn ErrorSink>,
    mut receiver: mpsc::Receiver<ErrorReport>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            next = receiver.recv() => match next {
                Some(report) => deliver(sink.as_ref(), report).await,
                None => break,
            },
            _ = shutdown.cancelled() => {
                receiver.close();
                while let Ok(report) = receiver.try_recv() {
                    deliver(sink.as_ref(), report).await;
                }
                break;
            }
        }
    }
    log_debug!("Error reporter stopped");
}

async fn deliver(sink: &dyn ErrorSink, report: ErrorReport) {
    let correlation_id = report.correlation_id.clone();
    if let Err(e) = sink.capture(report).await {
        log_warn!(
            error = %e,
            correlation_id = ?correlation_id,
            "Error sink rejected report"
        );
    }
}
