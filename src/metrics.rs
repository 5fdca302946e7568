//! Rolling error metrics.
//!
//! [`ErrorMetrics`] keeps a bounded, insertion-ordered buffer of
//! [`ErrorMetric`] entries and computes statistics over trailing windows.
//! Its health verdict is deliberately coarse and independent from the
//! circuit breaker registry's summary.
//!
//! An optional background task, started with
//! [`ErrorMetrics::start_reporting`], logs a summary of each reporting
//! interval in which errors occurred. It stops on [`ErrorMetrics::shutdown`]
//! or when the aggregator is dropped.

use crate::config::MetricsConfig;
use crate::core_types::{AppError, ErrorCategory, ErrorSeverity};
use crate::logging::{log_debug, log_info, log_warn};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const HEALTH_WINDOW: Duration = Duration::from_secs(60);

/// Environment tags attached to every recorded metric.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentTags {
    pub user_agent: Option<String>,
    pub location: Option<String>,
    pub session_id: Option<String>,
    pub user_id: Option<String>,
}

/// Immutable projection of an [`AppError`] kept for aggregation only.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorMetric {
    pub id: Uuid,
    pub correlation_id: String,
    pub message: String,
    pub category: ErrorCategory,
    pub severity: ErrorSeverity,
    pub context: Option<String>,
    pub status: Option<u16>,
    pub timestamp: DateTime<Utc>,
    pub tags: EnvironmentTags,
    #[serde(skip)]
    recorded_at: Instant,
}

impl ErrorMetric {
    fn from_error(error: &AppError, tags: &EnvironmentTags) -> Self {
        Self {
            id: Uuid::new_v4(),
            correlation_id: error.correlation_id().to_string(),
            message: error.message().to_string(),
            category: error.category(),
            severity: error.severity(),
            context: error.context().map(str::to_string),
            status: error.status(),
            timestamp: Utc::now(),
            tags: tags.clone(),
            recorded_at: Instant::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextCount {
    pub context: String,
    pub count: usize,
}

/// Statistics over a trailing window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorStats {
    pub window: Duration,
    pub total: usize,
    pub by_category: BTreeMap<ErrorCategory, usize>,
    pub by_severity: BTreeMap<ErrorSeverity, usize>,
    /// Most frequent contexts, highest first; ties in name order.
    pub top_contexts: Vec<ContextCount>,
    /// Counts per `YYYY-MM-DDTHH:00` bucket.
    pub hourly: BTreeMap<String, usize>,
    pub errors_per_minute: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricsHealthStatus {
    Healthy,
    Warning,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsHealth {
    pub status: MetricsHealthStatus,
    pub message: String,
    pub errors_last_minute: usize,
}

/// Bounded, time-ordered error buffer with trailing-window statistics.
#[derive(Debug)]
pub struct ErrorMetrics {
    config: MetricsConfig,
    tags: EnvironmentTags,
    buffer: Mutex<VecDeque<ErrorMetric>>,
    last_summary: Mutex<Option<ErrorStats>>,
    reporter: Mutex<Option<JoinHandle<()>>>,
    shutdown: CancellationToken,
}

impl Default for ErrorMetrics {
    fn default() -> Self {
        Self::new(MetricsConfig::default(), EnvironmentTags::default())
    }
}

impl ErrorMetrics {
    pub fn new(config: MetricsConfig, tags: EnvironmentTags) -> Self {
        Self {
            config,
            tags,
            buffer: Mutex::new(VecDeque::new()),
            last_summary: Mutex::new(None),
            reporter: Mutex::new(None),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &MetricsConfig {
        &self.config
    }

    /// Append a metric for `error`, dropping the oldest entries beyond
    /// `max_entries`.
    pub fn record(&self, error: &AppError) {
        let metric = ErrorMetric::from_error(error, &self.tags);
        let mut buffer = lock(&self.buffer);
        buffer.push_back(metric);
        while buffer.len() > self.config.max_entries {
            buffer.pop_front();
        }
    }

    /// Statistics over the trailing `window`, or the configured aggregation
    /// window when `None`. Read-only.
    pub fn get_stats(&self, window: Option<Duration>) -> ErrorStats {
        let window = window.unwrap_or(self.config.aggregation_window);
        let now = Instant::now();

        let mut stats = ErrorStats {
            window,
            total: 0,
            by_category: BTreeMap::new(),
            by_severity: BTreeMap::new(),
            top_contexts: Vec::new(),
            hourly: BTreeMap::new(),
            errors_per_minute: 0.0,
        };
        let mut contexts: HashMap<String, usize> = HashMap::new();

        for metric in lock(&self.buffer)
            .iter()
            .filter(|m| now.saturating_duration_since(m.recorded_at) <= window)
        {
            stats.total += 1;
            *stats.by_category.entry(metric.category).or_default() += 1;
            *stats.by_severity.entry(metric.severity).or_default() += 1;
            *contexts
                .entry(metric.context.clone().unwrap_or_else(|| "unknown".to_string()))
                .or_default() += 1;
            *stats
                .hourly
                .entry(metric.timestamp.format("%Y-%m-%dT%H:00").to_string())
                .or_default() += 1;
        }

        let mut ranked: Vec<ContextCount> = contexts
            .into_iter()
            .map(|(context, count)| ContextCount { context, count })
            .collect();
        ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.context.cmp(&b.context)));
        ranked.truncate(self.config.top_contexts);
        stats.top_contexts = ranked;

        let minutes = window.as_secs_f64() / 60.0;
        if minutes > 0.0 {
            stats.errors_per_minute = stats.total as f64 / minutes;
        }
        stats
    }

    /// Coarse verdict from the number of errors in the last minute.
    pub fn get_health_status(&self) -> MetricsHealth {
        let now = Instant::now();
        let errors_last_minute = lock(&self.buffer)
            .iter()
            .filter(|m| now.saturating_duration_since(m.recorded_at) <= HEALTH_WINDOW)
            .count();

        let (status, message) = if errors_last_minute > self.config.critical_threshold {
            (
                MetricsHealthStatus::Critical,
                format!("High error rate: {errors_last_minute} errors in the last minute"),
            )
        } else if errors_last_minute > self.config.warning_threshold {
            (
                MetricsHealthStatus::Warning,
                format!("Elevated error rate: {errors_last_minute} errors in the last minute"),
            )
        } else {
            (
                MetricsHealthStatus::Healthy,
                "Error rate is within normal limits".to_string(),
            )
        };

        MetricsHealth {
            status,
            message,
            errors_last_minute,
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.buffer).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.buffer).is_empty()
    }

    /// Copy of the buffered metrics, oldest first.
    pub fn entries(&self) -> Vec<ErrorMetric> {
        lock(&self.buffer).iter().cloned().collect()
    }

    pub fn clear(&self) {
        lock(&self.buffer).clear();
    }

    /// Summary emitted by the most recent reporting tick that saw errors.
    pub fn last_summary(&self) -> Option<ErrorStats> {
        lock(&self.last_summary).clone()
    }

    /// Spawn the periodic summary task on the current tokio runtime.
    ///
    /// Returns `false` when no runtime is available or the task is already
    /// running. The task holds only a weak reference to the aggregator.
    pub fn start_reporting(self: &Arc<Self>) -> bool {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            log_warn!("No tokio runtime available, error metrics reporting disabled");
            return false;
        };

        let mut reporter = lock(&self.reporter);
        if reporter.is_some() || self.shutdown.is_cancelled() {
            return false;
        }

        let period = self.config.report_interval.max(Duration::from_millis(1));
        let metrics = Arc::downgrade(self);
        let shutdown = self.shutdown.clone();

        *reporter = Some(runtime.spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(metrics) = metrics.upgrade() else { break };
                        metrics.emit_summary(period);
                    }
                }
            }
            log_debug!("Error metrics reporting stopped");
        }));

        log_debug!(
            report_interval_ms = period.as_millis(),
            "Error metrics reporting started"
        );
        true
    }

    /// Stop the periodic summary task. Recording keeps working.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        lock(&self.reporter).take();
    }

    fn emit_summary(&self, period: Duration) {
        let stats = self.get_stats(Some(period));
        if stats.total == 0 {
            return;
        }

        log_info!(
            total = stats.total,
            errors_per_minute = stats.errors_per_minute,
            by_category = ?stats.by_category,
            by_severity = ?stats.by_severity,
            top_contexts = ?stats.top_contexts,
            "Error metrics summary"
        );
        *lock(&self.last_summary) = Some(stats);
    }
}

impl Drop for ErrorMetrics {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
