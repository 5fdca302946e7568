//! Duplicate-report throttling for low-level runtime faults.
//!
//! Uncaught exceptions, unhandled rejections and failed resource or network
//! loads tend to repeat in bursts. The throttler bounds how often one fault
//! fingerprint reaches the error-tracking sink without silencing it for the
//! rest of the session.

use crate::config::ThrottleConfig;
use crate::logging::{log_debug, log_trace};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::time::Instant;

/// Kind of low-level fault being reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    UncaughtException,
    UnhandledRejection,
    ResourceLoad,
    NetworkRequest,
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::UncaughtException => "uncaught_exception",
            Self::UnhandledRejection => "unhandled_rejection",
            Self::ResourceLoad => "resource_load",
            Self::NetworkRequest => "network_request",
        };
        f.write_str(label)
    }
}

/// Stable fingerprint for a fault: kind, message and where it came from
/// (source location for exceptions, URL for loads and requests).
pub fn fault_key(kind: FaultKind, message: &str, source: Option<&str>) -> String {
    format!("{kind}:{}:{}", message.trim(), source.unwrap_or("-"))
}

#[derive(Debug, Clone)]
struct ThrottleEntry {
    count: u32,
    last_report: Instant,
    suppressed: u64,
}

/// Rate limiter keyed by fault fingerprint.
#[derive(Debug)]
pub struct ReportThrottle {
    config: ThrottleConfig,
    entries: Mutex<HashMap<String, ThrottleEntry>>,
}

impl Default for ReportThrottle {
    fn default() -> Self {
        Self::new(ThrottleConfig::default())
    }
}

impl ReportThrottle {
    pub fn new(config: ThrottleConfig) -> Self {
        Self {
            config,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &ThrottleConfig {
        &self.config
    }

    /// Whether this occurrence of `key` should be reported.
    ///
    /// The first occurrence always reports. Later ones report while fewer
    /// than `max_reports_per_window` have been sent; once
    /// `report_interval` has passed since the last report the count starts
    /// over.
    pub fn should_report(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut entries = self.lock();

        let Some(entry) = entries.get_mut(key) else {
            if entries.len() >= self.config.max_tracked_keys {
                self.make_room(&mut entries, now);
            }
            entries.insert(
                key.to_string(),
                ThrottleEntry {
                    count: 1,
                    last_report: now,
                    suppressed: 0,
                },
            );
            return true;
        };

        if now.duration_since(entry.last_report) >= self.config.report_interval {
            log_debug!(
                fault = %key,
                suppressed = entry.suppressed,
                "Report window elapsed, resetting fault counter"
            );
            entry.count = 1;
            entry.last_report = now;
            return true;
        }

        if entry.count < self.config.max_reports_per_window {
            entry.count += 1;
            entry.last_report = now;
            return true;
        }

        entry.suppressed += 1;
        log_trace!(fault = %key, suppressed = entry.suppressed, "Duplicate fault report suppressed");
        false
    }

    /// Occurrences of `key` withheld so far.
    pub fn suppressed(&self, key: &str) -> u64 {
        self.lock().get(key).map_or(0, |entry| entry.suppressed)
    }

    /// Forget keys idle for longer than the report interval. Returns how
    /// many were dropped.
    pub fn prune(&self) -> usize {
        let now = Instant::now();
        let interval = self.config.report_interval;
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, entry| now.duration_since(entry.last_report) < interval);
        before - entries.len()
    }

    // Drop idle keys; if the map is still full, evict the least recently
    // reported one.
    fn make_room(&self, entries: &mut HashMap<String, ThrottleEntry>, now: Instant) {
        let interval = self.config.report_interval;
        let before = entries.len();
        entries.retain(|_, entry| now.duration_since(entry.last_report) < interval);

        if entries.len() >= self.config.max_tracked_keys {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_report)
                .map(|(key, _)| key.clone());
            if let Some(oldest) = oldest {
                entries.remove(&oldest);
            }
        }

        log_debug!(
            evicted = before - entries.len(),
            max_tracked_keys = self.config.max_tracked_keys,
            "Fault throttle at capacity, evicted keys"
        );
    }

    pub fn tracked_keys(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ThrottleEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
