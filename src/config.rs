//! Configuration for every resilience component.
//!
//! [`ResilienceConfig`] bundles the per-component settings. It can be built
//! from defaults, from a parsed `key = value` section, or from `RESILIENCE_*`
//! environment variables.

use crate::core_types::ErrorSeverity;
use crate::error::{ResilienceError, ResilienceResult};
use crate::logging::log_debug;
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

/// Prefix under which [`CircuitBreakerRegistry::api`](crate::CircuitBreakerRegistry::api)
/// namespaces its breakers.
pub const API_BREAKER_PREFIX: &str = "api:";

/// Environment variable prefix read by [`ResilienceConfig::from_env`].
pub const ENV_PREFIX: &str = "RESILIENCE_";

/// Settings for a single circuit breaker, fixed at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Logical operation name, used in logs and registry lookups.
    pub name: String,
    /// Consecutive failures in `Closed` before tripping.
    pub failure_threshold: u32,
    /// Minimum time in `Open` before a trial call is allowed.
    pub recovery_timeout: Duration,
    /// Window after which consecutive counters in `Closed` are forgotten.
    pub monitoring_period: Duration,
    /// Consecutive successes in `HalfOpen` required to close again.
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            monitoring_period: Duration::from_secs(120),
            success_threshold: 2,
        }
    }
}

impl CircuitBreakerConfig {
    /// Default settings under the given name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Defaults tuned for remote API calls: trip sooner, try again sooner.
    pub fn api_defaults() -> Self {
        Self {
            name: "api".to_string(),
            failure_threshold: 3,
            recovery_timeout: Duration::from_secs(30),
            monitoring_period: Duration::from_secs(60),
            success_threshold: 2,
        }
    }

    /// Copy of these settings with the overrides applied on top.
    pub fn merged(&self, name: impl Into<String>, overrides: &CircuitBreakerOverrides) -> Self {
        Self {
            name: name.into(),
            failure_threshold: overrides.failure_threshold.unwrap_or(self.failure_threshold),
            recovery_timeout: overrides.recovery_timeout.unwrap_or(self.recovery_timeout),
            monitoring_period: overrides.monitoring_period.unwrap_or(self.monitoring_period),
            success_threshold: overrides.success_threshold.unwrap_or(self.success_threshold),
        }
    }

    pub fn validate(&self) -> ResilienceResult<()> {
        if self.failure_threshold == 0 {
            return Err(ResilienceError::configuration_error(format!(
                "Circuit breaker '{}' failure_threshold must be at least 1",
                self.name
            )));
        }
        if self.success_threshold == 0 {
            return Err(ResilienceError::configuration_error(format!(
                "Circuit breaker '{}' success_threshold must be at least 1",
                self.name
            )));
        }
        Ok(())
    }
}

/// Per-breaker overrides merged onto registry defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerOverrides {
    pub failure_threshold: Option<u32>,
    pub recovery_timeout: Option<Duration>,
    pub monitoring_period: Option<Duration>,
    pub success_threshold: Option<u32>,
}

impl CircuitBreakerOverrides {
    pub fn failure_threshold(mut self, value: u32) -> Self {
        self.failure_threshold = Some(value);
        self
    }

    pub fn recovery_timeout(mut self, value: Duration) -> Self {
        self.recovery_timeout = Some(value);
        self
    }

    pub fn monitoring_period(mut self, value: Duration) -> Self {
        self.monitoring_period = Some(value);
        self
    }

    pub fn success_threshold(mut self, value: u32) -> Self {
        self.success_threshold = Some(value);
        self
    }
}

/// Duplicate-report throttling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThrottleConfig {
    /// Reports allowed per fault key before suppression kicks in.
    pub max_reports_per_window: u32,
    /// Quiet time after which a key's counter resets.
    pub report_interval: Duration,
    /// Fingerprints remembered at once; idle ones are pruned first, then
    /// the least recently reported.
    pub max_tracked_keys: usize,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            max_reports_per_window: 3,
            report_interval: Duration::from_secs(60),
            max_tracked_keys: 1000,
        }
    }
}

/// Error metrics aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Entries retained; the oldest are dropped first.
    pub max_entries: usize,
    /// Window used by `get_stats(None)`.
    pub aggregation_window: Duration,
    /// Period of the background summary report.
    pub report_interval: Duration,
    /// Number of contexts kept in the top-N breakdown.
    pub top_contexts: usize,
    /// Errors in the last minute above which health is `Warning`.
    pub warning_threshold: usize,
    /// Errors in the last minute above which health is `Critical`.
    pub critical_threshold: usize,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            aggregation_window: Duration::from_secs(60 * 60),
            report_interval: Duration::from_secs(5 * 60),
            top_contexts: 10,
            warning_threshold: 5,
            critical_threshold: 10,
        }
    }
}

/// External error-tracking dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportingConfig {
    /// Lowest severity forwarded to the sink.
    pub min_severity: ErrorSeverity,
    /// Local development: never forward anything.
    pub development_mode: bool,
    /// Bound of the fire-and-forget queue.
    pub queue_capacity: usize,
    /// Environment tag attached to every report.
    pub environment: String,
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            min_severity: ErrorSeverity::High,
            development_mode: false,
            queue_capacity: 100,
            environment: "production".to_string(),
        }
    }
}

/// Settings for the whole resilience layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResilienceConfig {
    pub breaker: CircuitBreakerConfig,
    pub api_breaker: CircuitBreakerConfig,
    pub retry: RetryPolicy,
    pub throttle: ThrottleConfig,
    pub metrics: MetricsConfig,
    pub reporting: ReportingConfig,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            breaker: CircuitBreakerConfig::default(),
            api_breaker: CircuitBreakerConfig::api_defaults(),
            retry: RetryPolicy::default(),
            throttle: ThrottleConfig::default(),
            metrics: MetricsConfig::default(),
            reporting: ReportingConfig::default(),
        }
    }
}

/// Keys understood by [`ResilienceConfig::from_section`].
pub const SECTION_KEYS: &[&str] = &[
    "breaker.failure_threshold",
    "breaker.recovery_timeout_ms",
    "breaker.monitoring_period_ms",
    "breaker.success_threshold",
    "api_breaker.failure_threshold",
    "api_breaker.recovery_timeout_ms",
    "api_breaker.monitoring_period_ms",
    "api_breaker.success_threshold",
    "retry.initial_delay_ms",
    "retry.max_delay_ms",
    "retry.backoff_multiplier",
    "retry.jitter",
    "throttle.max_reports_per_window",
    "throttle.report_interval_ms",
    "throttle.max_tracked_keys",
    "metrics.max_entries",
    "metrics.aggregation_window_ms",
    "metrics.report_interval_ms",
    "metrics.top_contexts",
    "metrics.warning_threshold",
    "metrics.critical_threshold",
    "reporting.min_severity",
    "reporting.development_mode",
    "reporting.queue_capacity",
    "reporting.environment",
];

impl ResilienceConfig {
    /// Validate every section.
    ///
    /// # Errors
    ///
    /// Returns [`ResilienceError::ConfigurationError`] on the first invalid
    /// setting found.
    pub fn validate(&self) -> ResilienceResult<()> {
        self.breaker.validate()?;
        self.api_breaker.validate()?;
        self.retry.validate()?;

        if self.throttle.max_reports_per_window == 0 {
            return Err(ResilienceError::configuration_error(
                "throttle.max_reports_per_window must be at least 1",
            ));
        }
        if self.throttle.max_tracked_keys == 0 {
            return Err(ResilienceError::configuration_error(
                "throttle.max_tracked_keys must be at least 1",
            ));
        }
        if self.metrics.max_entries == 0 {
            return Err(ResilienceError::configuration_error(
                "metrics.max_entries must be at least 1",
            ));
        }
        if self.metrics.report_interval.is_zero() {
            return Err(ResilienceError::configuration_error(
                "metrics.report_interval must be greater than zero",
            ));
        }
        if self.metrics.warning_threshold > self.metrics.critical_threshold {
            return Err(ResilienceError::configuration_error(
                "metrics.warning_threshold must not exceed metrics.critical_threshold",
            ));
        }
        if self.reporting.queue_capacity == 0 {
            return Err(ResilienceError::configuration_error(
                "reporting.queue_capacity must be at least 1",
            ));
        }
        Ok(())
    }

    /// Build configuration from parsed section data, starting from defaults.
    ///
    /// Durations are given in milliseconds (`*_ms` keys). Unknown keys are
    /// ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ResilienceError::ConfigurationError`] if a value fails to
    /// parse or the resulting configuration does not validate.
    pub fn from_section(section: &HashMap<String, String>) -> ResilienceResult<Self> {
        log_debug!(keys = section.len(), "Creating resilience configuration from section");

        let mut config = Self::default();
        apply_breaker(&mut config.breaker, "breaker", section)?;
        apply_breaker(&mut config.api_breaker, "api_breaker", section)?;

        if let Some(ms) = parse_param::<u64>(section, "retry.initial_delay_ms")? {
            config.retry.initial_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_param::<u64>(section, "retry.max_delay_ms")? {
            config.retry.max_delay = Duration::from_millis(ms);
        }
        if let Some(multiplier) = parse_param::<f64>(section, "retry.backoff_multiplier")? {
            config.retry.backoff_multiplier = multiplier;
        }
        if let Some(jitter) = parse_param::<f64>(section, "retry.jitter")? {
            config.retry.jitter = jitter;
        }

        if let Some(max) = parse_param(section, "throttle.max_reports_per_window")? {
            config.throttle.max_reports_per_window = max;
        }
        if let Some(ms) = parse_param::<u64>(section, "throttle.report_interval_ms")? {
            config.throttle.report_interval = Duration::from_millis(ms);
        }
        if let Some(max) = parse_param(section, "throttle.max_tracked_keys")? {
            config.throttle.max_tracked_keys = max;
        }

        if let Some(max) = parse_param(section, "metrics.max_entries")? {
            config.metrics.max_entries = max;
        }
        if let Some(ms) = parse_param::<u64>(section, "metrics.aggregation_window_ms")? {
            config.metrics.aggregation_window = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_param::<u64>(section, "metrics.report_interval_ms")? {
            config.metrics.report_interval = Duration::from_millis(ms);
        }
        if let Some(top) = parse_param(section, "metrics.top_contexts")? {
            config.metrics.top_contexts = top;
        }
        if let Some(threshold) = parse_param(section, "metrics.warning_threshold")? {
            config.metrics.warning_threshold = threshold;
        }
        if let Some(threshold) = parse_param(section, "metrics.critical_threshold")? {
            config.metrics.critical_threshold = threshold;
        }

        if let Some(severity) = parse_param::<ErrorSeverity>(section, "reporting.min_severity")? {
            config.reporting.min_severity = severity;
        }
        if let Some(dev) = parse_param(section, "reporting.development_mode")? {
            config.reporting.development_mode = dev;
        }
        if let Some(capacity) = parse_param(section, "reporting.queue_capacity")? {
            config.reporting.queue_capacity = capacity;
        }
        if let Some(environment) = section.get("reporting.environment") {
            config.reporting.environment = environment.trim().to_string();
        }

        config.validate()?;
        Ok(config)
    }

    /// Build configuration from `RESILIENCE_*` environment variables.
    ///
    /// Each section key maps to an upper-cased variable with dots replaced by
    /// underscores: `breaker.failure_threshold` is read from
    /// `RESILIENCE_BREAKER_FAILURE_THRESHOLD`.
    ///
    /// # Errors
    ///
    /// Same as [`from_section`](Self::from_section).
    pub fn from_env() -> ResilienceResult<Self> {
        let section: HashMap<String, String> = SECTION_KEYS
            .iter()
            .filter_map(|key| {
                std::env::var(env_var_name(key))
                    .ok()
                    .map(|value| (key.to_string(), value))
            })
            .collect();

        log_debug!(
            variables_found = section.len(),
            "Loading resilience configuration from environment"
        );

        Self::from_section(&section)
    }
}

/// Environment variable holding a section key.
pub fn env_var_name(key: &str) -> String {
    format!("{ENV_PREFIX}{}", key.replace('.', "_").to_ascii_uppercase())
}

fn apply_breaker(
    breaker: &mut CircuitBreakerConfig,
    prefix: &str,
    section: &HashMap<String, String>,
) -> ResilienceResult<()> {
    if let Some(threshold) = parse_param(section, &format!("{prefix}.failure_threshold"))? {
        breaker.failure_threshold = threshold;
    }
    if let Some(ms) = parse_param::<u64>(section, &format!("{prefix}.recovery_timeout_ms"))? {
        breaker.recovery_timeout = Duration::from_millis(ms);
    }
    if let Some(ms) = parse_param::<u64>(section, &format!("{prefix}.monitoring_period_ms"))? {
        breaker.monitoring_period = Duration::from_millis(ms);
    }
    if let Some(threshold) = parse_param(section, &format!("{prefix}.success_threshold"))? {
        breaker.success_threshold = threshold;
    }
    Ok(())
}

/// Parse a parameter from the section, rejecting values that do not parse
fn parse_param<T: FromStr>(section: &HashMap<String, String>, key: &str) -> ResilienceResult<Option<T>> {
    match section.get(key) {
        None => Ok(None),
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|_| {
            ResilienceError::configuration_error(format!("Invalid value for '{key}': '{raw}'"))
        }),
    }
}
