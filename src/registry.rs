//! Registry of named circuit breakers.
//!
//! The registry is the single source of truth mapping a logical operation
//! name to one breaker. Build it once at startup and share it by `Arc`.
//!
//! ```rust
//! use console_resilience::{CircuitBreakerOverrides, CircuitBreakerRegistry};
//!
//! let registry = CircuitBreakerRegistry::default();
//! let breaker = registry.api().create_breaker("shelters", CircuitBreakerOverrides::default());
//! assert_eq!(breaker.name(), "api:shelters");
//! assert!(registry.api().get_breaker("shelters").is_some());
//! assert!(registry.get_breaker("api:shelters").is_some());
//! ```

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerState, CircuitBreakerStats};
use crate::config::{
    CircuitBreakerConfig, CircuitBreakerOverrides, ResilienceConfig, API_BREAKER_PREFIX,
};
use crate::logging::{log_debug, log_info};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Overall verdict across every registered breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthVerdict {
    /// No breaker is open.
    Healthy,
    /// Some, but not all, breakers are open.
    Degraded,
    /// Every breaker is open.
    Unhealthy,
}

/// Breakers partitioned by state, plus the derived verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthSummary {
    pub total: usize,
    pub closed: usize,
    pub open: usize,
    pub half_open: usize,
    pub open_breakers: Vec<String>,
    pub verdict: HealthVerdict,
}

/// Named-instance factory and lookup over circuit breakers.
#[derive(Debug)]
pub struct CircuitBreakerRegistry {
    defaults: CircuitBreakerConfig,
    api_defaults: CircuitBreakerConfig,
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

impl CircuitBreakerRegistry {
    /// Create a registry whose breakers start from `defaults`. API breakers
    /// start from [`CircuitBreakerConfig::api_defaults`].
    pub fn new(defaults: CircuitBreakerConfig) -> Self {
        Self {
            defaults,
            api_defaults: CircuitBreakerConfig::api_defaults(),
            breakers: Mutex::new(HashMap::new()),
        }
    }

    /// Registry built from the `breaker` and `api_breaker` settings.
    pub fn from_config(config: &ResilienceConfig) -> Self {
        Self::new(config.breaker.clone()).with_api_defaults(config.api_breaker.clone())
    }

    pub fn with_api_defaults(mut self, api_defaults: CircuitBreakerConfig) -> Self {
        self.api_defaults = api_defaults;
        self
    }

    pub fn defaults(&self) -> &CircuitBreakerConfig {
        &self.defaults
    }

    /// Factory for remote API breakers: tighter defaults, and every name is
    /// namespaced under `api:`. The breakers live in this registry.
    pub fn api(&self) -> ApiBreakerFactory<'_> {
        ApiBreakerFactory { registry: self }
    }

    /// Return the breaker registered under `name`, creating it from the
    /// defaults plus `overrides` if absent. Overrides are ignored when the
    /// breaker already exists.
    pub fn create_breaker(&self, name: &str, overrides: CircuitBreakerOverrides) -> Arc<CircuitBreaker> {
        self.get_or_insert(name.to_string(), &self.defaults, &overrides)
    }

    fn get_or_insert(
        &self,
        key: String,
        defaults: &CircuitBreakerConfig,
        overrides: &CircuitBreakerOverrides,
    ) -> Arc<CircuitBreaker> {
        let mut breakers = self.lock();

        if let Some(existing) = breakers.get(&key) {
            log_debug!(breaker = %key, "Returning existing circuit breaker");
            return Arc::clone(existing);
        }

        let config = defaults.merged(key.clone(), overrides);
        log_info!(
            breaker = %key,
            failure_threshold = config.failure_threshold,
            recovery_timeout_ms = config.recovery_timeout.as_millis(),
            success_threshold = config.success_threshold,
            "Registering circuit breaker"
        );
        let breaker = Arc::new(CircuitBreaker::new(config));
        breakers.insert(key, Arc::clone(&breaker));
        breaker
    }

    pub fn get_breaker(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.lock().get(name).cloned()
    }

    /// Deregister a breaker. Returns whether one was registered.
    ///
    /// Holders of the old `Arc` keep a working breaker; the next
    /// `create_breaker` with the same name starts fresh.
    pub fn remove_breaker(&self, name: &str) -> bool {
        let removed = self.lock().remove(name).is_some();
        if removed {
            log_info!(breaker = %name, "Circuit breaker removed");
        }
        removed
    }

    /// Snapshot of every breaker, keyed by full (prefixed) name.
    pub fn get_all_stats(&self) -> BTreeMap<String, CircuitBreakerStats> {
        self.snapshot()
            .into_iter()
            .map(|(name, breaker)| (name, breaker.stats()))
            .collect()
    }

    pub fn get_health_summary(&self) -> HealthSummary {
        let mut summary = HealthSummary {
            total: 0,
            closed: 0,
            open: 0,
            half_open: 0,
            open_breakers: Vec::new(),
            verdict: HealthVerdict::Healthy,
        };

        for (name, breaker) in self.snapshot() {
            summary.total += 1;
            match breaker.state() {
                CircuitBreakerState::Closed => summary.closed += 1,
                CircuitBreakerState::HalfOpen => summary.half_open += 1,
                CircuitBreakerState::Open => {
                    summary.open += 1;
                    summary.open_breakers.push(name);
                }
            }
        }

        summary.verdict = if summary.open == 0 {
            HealthVerdict::Healthy
        } else if summary.open == summary.total {
            HealthVerdict::Unhealthy
        } else {
            HealthVerdict::Degraded
        };
        summary
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.snapshot().into_iter().map(|(name, _)| name).collect()
    }

    // Clone out of the map so breaker locks are never taken under the map lock.
    fn snapshot(&self) -> BTreeMap<String, Arc<CircuitBreaker>> {
        self.lock()
            .iter()
            .map(|(name, breaker)| (name.clone(), Arc::clone(breaker)))
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<CircuitBreaker>>> {
        self.breakers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// API-flavoured view over a [`CircuitBreakerRegistry`].
///
/// Names may be given with or without the `api:` prefix.
#[derive(Debug, Clone, Copy)]
pub struct ApiBreakerFactory<'a> {
    registry: &'a CircuitBreakerRegistry,
}

impl<'a> ApiBreakerFactory<'a> {
    pub fn defaults(&self) -> &'a CircuitBreakerConfig {
        &self.registry.api_defaults
    }

    pub fn create_breaker(&self, name: &str, overrides: CircuitBreakerOverrides) -> Arc<CircuitBreaker> {
        self.registry
            .get_or_insert(api_key(name), &self.registry.api_defaults, &overrides)
    }

    pub fn get_breaker(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.registry.get_breaker(&api_key(name))
    }

    pub fn remove_breaker(&self, name: &str) -> bool {
        self.registry.remove_breaker(&api_key(name))
    }
}

fn api_key(name: &str) -> String {
    if name.starts_with(API_BREAKER_PREFIX) {
        name.to_string()
    } else {
        format!("{API_BREAKER_PREFIX}{name}")
    }
}
