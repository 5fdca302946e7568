// Unit Tests for Resilience Configuration
//
// UNIT UNDER TEST: ResilienceConfig, CircuitBreakerConfig, CircuitBreakerOverrides
//
// BUSINESS RESPONSIBILITY:
//   - Provides production defaults for every resilience component
//   - Loads settings from parsed config sections and environment variables
//   - Rejects invalid settings before any component is built
//
// TEST COVERAGE:
//   - Default values for general and API breakers
//   - Override merging
//   - Section parsing including durations and severities
//   - Validation failures
//   - Environment variable loading (serialized)

use crate::config::{
    env_var_name, CircuitBreakerConfig, CircuitBreakerOverrides, ResilienceConfig,
};
use crate::core_types::ErrorSeverity;
use crate::error::ResilienceError;
use std::collections::HashMap;
use std::time::Duration;

fn section(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[cfg(test)]
mod default_config_tests {
    use super::*;

    #[test]
    fn test_defaults_match_production_requirements() {
        // Arrange & Act
        let config = ResilienceConfig::default();

        // Assert
        assert_eq!(config.breaker.failure_threshold, 5);
        assert_eq!(config.breaker.recovery_timeout, Duration::from_secs(60));
        assert_eq!(config.breaker.success_threshold, 2);
        assert_eq!(config.api_breaker.failure_threshold, 3, "API breakers trip sooner");
        assert_eq!(config.api_breaker.recovery_timeout, Duration::from_secs(30));
        assert_eq!(config.throttle.max_reports_per_window, 3);
        assert_eq!(config.metrics.max_entries, 1000);
        assert_eq!(config.metrics.critical_threshold, 10);
        assert_eq!(config.reporting.min_severity, ErrorSeverity::High);
        assert!(!config.reporting.development_mode);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overrides_apply_only_what_they_set() {
        // Arrange
        let base = CircuitBreakerConfig::default();
        let overrides = CircuitBreakerOverrides::default()
            .failure_threshold(1)
            .monitoring_period(Duration::from_secs(5));

        // Act
        let merged = base.merged("reports", &overrides);

        // Assert
        assert_eq!(merged.name, "reports");
        assert_eq!(merged.failure_threshold, 1);
        assert_eq!(merged.monitoring_period, Duration::from_secs(5));
        assert_eq!(merged.recovery_timeout, base.recovery_timeout);
        assert_eq!(merged.success_threshold, base.success_threshold);
    }

    #[test]
    fn test_zero_thresholds_are_invalid() {
        // Arrange
        let no_failures = CircuitBreakerConfig {
            failure_threshold: 0,
            ..CircuitBreakerConfig::named("orders")
        };
        let no_successes = CircuitBreakerConfig {
            success_threshold: 0,
            ..CircuitBreakerConfig::named("orders")
        };

        // Act & Assert
        assert!(matches!(
            no_failures.validate(),
            Err(ResilienceError::ConfigurationError { .. })
        ));
        assert!(no_successes.validate().is_err());
    }
}

#[cfg(test)]
mod section_parsing_tests {
    use super::*;

    #[test]
    fn test_from_section_applies_values() {
        // Arrange
        let values = section(&[
            ("breaker.failure_threshold", "7"),
            ("api_breaker.recovery_timeout_ms", "1500"),
            ("retry.initial_delay_ms", "250"),
            ("retry.jitter", "0.2"),
            ("throttle.report_interval_ms", "30000"),
            ("throttle.max_tracked_keys", "50"),
            ("metrics.top_contexts", "3"),
            ("reporting.min_severity", "medium"),
            ("reporting.development_mode", "true"),
            ("reporting.environment", " staging "),
            ("unrelated.key", "ignored"),
        ]);

        // Act
        let config = ResilienceConfig::from_section(&values).expect("valid section");

        // Assert
        assert_eq!(config.breaker.failure_threshold, 7);
        assert_eq!(config.api_breaker.recovery_timeout, Duration::from_millis(1500));
        assert_eq!(config.api_breaker.failure_threshold, 3, "Untouched keys keep defaults");
        assert_eq!(config.retry.initial_delay, Duration::from_millis(250));
        assert_eq!(config.retry.jitter, 0.2);
        assert_eq!(config.throttle.report_interval, Duration::from_secs(30));
        assert_eq!(config.throttle.max_tracked_keys, 50);
        assert_eq!(config.metrics.top_contexts, 3);
        assert_eq!(config.reporting.min_severity, ErrorSeverity::Medium);
        assert!(config.reporting.development_mode);
        assert_eq!(config.reporting.environment, "staging");
    }

    #[test]
    fn test_unparseable_value_is_configuration_error() {
        // Arrange
        let values = section(&[("breaker.failure_threshold", "many")]);

        // Act
        let result = ResilienceConfig::from_section(&values);

        // Assert
        match result {
            Err(ResilienceError::ConfigurationError { message }) => {
                assert!(message.contains("breaker.failure_threshold"));
            }
            other => panic!("Expected ConfigurationError, got {other:?}"),
        }
    }

    #[test]
    fn test_parsed_values_are_validated() {
        // Arrange
        let values = section(&[
            ("metrics.warning_threshold", "20"),
            ("metrics.critical_threshold", "10"),
        ]);

        // Act
        let result = ResilienceConfig::from_section(&values);

        // Assert
        assert!(result.is_err(), "Warning threshold above critical is rejected");
    }

    #[test]
    fn test_zero_tracked_keys_is_rejected() {
        // Arrange
        let values = section(&[("throttle.max_tracked_keys", "0")]);

        // Act & Assert
        assert!(ResilienceConfig::from_section(&values).is_err());
    }

    #[test]
    fn test_env_var_names_follow_section_keys() {
        // Act & Assert
        assert_eq!(
            env_var_name("breaker.failure_threshold"),
            "RESILIENCE_BREAKER_FAILURE_THRESHOLD"
        );
        assert_eq!(
            env_var_name("reporting.development_mode"),
            "RESILIENCE_REPORTING_DEVELOPMENT_MODE"
        );
    }
}

#[cfg(test)]
mod environment_config_tests {
    use super::*;

    #[test]
    #[serial_test::serial]
    fn test_from_env_reads_prefixed_variables() {
        // Arrange
        std::env::set_var("RESILIENCE_BREAKER_FAILURE_THRESHOLD", "9");
        std::env::set_var("RESILIENCE_REPORTING_MIN_SEVERITY", "critical");

        // Act
        let result = ResilienceConfig::from_env();

        // Cleanup
        std::env::remove_var("RESILIENCE_BREAKER_FAILURE_THRESHOLD");
        std::env::remove_var("RESILIENCE_REPORTING_MIN_SEVERITY");

        // Assert
        let config = result.expect("valid environment");
        assert_eq!(config.breaker.failure_threshold, 9);
        assert_eq!(config.reporting.min_severity, ErrorSeverity::Critical);
    }

    #[test]
    #[serial_test::serial]
    fn test_from_env_without_variables_uses_defaults() {
        // Arrange
        std::env::remove_var("RESILIENCE_BREAKER_FAILURE_THRESHOLD");

        // Act
        let config = ResilienceConfig::from_env().expect("defaults are valid");

        // Assert
        assert_eq!(config, ResilienceConfig::default());
    }

    #[test]
    #[serial_test::serial]
    fn test_from_env_propagates_parse_errors() {
        // Arrange
        std::env::set_var("RESILIENCE_RETRY_BACKOFF_MULTIPLIER", "fast");

        // Act
        let result = ResilienceConfig::from_env();

        // Cleanup
        std::env::remove_var("RESILIENCE_RETRY_BACKOFF_MULTIPLIER");

        // Assert
        assert!(result.is_err());
    }
}
