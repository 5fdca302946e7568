//! Error types for resilience operations.
//!
//! Two families live here:
//!
//! - [`ResilienceError`]: failures of the resilience layer itself, such as
//!   bad configuration or a reporter started outside a runtime.
//! - [`BreakerError`] and [`RetryError`]: generic wrappers returned by
//!   [`CircuitBreaker::execute`](crate::CircuitBreaker::execute) and
//!   [`RetryOrchestrator::retry_with_policy`](crate::RetryOrchestrator::retry_with_policy).
//!   They never hide the wrapped operation's error: it is always reachable,
//!   unchanged, through `into_inner()` or `source()`.
//!
//! # Error Handling Example
//!
//! ```rust,no_run
//! use console_resilience::{BreakerError, CircuitBreaker, CircuitBreakerConfig};
//!
//! # async fn example() {
//! let breaker = CircuitBreaker::new(CircuitBreakerConfig::named("shelters.list"));
//! let result = breaker
//!     .execute(|| async { Err::<(), _>(std::io::Error::other("boom")) })
//!     .await;
//!
//! match result {
//!     Err(BreakerError::Open { retry_after, .. }) => {
//!         println!("Rejected without calling, retry in {retry_after:?}");
//!     }
//!     Err(other) => println!("Operation failed: {other}"),
//!     Ok(()) => {}
//! }
//! # }
//! ```

use crate::logging::log_error;
use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Convenient result type for resilience-layer operations.
pub type ResilienceResult<T> = std::result::Result<T, ResilienceError>;

/// Failures of the resilience layer itself.
///
/// | Variant | Cause |
/// |---------|-------|
/// | `ConfigurationError` | Invalid or unparseable settings, or a component started without the runtime it needs |
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResilienceError {
    /// Configuration is invalid or could not be parsed.
    #[error("Resilience configuration error: {message}")]
    ConfigurationError {
        /// Description of the configuration problem.
        message: String,
    },
}

impl ResilienceError {
    // Constructors log at creation, like every other error in the crate.

    pub fn configuration_error(message: impl Into<String>) -> Self {
        let message = message.into();
        log_error!(
            error_type = "configuration_error",
            message = %message,
            "Resilience configuration validation failed"
        );
        Self::ConfigurationError { message }
    }
}

/// Outcome of a breaker-guarded call that did not succeed.
///
/// `Open` is the breaker's own synthetic rejection; callers can tell it apart
/// from the operation's native failure, which arrives untouched in
/// `Operation`.
#[derive(Debug)]
pub enum BreakerError<E> {
    /// The circuit is open and the operation was not invoked.
    Open {
        /// Breaker that rejected the call.
        name: String,
        /// Time left until a trial call will be allowed.
        retry_after: Duration,
    },

    /// The caller cancelled before the operation completed.
    /// Nothing was charged to the breaker.
    Cancelled {
        /// Breaker guarding the cancelled call.
        name: String,
    },

    /// The operation ran and failed.
    Operation(E),
}

impl<E> BreakerError<E> {
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// The operation's own error, if the operation ran.
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Operation(e) => Some(e),
            Self::Open { .. } | Self::Cancelled { .. } => None,
        }
    }

    pub fn as_inner(&self) -> Option<&E> {
        match self {
            Self::Operation(e) => Some(e),
            Self::Open { .. } | Self::Cancelled { .. } => None,
        }
    }
}

impl<E: fmt::Display> fmt::Display for BreakerError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open { name, retry_after } => write!(
                f,
                "Circuit breaker '{name}' is open, retry after {}ms",
                retry_after.as_millis()
            ),
            Self::Cancelled { name } => write!(f, "Call through circuit breaker '{name}' cancelled"),
            Self::Operation(e) => write!(f, "{e}"),
        }
    }
}

impl<E: StdError + 'static> StdError for BreakerError<E> {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Operation(e) => Some(e),
            Self::Open { .. } | Self::Cancelled { .. } => None,
        }
    }
}

/// Outcome of a retried operation that did not succeed.
#[derive(Debug)]
pub enum RetryError<E> {
    /// The last allowed attempt failed; `error` is its error,
    /// exactly as the operation returned it.
    Failed {
        /// Total invocations made, including the first.
        attempts: u32,
        /// The last attempt's error.
        error: E,
    },

    /// Cancellation was observed; no further attempts were scheduled.
    Cancelled {
        /// Invocations started before cancellation.
        attempts: u32,
    },
}

impl<E> RetryError<E> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            Self::Failed { attempts, .. } | Self::Cancelled { attempts } => *attempts,
        }
    }

    /// The last attempt's error, unchanged.
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Failed { error, .. } => Some(error),
            Self::Cancelled { .. } => None,
        }
    }

    pub fn as_inner(&self) -> Option<&E> {
        match self {
            Self::Failed { error, .. } => Some(error),
            Self::Cancelled { .. } => None,
        }
    }
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed { error, .. } => write!(f, "{error}"),
            Self::Cancelled { attempts } => {
                write!(f, "Retry cancelled after {attempts} attempt(s)")
            }
        }
    }
}

impl<E: StdError + 'static> StdError for RetryError<E> {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Failed { error, .. } => Some(error),
            Self::Cancelled { .. } => None,
        }
    }
}
