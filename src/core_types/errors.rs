//! The shared failure vocabulary: category, severity, and the canonical
//! [`AppError`] record every other component reads and writes.

use crate::logging::log_debug;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Metadata key set on errors synthesized from a circuit-open rejection.
pub const CIRCUIT_OPEN_KEY: &str = "circuit_open";

/// Metadata key linking a retried error to the occurrence it replaces.
pub const PREVIOUS_CORRELATION_KEY: &str = "previous_correlation_id";

/// Semantic cause of a failure.
///
/// `Business`, `Rule`, `Process` and `Server` mirror the tags the remote API
/// attaches to its own error payloads; the rest are raised client-side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    /// A domain rule of the business refused the request (e.g. not found).
    Business,
    /// A request-level rule was violated (the API's validation tag).
    Rule,
    /// A long-running process on the server reported a problem.
    Process,
    /// The server failed unexpectedly.
    Server,
    /// The request never reached the server, or the response never came back.
    Network,
    /// Client-side input validation failed.
    Validation,
    /// The session is missing or expired.
    Authentication,
    /// The user is authenticated but not allowed to do this.
    Authorization,
    /// Nothing more specific could be determined.
    Unknown,
}

impl ErrorCategory {
    pub const ALL: [ErrorCategory; 9] = [
        Self::Business,
        Self::Rule,
        Self::Process,
        Self::Server,
        Self::Network,
        Self::Validation,
        Self::Authentication,
        Self::Authorization,
        Self::Unknown,
    ];

    /// Wire label, e.g. `"NETWORK"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Business => "BUSINESS",
            Self::Rule => "RULE",
            Self::Process => "PROCESS",
            Self::Server => "SERVER",
            Self::Network => "NETWORK",
            Self::Validation => "VALIDATION",
            Self::Authentication => "AUTHENTICATION",
            Self::Authorization => "AUTHORIZATION",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Parse a label, falling back to [`ErrorCategory::Unknown`] for anything
    /// unrecognised. Never fails.
    pub fn from_label(label: &str) -> Self {
        label.parse().unwrap_or(Self::Unknown)
    }

    /// The transport tag carrying the same meaning, if any.
    pub fn as_transport(&self) -> Option<TransportCategory> {
        match self {
            Self::Business => Some(TransportCategory::Business),
            Self::Rule => Some(TransportCategory::Rule),
            Self::Process => Some(TransportCategory::Process),
            Self::Server => Some(TransportCategory::Server),
            Self::Network
            | Self::Validation
            | Self::Authentication
            | Self::Authorization
            | Self::Unknown => None,
        }
    }

    /// Categories a retry can plausibly fix.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Network | Self::Server | Self::Process)
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let category = match s.trim().to_ascii_uppercase().as_str() {
            "BUSINESS" => Self::Business,
            "RULE" => Self::Rule,
            "PROCESS" => Self::Process,
            "SERVER" => Self::Server,
            "NETWORK" => Self::Network,
            "VALIDATION" => Self::Validation,
            "AUTHENTICATION" => Self::Authentication,
            "AUTHORIZATION" => Self::Authorization,
            "UNKNOWN" => Self::Unknown,
            other => return Err(format!("unknown error category: {other}")),
        };
        Ok(category)
    }
}

/// Severity level, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorSeverity {
    /// Cosmetic or expected; no user impact.
    Low,
    /// The action failed but the user can carry on.
    Medium,
    /// A feature is unusable until something changes.
    High,
    /// The application as a whole is unusable.
    Critical,
}

impl ErrorSeverity {
    pub const ALL: [ErrorSeverity; 4] = [Self::Low, Self::Medium, Self::High, Self::Critical];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorSeverity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LOW" => Ok(Self::Low),
            "MEDIUM" => Ok(Self::Medium),
            "HIGH" => Ok(Self::High),
            "CRITICAL" => Ok(Self::Critical),
            other => Err(format!("unknown error severity: {other}")),
        }
    }
}

/// Category tag attached by the remote API to its own error payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransportCategory {
    Business,
    Rule,
    Process,
    Server,
}

impl TransportCategory {
    pub fn as_category(&self) -> ErrorCategory {
        match self {
            Self::Business => ErrorCategory::Business,
            Self::Rule => ErrorCategory::Rule,
            Self::Process => ErrorCategory::Process,
            Self::Server => ErrorCategory::Server,
        }
    }
}

/// A failure as it arrives from the outside world, before normalization.
///
/// Every field except the message is optional; [`AppError::from_raw`] fills
/// in the gaps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawError {
    pub message: String,
    pub transport_category: Option<TransportCategory>,
    pub category: Option<ErrorCategory>,
    pub severity: Option<ErrorSeverity>,
    pub status: Option<u16>,
    pub metadata: Option<Map<String, Value>>,
}

impl RawError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn with_transport_category(mut self, category: TransportCategory) -> Self {
        self.transport_category = Some(category);
        self
    }

    pub fn with_category(mut self, category: ErrorCategory) -> Self {
        self.category = Some(category);
        self
    }

    pub fn with_severity(mut self, severity: ErrorSeverity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata
            .get_or_insert_with(Map::new)
            .insert(key.into(), value.into());
        self
    }

    /// Explicit category, else the transport tag's, else the status code's,
    /// else `Unknown`.
    pub fn resolved_category(&self) -> ErrorCategory {
        self.category
            .or_else(|| self.transport_category.map(|t| t.as_category()))
            .or_else(|| self.status.map(Self::category_from_status))
            .unwrap_or(ErrorCategory::Unknown)
    }

    /// Explicit severity, else `High` for server-side status codes and
    /// network failures, else `Medium`.
    pub fn resolved_severity(&self) -> ErrorSeverity {
        self.severity.unwrap_or_else(|| {
            match (self.resolved_category(), self.status) {
                (_, Some(status)) if status >= 500 => ErrorSeverity::High,
                (ErrorCategory::Network, _) => ErrorSeverity::High,
                _ => ErrorSeverity::Medium,
            }
        })
    }

    /// Category implied by a transport status code.
    pub fn category_from_status(status: u16) -> ErrorCategory {
        match status {
            0 => ErrorCategory::Network,
            400 | 422 => ErrorCategory::Validation,
            401 => ErrorCategory::Authentication,
            403 => ErrorCategory::Authorization,
            404 | 409 => ErrorCategory::Business,
            500..=599 => ErrorCategory::Server,
            _ => ErrorCategory::Unknown,
        }
    }
}

/// The canonical failure record.
///
/// Immutable once built: the builder methods consume `self` and are meant
/// for construction only. A retry produces a new record through
/// [`AppError::retried`].
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("{message}")]
pub struct AppError {
    message: String,
    category: ErrorCategory,
    severity: ErrorSeverity,
    status: Option<u16>,
    /// Tag the remote API put on the payload, kept for classification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    transport: Option<TransportCategory>,
    context: Option<String>,
    correlation_id: String,
    metadata: Option<Map<String, Value>>,
    timestamp: DateTime<Utc>,
}

impl AppError {
    pub fn new(message: impl Into<String>, category: ErrorCategory, severity: ErrorSeverity) -> Self {
        Self {
            message: message.into(),
            category,
            severity,
            status: None,
            transport: None,
            context: None,
            correlation_id: new_correlation_id(),
            metadata: None,
            timestamp: Utc::now(),
        }
    }

    /// An error with nothing known about it but its message.
    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(message, ErrorCategory::Unknown, ErrorSeverity::Medium)
    }

    /// Normalize a raw failure. Missing category and severity are inferred
    /// from the transport tag and status code, defaulting to
    /// `Unknown`/`Medium`.
    pub fn from_raw(raw: RawError, context: Option<&str>) -> Self {
        let category = raw.resolved_category();
        let severity = raw.resolved_severity();

        log_debug!(
            category = %category,
            severity = %severity,
            status = ?raw.status,
            context = ?context,
            "Normalized raw error"
        );

        let message = if raw.message.trim().is_empty() {
            "Unexpected error".to_string()
        } else {
            raw.message
        };

        Self {
            message,
            category,
            severity,
            status: raw.status,
            transport: raw.transport_category,
            context: context.map(str::to_string),
            correlation_id: new_correlation_id(),
            metadata: raw.metadata,
            timestamp: Utc::now(),
        }
    }

    /// Error standing in for a call rejected by an open circuit.
    pub fn circuit_open(breaker: &str, retry_after: Duration) -> Self {
        Self::new(
            format!("Circuit breaker '{breaker}' is open"),
            ErrorCategory::Network,
            ErrorSeverity::High,
        )
        .with_metadata(CIRCUIT_OPEN_KEY, true)
        .with_metadata("breaker", breaker)
        .with_metadata("retry_after_ms", retry_after.as_millis() as u64)
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata
            .get_or_insert_with(Map::new)
            .insert(key.into(), value.into());
        self
    }

    /// A fresh occurrence of the same failure, for the next retry attempt.
    pub fn retried(&self) -> Self {
        let mut next = self.clone();
        next.correlation_id = new_correlation_id();
        next.timestamp = Utc::now();
        next.metadata
            .get_or_insert_with(Map::new)
            .insert(
                PREVIOUS_CORRELATION_KEY.to_string(),
                Value::String(self.correlation_id.clone()),
            );
        next
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn category(&self) -> ErrorCategory {
        self.category
    }

    pub fn severity(&self) -> ErrorSeverity {
        self.severity
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn metadata(&self) -> Option<&Map<String, Value>> {
        self.metadata.as_ref()
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn is_circuit_open(&self) -> bool {
        self.metadata
            .as_ref()
            .and_then(|m| m.get(CIRCUIT_OPEN_KEY))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Transport tag the remote API attached, if the error came from one.
    pub fn transport_category(&self) -> Option<TransportCategory> {
        self.transport
    }
}

impl From<RawError> for AppError {
    fn from(raw: RawError) -> Self {
        Self::from_raw(raw, None)
    }
}

fn new_correlation_id() -> String {
    format!("err-{}", Uuid::new_v4().simple())
}
