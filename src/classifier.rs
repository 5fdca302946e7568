//! Maps failures to a presentation directive and a user-facing message.
//!
//! Classification is a pure function of its inputs: the same error, context
//! and preferences always yield the same [`PresentationDirective`]. Wording is
//! derived separately by [`friendly_message`] from category and severity
//! alone, so the two decisions can change independently.
//!
//! ```rust
//! use console_resilience::classifier::{classify, ActionKind, PresentationPreferences, Surface};
//! use console_resilience::{ErrorCategory, RawError};
//!
//! let raw = RawError::new("connection reset").with_category(ErrorCategory::Network);
//! let directive = classify(&raw, Some("checkout-page"), &PresentationPreferences::default());
//!
//! assert_eq!(directive.surface, Surface::Snackbar);
//! assert!(directive.persistent);
//! assert_eq!(directive.action.map(|a| a.kind), Some(ActionKind::Retry));
//! ```

use crate::core_types::{AppError, ErrorCategory, ErrorSeverity, RawError, TransportCategory};
use crate::logging::log_debug;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static FORM_CONTEXT: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?i)(^|[^a-z])(form|edit|create|new|register)([^a-z]|$)").ok());

static FULL_PAGE_CONTEXT: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?i)(page|screen|dashboard|fullscreen)").ok());

/// One of four mutually exclusive ways to show an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Surface {
    Snackbar,
    Inline,
    Modal,
    Fullscreen,
}

/// Corrective action the user can trigger from the error presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Reissue the load that failed.
    Retry,
    /// Navigate back to the home screen.
    GoHome,
    /// Start a new session.
    Login,
    /// Try again later, after a circuit-open rejection.
    TryAgain,
}

impl ActionKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Retry => "Retry",
            Self::GoHome => "Go to home",
            Self::Login => "Log in again",
            Self::TryAgain => "Try again",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestedAction {
    pub kind: ActionKind,
    pub label: String,
}

impl SuggestedAction {
    pub fn new(kind: ActionKind) -> Self {
        Self {
            kind,
            label: kind.label().to_string(),
        }
    }
}

/// What the UI layer should render for an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresentationDirective {
    pub surface: Surface,
    /// Whether the presentation stays until dismissed.
    pub persistent: bool,
    pub action: Option<SuggestedAction>,
}

impl PresentationDirective {
    fn new(surface: Surface, persistent: bool) -> Self {
        Self {
            surface,
            persistent,
            action: None,
        }
    }

    fn with_action(mut self, kind: ActionKind) -> Self {
        self.action = Some(SuggestedAction::new(kind));
        self
    }
}

impl Default for PresentationDirective {
    fn default() -> Self {
        Self::new(Surface::Snackbar, false)
    }
}

/// Caller-side presentation preferences applied after the rules.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresentationPreferences {
    /// Screen-reader users: never auto-dismiss.
    pub accessibility: bool,
    /// Prefer less intrusive surfaces: no fullscreen takeovers.
    pub minimal: bool,
}

/// Classify a raw error raised by the feature named `context`.
pub fn classify(
    raw: &RawError,
    context: Option<&str>,
    preferences: &PresentationPreferences,
) -> PresentationDirective {
    let category = raw.resolved_category();
    let severity = raw.resolved_severity();
    let directive = apply_rules(raw.transport_category, category, severity, raw.status, context);
    finish(directive, category, context, preferences)
}

/// Classify a normalized error using its own context label.
///
/// Circuit-open errors are offered "try again" rather than an immediate
/// reload.
pub fn classify_app_error(error: &AppError, preferences: &PresentationPreferences) -> PresentationDirective {
    let mut directive = apply_rules(
        error.transport_category(),
        error.category(),
        error.severity(),
        error.status(),
        error.context(),
    );
    if error.is_circuit_open() {
        directive.action = Some(SuggestedAction::new(ActionKind::TryAgain));
    }
    finish(directive, error.category(), error.context(), preferences)
}

fn finish(
    mut directive: PresentationDirective,
    category: ErrorCategory,
    context: Option<&str>,
    preferences: &PresentationPreferences,
) -> PresentationDirective {
    if preferences.accessibility {
        directive.persistent = true;
    }
    if preferences.minimal && directive.surface == Surface::Fullscreen {
        directive.surface = Surface::Modal;
    }

    log_debug!(
        category = %category,
        context = ?context,
        surface = ?directive.surface,
        persistent = directive.persistent,
        action = ?directive.action.as_ref().map(|a| a.kind),
        "Classified error presentation"
    );
    directive
}

/// Priority-ordered rules; the first match wins.
fn apply_rules(
    transport: Option<TransportCategory>,
    category: ErrorCategory,
    severity: ErrorSeverity,
    status: Option<u16>,
    context: Option<&str>,
) -> PresentationDirective {
    let transport_is = |tag: TransportCategory| transport == Some(tag);

    // Validation-like failures belong next to the input that caused them.
    if transport_is(TransportCategory::Rule)
        || matches!(category, ErrorCategory::Validation | ErrorCategory::Rule)
    {
        let surface = if is_form_context(context) {
            Surface::Inline
        } else {
            Surface::Snackbar
        };
        return PresentationDirective::new(surface, false);
    }

    if transport_is(TransportCategory::Business) || category == ErrorCategory::Business {
        let directive = PresentationDirective::new(Surface::Snackbar, false);
        return if status == Some(404) {
            directive.with_action(ActionKind::GoHome)
        } else {
            directive
        };
    }

    if transport_is(TransportCategory::Server) || category == ErrorCategory::Server {
        let surface = if severity == ErrorSeverity::Critical {
            Surface::Fullscreen
        } else {
            Surface::Snackbar
        };
        return PresentationDirective::new(surface, severity >= ErrorSeverity::High);
    }

    if transport_is(TransportCategory::Process) || category == ErrorCategory::Process {
        return PresentationDirective::new(Surface::Snackbar, false);
    }

    match category {
        ErrorCategory::Network => {
            PresentationDirective::new(Surface::Snackbar, true).with_action(ActionKind::Retry)
        }
        ErrorCategory::Authentication => {
            PresentationDirective::new(Surface::Snackbar, true).with_action(ActionKind::Login)
        }
        ErrorCategory::Authorization => PresentationDirective::new(Surface::Modal, true),
        ErrorCategory::Unknown
        | ErrorCategory::Business
        | ErrorCategory::Rule
        | ErrorCategory::Process
        | ErrorCategory::Server
        | ErrorCategory::Validation => {
            if is_full_page_context(context) && severity == ErrorSeverity::Critical {
                PresentationDirective::new(Surface::Fullscreen, true)
            } else {
                PresentationDirective::default()
            }
        }
    }
}

fn is_form_context(context: Option<&str>) -> bool {
    matches_context(&FORM_CONTEXT, context)
}

fn is_full_page_context(context: Option<&str>) -> bool {
    matches_context(&FULL_PAGE_CONTEXT, context)
}

fn matches_context(pattern: &Lazy<Option<Regex>>, context: Option<&str>) -> bool {
    match (pattern.as_ref(), context) {
        (Some(regex), Some(label)) => regex.is_match(label),
        _ => false,
    }
}

/// Human-friendly wording keyed only off category and severity.
pub fn friendly_message(category: ErrorCategory, severity: ErrorSeverity) -> &'static str {
    match category {
        ErrorCategory::Network => {
            "We couldn't reach the server. Check your internet connection and try again."
        }
        ErrorCategory::Server => match severity {
            ErrorSeverity::Critical => {
                "The service is currently unavailable. Our team has been notified."
            }
            ErrorSeverity::High => "The server ran into a problem. Please try again in a moment.",
            ErrorSeverity::Low | ErrorSeverity::Medium => {
                "Something went wrong on our side. Please try again."
            }
        },
        ErrorCategory::Validation | ErrorCategory::Rule => {
            "Some of the information entered is not valid. Please review it and try again."
        }
        ErrorCategory::Business => "This action can't be completed right now.",
        ErrorCategory::Process => "The operation could not be finished. Please try again later.",
        ErrorCategory::Authentication => "Your session has expired. Please log in again.",
        ErrorCategory::Authorization => "You don't have permission to do this.",
        ErrorCategory::Unknown => match severity {
            ErrorSeverity::Critical => {
                "A serious error occurred. Please reload the application."
            }
            ErrorSeverity::Low | ErrorSeverity::Medium | ErrorSeverity::High => {
                "An unexpected error occurred. Please try again."
            }
        },
    }
}
