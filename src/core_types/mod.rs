//! Core types shared by every resilience component
//!
//! ## Organization
//! - `errors` - Failure taxonomy and the canonical `AppError` record

pub mod errors;

// Re-export commonly used types
pub use errors::{
    AppError, ErrorCategory, ErrorSeverity, RawError, TransportCategory, CIRCUIT_OPEN_KEY,
    PREVIOUS_CORRELATION_KEY,
};
