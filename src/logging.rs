//! Logging utilities for console-resilience
//!
//! Re-exports tracing macros with log_* naming convention for consistency.
//! The crate never installs a subscriber; the host application decides where
//! these events go.

// Re-export tracing macros with log_* naming
pub use tracing::{
    debug as log_debug,
    error as log_error,
    info as log_info,
    trace as log_trace,
    warn as log_warn,
};
