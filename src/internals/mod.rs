//! Internal utilities for console-resilience
//!
//! Implementation modules that are re-exported through `lib.rs` for public
//! use (`RetryOrchestrator`, `RetryPolicy`, `RetryOptions`).

pub mod retry;
