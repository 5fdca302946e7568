// Test modules for console-resilience crate
//
// Each source module has a corresponding test file that focuses on
// behaviour verification. Timing-sensitive tests run on tokio's paused
// clock so recovery timeouts and backoff delays elapse instantly.

// Shared fixtures
pub mod helpers;

// Failure model and configuration
pub mod config;


pub mod reporting;
