//! Utility functions module
//!
//! Contains helpers for formatting timings and parsing durations.

pub mod units;

// Re-export commonly used functions
pub use units::{format_duration, format_seconds, format_speedup, parse_duration};
