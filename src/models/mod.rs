//! Data models module
//!
//! Contains the timing records and reports produced by benchmark sessions.

pub mod result;

// Re-export commonly used types
pub use result::{PhaseComparison, Report, TimingResult};
