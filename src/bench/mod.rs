//! Benchmark engine module
//!
//! Contains the timing runner, measurement phases, operations and the clock
//! abstraction they share.

pub mod clock;
pub mod operation;
pub mod phase;
pub mod runner;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, SystemClock};
pub use operation::{FnOperation, Operation, PipelineOperation};
pub use phase::{index_comparison_phases, NamedOperation, Phase, SetupAction};
pub use runner::{BenchmarkRunner, Measurement, SessionFailure, SessionOutcome};
