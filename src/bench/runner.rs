//! Benchmark runner
//!
//! Executes phases strictly in order, and the operations of each phase
//! strictly in order, appending one [`TimingResult`] per measurement so the
//! report mirrors execution order exactly.
//!
//! Failure policy: fail-fast within a phase, fail-soft at the session
//! boundary. The first failing setup action or operation stops the session,
//! and the measurements recorded before it are still handed back.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::bench::clock::{Clock, SystemClock};
use crate::bench::operation::Operation;
use crate::bench::phase::Phase;
use crate::models::{Report, TimingResult};
use crate::store::Document;
use crate::util::units::{format_duration, format_seconds};
use crate::{PipebenchError, Result};

/// Timing of one successful operation execution
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    /// Seconds between the instant before invocation and the instant after
    /// the result cursor was exhausted
    pub duration_seconds: f64,
    /// Number of documents the cursor produced
    pub documents: usize,
    /// Wall-clock time just before invocation
    pub started_at: DateTime<Utc>,
}

/// Where and why a session stopped early
#[derive(Debug)]
pub struct SessionFailure {
    pub phase_name: String,
    /// `None` when the phase setup action failed
    pub operation_name: Option<String>,
    pub error: PipebenchError,
}

/// Result of a session: everything measured, plus the failure that ended it
/// early if there was one
#[derive(Debug)]
pub struct SessionOutcome {
    pub report: Report,
    pub failure: Option<SessionFailure>,
}

impl SessionOutcome {
    /// Whether every phase and operation ran
    pub fn is_complete(&self) -> bool {
        self.failure.is_none()
    }

    /// The report if the session completed, otherwise the error that
    /// stopped it
    pub fn into_result(self) -> Result<Report> {
        match self.failure {
            None => Ok(self.report),
            Some(failure) => Err(failure.error),
        }
    }
}

/// Runs operations and phases against a store, timing them with `C`
#[derive(Debug, Clone, Default)]
pub struct BenchmarkRunner<C = SystemClock> {
    clock: C,
}

impl BenchmarkRunner<SystemClock> {
    /// Runner on real time
    pub fn new() -> Self {
        Self { clock: SystemClock }
    }
}

impl<C: Clock> BenchmarkRunner<C> {
    /// Runner on a custom clock
    pub fn with_clock(clock: C) -> Self {
        Self { clock }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Execute `operation` once, draining its result cursor inside the
    /// measured window. Errors propagate unchanged and record nothing.
    pub fn measure<S, O>(&self, operation: &O, store: &S) -> Result<Measurement>
    where
        S: ?Sized,
        O: Operation<S> + ?Sized,
    {
        self.timed(operation, store, |_| {})
    }

    /// Like [`measure`](Self::measure) but also returns the result
    /// documents, for correctness checks alongside timing
    pub fn measure_with_results<S, O>(
        &self,
        operation: &O,
        store: &S,
    ) -> Result<(Measurement, Vec<Document>)>
    where
        S: ?Sized,
        O: Operation<S> + ?Sized,
    {
        let mut documents = Vec::new();
        let measurement = self.timed(operation, store, |doc| documents.push(doc))?;
        Ok((measurement, documents))
    }

    fn timed<S, O, F>(&self, operation: &O, store: &S, mut sink: F) -> Result<Measurement>
    where
        S: ?Sized,
        O: Operation<S> + ?Sized,
        F: FnMut(Document),
    {
        let started_at = self.clock.timestamp();
        let start = self.clock.now();

        let cursor = operation.execute(store)?;
        let mut documents = 0;
        for item in cursor {
            sink(item?);
            documents += 1;
        }

        let end = self.clock.now();
        Ok(Measurement {
            duration_seconds: end.saturating_duration_since(start).as_secs_f64(),
            documents,
            started_at,
        })
    }

    /// Run `phases` in order against `store`.
    ///
    /// Each phase runs its setup action, waits its settle delay, then
    /// measures its operations in order. The first failure ends the session;
    /// the outcome carries the partial report and the failure.
    pub fn run_session<'a, S, I>(&self, store: &S, phases: I) -> SessionOutcome
    where
        S: ?Sized + 'a,
        I: IntoIterator<Item = Phase<'a, S>>,
    {
        let mut report = Report::new();

        for phase in phases {
            let (phase_name, setup, settle_delay, operations) = phase.into_parts();
            info!(phase = %phase_name, operations = operations.len(), "starting phase");

            if let Some(mut setup) = setup {
                debug!(phase = %phase_name, "running setup");
                if let Err(err) = setup(store) {
                    warn!(phase = %phase_name, error = %err, "setup failed, aborting session");
                    return SessionOutcome {
                        report,
                        failure: Some(SessionFailure {
                            error: PipebenchError::Setup {
                                phase: phase_name.clone(),
                                source: Box::new(err),
                            },
                            phase_name,
                            operation_name: None,
                        }),
                    };
                }
            }

            if let Some(delay) = settle_delay {
                debug!(phase = %phase_name, delay = %format_duration(delay), "settling");
                self.clock.sleep(delay);
            }

            for named in operations {
                match self.measure(&named.operation, store) {
                    Ok(measurement) => {
                        info!(
                            phase = %phase_name,
                            operation = %named.name,
                            elapsed = %format_seconds(measurement.duration_seconds),
                            documents = measurement.documents,
                            "measured"
                        );
                        report.push(TimingResult::new(
                            named.name,
                            phase_name.clone(),
                            measurement.duration_seconds,
                            measurement.documents,
                            measurement.started_at,
                        ));
                    }
                    Err(err) => {
                        warn!(
                            phase = %phase_name,
                            operation = %named.name,
                            error = %err,
                            "operation failed, aborting session"
                        );
                        return SessionOutcome {
                            report,
                            failure: Some(SessionFailure {
                                error: PipebenchError::Operation {
                                    name: named.name.clone(),
                                    source: Box::new(err),
                                },
                                phase_name,
                                operation_name: Some(named.name),
                            }),
                        };
                    }
                }
            }
        }

        SessionOutcome {
            report,
            failure: None,
        }
    }
}
