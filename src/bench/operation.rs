//! Measurable units of work

use crate::pipeline::Pipeline;
use crate::store::{Cursor, DataStore};
use crate::Result;

/// Something the runner can execute against a store handle and time.
///
/// The returned cursor may be lazy; the runner drains it inside the measured
/// window.
pub trait Operation<S: ?Sized> {
    fn execute<'s>(&self, store: &'s S) -> Result<Cursor<'s>>;
}

impl<S: ?Sized, O: Operation<S> + ?Sized> Operation<S> for Box<O> {
    fn execute<'s>(&self, store: &'s S) -> Result<Cursor<'s>> {
        (**self).execute(store)
    }
}

/// Runs an aggregation pipeline through [`DataStore::aggregate`]
#[derive(Debug, Clone)]
pub struct PipelineOperation {
    pipeline: Pipeline,
}

impl PipelineOperation {
    pub fn new(pipeline: Pipeline) -> Self {
        Self { pipeline }
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }
}

impl<S: DataStore + ?Sized> Operation<S> for PipelineOperation {
    fn execute<'s>(&self, store: &'s S) -> Result<Cursor<'s>> {
        store.aggregate(&self.pipeline)
    }
}

/// Adapts a closure into an [`Operation`]
pub struct FnOperation<F> {
    f: F,
}

impl<F> FnOperation<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<S: ?Sized, F> Operation<S> for FnOperation<F>
where
    F: for<'s> Fn(&'s S) -> Result<Cursor<'s>>,
{
    fn execute<'s>(&self, store: &'s S) -> Result<Cursor<'s>> {
        (self.f)(store)
    }
}
