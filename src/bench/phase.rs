//! Measurement phases
//!
//! A phase groups operations that run under the same environment state. Its
//! setup action runs once before the operations, followed by the optional
//! settle delay that lets background work on the store finish first.

use std::fmt;
use std::time::Duration;

use crate::bench::operation::{FnOperation, Operation, PipelineOperation};
use crate::pipeline::Pipeline;
use crate::store::{Cursor, DataStore};
use crate::Result;

/// Environment-changing action run before a phase's measurements
pub type SetupAction<'a, S> = Box<dyn FnMut(&S) -> Result<()> + 'a>;

/// Operation registered under a name
pub struct NamedOperation<'a, S: ?Sized> {
    pub name: String,
    pub operation: Box<dyn Operation<S> + 'a>,
}

/// Named group of measurements sharing one environment setup
pub struct Phase<'a, S: ?Sized> {
    name: String,
    setup: Option<SetupAction<'a, S>>,
    settle_delay: Option<Duration>,
    operations: Vec<NamedOperation<'a, S>>,
}

impl<'a, S: ?Sized + 'a> Phase<'a, S> {
    /// Create a phase with no setup, no settle delay and no operations
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            setup: None,
            settle_delay: None,
            operations: Vec::new(),
        }
    }

    /// Run `setup` once before this phase's measurements
    pub fn with_setup<F>(mut self, setup: F) -> Self
    where
        F: FnMut(&S) -> Result<()> + 'a,
    {
        self.setup = Some(Box::new(setup));
        self
    }

    /// Pause for `delay` after setup and before the first measurement.
    /// A zero delay is the same as none.
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = if delay.is_zero() { None } else { Some(delay) };
        self
    }

    /// Append an operation to measure; adding the same name twice measures
    /// it twice
    pub fn with_operation<O>(mut self, name: impl Into<String>, operation: O) -> Self
    where
        O: Operation<S> + 'a,
    {
        self.operations.push(NamedOperation {
            name: name.into(),
            operation: Box::new(operation),
        });
        self
    }

    /// Append a closure operation
    pub fn with_fn<F>(self, name: impl Into<String>, f: F) -> Self
    where
        F: for<'s> Fn(&'s S) -> Result<Cursor<'s>> + 'a,
    {
        self.with_operation(name, FnOperation::new(f))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settle_delay(&self) -> Option<Duration> {
        self.settle_delay
    }

    pub fn has_setup(&self) -> bool {
        self.setup.is_some()
    }

    pub fn operations(&self) -> &[NamedOperation<'a, S>] {
        &self.operations
    }

    /// Split into setup, settle delay and operations for execution
    pub(crate) fn into_parts(
        self,
    ) -> (
        String,
        Option<SetupAction<'a, S>>,
        Option<Duration>,
        Vec<NamedOperation<'a, S>>,
    ) {
        (self.name, self.setup, self.settle_delay, self.operations)
    }
}

impl<'a, S: DataStore + ?Sized + 'a> Phase<'a, S> {
    /// Append an aggregation pipeline to measure
    pub fn with_pipeline(self, name: impl Into<String>, pipeline: Pipeline) -> Self {
        self.with_operation(name, PipelineOperation::new(pipeline))
    }
}

impl<S: ?Sized> fmt::Debug for Phase<'_, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Phase")
            .field("name", &self.name)
            .field("setup", &self.setup.is_some())
            .field("settle_delay", &self.settle_delay)
            .field(
                "operations",
                &self.operations.iter().map(|o| o.name.as_str()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Setup action dropping every index but `_id_`
pub fn drop_indexes<S: DataStore + ?Sized>() -> impl FnMut(&S) -> Result<()> {
    |store: &S| store.drop_indexes()
}

/// Setup action creating an ascending index on each field path
pub fn create_indexes<S: DataStore + ?Sized>(
    field_paths: Vec<String>,
) -> impl FnMut(&S) -> Result<()> {
    move |store: &S| {
        for path in &field_paths {
            store.create_index(path)?;
        }
        Ok(())
    }
}

/// Setup action dropping all indexes and then creating the given ones:
/// one full drop/create cycle
pub fn reset_indexes<S: DataStore + ?Sized>(
    field_paths: Vec<String>,
) -> impl FnMut(&S) -> Result<()> {
    let mut create = create_indexes::<S>(field_paths);
    move |store: &S| {
        store.drop_indexes()?;
        create(store)
    }
}

/// Phases comparing one pipeline without and with indexes:
///
/// 1. `cold, no index`: first execution, store left as found
/// 2. `warm, no index`: same pipeline again, caches populated
/// 3. `with index`: indexes created on `index_paths`, `settle_delay`
///    waited, pipeline measured twice
pub fn index_comparison_phases<'a, S: DataStore + ?Sized + 'a>(
    operation_name: &str,
    pipeline: &Pipeline,
    index_paths: &[&str],
    settle_delay: Duration,
) -> Vec<Phase<'a, S>> {
    let index_paths: Vec<String> = index_paths.iter().map(|p| p.to_string()).collect();
    vec![
        Phase::new("cold, no index").with_pipeline(operation_name, pipeline.clone()),
        Phase::new("warm, no index").with_pipeline(operation_name, pipeline.clone()),
        Phase::new("with index")
            .with_setup(reset_indexes(index_paths))
            .with_settle_delay(settle_delay)
            .with_pipeline(operation_name, pipeline.clone())
            .with_pipeline(operation_name, pipeline.clone()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Document, MemoryStore};

    #[test]
    fn test_builder() {
        let phase: Phase<'_, MemoryStore> = Phase::new("warm")
            .with_settle_delay(Duration::from_secs(2))
            .with_pipeline("a", Pipeline::top_by_combined_rating(5))
            .with_fn("b", |_store: &MemoryStore| {
                Ok(Box::new(std::iter::empty::<Result<Document>>()) as Cursor<'_>)
            });

        assert_eq!(phase.name(), "warm");
        assert_eq!(phase.settle_delay(), Some(Duration::from_secs(2)));
        assert!(!phase.has_setup());
        let names: Vec<&str> = phase.operations().iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert!(format!("{:?}", phase).contains("warm"));
    }

    #[test]
    fn test_zero_settle_delay_is_none() {
        let phase: Phase<'_, MemoryStore> = Phase::new("p").with_settle_delay(Duration::ZERO);
        assert_eq!(phase.settle_delay(), None);
    }

    #[test]
    fn test_index_setup_actions() {
        let store = MemoryStore::new("movies");
        let mut create = create_indexes::<MemoryStore>(vec!["imdb.rating".to_string()]);
        create(&store).unwrap();
        assert!(store.has_index("imdb.rating").unwrap());

        let mut reset = reset_indexes::<MemoryStore>(vec!["year".to_string()]);
        reset(&store).unwrap();
        assert!(!store.has_index("imdb.rating").unwrap());
        assert!(store.has_index("year").unwrap());

        let mut clear = drop_indexes::<MemoryStore>();
        clear(&store).unwrap();
        assert_eq!(store.list_indexes().unwrap(), vec!["_id_"]);
    }

    #[test]
    fn test_index_comparison_phases_layout() {
        let phases: Vec<Phase<'_, MemoryStore>> = index_comparison_phases(
            "top-5",
            &Pipeline::top_by_combined_rating(5),
            &["imdb.rating", "tomatoes.viewer.rating"],
            Duration::from_secs(10),
        );
        let names: Vec<&str> = phases.iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["cold, no index", "warm, no index", "with index"]);
        assert!(!phases[0].has_setup());
        assert!(!phases[1].has_setup());
        assert!(phases[2].has_setup());
        assert_eq!(phases[2].settle_delay(), Some(Duration::from_secs(10)));
        assert_eq!(phases[2].operations().len(), 2);
    }
}
