//! Verified example pipelines
//!
//! Examples are stored as typed [`Pipeline`] values and only rendered to
//! text when a prompt is built, so an example can never drift into an
//! invalid shape.

use std::collections::BTreeMap;

use crate::pipeline::Pipeline;

/// The question the movies example answers
pub const BEST_MOVIES_QUESTION: &str = "What are the best 1337 movies";

/// A pipeline known to answer `description` correctly
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedExample {
    pub description: String,
    pub pipeline: Pipeline,
}

/// Named verified examples, iterated in name order
#[derive(Debug, Clone, Default)]
pub struct ExampleRegistry {
    examples: BTreeMap<String, VerifiedExample>,
}

impl ExampleRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry for the movies collection, holding the combined-rating
    /// ranking pipeline
    pub fn movies() -> Self {
        let mut registry = Self::new();
        registry.register(
            "best_movies",
            BEST_MOVIES_QUESTION,
            Pipeline::top_by_combined_rating(1337),
        );
        registry
    }

    /// Add or replace the example stored under `name`
    pub fn register(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        pipeline: Pipeline,
    ) -> Option<VerifiedExample> {
        self.examples.insert(
            name.into(),
            VerifiedExample {
                description: description.into(),
                pipeline,
            },
        )
    }

    pub fn get(&self, name: &str) -> Option<&VerifiedExample> {
        self.examples.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &VerifiedExample)> {
        self.examples.iter().map(|(name, example)| (name.as_str(), example))
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_movies_registry() {
        let registry = ExampleRegistry::movies();
        assert_eq!(registry.len(), 1);
        let example = registry.get("best_movies").unwrap();
        assert_eq!(example.description, BEST_MOVIES_QUESTION);
        assert_eq!(
            example.pipeline.stage_names(),
            vec!["$project", "$addFields", "$sort", "$limit"]
        );
    }

    #[test]
    fn test_register_replaces_and_orders_by_name() {
        let mut registry = ExampleRegistry::new();
        assert!(registry
            .register("b", "second", Pipeline::top_by_combined_rating(2))
            .is_none());
        registry.register("a", "first", Pipeline::top_by_combined_rating(1));
        let replaced = registry.register("b", "again", Pipeline::top_by_combined_rating(3));
        assert_eq!(replaced.unwrap().description, "second");

        let names: Vec<&str> = registry.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(registry.get("b").unwrap().description, "again");
    }
}
