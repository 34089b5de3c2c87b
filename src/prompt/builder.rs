//! Prompt builder
//!
//! Produces a system instruction plus one user message laid out in tagged
//! sections: `[context]` with the collection and verified pipelines, the
//! instruction naming the user's question, and `[response criteria]`.

use std::fmt::Write as _;

use crate::prompt::{ChatMessage, ExampleRegistry};
use crate::Result;

/// Instruction sent as the system message
pub const SYSTEM_INSTRUCTION: &str = "You are a helpful assistant that translates English to \
MongoDB Aggregation Pipeline array. Only respond with the array, ready to use.";

/// Shape the answer must take so it can be parsed back into a pipeline
pub const DEFAULT_RESPONSE_CRITERIA: [&str; 2] = [
    "JSON object with keys 'pipeline' and 'user_input'",
    "response must be JSON",
];

/// Assembles pipeline-generation prompts for one collection
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    collection: String,
    registry: ExampleRegistry,
    criteria: Vec<String>,
}

impl PromptBuilder {
    pub fn new(collection: impl Into<String>, registry: ExampleRegistry) -> Self {
        Self {
            collection: collection.into(),
            registry,
            criteria: DEFAULT_RESPONSE_CRITERIA
                .iter()
                .map(|c| c.to_string())
                .collect(),
        }
    }

    /// Append a response criterion
    pub fn with_criterion(mut self, criterion: impl Into<String>) -> Self {
        self.criteria.push(criterion.into());
        self
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn registry(&self) -> &ExampleRegistry {
        &self.registry
    }

    pub fn criteria(&self) -> &[String] {
        &self.criteria
    }

    /// Messages asking for a pipeline that answers `user_input`
    pub fn build(&self, user_input: &str) -> Result<Vec<ChatMessage>> {
        Ok(vec![
            ChatMessage::system(SYSTEM_INSTRUCTION),
            ChatMessage::user(self.user_message(user_input)?),
        ])
    }

    fn user_message(&self, user_input: &str) -> Result<String> {
        let mut out = String::new();
        // Writing into a String cannot fail
        let _ = writeln!(out, "[context]");
        let _ = writeln!(out, "collection = {:?}", self.collection);
        let _ = writeln!(out, "[verified pipelines]");
        for (_, example) in self.registry.iter() {
            let _ = writeln!(out, "[user_input=`{}`]", example.description);
            let _ = writeln!(out, "{}", example.pipeline.to_json_pretty()?);
        }
        let _ = writeln!(out, "[/verified pipelines]");
        let _ = writeln!(out, "[/context]");
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "USE THE [verified pipelines] IN THE [context] TO RESPOND TO \
             [user_input=`{}`] AND RETURN A JSON ARRAY MONGODB AGGREGATION PIPELINE",
            user_input
        );
        let _ = writeln!(out);
        let _ = writeln!(out, "[response criteria]");
        for criterion in &self.criteria {
            let _ = writeln!(out, "- {}", criterion);
        }
        let _ = writeln!(out, "[/response criteria]");
        Ok(out)
    }
}
