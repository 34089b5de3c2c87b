//! Prompt construction module
//!
//! Builds the chat messages that ask a language model to translate a
//! question into an aggregation pipeline, grounded in a registry of
//! verified pipelines.

pub mod builder;
pub mod registry;

use serde::{Deserialize, Serialize};

pub use builder::{PromptBuilder, DEFAULT_RESPONSE_CRITERIA, SYSTEM_INSTRUCTION};
pub use registry::{ExampleRegistry, VerifiedExample};

/// Author of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One role-tagged chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}
