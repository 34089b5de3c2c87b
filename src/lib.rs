//! pipebench - Aggregation Pipeline Bench
//!
//! Times named aggregation pipelines against a document store across
//! measurement phases (cold cache, warm cache, with and without indexes)
//! and asks a hosted language model to write new pipelines from verified
//! examples.

use thiserror::Error;

pub mod bench;
pub mod config;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod prompt;
pub mod store;
pub mod util;

/// Common error type for every pipebench operation
#[derive(Debug, Error)]
pub enum PipebenchError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Configuration validation or parsing error
    #[error("Configuration error: {0}")]
    Config(String),
    /// Pipeline is not a list of single-key stage documents
    #[error("Invalid pipeline: {0}")]
    InvalidPipeline(String),
    /// Stage or expression operator the store cannot evaluate
    #[error("Unsupported stage: {0}")]
    UnsupportedStage(String),
    /// Data store rejected a request
    #[error("Store error: {0}")]
    Store(String),
    /// A measured operation failed
    #[error("Operation '{name}' failed: {source}")]
    Operation {
        name: String,
        #[source]
        source: Box<PipebenchError>,
    },
    /// A phase setup action failed
    #[error("Setup for phase '{phase}' failed: {source}")]
    Setup {
        phase: String,
        #[source]
        source: Box<PipebenchError>,
    },
    /// Transport-level failure talking to the text-generation service
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    /// Text-generation service answered with a non-success status
    #[error("Service returned {status}: {message}")]
    Service { status: u16, message: String },
    /// Text-generation response did not have the expected shape
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
    /// JSON encoding or decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// Blocking benchmark task panicked or was cancelled
    #[error("Benchmark task failed: {0}")]
    Task(String),
}

impl From<tokio::task::JoinError> for PipebenchError {
    fn from(err: tokio::task::JoinError) -> Self {
        PipebenchError::Task(err.to_string())
    }
}

impl From<toml::de::Error> for PipebenchError {
    fn from(err: toml::de::Error) -> Self {
        PipebenchError::Config(format!("TOML parsing error: {}", err))
    }
}

impl From<toml::ser::Error> for PipebenchError {
    fn from(err: toml::ser::Error) -> Self {
        PipebenchError::Config(format!("TOML serialization error: {}", err))
    }
}

/// Result type alias for pipebench operations
pub type Result<T> = std::result::Result<T, PipebenchError>;

/// Error reporting helpers for the command line
pub mod error {
    use super::PipebenchError;

    /// Convert error to user-friendly message with a hint where one helps
    pub fn user_friendly_message(error: &PipebenchError) -> String {
        match error {
            PipebenchError::Config(msg) => {
                format!("Configuration error: {}. Check your settings.", msg)
            }
            PipebenchError::Http(_) => {
                "Could not reach the text-generation service. Check the endpoint and your network."
                    .to_string()
            }
            PipebenchError::Service { status: 401, .. }
            | PipebenchError::Service { status: 403, .. } => {
                "The text-generation service rejected the credential. Check the API key."
                    .to_string()
            }
            PipebenchError::MalformedResponse(msg) => {
                format!("The model answer could not be used as a pipeline: {}", msg)
            }
            PipebenchError::Operation { name, source } => {
                format!("Measurement '{}' failed: {}", name, user_friendly_message(source))
            }
            PipebenchError::Setup { phase, source } => {
                format!("Could not prepare phase '{}': {}", phase, user_friendly_message(source))
            }
            _ => error.to_string(),
        }
    }

    /// Process exit code for a fatal error
    pub fn exit_code(error: &PipebenchError) -> i32 {
        match error {
            PipebenchError::Config(_) => 2,
            PipebenchError::Http(_) | PipebenchError::Service { .. } => 3,
            PipebenchError::MalformedResponse(_) | PipebenchError::Json(_) => 4,
            _ => 1,
        }
    }
}

// Common types and constants
pub const APP_NAME: &str = "pipebench";
pub const CONFIG_FILE: &str = "pipebench.toml";
pub const API_KEY_ENV: &str = "PIPEBENCH_API_KEY";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrapped_errors_keep_source_message() {
        let err = PipebenchError::Operation {
            name: "top-5".to_string(),
            source: Box::new(PipebenchError::UnsupportedStage("$lookup".to_string())),
        };
        let text = err.to_string();
        assert!(text.contains("top-5"));
        assert!(text.contains("$lookup"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_user_friendly_message_for_auth_failure() {
        let err = PipebenchError::Service {
            status: 401,
            message: "denied".to_string(),
        };
        assert!(error::user_friendly_message(&err).contains("API key"));
        assert_eq!(error::exit_code(&err), 3);
    }

    #[test]
    fn test_toml_error_maps_to_config() {
        let err: PipebenchError = toml::from_str::<toml::Value>("= broken")
            .unwrap_err()
            .into();
        assert!(matches!(err, PipebenchError::Config(_)));
        assert_eq!(error::exit_code(&err), 2);
    }

    #[tokio::test]
    async fn test_panicked_task_maps_to_task_error() {
        let joined = tokio::task::spawn_blocking(|| -> Result<()> { panic!("store exploded") }).await;
        let err: PipebenchError = joined.unwrap_err().into();
        assert!(matches!(err, PipebenchError::Task(_)));

        let message = error::user_friendly_message(&err);
        assert!(message.starts_with("Benchmark task failed"));
        assert!(!message.contains("I/O error"));
        assert_eq!(error::exit_code(&err), 1);
    }
}
