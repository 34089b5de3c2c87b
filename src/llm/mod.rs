//! Text-generation module
//!
//! The [`TextGenerator`] trait hides the hosted chat-completions service;
//! [`generate_pipeline`] turns a question into a validated [`Pipeline`] by
//! prompting it with verified examples and parsing its JSON answer.

pub mod azure;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::pipeline::Pipeline;
use crate::prompt::{ChatMessage, PromptBuilder};
use crate::{PipebenchError, Result};

pub use azure::AzureOpenAiClient;

/// Output format the service is asked to honor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseFormat {
    Text,
    JsonObject,
}

/// A chat-completions request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub response_format: ResponseFormat,
}

impl ChatRequest {
    /// Request whose answer must be a JSON object
    pub fn json(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            response_format: ResponseFormat::JsonObject,
        }
    }
}

/// Anything that can complete a chat and return the answer text
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn complete(&self, request: &ChatRequest) -> Result<String>;
}

#[async_trait]
impl<T: TextGenerator + ?Sized> TextGenerator for Box<T> {
    async fn complete(&self, request: &ChatRequest) -> Result<String> {
        (**self).complete(request).await
    }
}

/// The model's answer: a pipeline and the question it answers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineResponse {
    pub pipeline: Pipeline,
    pub user_input: String,
}

impl PipelineResponse {
    /// Parse the answer text. Anything but a JSON object holding a valid
    /// `pipeline` array and a `user_input` string is rejected.
    pub fn parse(content: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(content.trim()).map_err(|e| {
            PipebenchError::MalformedResponse(format!("answer is not JSON: {}", e))
        })?;

        let object = value.as_object().ok_or_else(|| {
            PipebenchError::MalformedResponse("answer is not a JSON object".to_string())
        })?;

        let pipeline = object
            .get("pipeline")
            .cloned()
            .ok_or_else(|| PipebenchError::MalformedResponse("missing 'pipeline'".to_string()))?;
        let pipeline = Pipeline::from_value(pipeline)
            .map_err(|e| PipebenchError::MalformedResponse(e.to_string()))?;

        let user_input = object
            .get("user_input")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                PipebenchError::MalformedResponse("missing string 'user_input'".to_string())
            })?
            .to_string();

        Ok(Self {
            pipeline,
            user_input,
        })
    }
}

/// Ask `generator` for a pipeline answering `question`
pub async fn generate_pipeline<G>(
    generator: &G,
    builder: &PromptBuilder,
    question: &str,
) -> Result<PipelineResponse>
where
    G: TextGenerator + ?Sized,
{
    let request = ChatRequest::json(builder.build(question)?);
    debug!(collection = builder.collection(), "requesting pipeline");

    let content = generator.complete(&request).await?;
    let response = PipelineResponse::parse(&content)?;
    info!(stages = response.pipeline.len(), "received pipeline");
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::{ExampleRegistry, Role};
    use std::sync::Mutex;

    /// Returns a fixed answer and remembers the last request
    struct Canned {
        answer: String,
        last: Mutex<Option<ChatRequest>>,
    }

    impl Canned {
        fn new(answer: &str) -> Self {
            Self {
                answer: answer.to_string(),
                last: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl TextGenerator for Canned {
        async fn complete(&self, request: &ChatRequest) -> Result<String> {
            *self.last.lock().unwrap() = Some(request.clone());
            Ok(self.answer.clone())
        }
    }

    struct Unreachable;

    #[async_trait]
    impl TextGenerator for Unreachable {
        async fn complete(&self, _request: &ChatRequest) -> Result<String> {
            Err(PipebenchError::Service {
                status: 401,
                message: "Access denied".to_string(),
            })
        }
    }

    fn builder() -> PromptBuilder {
        PromptBuilder::new("movies", ExampleRegistry::movies())
    }

    #[tokio::test]
    async fn test_generate_pipeline() {
        let answer = serde_json::json!({
            "pipeline": Pipeline::top_by_combined_rating(5),
            "user_input": "What are the best 5 movies?"
        })
        .to_string();
        let generator = Canned::new(&answer);

        let response = generate_pipeline(&generator, &builder(), "What are the best 5 movies?")
            .await
            .unwrap();
        assert_eq!(response.pipeline, Pipeline::top_by_combined_rating(5));
        assert_eq!(response.user_input, "What are the best 5 movies?");

        let request = generator.last.lock().unwrap().clone().unwrap();
        assert_eq!(request.response_format, ResponseFormat::JsonObject);
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[1].role, Role::User);
    }

    #[tokio::test]
    async fn test_non_json_answer_is_rejected() {
        let generator = Canned::new("Sure! Here is your pipeline: [...]");
        let err = generate_pipeline(&generator, &builder(), "best movies")
            .await
            .unwrap_err();
        assert!(matches!(err, PipebenchError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_service_error_propagates() {
        let generator: Box<dyn TextGenerator> = Box::new(Unreachable);
        let err = generate_pipeline(&generator, &builder(), "best movies")
            .await
            .unwrap_err();
        assert!(matches!(err, PipebenchError::Service { status: 401, .. }));
    }

    #[test]
    fn test_parse_rejects_wrong_shapes() {
        let cases = [
            r#"[{"$limit": 5}]"#,
            r#"{"user_input": "q"}"#,
            r#"{"pipeline": [{"$limit": 5}]}"#,
            r#"{"pipeline": {"$limit": 5}, "user_input": "q"}"#,
            r#"{"pipeline": [{"limit": 5}], "user_input": "q"}"#,
        ];
        for case in cases {
            let err = PipelineResponse::parse(case).unwrap_err();
            assert!(
                matches!(err, PipebenchError::MalformedResponse(_)),
                "{} gave {:?}",
                case,
                err
            );
        }
    }

    #[test]
    fn test_request_serializes_response_format() {
        let request = ChatRequest::json(vec![ChatMessage::user("q")]);
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["response_format"], serde_json::json!({"type": "json_object"}));
        assert_eq!(value["messages"][0]["role"], "user");
    }
}
