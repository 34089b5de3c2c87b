//! Azure OpenAI chat-completions client

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::LlmConfig;
use crate::llm::{ChatRequest, TextGenerator};
use crate::{PipebenchError, Result};

/// Calls one model deployment through the Azure OpenAI REST API
#[derive(Clone)]
pub struct AzureOpenAiClient {
    client: Client,
    url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct CompletionEnvelope {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<AnswerMessage>,
}

#[derive(Debug, Deserialize)]
struct AnswerMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

impl AzureOpenAiClient {
    /// Build a client from validated settings
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            url: completions_url(config),
            api_key: config.credential.clone(),
        })
    }

    /// Request URL including the `api-version` query parameter
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl std::fmt::Debug for AzureOpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureOpenAiClient")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TextGenerator for AzureOpenAiClient {
    async fn complete(&self, request: &ChatRequest) -> Result<String> {
        debug!(url = %self.url, messages = request.messages.len(), "sending chat completion");
        let response = self
            .client
            .post(&self.url)
            .header("api-key", &self.api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            warn!(status = status.as_u16(), "chat completion rejected");
            return Err(service_error(status, &body));
        }
        extract_content(&body)
    }
}

fn completions_url(config: &LlmConfig) -> String {
    format!(
        "{}/openai/deployments/{}/chat/completions?api-version={}",
        config.endpoint.trim_end_matches('/'),
        config.deployment,
        config.api_version
    )
}

/// Message text of the first choice in a successful response body
fn extract_content(body: &str) -> Result<String> {
    let envelope: CompletionEnvelope = serde_json::from_str(body)
        .map_err(|e| PipebenchError::MalformedResponse(format!("unexpected response body: {}", e)))?;

    envelope
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message)
        .and_then(|message| message.content)
        .ok_or_else(|| PipebenchError::MalformedResponse("response has no message content".to_string()))
}

fn service_error(status: StatusCode, body: &str) -> PipebenchError {
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|envelope| envelope.error.message)
        .unwrap_or_else(|_| {
            status
                .canonical_reason()
                .unwrap_or("unknown error")
                .to_string()
        });
    PipebenchError::Service {
        status: status.as_u16(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completions_url() {
        let config = LlmConfig {
            endpoint: "https://example.openai.azure.com/".to_string(),
            credential: "key".to_string(),
            ..LlmConfig::default()
        };
        let client = AzureOpenAiClient::new(&config).unwrap();
        assert_eq!(
            client.url(),
            "https://example.openai.azure.com/openai/deployments/gpt-4o/chat/completions?api-version=2024-10-21"
        );
        assert!(!format!("{:?}", client).contains("key\""));
    }

    #[test]
    fn test_extract_content() {
        let body = r#"{
            "id": "chatcmpl-1",
            "choices": [
                {"index": 0, "message": {"role": "assistant", "content": "{\"pipeline\": []}"}}
            ]
        }"#;
        assert_eq!(extract_content(body).unwrap(), r#"{"pipeline": []}"#);
    }

    #[test]
    fn test_extract_content_without_choices() {
        let err = extract_content(r#"{"choices": []}"#).unwrap_err();
        assert!(matches!(err, PipebenchError::MalformedResponse(_)));

        let err = extract_content("<html>gateway</html>").unwrap_err();
        assert!(matches!(err, PipebenchError::MalformedResponse(_)));
    }

    #[test]
    fn test_service_error_message() {
        let err = service_error(
            StatusCode::UNAUTHORIZED,
            r#"{"error": {"code": "401", "message": "Access denied due to invalid subscription key."}}"#,
        );
        match err {
            PipebenchError::Service { status, message } => {
                assert_eq!(status, 401);
                assert!(message.starts_with("Access denied"));
            }
            other => panic!("unexpected error: {:?}", other),
        }

        let err = service_error(StatusCode::BAD_GATEWAY, "upstream down");
        assert!(matches!(
            err,
            PipebenchError::Service { status: 502, ref message } if message == "Bad Gateway"
        ));
    }
}
