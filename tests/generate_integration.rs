use async_trait::async_trait;
use pipebench::bench::{BenchmarkRunner, PipelineOperation};
use pipebench::llm::{generate_pipeline, ChatRequest, TextGenerator};
use pipebench::prompt::{ExampleRegistry, PromptBuilder};
use pipebench::store::{synthetic_movies, MemoryStore};
use pipebench::{PipebenchError, Result};

/// Answers with the verified example, re-limited to five documents
struct ExampleEcho;

#[async_trait]
impl TextGenerator for ExampleEcho {
    async fn complete(&self, request: &ChatRequest) -> Result<String> {
        let prompt = &request.messages[1].content;
        assert!(prompt.contains("What are the best 5 movies?"));

        let example = ExampleRegistry::movies();
        let pipeline = example
            .get("best_movies")
            .expect("movies example")
            .pipeline
            .with_limit(5);
        Ok(serde_json::json!({
            "pipeline": pipeline,
            "user_input": "What are the best 5 movies?"
        })
        .to_string())
    }
}

struct Chatty;

#[async_trait]
impl TextGenerator for Chatty {
    async fn complete(&self, _request: &ChatRequest) -> Result<String> {
        Ok("I can't answer that as JSON, sorry.".to_string())
    }
}

#[tokio::test]
async fn test_generated_pipeline_runs_against_store() {
    let builder = PromptBuilder::new("movies", ExampleRegistry::movies());
    let response = generate_pipeline(&ExampleEcho, &builder, "What are the best 5 movies?")
        .await
        .expect("pipeline generated");

    let store = MemoryStore::with_documents("movies", synthetic_movies(200, 3)).unwrap();
    let (measurement, documents) = BenchmarkRunner::new()
        .measure_with_results(&PipelineOperation::new(response.pipeline), &store)
        .unwrap();

    assert_eq!(measurement.documents, 5);
    let ratings: Vec<f64> = documents
        .iter()
        .map(|doc| doc["combined_rating"].as_f64().unwrap())
        .collect();
    assert!(ratings.windows(2).all(|pair| pair[0] >= pair[1]));
}

#[tokio::test]
async fn test_non_json_answer_yields_no_pipeline() {
    let builder = PromptBuilder::new("movies", ExampleRegistry::movies());
    let result = generate_pipeline(&Chatty, &builder, "What are the best 5 movies?").await;
    assert!(matches!(result, Err(PipebenchError::MalformedResponse(_))));
}
