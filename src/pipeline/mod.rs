//! Aggregation pipeline model
//!
//! A pipeline is an ordered list of stage documents, each an object with
//! exactly one `$`-prefixed key (`{"$sort": {...}}`). This module only checks
//! that shape; what each stage means is up to the store evaluating it.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{PipebenchError, Result};

/// Ordered sequence of aggregation stages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Value>", into = "Vec<Value>")]
pub struct Pipeline {
    stages: Vec<Value>,
}

impl Pipeline {
    /// Create a pipeline, validating every stage
    pub fn new(stages: Vec<Value>) -> Result<Self> {
        for (index, stage) in stages.iter().enumerate() {
            stage_operator(stage).map_err(|e| {
                PipebenchError::InvalidPipeline(format!("stage {}: {}", index, e))
            })?;
        }
        Ok(Self { stages })
    }

    /// Parse a pipeline from JSON text holding an array of stages
    pub fn from_json(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(value)
    }

    /// Build a pipeline from an already-parsed JSON array
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Array(stages) => Self::new(stages),
            other => Err(PipebenchError::InvalidPipeline(format!(
                "expected an array of stages, found {}",
                json_type_name(&other)
            ))),
        }
    }

    /// The movie ranking pipeline used throughout the demos: project both
    /// ratings, average them into `combined_rating`, sort descending and keep
    /// the first `limit` documents.
    pub fn top_by_combined_rating(limit: u64) -> Self {
        Self {
            stages: vec![
                json!({"$project": {
                    "title": 1,
                    "imdb_rating": "$imdb.rating",
                    "tomatoes_viewer_rating": "$tomatoes.viewer.rating"
                }}),
                json!({"$addFields": {
                    "combined_rating": {"$avg": ["$imdb_rating", "$tomatoes_viewer_rating"]}
                }}),
                json!({"$sort": {"combined_rating": -1}}),
                json!({"$limit": limit}),
            ],
        }
    }

    /// Stage documents in execution order
    pub fn stages(&self) -> &[Value] {
        &self.stages
    }

    /// Stage operator names in execution order (`$project`, `$sort`, ...)
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages
            .iter()
            .filter_map(|stage| stage_operator(stage).ok().map(|(name, _)| name))
            .collect()
    }

    /// Number of stages
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Whether the pipeline has no stages (passes every document through)
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Copy of this pipeline whose trailing `$limit` is replaced by `limit`,
    /// or which gains one if it had none
    pub fn with_limit(&self, limit: u64) -> Self {
        let mut stages = self.stages.clone();
        let limit_stage = json!({ "$limit": limit });
        match stages.last() {
            Some(last) if matches!(stage_operator(last), Ok(("$limit", _))) => {
                if let Some(slot) = stages.last_mut() {
                    *slot = limit_stage;
                }
            }
            _ => stages.push(limit_stage),
        }
        Self { stages }
    }

    /// Pretty JSON rendering of the stage list
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.stages)?)
    }
}

impl TryFrom<Vec<Value>> for Pipeline {
    type Error = PipebenchError;

    fn try_from(stages: Vec<Value>) -> Result<Self> {
        Self::new(stages)
    }
}

impl From<Pipeline> for Vec<Value> {
    fn from(pipeline: Pipeline) -> Self {
        pipeline.stages
    }
}

/// Split a stage document into its operator name and argument
pub fn stage_operator(stage: &Value) -> Result<(&str, &Value)> {
    let object = stage.as_object().ok_or_else(|| {
        PipebenchError::InvalidPipeline(format!(
            "stage must be an object, found {}",
            json_type_name(stage)
        ))
    })?;

    let mut entries = object.iter();
    match (entries.next(), entries.next()) {
        (Some((name, argument)), None) if name.starts_with('$') => Ok((name.as_str(), argument)),
        (Some((name, _)), None) => Err(PipebenchError::InvalidPipeline(format!(
            "stage name must start with '$', found '{}'",
            name
        ))),
        (None, _) => Err(PipebenchError::InvalidPipeline(
            "stage document is empty".to_string(),
        )),
        _ => Err(PipebenchError::InvalidPipeline(format!(
            "stage must have exactly one key, found {}",
            object.len()
        ))),
    }
}

/// JSON type name for error messages
pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_top_by_combined_rating_shape() {
        let pipeline = Pipeline::top_by_combined_rating(5);
        assert_eq!(
            pipeline.stage_names(),
            vec!["$project", "$addFields", "$sort", "$limit"]
        );
        assert_eq!(pipeline.stages()[3], json!({"$limit": 5}));
    }

    #[test]
    fn test_rejects_malformed_stages() {
        assert!(Pipeline::from_json(r#"{"$limit": 5}"#).is_err());
        assert!(Pipeline::from_json(r#"[{"limit": 5}]"#).is_err());
        assert!(Pipeline::from_json(r#"[{}]"#).is_err());
        assert!(Pipeline::from_json(r#"[{"$limit": 5, "$skip": 1}]"#).is_err());
        assert!(Pipeline::from_json(r#"[42]"#).is_err());
        assert!(Pipeline::from_json("not json").is_err());
    }

    #[test]
    fn test_deserialize_validates() {
        let ok: std::result::Result<Pipeline, _> =
            serde_json::from_str(r#"[{"$sort": {"year": 1}}]"#);
        assert!(ok.is_ok());

        let bad: std::result::Result<Pipeline, _> = serde_json::from_str(r#"[{"sort": 1}]"#);
        assert!(bad.is_err());
    }

    #[test]
    fn test_with_limit_replaces_trailing_limit() {
        let pipeline = Pipeline::top_by_combined_rating(1337).with_limit(5);
        assert_eq!(pipeline.len(), 4);
        assert_eq!(pipeline.stages()[3], json!({"$limit": 5}));

        let appended = Pipeline::new(vec![json!({"$sort": {"year": -1}})])
            .unwrap()
            .with_limit(3);
        assert_eq!(appended.stage_names(), vec!["$sort", "$limit"]);
    }

    #[test]
    fn test_serializes_as_plain_array() {
        let pipeline = Pipeline::top_by_combined_rating(5);
        let value = serde_json::to_value(&pipeline).unwrap();
        assert!(value.is_array());
        assert_eq!(Pipeline::from_value(value).unwrap(), pipeline);
    }
}
