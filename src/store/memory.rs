//! In-process document collection
//!
//! Evaluates the aggregation stages the benchmark pipelines use and keeps an
//! index catalog so index phases can be exercised without a database server.
//! The catalog does not change query plans: every pipeline is a full
//! collection scan.

use std::cmp::Ordering;
use std::fs;
use std::path::Path;
use std::sync::RwLock;

use serde_json::{json, Map, Value};
use tracing::debug;

use crate::pipeline::{json_type_name, stage_operator, Pipeline};
use crate::store::eval::{compare_values, get_path, remove_path, set_path, split_path, Expr, Filter};
use crate::store::{index_name, Cursor, DataStore, Document, ID_INDEX};
use crate::{PipebenchError, Result};

/// Catalog entry for one index
#[derive(Debug, Clone, PartialEq)]
struct IndexEntry {
    name: String,
    field_path: String,
}

/// In-memory collection implementing [`DataStore`]
#[derive(Debug)]
pub struct MemoryStore {
    collection: String,
    documents: Vec<Document>,
    next_id: u64,
    indexes: RwLock<Vec<IndexEntry>>,
}

impl MemoryStore {
    /// Create an empty collection
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            documents: Vec::new(),
            next_id: 1,
            indexes: RwLock::new(vec![IndexEntry {
                name: ID_INDEX.to_string(),
                field_path: "_id".to_string(),
            }]),
        }
    }

    /// Create a collection holding `documents`
    pub fn with_documents(
        collection: impl Into<String>,
        documents: impl IntoIterator<Item = Document>,
    ) -> Result<Self> {
        let mut store = Self::new(collection);
        store.insert_many(documents)?;
        Ok(store)
    }

    /// Load a collection from a file holding either a JSON array of
    /// documents or one document per line
    pub fn from_json_file(collection: impl Into<String>, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;

        let documents: Vec<Document> = if content.trim_start().starts_with('[') {
            serde_json::from_str(&content)?
        } else {
            content
                .lines()
                .filter(|line| !line.trim().is_empty())
                .map(serde_json::from_str)
                .collect::<std::result::Result<_, _>>()?
        };

        debug!(path = %path.display(), documents = documents.len(), "loaded collection file");
        Self::with_documents(collection, documents)
    }

    /// Append documents, assigning an integer `_id` to those without one.
    /// Returns the number of documents inserted.
    pub fn insert_many(&mut self, documents: impl IntoIterator<Item = Document>) -> Result<usize> {
        let mut inserted = 0;
        for mut document in documents {
            let object = document.as_object_mut().ok_or_else(|| {
                PipebenchError::Store("documents must be JSON objects".to_string())
            })?;
            if !object.contains_key("_id") {
                object.insert("_id".to_string(), json!(self.next_id));
                self.next_id += 1;
            }
            self.documents.push(document);
            inserted += 1;
        }
        Ok(inserted)
    }

    /// Collection name
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Stored documents in insertion order
    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    /// Number of stored documents
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Whether the collection is empty
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Whether an index exists on `field_path`
    pub fn has_index(&self, field_path: &str) -> Result<bool> {
        let indexes = self.read_indexes()?;
        Ok(indexes.iter().any(|entry| entry.field_path == field_path))
    }

    fn read_indexes(&self) -> Result<std::sync::RwLockReadGuard<'_, Vec<IndexEntry>>> {
        self.indexes
            .read()
            .map_err(|_| PipebenchError::Store("index catalog lock poisoned".to_string()))
    }

    fn write_indexes(&self) -> Result<std::sync::RwLockWriteGuard<'_, Vec<IndexEntry>>> {
        self.indexes
            .write()
            .map_err(|_| PipebenchError::Store("index catalog lock poisoned".to_string()))
    }
}

impl DataStore for MemoryStore {
    fn aggregate(&self, pipeline: &Pipeline) -> Result<Cursor<'_>> {
        let stages = pipeline
            .stages()
            .iter()
            .map(Stage::compile)
            .collect::<Result<Vec<_>>>()?;

        let mut cursor: Cursor<'_> = Box::new(self.documents.iter().cloned().map(Ok));
        for stage in stages {
            cursor = stage.attach(cursor);
        }
        Ok(cursor)
    }

    fn create_index(&self, field_path: &str) -> Result<String> {
        split_path(field_path)
            .map_err(|e| PipebenchError::Store(format!("cannot index '{}': {}", field_path, e)))?;

        let name = index_name(field_path);
        let mut indexes = self.write_indexes()?;
        if !indexes.iter().any(|entry| entry.name == name) {
            indexes.push(IndexEntry {
                name: name.clone(),
                field_path: field_path.to_string(),
            });
            debug!(collection = %self.collection, index = %name, "created index");
        }
        Ok(name)
    }

    fn drop_indexes(&self) -> Result<()> {
        let mut indexes = self.write_indexes()?;
        let before = indexes.len();
        indexes.retain(|entry| entry.name == ID_INDEX);
        debug!(
            collection = %self.collection,
            dropped = before - indexes.len(),
            "dropped indexes"
        );
        Ok(())
    }

    fn list_indexes(&self) -> Result<Vec<String>> {
        let indexes = self.read_indexes()?;
        Ok(indexes.iter().map(|entry| entry.name.clone()).collect())
    }
}

/// Parsed `$project` argument
#[derive(Debug, Clone)]
enum Projection {
    /// Keep only the listed paths (plus `_id` unless excluded); paths with an
    /// expression are computed from the input document
    Include {
        keep_id: bool,
        fields: Vec<(Vec<String>, Option<Expr>)>,
    },
    /// Remove the listed paths
    Exclude(Vec<Vec<String>>),
}

impl Projection {
    fn parse(argument: &Value) -> Result<Self> {
        let map = expect_object("$project", argument)?;
        if map.is_empty() {
            return Err(PipebenchError::InvalidPipeline(
                "$project requires at least one field".to_string(),
            ));
        }

        let mut keep_id = true;
        let mut included = Vec::new();
        let mut excluded = Vec::new();
        for (key, value) in map {
            let flag = match value {
                Value::Bool(b) => Some(*b),
                Value::Number(n) => Some(n.as_f64().map(|v| v != 0.0).unwrap_or(false)),
                _ => None,
            };
            match (key.as_str(), flag) {
                ("_id", Some(keep)) => keep_id = keep,
                (path, Some(true)) => included.push((split_path(path)?, None)),
                (path, Some(false)) => excluded.push(split_path(path)?),
                (path, None) => included.push((split_path(path)?, Some(Expr::parse(value)?))),
            }
        }

        match (included.is_empty(), excluded.is_empty()) {
            (false, false) => Err(PipebenchError::InvalidPipeline(
                "$project cannot mix inclusion and exclusion".to_string(),
            )),
            // `{"_id": 1}` alone keeps only the id
            (true, true) if keep_id => Ok(Projection::Include {
                keep_id,
                fields: included,
            }),
            (true, _) => {
                if !keep_id {
                    excluded.push(vec!["_id".to_string()]);
                }
                Ok(Projection::Exclude(excluded))
            }
            (false, true) => Ok(Projection::Include {
                keep_id,
                fields: included,
            }),
        }
    }

    fn apply(&self, mut document: Document) -> Document {
        match self {
            Projection::Include { keep_id, fields } => {
                let mut output = Value::Object(Map::new());
                if *keep_id {
                    if let Some(id) = document.get("_id") {
                        set_path(&mut output, &["_id".to_string()], id.clone());
                    }
                }
                for (path, expr) in fields {
                    let value = match expr {
                        Some(expr) => expr.eval(&document),
                        None => get_path(&document, path).cloned(),
                    };
                    if let Some(value) = value {
                        set_path(&mut output, path, value);
                    }
                }
                output
            }
            Projection::Exclude(paths) => {
                for path in paths {
                    remove_path(&mut document, path);
                }
                document
            }
        }
    }
}

/// Compiled pipeline stage
#[derive(Debug, Clone)]
enum Stage {
    Match(Filter),
    Project(Projection),
    AddFields(Vec<(Vec<String>, Expr)>),
    Sort(Vec<(Vec<String>, bool)>),
    Limit(usize),
    Skip(usize),
    Count(String),
}

impl Stage {
    fn compile(stage: &Value) -> Result<Self> {
        let (name, argument) = stage_operator(stage)?;
        match name {
            "$match" => Ok(Stage::Match(Filter::parse(argument)?)),
            "$project" => Ok(Stage::Project(Projection::parse(argument)?)),
            "$addFields" | "$set" => {
                let map = expect_object(name, argument)?;
                let fields = map
                    .iter()
                    .map(|(path, expr)| Ok((split_path(path)?, Expr::parse(expr)?)))
                    .collect::<Result<_>>()?;
                Ok(Stage::AddFields(fields))
            }
            "$sort" => {
                let map = expect_object(name, argument)?;
                if map.is_empty() {
                    return Err(PipebenchError::InvalidPipeline(
                        "$sort requires at least one key".to_string(),
                    ));
                }
                let keys = map
                    .iter()
                    .map(|(path, direction)| match direction.as_i64() {
                        Some(1) => Ok((split_path(path)?, false)),
                        Some(-1) => Ok((split_path(path)?, true)),
                        _ => Err(PipebenchError::InvalidPipeline(format!(
                            "$sort direction for '{}' must be 1 or -1",
                            path
                        ))),
                    })
                    .collect::<Result<_>>()?;
                Ok(Stage::Sort(keys))
            }
            "$limit" => match argument.as_u64() {
                Some(n) if n > 0 => Ok(Stage::Limit(n as usize)),
                _ => Err(PipebenchError::InvalidPipeline(format!(
                    "$limit must be a positive integer, found {}",
                    argument
                ))),
            },
            "$skip" => match argument.as_u64() {
                Some(n) => Ok(Stage::Skip(n as usize)),
                None => Err(PipebenchError::InvalidPipeline(format!(
                    "$skip must be a non-negative integer, found {}",
                    argument
                ))),
            },
            "$count" => match argument.as_str() {
                Some(field) if !field.is_empty() && !field.starts_with('$') && !field.contains('.') => {
                    Ok(Stage::Count(field.to_string()))
                }
                _ => Err(PipebenchError::InvalidPipeline(format!(
                    "$count expects a plain field name, found {}",
                    argument
                ))),
            },
            other => Err(PipebenchError::UnsupportedStage(other.to_string())),
        }
    }

    /// Wrap `upstream` with this stage, keeping evaluation lazy
    fn attach<'a>(self, upstream: Cursor<'a>) -> Cursor<'a> {
        match self {
            Stage::Match(filter) => Box::new(upstream.filter(move |item| match item {
                Ok(document) => filter.matches(document),
                Err(_) => true,
            })),
            Stage::Project(projection) => {
                Box::new(upstream.map(move |item| item.map(|doc| projection.apply(doc))))
            }
            Stage::AddFields(fields) => Box::new(upstream.map(move |item| {
                item.map(|mut document| {
                    let values: Vec<Option<Value>> =
                        fields.iter().map(|(_, expr)| expr.eval(&document)).collect();
                    for ((path, _), value) in fields.iter().zip(values) {
                        if let Some(value) = value {
                            set_path(&mut document, path, value);
                        }
                    }
                    document
                })
            })),
            Stage::Sort(keys) => blocking_stage(upstream, move |mut documents| {
                documents.sort_by(|a, b| compare_sort_keys(&keys, a, b));
                documents
            }),
            Stage::Limit(n) => Box::new(upstream.take(n)),
            Stage::Skip(n) => Box::new(upstream.skip(n)),
            Stage::Count(field) => blocking_stage(upstream, move |documents| {
                if documents.is_empty() {
                    Vec::new()
                } else {
                    vec![json!({ field.as_str(): documents.len() })]
                }
            }),
        }
    }
}

/// Stage that needs its whole input: drains upstream on first pull, then
/// yields the transformed batch
fn blocking_stage<'a, F>(upstream: Cursor<'a>, transform: F) -> Cursor<'a>
where
    F: FnOnce(Vec<Document>) -> Vec<Document> + 'a,
{
    let mut pending = Some((upstream, transform));
    let mut output: Option<std::vec::IntoIter<Document>> = None;
    Box::new(std::iter::from_fn(move || {
        if let Some((upstream, transform)) = pending.take() {
            match upstream.collect::<Result<Vec<_>>>() {
                Ok(documents) => output = Some(transform(documents).into_iter()),
                Err(err) => return Some(Err(err)),
            }
        }
        output.as_mut()?.next().map(Ok)
    }))
}

fn compare_sort_keys(keys: &[(Vec<String>, bool)], a: &Document, b: &Document) -> Ordering {
    for (path, descending) in keys {
        let ordering = compare_values(get_path(a, path), get_path(b, path));
        let ordering = if *descending {
            ordering.reverse()
        } else {
            ordering
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

fn expect_object<'a>(stage: &str, argument: &'a Value) -> Result<&'a Map<String, Value>> {
    argument.as_object().ok_or_else(|| {
        PipebenchError::InvalidPipeline(format!(
            "{} expects an object, found {}",
            stage,
            json_type_name(argument)
        ))
    })
}
