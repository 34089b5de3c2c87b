//! Document store module
//!
//! Defines the data-store collaborator the benchmark runner measures
//! against, plus an in-process implementation and a synthetic dataset.

use serde_json::Value;

use tracing::info;

use crate::config::{BenchSettings, StoreConfig};
use crate::pipeline::Pipeline;
use crate::{PipebenchError, Result};

pub mod eval;
pub mod memory;
pub mod seed;

pub use memory::MemoryStore;
pub use seed::synthetic_movies;

/// A JSON object document
pub type Document = Value;

/// Lazy sequence of result documents produced by an aggregation
pub type Cursor<'a> = Box<dyn Iterator<Item = Result<Document>> + 'a>;

/// Name of the index every collection carries and `drop_indexes` keeps
pub const ID_INDEX: &str = "_id_";

/// Data store handle scoped to a single collection
///
/// All operations are synchronous and blocking.
pub trait DataStore {
    /// Run an aggregation pipeline. Results are produced lazily; the cost of
    /// evaluation is paid while the cursor is drained.
    fn aggregate(&self, pipeline: &Pipeline) -> Result<Cursor<'_>>;

    /// Create an ascending index on a dotted field path and return its name.
    /// Creating an index that already exists is a no-op.
    fn create_index(&self, field_path: &str) -> Result<String>;

    /// Drop every index except the implicit `_id_` index
    fn drop_indexes(&self) -> Result<()>;

    /// Names of the indexes currently defined, `_id_` included
    fn list_indexes(&self) -> Result<Vec<String>>;
}

/// Index name for an ascending index on `field_path`
pub fn index_name(field_path: &str) -> String {
    format!("{}_1", field_path)
}

/// Open the store described by `config`.
///
/// `memory://` (or an empty URI) gives an empty in-process collection;
/// `file://<path>` loads the collection from a JSON array or JSON-lines file.
pub fn open_store(config: &StoreConfig) -> Result<MemoryStore> {
    let uri = config.connection_uri.trim();
    if is_memory_uri(uri) {
        return Ok(MemoryStore::new(config.collection.clone()));
    }

    if let Some(path) = uri.strip_prefix("file://") {
        return MemoryStore::from_json_file(config.collection.clone(), path);
    }

    let scheme = uri.split("://").next().unwrap_or(uri);
    Err(PipebenchError::Config(format!(
        "Unsupported connection URI scheme '{}' (expected memory:// or file://)",
        scheme
    )))
}

/// Open the store for a benchmark session. A `memory://` collection is
/// filled with `bench.movie_count` synthetic movies first.
pub fn open_bench_store(store: &StoreConfig, bench: &BenchSettings) -> Result<MemoryStore> {
    let mut opened = open_store(store)?;
    if is_memory_uri(store.connection_uri.trim()) {
        let inserted = opened.insert_many(synthetic_movies(bench.movie_count, bench.seed))?;
        info!(documents = inserted, seed = bench.seed, "seeded synthetic movies");
    }
    Ok(opened)
}

pub(crate) fn is_memory_uri(uri: &str) -> bool {
    uri.is_empty() || uri == "memory://"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_name() {
        assert_eq!(index_name("imdb.rating"), "imdb.rating_1");
    }

    #[test]
    fn test_open_store_schemes() {
        let mut config = StoreConfig::default();
        config.connection_uri = "memory://".to_string();
        let store = open_store(&config).unwrap();
        assert!(store.is_empty());
        assert_eq!(store.collection(), config.collection);

        config.connection_uri = "mongodb+srv://cluster.example.net".to_string();
        let err = open_store(&config).unwrap_err();
        assert!(err.to_string().contains("mongodb+srv"));
    }

    #[test]
    fn test_open_bench_store_seeds_memory_only() {
        let bench = BenchSettings {
            movie_count: 50,
            ..BenchSettings::default()
        };
        let store = open_bench_store(&StoreConfig::default(), &bench).unwrap();
        assert_eq!(store.len(), 50);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("movies.jsonl");
        std::fs::write(&path, "{\"title\": \"Heat\"}\n").unwrap();
        let config = StoreConfig {
            connection_uri: format!("file://{}", path.display()),
            ..StoreConfig::default()
        };
        let store = open_bench_store(&config, &bench).unwrap();
        assert_eq!(store.len(), 1);
    }
}
