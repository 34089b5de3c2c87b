//! Configuration management module
//!
//! Holds the settings for both collaborators (text-generation service and
//! document store) and for benchmark sessions. A configuration value is
//! always passed explicitly to whatever needs it; nothing reads a global.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::store::is_memory_uri;
use crate::{PipebenchError, Result, API_KEY_ENV, APP_NAME, CONFIG_FILE};

/// Complete configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipebenchConfig {
    /// Text-generation service settings
    pub llm: LlmConfig,
    /// Document store settings
    pub store: StoreConfig,
    /// Benchmark session settings
    pub bench: BenchSettings,
}

/// Azure OpenAI chat-completions settings
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Resource endpoint, e.g. `https://my-resource.openai.azure.com`
    pub endpoint: String,
    /// API key; usually supplied through `PIPEBENCH_API_KEY` instead of the file
    #[serde(skip_serializing_if = "String::is_empty")]
    pub credential: String,
    /// REST API version query parameter
    pub api_version: String,
    /// Model deployment name
    pub deployment: String,
    /// Request timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

/// Document store settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// `memory://` for a seeded in-process collection, `file://<path>` to
    /// load one from JSON
    pub connection_uri: String,
    /// Database name, used in prompts and reports
    pub database: String,
    /// Collection the pipelines run against
    pub collection: String,
}

/// Benchmark session settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchSettings {
    /// Pause after index changes before measuring
    #[serde(with = "humantime_serde")]
    pub settle_delay: Duration,
    /// `$limit` of the ranking pipeline
    pub result_limit: u64,
    /// Number of synthetic movies seeded into a `memory://` store
    pub movie_count: usize,
    /// Seed for the synthetic dataset
    pub seed: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            credential: String::new(),
            api_version: "2024-10-21".to_string(),
            deployment: "gpt-4o".to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

impl fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmConfig")
            .field("endpoint", &self.endpoint)
            .field(
                "credential",
                &if self.credential.is_empty() { "" } else { "<redacted>" },
            )
            .field("api_version", &self.api_version)
            .field("deployment", &self.deployment)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            connection_uri: "memory://".to_string(),
            database: "sample_mflix".to_string(),
            collection: "movies".to_string(),
        }
    }
}

impl Default for BenchSettings {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_secs(10),
            result_limit: 5,
            movie_count: 20_000,
            seed: 42,
        }
    }
}

impl PipebenchConfig {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate store and benchmark settings
    pub fn validate(&self) -> Result<()> {
        if self.store.collection.trim().is_empty() {
            return Err(PipebenchError::Config(
                "Collection name must not be empty".to_string(),
            ));
        }

        if self.bench.result_limit == 0 {
            return Err(PipebenchError::Config(
                "Result limit must be greater than 0".to_string(),
            ));
        }

        const MAX_SETTLE_DELAY: Duration = Duration::from_secs(3600); // 1 hour
        if self.bench.settle_delay > MAX_SETTLE_DELAY {
            return Err(PipebenchError::Config(format!(
                "Settle delay too long: {}s (max: {}s)",
                self.bench.settle_delay.as_secs(),
                MAX_SETTLE_DELAY.as_secs()
            )));
        }

        // Only a memory:// store is seeded; file:// stores ignore the count
        const MAX_MOVIES: usize = 10_000_000;
        let seeded = is_memory_uri(self.store.connection_uri.trim());
        if seeded && (self.bench.movie_count == 0 || self.bench.movie_count > MAX_MOVIES) {
            return Err(PipebenchError::Config(format!(
                "Movie count must be between 1 and {}",
                MAX_MOVIES
            )));
        }

        Ok(())
    }

    /// Validate the settings needed to call the text-generation service
    pub fn validate_llm(&self) -> Result<()> {
        let llm = &self.llm;
        if !(llm.endpoint.starts_with("https://") || llm.endpoint.starts_with("http://")) {
            return Err(PipebenchError::Config(format!(
                "LLM endpoint must be an http(s) URL, found '{}'",
                llm.endpoint
            )));
        }
        if llm.credential.is_empty() {
            return Err(PipebenchError::Config(format!(
                "LLM credential is missing; set it in the config file or {}",
                API_KEY_ENV
            )));
        }
        if llm.api_version.trim().is_empty() {
            return Err(PipebenchError::Config(
                "LLM api_version must not be empty".to_string(),
            ));
        }
        if llm.deployment.trim().is_empty() {
            return Err(PipebenchError::Config(
                "LLM deployment must not be empty".to_string(),
            ));
        }
        if llm.timeout.is_zero() {
            return Err(PipebenchError::Config(
                "LLM timeout must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Set the text-generation endpoint
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.llm.endpoint = endpoint.into();
        self
    }

    /// Set the text-generation credential
    pub fn with_credential(mut self, credential: impl Into<String>) -> Self {
        self.llm.credential = credential.into();
        self
    }

    /// Set the REST API version
    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.llm.api_version = api_version.into();
        self
    }

    /// Set the store connection URI
    pub fn with_connection_uri(mut self, uri: impl Into<String>) -> Self {
        self.store.connection_uri = uri.into();
        self
    }

    /// Set the settle delay
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.bench.settle_delay = delay;
        self
    }

    /// Set the ranking pipeline limit
    pub fn with_result_limit(mut self, limit: u64) -> Self {
        self.bench.result_limit = limit;
        self
    }

    /// Set the synthetic dataset size and seed
    pub fn with_dataset(mut self, movie_count: usize, seed: u64) -> Self {
        self.bench.movie_count = movie_count;
        self.bench.seed = seed;
        self
    }

    /// Load configuration from the standard config file location.
    /// Returns defaults if the file doesn't exist.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_file_path()?;
        if !config_path.exists() {
            let mut config = Self::default();
            config.apply_env_overrides();
            return Ok(config);
        }
        Self::load_from(&config_path)
    }

    /// Load configuration from an explicit path, then apply environment
    /// overrides and validate
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            PipebenchError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        let mut config: Self = toml::from_str(&content).map_err(|e| {
            PipebenchError::Config(format!(
                "Failed to parse config file {}: {}",
                path.display(),
                e
            ))
        })?;

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to an explicit path, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<()> {
        self.validate()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                PipebenchError::Config(format!(
                    "Failed to create config directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(path, content).map_err(|e| {
            PipebenchError::Config(format!(
                "Failed to write config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Ok(())
    }

    /// Take the credential from `PIPEBENCH_API_KEY` when it is set
    pub fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.trim().is_empty() {
                self.llm.credential = key.trim().to_string();
            }
        }
    }

    /// Get the standard configuration file path:
    /// `$CONFIG_DIR/pipebench/pipebench.toml`
    pub fn config_file_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| {
            PipebenchError::Config("Unable to determine config directory".to_string())
        })?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Tests that touch process environment variables hold this lock
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_toml_serialization() {
        let config = PipebenchConfig::new()
            .with_endpoint("https://example.openai.azure.com")
            .with_settle_delay(Duration::from_millis(1500))
            .with_result_limit(10);
        let toml_str = toml::to_string(&config).expect("Failed to serialize to TOML");
        assert!(toml_str.contains("settle_delay = \"1s 500ms\""));

        let deserialized: PipebenchConfig =
            toml::from_str(&toml_str).expect("Failed to deserialize from TOML");
        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: PipebenchConfig = toml::from_str(
            r#"
            [bench]
            settle_delay = "250ms"
            "#,
        )
        .unwrap();
        assert_eq!(config.bench.settle_delay, Duration::from_millis(250));
        assert_eq!(config.bench.result_limit, 5);
        assert_eq!(config.store.collection, "movies");
        assert_eq!(config.llm.api_version, "2024-10-21");
    }

    #[test]
    fn test_bad_duration_is_rejected() {
        let parsed: std::result::Result<PipebenchConfig, _> = toml::from_str(
            r#"
            [bench]
            settle_delay = "soon"
            "#,
        );
        assert!(parsed.is_err());
    }

    #[test]
    fn test_validate() {
        assert!(PipebenchConfig::new().validate().is_ok());
        assert!(PipebenchConfig::new().with_result_limit(0).validate().is_err());
        assert!(PipebenchConfig::new()
            .with_settle_delay(Duration::from_secs(7200))
            .validate()
            .is_err());
        assert!(PipebenchConfig::new().with_dataset(0, 1).validate().is_err());
    }

    #[test]
    fn test_movie_count_only_checked_for_seeded_store() {
        let file_store = PipebenchConfig::new()
            .with_connection_uri("file:///data/movies.json")
            .with_dataset(0, 1);
        assert!(file_store.validate().is_ok());

        let memory_store = PipebenchConfig::new()
            .with_connection_uri("memory://")
            .with_dataset(0, 1);
        assert!(memory_store.validate().is_err());
        assert!(PipebenchConfig::new()
            .with_connection_uri("")
            .with_dataset(20_000_000, 1)
            .validate()
            .is_err());
    }

    #[test]
    fn test_duration_fields_accept_human_strings() {
        let config: PipebenchConfig = toml::from_str(
            r#"
            [llm]
            timeout = "1m 30s"
            "#,
        )
        .unwrap();
        assert_eq!(config.llm.timeout, Duration::from_secs(90));

        let toml_str = toml::to_string(&config).unwrap();
        assert!(toml_str.contains("timeout = \"1m 30s\""));
    }

    #[test]
    fn test_validate_llm() {
        let config = PipebenchConfig::new();
        assert!(config.validate_llm().is_err());

        let config = config
            .with_endpoint("https://example.openai.azure.com")
            .with_credential("secret");
        assert!(config.validate_llm().is_ok());
        assert!(config.clone().with_api_version("").validate_llm().is_err());
    }

    #[test]
    fn test_credential_not_in_debug_output() {
        let config = PipebenchConfig::new().with_credential("super-secret");
        let debug = format!("{:?}", config);
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join(CONFIG_FILE);

        let config = PipebenchConfig::new()
            .with_endpoint("https://example.openai.azure.com")
            .with_connection_uri("file:///data/movies.json")
            .with_dataset(1000, 9);
        config.save_to(&path).unwrap();

        let loaded = PipebenchConfig::load_from(&path).unwrap();
        assert_eq!(loaded.llm.endpoint, config.llm.endpoint);
        assert_eq!(loaded.store, config.store);
        assert_eq!(loaded.bench, config.bench);
    }

    #[test]
    fn test_api_key_env_overrides_file_credential() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(CONFIG_FILE);
        fs::write(
            &path,
            r#"
            [llm]
            endpoint = "https://example.openai.azure.com"
            credential = "from-file"
            "#,
        )
        .unwrap();

        std::env::set_var(API_KEY_ENV, "  from-env  ");
        let loaded = PipebenchConfig::load_from(&path);
        std::env::set_var(API_KEY_ENV, "   ");
        let blank = PipebenchConfig::load_from(&path);
        std::env::remove_var(API_KEY_ENV);

        assert_eq!(loaded.unwrap().llm.credential, "from-env");
        assert_eq!(blank.unwrap().llm.credential, "from-file");

        let unset = PipebenchConfig::load_from(&path).unwrap();
        assert_eq!(unset.llm.credential, "from-file");
    }

    #[test]
    fn test_load_from_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let err = PipebenchConfig::load_from(&temp_dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, PipebenchError::Config(_)));
    }

    #[test]
    fn test_config_file_path() {
        let path = PipebenchConfig::config_file_path();
        assert!(path.is_ok());
        let path = path.unwrap();
        assert!(path.to_string_lossy().contains("pipebench"));
        assert!(path.to_string_lossy().ends_with("pipebench.toml"));
    }
}
