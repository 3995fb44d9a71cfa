//! Configuration management for weft.
//!
//! Configuration is loaded from multiple sources with the following priority:
//! 1. Environment variables (highest priority)
//! 2. Project-local `weft.toml` file
//! 3. User config `~/.config/weft/config.toml`
//! 4. Built-in defaults (lowest priority)
//!
//! The graph endpoint and credentials have no defaults; a run refuses to
//! start until all three are present.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::extract::Language;
use crate::graph::Palette;
use crate::retry::RetryPolicy;

mod defaults;

pub use defaults::*;

pub const ENV_GRAPH_ENDPOINT: &str = "GRAPH_ENDPOINT";
pub const ENV_GRAPH_USER: &str = "GRAPH_USER";
pub const ENV_GRAPH_PASSWORD: &str = "GRAPH_PASSWORD";
pub const ENV_GRAPH_DATABASE: &str = "GRAPH_DATABASE";
pub const ENV_PROJECT_NAME: &str = "PROJECT_NAME";
pub const ENV_SOURCE_URL_BASE: &str = "SOURCE_URL_BASE";
pub const ENV_SOURCE_ROOT: &str = "SOURCE_ROOT";
pub const ENV_LANGUAGE: &str = "LANGUAGE";
pub const ENV_EXTRACT_CONCURRENCY: &str = "EXTRACT_CONCURRENCY";
pub const ENV_CONNECT_MAX_ATTEMPTS: &str = "CONNECT_MAX_ATTEMPTS";
pub const ENV_CONNECT_BASE_DELAY_MS: &str = "CONNECT_BASE_DELAY_MS";
pub const ENV_FLUSH_MAX_ROUNDS: &str = "FLUSH_MAX_ROUNDS";
pub const ENV_FLUSH_BASE_DELAY_MS: &str = "FLUSH_BASE_DELAY_MS";
pub const ENV_RESOURCE_STORE: &str = "RESOURCE_STORE";
pub const ENV_RESOURCE_DATABASE: &str = "RESOURCE_DATABASE";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required setting {0}")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Graph store connection.
    pub graph: GraphConfig,

    /// What is scanned and how it is tagged.
    pub project: ProjectConfig,

    /// Connection and deferred flush backoff.
    pub retry: RetryConfig,

    /// Extraction tuning.
    pub extraction: ExtractionConfig,

    /// Node colors keyed by label.
    pub palette: Palette,
}

impl Config {
    /// Load configuration from default locations, then apply the process
    /// environment and validate.
    ///
    /// Searches for config in order:
    /// 1. `./weft.toml` (project local)
    /// 2. `~/.config/weft/config.toml` (user config)
    /// 3. Falls back to defaults
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Like [`Config::load`], but an explicit file takes precedence over the
    /// default search locations.
    pub fn load_from(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = Self::resolve(path)?;
        config.validate()?;
        Ok(config)
    }

    /// File and environment layers merged, without validation. Dry runs
    /// use this since they never need graph credentials.
    pub fn resolve(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::discover()?,
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    fn discover() -> Result<Self, ConfigError> {
        if Path::new("weft.toml").exists() {
            return Self::from_file("weft.toml");
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("weft").join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file without consulting the
    /// environment.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key/value source. Blank values count as unset.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        // Graph store
        if let Some(endpoint) = get(ENV_GRAPH_ENDPOINT) {
            self.graph.endpoint = Some(endpoint);
        }
        if let Some(user) = get(ENV_GRAPH_USER) {
            self.graph.user = Some(user);
        }
        if let Some(password) = get(ENV_GRAPH_PASSWORD) {
            self.graph.password = Some(password);
        }
        if let Some(database) = get(ENV_GRAPH_DATABASE) {
            self.graph.database = database;
        }

        // Project
        if let Some(name) = get(ENV_PROJECT_NAME) {
            self.project.name = name;
        }
        if let Some(base) = get(ENV_SOURCE_URL_BASE) {
            self.project.source_url_base = base;
        }
        if let Some(root) = get(ENV_SOURCE_ROOT) {
            self.project.source_root = PathBuf::from(root);
        }
        if let Some(language) = get(ENV_LANGUAGE) {
            let parsed = language
                .parse::<Language>()
                .map_err(|message| ConfigError::Invalid { key: ENV_LANGUAGE, message })?;
            self.project.language = Some(parsed);
        }

        // Retry
        if let Some(value) = get(ENV_CONNECT_MAX_ATTEMPTS) {
            self.retry.connect_max_attempts = parse_number(ENV_CONNECT_MAX_ATTEMPTS, &value)?;
        }
        if let Some(value) = get(ENV_CONNECT_BASE_DELAY_MS) {
            self.retry.connect_base_delay_ms = parse_number(ENV_CONNECT_BASE_DELAY_MS, &value)?;
        }
        if let Some(value) = get(ENV_FLUSH_MAX_ROUNDS) {
            self.retry.flush_max_rounds = parse_number(ENV_FLUSH_MAX_ROUNDS, &value)?;
        }
        if let Some(value) = get(ENV_FLUSH_BASE_DELAY_MS) {
            self.retry.flush_base_delay_ms = parse_number(ENV_FLUSH_BASE_DELAY_MS, &value)?;
        }

        // Extraction
        if let Some(value) = get(ENV_EXTRACT_CONCURRENCY) {
            self.extraction.concurrency = Some(parse_number(ENV_EXTRACT_CONCURRENCY, &value)?);
        }
        if let Some(store) = get(ENV_RESOURCE_STORE) {
            self.extraction.resource_store = store;
        }
        if let Some(database) = get(ENV_RESOURCE_DATABASE) {
            self.extraction.resource_database = database;
        }

        Ok(())
    }

    /// Check every invariant a run depends on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.graph_connection()?;
        self.validate_settings()
    }

    /// Everything [`Config::validate`] checks except the graph connection.
    pub fn validate_settings(&self) -> Result<(), ConfigError> {
        let name = self.project.name.trim();
        if name.is_empty() {
            return Err(ConfigError::Invalid {
                key: ENV_PROJECT_NAME,
                message: "project name must not be empty".to_string(),
            });
        }
        // Project keys are `{project}:{path}`, so a colon would make them ambiguous.
        if name.contains(':') {
            return Err(ConfigError::Invalid {
                key: ENV_PROJECT_NAME,
                message: format!("'{}' must not contain ':'", name),
            });
        }
        if self.retry.connect_max_attempts == 0 {
            return Err(ConfigError::Invalid {
                key: ENV_CONNECT_MAX_ATTEMPTS,
                message: "at least one attempt is required".to_string(),
            });
        }
        if self.extraction.concurrency == Some(0) {
            return Err(ConfigError::Invalid {
                key: ENV_EXTRACT_CONCURRENCY,
                message: "concurrency must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// The validated graph store connection settings.
    pub fn graph_connection(&self) -> Result<GraphConnection, ConfigError> {
        let endpoint = self.graph.endpoint.clone().ok_or(ConfigError::Missing(ENV_GRAPH_ENDPOINT))?;
        let user = self.graph.user.clone().ok_or(ConfigError::Missing(ENV_GRAPH_USER))?;
        let password = self.graph.password.clone().ok_or(ConfigError::Missing(ENV_GRAPH_PASSWORD))?;

        Ok(GraphConnection {
            endpoint,
            user,
            password,
            database: self.graph.database.clone(),
            max_connections: self.graph.max_connections,
            fetch_size: self.graph.fetch_size,
        })
    }

    /// Render the effective configuration as TOML. The password is never
    /// included.
    pub fn to_toml_string(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }
}

fn parse_number<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError>
where
    T::Err: fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        message: format!("'{}': {}", value, e),
    })
}

/// Graph store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Bolt URI, e.g. `bolt://localhost:7687`.
    pub endpoint: Option<String>,

    /// Basic-auth user.
    pub user: Option<String>,

    /// Basic-auth password (usually supplied through the environment).
    #[serde(skip_serializing)]
    pub password: Option<String>,

    /// Logical database name.
    pub database: String,

    /// Connection pool size.
    pub max_connections: usize,

    /// Rows fetched per round trip.
    pub fetch_size: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            user: None,
            password: None,
            database: DEFAULT_GRAPH_DATABASE.to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            fetch_size: DEFAULT_FETCH_SIZE,
        }
    }
}

/// Validated connection settings handed to the graph driver.
#[derive(Clone)]
pub struct GraphConnection {
    pub endpoint: String,
    pub user: String,
    pub password: String,
    pub database: String,
    pub max_connections: usize,
    pub fetch_size: usize,
}

impl fmt::Debug for GraphConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphConnection")
            .field("endpoint", &self.endpoint)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

/// Project configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Project tag stamped on every node of a run.
    pub name: String,

    /// Directory scanned for source files.
    pub source_root: PathBuf,

    /// Prefix of per-node source links.
    pub source_url_base: String,

    /// Source language; detected from the tree when unset.
    pub language: Option<Language>,

    /// Directory names pruned during discovery.
    pub exclude_dirs: Vec<String>,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_PROJECT_NAME.to_string(),
            source_root: PathBuf::from(DEFAULT_SOURCE_ROOT),
            source_url_base: DEFAULT_SOURCE_URL_BASE.to_string(),
            language: None,
            exclude_dirs: DEFAULT_EXCLUDE_DIRS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Backoff configuration for the two bounded retry loops.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub connect_max_attempts: u32,
    pub connect_base_delay_ms: u64,
    pub flush_max_rounds: u32,
    pub flush_base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            connect_max_attempts: DEFAULT_CONNECT_MAX_ATTEMPTS,
            connect_base_delay_ms: DEFAULT_CONNECT_BASE_DELAY_MS,
            flush_max_rounds: DEFAULT_FLUSH_MAX_ROUNDS,
            flush_base_delay_ms: DEFAULT_FLUSH_BASE_DELAY_MS,
        }
    }
}

impl RetryConfig {
    pub fn connect_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            Duration::from_millis(self.connect_base_delay_ms),
            self.connect_max_attempts,
        )
    }

    pub fn flush_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            Duration::from_millis(self.flush_base_delay_ms),
            self.flush_max_rounds,
        )
    }

    /// Backoff for a file batch the store rejected. Shares the flush budget.
    pub fn write_policy(&self) -> RetryPolicy {
        self.flush_policy()
    }
}

/// Extraction configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Files processed concurrently; defaults to the available parallelism.
    pub concurrency: Option<usize>,

    /// Store prefix of synthesized resource keys.
    pub resource_store: String,

    /// Database used when a call site names none.
    pub resource_database: String,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            concurrency: None,
            resource_store: DEFAULT_RESOURCE_STORE.to_string(),
            resource_database: DEFAULT_RESOURCE_DATABASE.to_string(),
        }
    }
}

impl ExtractionConfig {
    /// Effective fan-out width.
    pub fn concurrency(&self) -> usize {
        self.concurrency.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.project.name, DEFAULT_PROJECT_NAME);
        assert_eq!(config.project.source_url_base, DEFAULT_SOURCE_URL_BASE);
        assert_eq!(config.retry.connect_max_attempts, DEFAULT_CONNECT_MAX_ATTEMPTS);
        assert!(config.graph.endpoint.is_none());
    }

    #[test]
    fn test_missing_credentials_are_reported_by_key() {
        let mut config = Config::default();
        config
            .apply_overrides(lookup(&[("GRAPH_ENDPOINT", "bolt://db:7687"), ("GRAPH_USER", "neo4j")]))
            .unwrap();

        match config.validate() {
            Err(ConfigError::Missing(key)) => assert_eq!(key, ENV_GRAPH_PASSWORD),
            other => panic!("expected missing password, got {:?}", other),
        }
    }

    #[test]
    fn test_blank_values_count_as_unset() {
        let mut config = Config::default();
        config
            .apply_overrides(lookup(&[("PROJECT_NAME", "  "), ("GRAPH_ENDPOINT", "")]))
            .unwrap();
        assert_eq!(config.project.name, DEFAULT_PROJECT_NAME);
        assert!(config.graph.endpoint.is_none());
    }

    #[test]
    fn test_project_name_with_colon_is_rejected() {
        let mut config = Config::default();
        config
            .apply_overrides(lookup(&[
                ("GRAPH_ENDPOINT", "bolt://db:7687"),
                ("GRAPH_USER", "neo4j"),
                ("GRAPH_PASSWORD", "secret"),
                ("PROJECT_NAME", "a:b"),
            ]))
            .unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { key: ENV_PROJECT_NAME, .. })
        ));
    }

    #[test]
    fn test_malformed_number_is_invalid() {
        let mut config = Config::default();
        let result = config.apply_overrides(lookup(&[("FLUSH_MAX_ROUNDS", "many")]));
        assert!(matches!(
            result,
            Err(ConfigError::Invalid { key: ENV_FLUSH_MAX_ROUNDS, .. })
        ));
    }

    #[test]
    fn test_connection_debug_redacts_password() {
        let mut config = Config::default();
        config
            .apply_overrides(lookup(&[
                ("GRAPH_ENDPOINT", "bolt://db:7687"),
                ("GRAPH_USER", "neo4j"),
                ("GRAPH_PASSWORD", "hunter2"),
            ]))
            .unwrap();
        let rendered = format!("{:?}", config.graph_connection().unwrap());
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("bolt://db:7687"));
    }

    #[test]
    fn test_policies_follow_config() {
        let retry = RetryConfig {
            connect_max_attempts: 3,
            connect_base_delay_ms: 10,
            flush_max_rounds: 2,
            flush_base_delay_ms: 5,
        };
        assert_eq!(retry.connect_policy().max_attempts, 3);
        assert_eq!(retry.flush_policy().base_delay, Duration::from_millis(5));
        assert_eq!(retry.write_policy(), retry.flush_policy());
    }
}
