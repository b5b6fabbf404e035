//! Persister Configuration
//!
//! Fixed at construction. Can be built in code, loaded from a TOML file, or
//! taken from environment variables:
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | ROW_STREAM_KEY_PREFIX | Default | Prefix of every record key |
//! | ROW_STREAM_STRUCTURE | string | `string` (JSON blob) or `hash` |
//! | ROW_STREAM_INDEX | false | Enable the search index |
//! | ROW_STREAM_INDEXED_FIELDS | - | Comma-separated field labels to index |
//! | ROW_STREAM_REDIS_HOST | localhost | Redis server address |
//! | ROW_STREAM_REDIS_PORT | 6379 | Redis server port |
//! | ROW_STREAM_REDIS_PASSWORD | - | Sent with AUTH on connect |
//! | ROW_STREAM_REDIS_DB | - | Database selected on connect |
//! | ROW_STREAM_VERBOSE | false | Log every record written |

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

pub const DEFAULT_KEY_PREFIX: &str = "Default";
pub const DEFAULT_SERVER_ADDRESS: &str = "localhost";
pub const DEFAULT_SERVER_PORT: u16 = 6379;
pub const DEFAULT_INDEX_NAMESPACE: &str = "search";

/// Storage encoding of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Structure {
    /// Whole record serialized as one JSON string (`SET`)
    #[default]
    String,
    /// Native field map (`HSET`)
    Hash,
}

impl FromStr for Structure {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "string" => Ok(Structure::String),
            "hash" => Ok(Structure::Hash),
            other => Err(ConfigError::Invalid(format!(
                "unknown structure '{}', expected 'string' or 'hash'",
                other
            ))),
        }
    }
}

impl std::fmt::Display for Structure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Structure::String => write!(f, "string"),
            Structure::Hash => write!(f, "hash"),
        }
    }
}

/// What happens to a store or index failure on the writer task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Count it, nothing else
    Ignore,
    /// Count and log it
    Log,
    /// Count, log, and emit `LifecycleEvent::StoreFailed`
    #[default]
    Notify,
}

impl FromStr for FailurePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ignore" => Ok(FailurePolicy::Ignore),
            "log" => Ok(FailurePolicy::Log),
            "notify" => Ok(FailurePolicy::Notify),
            other => Err(ConfigError::Invalid(format!(
                "unknown failure policy '{}'",
                other
            ))),
        }
    }
}

/// Connection parameters of the key-value store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub server_address: String,
    pub server_port: u16,
    /// Backend-specific options. The Redis backend reads `password`,
    /// `username` and `db`.
    pub store_opts: BTreeMap<String, String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            server_address: DEFAULT_SERVER_ADDRESS.to_string(),
            server_port: DEFAULT_SERVER_PORT,
            store_opts: BTreeMap::new(),
        }
    }
}

impl StoreConfig {
    /// `host:port` for `TcpStream::connect`
    pub fn addr(&self) -> String {
        format!("{}:{}", self.server_address, self.server_port)
    }

    pub fn option(&self, name: &str) -> Option<&str> {
        self.store_opts.get(name).map(|s| s.as_str())
    }

    pub fn password(&self) -> Option<&str> {
        self.option("password")
    }

    pub fn username(&self) -> Option<&str> {
        self.option("username")
    }

    pub fn db(&self) -> Result<Option<u32>, ConfigError> {
        self.option("db")
            .map(|db| {
                db.parse::<u32>()
                    .map_err(|_| ConfigError::Invalid(format!("store option db='{}'", db)))
            })
            .transpose()
    }
}

/// Main persister configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersisterConfig {
    /// Keys are `<key_prefix>:<event id>`
    pub key_prefix: String,
    pub structure: Structure,
    /// Forward `indexed_fields` values to the search index
    pub index: bool,
    pub indexed_fields: Vec<String>,
    /// Key namespace of the search index
    pub index_namespace: String,
    pub verbose: bool,
    pub failure_policy: FailurePolicy,
    pub store: StoreConfig,
}

impl Default for PersisterConfig {
    fn default() -> Self {
        PersisterConfig {
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            structure: Structure::String,
            index: false,
            indexed_fields: Vec::new(),
            index_namespace: DEFAULT_INDEX_NAMESPACE.to_string(),
            verbose: false,
            failure_policy: FailurePolicy::Notify,
            store: StoreConfig::default(),
        }
    }
}

impl PersisterConfig {
    pub fn new(key_prefix: impl Into<String>) -> Self {
        PersisterConfig {
            key_prefix: key_prefix.into(),
            ..Default::default()
        }
    }

    pub fn with_structure(mut self, structure: Structure) -> Self {
        self.structure = structure;
        self
    }

    /// Enable indexing of the given fields
    pub fn with_index<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.index = true;
        self.indexed_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Parse a TOML document
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: PersisterConfig = toml::from_str(s)?;
        config.validated()
    }

    /// Load a TOML config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Defaults overridden by `ROW_STREAM_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_overrides()
    }

    pub fn with_env_overrides(mut self) -> Result<Self, ConfigError> {
        if let Ok(prefix) = std::env::var("ROW_STREAM_KEY_PREFIX") {
            self.key_prefix = prefix;
        }
        if let Ok(structure) = std::env::var("ROW_STREAM_STRUCTURE") {
            self.structure = structure.parse()?;
        }
        if let Ok(index) = std::env::var("ROW_STREAM_INDEX") {
            self.index = parse_flag(&index);
        }
        if let Ok(fields) = std::env::var("ROW_STREAM_INDEXED_FIELDS") {
            self.indexed_fields = split_list(&fields);
        }
        if let Ok(host) = std::env::var("ROW_STREAM_REDIS_HOST") {
            self.store.server_address = host;
        }
        if let Ok(port) = std::env::var("ROW_STREAM_REDIS_PORT") {
            self.store.server_port = port
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("ROW_STREAM_REDIS_PORT='{}'", port)))?;
        }
        if let Ok(password) = std::env::var("ROW_STREAM_REDIS_PASSWORD") {
            self.store.store_opts.insert("password".to_string(), password);
        }
        if let Ok(db) = std::env::var("ROW_STREAM_REDIS_DB") {
            self.store.store_opts.insert("db".to_string(), db);
        }
        if let Ok(verbose) = std::env::var("ROW_STREAM_VERBOSE") {
            self.verbose = parse_flag(&verbose);
        }
        self.validated()
    }

    /// Normalize and check values. An empty key prefix falls back to
    /// `Default`.
    pub fn validated(mut self) -> Result<Self, ConfigError> {
        if self.key_prefix.is_empty() {
            self.key_prefix = DEFAULT_KEY_PREFIX.to_string();
        }
        if self.store.server_address.is_empty() {
            self.store.server_address = DEFAULT_SERVER_ADDRESS.to_string();
        }
        if self.store.server_port == 0 {
            self.store.server_port = DEFAULT_SERVER_PORT;
        }
        if self.index_namespace.is_empty() {
            return Err(ConfigError::Invalid(
                "index_namespace must not be empty".to_string(),
            ));
        }
        self.store.db()?;
        self.indexed_fields.retain(|f| !f.is_empty());
        Ok(self)
    }
}

fn parse_flag(v: &str) -> bool {
    v == "true" || v == "1"
}

/// Split a comma-separated list, dropping blanks
pub fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PersisterConfig::default();
        assert_eq!(config.key_prefix, "Default");
        assert_eq!(config.structure, Structure::String);
        assert!(!config.index);
        assert!(config.indexed_fields.is_empty());
        assert_eq!(config.store.server_address, "localhost");
        assert_eq!(config.store.server_port, 6379);
        assert!(!config.verbose);
        assert_eq!(config.store.addr(), "localhost:6379");
    }

    #[test]
    fn test_from_toml() {
        let config = PersisterConfig::from_toml_str(
            r#"
            key_prefix = "addData"
            structure = "hash"
            index = true
            indexed_fields = ["A label"]
            verbose = true

            [store]
            server_address = "10.0.0.5"
            server_port = 6380
            store_opts = { password = "secret", db = "2" }
            "#,
        )
        .unwrap();
        assert_eq!(config.key_prefix, "addData");
        assert_eq!(config.structure, Structure::Hash);
        assert!(config.index);
        assert_eq!(config.indexed_fields, vec!["A label".to_string()]);
        assert_eq!(config.store.addr(), "10.0.0.5:6380");
        assert_eq!(config.store.password(), Some("secret"));
        assert_eq!(config.store.db().unwrap(), Some(2));
        assert_eq!(config.failure_policy, FailurePolicy::Notify);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = PersisterConfig::from_toml_str(r#"structure = "hash""#).unwrap();
        assert_eq!(config.key_prefix, "Default");
        assert_eq!(config.store.server_port, 6379);
    }

    #[test]
    fn test_invalid_structure_rejected() {
        assert!(PersisterConfig::from_toml_str(r#"structure = "list""#).is_err());
        assert!("list".parse::<Structure>().is_err());
        assert_eq!("HASH".parse::<Structure>().unwrap(), Structure::Hash);
    }

    #[test]
    fn test_empty_prefix_falls_back() {
        let config = PersisterConfig::new("").validated().unwrap();
        assert_eq!(config.key_prefix, "Default");
    }

    #[test]
    fn test_invalid_db_option() {
        let mut config = PersisterConfig::default();
        config.store.store_opts.insert("db".to_string(), "zero".to_string());
        assert!(config.validated().is_err());
    }

    #[test]
    fn test_split_list() {
        assert_eq!(split_list("A, B,,C "), vec!["A", "B", "C"]);
        assert!(split_list("").is_empty());
    }

    #[test]
    fn test_load_from_file() {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "key_prefix = \"fromFile\"").unwrap();
        let config = PersisterConfig::load(file.path()).unwrap();
        assert_eq!(config.key_prefix, "fromFile");
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let config = PersisterConfig::new("rt")
            .with_structure(Structure::Hash)
            .with_index(["A"]);
        let s = toml::to_string(&config).unwrap();
        let parsed = PersisterConfig::from_toml_str(&s).unwrap();
        assert_eq!(config, parsed);
    }
}
