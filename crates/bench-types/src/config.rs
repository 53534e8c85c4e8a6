//! Run configuration shared by every process of a benchmark run.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

/// Batch size used when batch mode is enabled without an explicit size.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Errors raised while encoding, decoding or reading a run configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The encoded configuration is not valid base64.
    #[error("Run configuration is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    /// The configuration could not be (de)serialized.
    #[error("Run configuration is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A required key is missing.
    #[error("Missing required configuration key '{0}'")]
    MissingKey(String),

    /// A key holds a value of the wrong shape.
    #[error("Invalid value for configuration key '{key}': {value}")]
    InvalidValue { key: String, value: String },
}

/// Kind of benchmark a run performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Insert,
    Query,
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskKind::Insert => write!(f, "insert"),
            TaskKind::Query => write!(f, "query"),
        }
    }
}

/// How primary keys of inserted events are produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimaryKeyMode {
    /// Database-side serial column.
    #[default]
    Db,
    /// SQL identity column with a sequence cache.
    Sql,
    /// Database-generated UUID.
    Uuid,
    /// Key computed by the worker from the event fields.
    Client,
}

impl std::str::FromStr for PrimaryKeyMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "db" => Ok(PrimaryKeyMode::Db),
            "sql" => Ok(PrimaryKeyMode::Sql),
            "uuid" => Ok(PrimaryKeyMode::Uuid),
            "client" => Ok(PrimaryKeyMode::Client),
            _ => Err(ConfigError::InvalidValue {
                key: "primary_key".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_device_spread() -> u32 {
    1
}

fn default_runs() -> u32 {
    1
}

/// Immutable benchmark parameters for one controller invocation.
///
/// Unknown keys (backend-specific options such as `connection_string`) are
/// kept verbatim in [`RunConfig::options`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub task: TaskKind,
    /// Backend tag selecting the storage implementation.
    pub module: String,
    #[serde(default)]
    pub num_inserts: u64,
    /// Total number of events inserted before the measured phase, split across workers.
    #[serde(default)]
    pub prefill: u64,
    #[serde(default)]
    pub primary_key: PrimaryKeyMode,
    #[serde(default)]
    pub use_multiple_tables: bool,
    #[serde(default)]
    pub batch_mode: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,
    #[serde(default = "default_true")]
    pub clean_database: bool,
    /// Number of synthetic devices per worker.
    #[serde(default = "default_device_spread")]
    pub device_spread: u32,
    /// How often each named query is repeated in a query run.
    #[serde(default = "default_runs")]
    pub runs: u32,
    #[serde(flatten)]
    pub options: BTreeMap<String, Value>,
}

impl RunConfig {
    /// Create a configuration with defaults for everything but task and module.
    pub fn new(task: TaskKind, module: impl Into<String>) -> Self {
        Self {
            task,
            module: module.into(),
            num_inserts: 0,
            prefill: 0,
            primary_key: PrimaryKeyMode::default(),
            use_multiple_tables: false,
            batch_mode: false,
            batch_size: None,
            clean_database: true,
            device_spread: 1,
            runs: 1,
            options: BTreeMap::new(),
        }
    }

    /// Encode as base64 of the JSON representation.
    pub fn encode(&self) -> Result<String, ConfigError> {
        let json = serde_json::to_vec(self)?;
        Ok(STANDARD.encode(json))
    }

    /// Decode a configuration produced by [`RunConfig::encode`].
    pub fn decode(encoded: &str) -> Result<Self, ConfigError> {
        let bytes = STANDARD.decode(encoded.trim())?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Batch size, falling back to [`DEFAULT_BATCH_SIZE`].
    pub fn batch_size(&self) -> usize {
        self.batch_size.unwrap_or(DEFAULT_BATCH_SIZE).max(1)
    }

    /// Backend option rendered as a string. Numbers and booleans are stringified.
    pub fn option_str(&self, key: &str) -> Option<String> {
        match self.options.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }

    /// Backend option that must be present.
    pub fn require_option(&self, key: &str) -> Result<String, ConfigError> {
        self.option_str(key)
            .ok_or_else(|| ConfigError::MissingKey(key.to_string()))
    }

    /// Backend flag; accepts JSON booleans and case-insensitive `"true"`.
    pub fn option_flag(&self, key: &str) -> bool {
        match self.options.get(key) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_minimal_config_uses_defaults() {
        let json = r#"{"task":"insert","module":"postgres","connection_string":"host=db"}"#;
        let encoded = STANDARD.encode(json);

        let config = RunConfig::decode(&encoded).unwrap();
        assert_eq!(config.task, TaskKind::Insert);
        assert_eq!(config.num_inserts, 0);
        assert!(config.clean_database);
        assert_eq!(config.device_spread, 1);
        assert_eq!(config.primary_key, PrimaryKeyMode::Db);
        assert_eq!(config.batch_size(), DEFAULT_BATCH_SIZE);
        assert_eq!(config.option_str("connection_string").as_deref(), Some("host=db"));
    }

    #[test]
    fn test_encoding_is_stable() {
        let mut config = RunConfig::new(TaskKind::Insert, "memory");
        config.num_inserts = 1000;
        config.options.insert("b".to_string(), Value::from("2"));
        config.options.insert("a".to_string(), Value::from(1));

        let first = config.encode().unwrap();
        let second = config.clone().encode().unwrap();
        assert_eq!(first, second);
        assert_eq!(RunConfig::decode(&first).unwrap(), config);
    }

    #[test]
    fn test_option_accessors() {
        let mut config = RunConfig::new(TaskKind::Query, "postgres");
        config.options.insert("create_indices".to_string(), Value::from("TRUE"));
        config.options.insert("use_values_lists".to_string(), Value::from(false));
        config.options.insert("port".to_string(), Value::from(5432));

        assert!(config.option_flag("create_indices"));
        assert!(!config.option_flag("use_values_lists"));
        assert!(!config.option_flag("missing"));
        assert_eq!(config.option_str("port").as_deref(), Some("5432"));
        assert!(matches!(
            config.require_option("connection_string"),
            Err(ConfigError::MissingKey(key)) if key == "connection_string"
        ));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            RunConfig::decode("not base64!!"),
            Err(ConfigError::Base64(_))
        ));
        let not_json = STANDARD.encode("plain text");
        assert!(matches!(RunConfig::decode(&not_json), Err(ConfigError::Json(_))));
    }

    #[test]
    fn test_primary_key_from_str() {
        assert_eq!("CLIENT".parse::<PrimaryKeyMode>().unwrap(), PrimaryKeyMode::Client);
        assert!("serial".parse::<PrimaryKeyMode>().is_err());
    }
}
