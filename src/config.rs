//! Storage configuration descriptors.
//!
//! A descriptor is a mapping with exactly one backend selector:
//!
//! ```toml
//! [sqlite]
//! database = "/var/lib/lsh/buckets.db"
//! serializer = "json"
//! enabled_levels = true
//! ```
//!
//! ```rust
//! use lshash_store::config::StorageConfig;
//!
//! let cfg = StorageConfig::from_json_str(r#"{"redis": {"host": "cache", "db": 15}}"#).unwrap();
//! assert_eq!(cfg.backend_name(), "redis");
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::storage::level::Level;
use crate::storage::serializer::SerializerKind;

/// Backend selectors recognized in a descriptor, in lookup order.
pub const BACKEND_SELECTORS: [&str; 3] = ["dict", "redis", "sqlite"];

/// Errors raised while reading a descriptor or constructing a backend from it.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("storage config names no backend (expected one of: dict, redis, sqlite)")]
    MissingBackend,

    #[error("unsupported storage backend '{0}' (expected one of: dict, redis, sqlite)")]
    UnsupportedBackend(String),

    #[error("storage config names more than one backend: {0:?}")]
    AmbiguousBackend(Vec<String>),

    #[error("invalid options for '{backend}' backend: {message}")]
    InvalidOptions {
        backend: &'static str,
        message: String,
    },

    #[error("unsupported serializer '{0}' (expected json or msgpack)")]
    UnsupportedSerializer(String),

    /// Table and column names are spliced into SQL and must be plain identifiers.
    #[error("invalid SQL identifier '{0}'")]
    InvalidIdentifier(String),

    #[error("column '{0}' is used twice in the sqlite table layout")]
    DuplicateColumn(String),

    /// The backend was compiled out of this build.
    #[error("storage backend '{0}' is not available in this build")]
    BackendUnavailable(&'static str),

    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(String),
}

/// Options for the in-process store. It takes none, and whatever a descriptor
/// puts under `dict` is ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryConfig {}

/// Connection options for the Redis backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub db: i64,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Connect timeout; unset means the client library default.
    pub connect_timeout_ms: Option<u64>,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            db: 0,
            username: None,
            password: None,
            connect_timeout_ms: None,
        }
    }
}

impl RedisConfig {
    /// Render as a `redis://` URL with credentials percent-encoded.
    pub fn url(&self) -> String {
        let auth = match (&self.username, &self.password) {
            (Some(user), Some(pass)) => format!(
                "{}:{}@",
                urlencoding::encode(user),
                urlencoding::encode(pass)
            ),
            (None, Some(pass)) => format!(":{}@", urlencoding::encode(pass)),
            (Some(user), None) => format!("{}@", urlencoding::encode(user)),
            (None, None) => String::new(),
        };
        format!("redis://{auth}{}:{}/{}", self.host, self.port, self.db)
    }
}

/// Options for the SQLite backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SqliteConfig {
    pub table: String,
    pub key_column: String,
    pub value_column: String,
    /// Database file. `None` or `":memory:"` opens a private in-memory database.
    pub database: Option<PathBuf>,
    pub serializer: SerializerKind,
    pub enabled_levels: bool,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            table: "lshash".to_string(),
            key_column: "key".to_string(),
            value_column: "value".to_string(),
            database: None,
            serializer: SerializerKind::default(),
            enabled_levels: false,
        }
    }
}

impl SqliteConfig {
    pub fn with_database(mut self, path: impl Into<PathBuf>) -> Self {
        self.database = Some(path.into());
        self
    }

    pub fn with_serializer(mut self, serializer: SerializerKind) -> Self {
        self.serializer = serializer;
        self
    }

    pub fn with_levels(mut self, enabled: bool) -> Self {
        self.enabled_levels = enabled;
        self
    }

    /// Column holding the content hash of `value_column`.
    pub fn value_hash_column(&self) -> String {
        format!("{}_hash", self.value_column)
    }

    /// True when no file path is configured.
    pub fn is_in_memory(&self) -> bool {
        self.database
            .as_deref()
            .is_none_or(|p| p.as_os_str() == ":memory:")
    }

    /// Physical key columns: `{key}` alone, or one per level when levels are on.
    pub fn key_columns(&self) -> Vec<String> {
        if self.enabled_levels {
            Level::ALL
                .iter()
                .map(|l| format!("{}_{}", self.key_column, l.as_str()))
                .collect()
        } else {
            vec![self.key_column.clone()]
        }
    }

    /// Reject table/column names that cannot be spliced into SQL verbatim, and
    /// column layouts where two columns would share a name.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for name in [&self.table, &self.key_column, &self.value_column] {
            if !is_sql_identifier(name) {
                return Err(ConfigError::InvalidIdentifier(name.clone()));
            }
        }

        // SQLite compares identifiers case-insensitively.
        let mut seen = HashSet::new();
        let columns = self
            .key_columns()
            .into_iter()
            .chain([self.value_column.clone(), self.value_hash_column()]);
        for column in columns {
            if !seen.insert(column.to_ascii_lowercase()) {
                return Err(ConfigError::DuplicateColumn(column));
            }
        }
        Ok(())
    }
}

fn is_sql_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// A backend selection plus its options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageConfig {
    Dict(MemoryConfig),
    Redis(RedisConfig),
    Sqlite(SqliteConfig),
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Dict(MemoryConfig::default())
    }
}

impl StorageConfig {
    pub fn backend_name(&self) -> &'static str {
        match self {
            Self::Dict(_) => "dict",
            Self::Redis(_) => "redis",
            Self::Sqlite(_) => "sqlite",
        }
    }

    /// Build from a generic mapping such as `{"sqlite": {"table": "t"}}`.
    ///
    /// Exactly one recognized selector must be present; its options may be
    /// `null`, which means all defaults.
    pub fn from_value(value: serde_json::Value) -> Result<Self, ConfigError> {
        let serde_json::Value::Object(mut map) = value else {
            return Err(ConfigError::MissingBackend);
        };

        let selected: Vec<String> = BACKEND_SELECTORS
            .iter()
            .filter(|name| map.contains_key(**name))
            .map(|name| (*name).to_string())
            .collect();

        let selector = match selected.as_slice() {
            [] => {
                return Err(match map.keys().next() {
                    Some(other) => ConfigError::UnsupportedBackend(other.clone()),
                    None => ConfigError::MissingBackend,
                });
            }
            [one] => one.clone(),
            _ => return Err(ConfigError::AmbiguousBackend(selected)),
        };

        let options = map
            .remove(&selector)
            .unwrap_or(serde_json::Value::Null);

        match selector.as_str() {
            "dict" => Ok(Self::Dict(MemoryConfig::default())),
            "redis" => Ok(Self::Redis(parse_options("redis", options)?)),
            _ => {
                let cfg: SqliteConfig = parse_options("sqlite", options)?;
                cfg.validate()?;
                Ok(Self::Sqlite(cfg))
            }
        }
    }

    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let value: serde_json::Value =
            serde_json::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Self::from_value(value)
    }

    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let table: toml::Table = toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))?;
        let value = serde_json::to_value(table).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Self::from_value(value)
    }

    /// Load a descriptor file: JSON when the extension is `.json`, TOML otherwise.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if path.extension().is_some_and(|ext| ext == "json") {
            Self::from_json_str(&text)
        } else {
            Self::from_toml_str(&text)
        }
    }
}

fn parse_options<T>(backend: &'static str, options: serde_json::Value) -> Result<T, ConfigError>
where
    T: Default + for<'de> Deserialize<'de>,
{
    if options.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(options).map_err(|e| ConfigError::InvalidOptions {
        backend,
        message: e.to_string(),
    })
}
