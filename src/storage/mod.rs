//! Bucket storage backends.
//!
//! Every backend implements [`Storage`]: list populated bucket keys, append a
//! value to a bucket (a repeat of the same value is a no-op), and read a
//! bucket back. Backends are picked at runtime from a [`StorageConfig`]:
//!
//! - **[`memory`]**: `HashMap` of `HashSet`s. Fast, not durable.
//! - **[`sqlite`]**: one table per index, content-hash unique index for dedup,
//!   optional High/Medium/Low key columns (see [`level`]).
//! - **[`redis`]**: one Redis set per bucket, keys namespaced `h{index:02}.`.
//!
//! ```rust
//! use lshash_store::config::StorageConfig;
//! use lshash_store::model::StoredValue;
//! use lshash_store::storage::open_storage;
//!
//! let mut store = open_storage(&StorageConfig::default(), 0)?;
//! store.append_val("0110", StoredValue::vector(vec![0.1, 0.2]))?;
//! store.append_val("0110", StoredValue::vector(vec![0.1, 0.2]))?;
//! assert_eq!(store.get_list("0110", None)?.len(), 1);
//! # Ok::<(), lshash_store::storage::StorageError>(())
//! ```

pub mod level;
pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;
pub mod serializer;
pub mod sqlite;

use thiserror::Error;
use tracing::debug;

use crate::config::{ConfigError, StorageConfig};
use crate::model::StoredValue;

pub use level::Level;
pub use memory::MemoryStorage;
#[cfg(feature = "redis")]
pub use self::redis::{KeyValueClient, MemoryKeyValue, RedisStorage, namespace_prefix};
pub use serializer::SerializerKind;
pub use sqlite::SqliteStorage;

/// Errors surfaced by storage operations.
///
/// Duplicate inserts are not errors and never show up here.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[cfg(feature = "redis")]
    #[error("redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("failed to encode value as {serializer}: {message}")]
    Encode {
        serializer: &'static str,
        message: String,
    },

    #[error("failed to decode {serializer} value: {message}")]
    Decode {
        serializer: &'static str,
        message: String,
    },
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Capability contract shared by all bucket backends.
pub trait Storage: Send {
    /// Backend kind: `dict`, `redis` or `sqlite`.
    fn name(&self) -> &'static str;

    /// Distinct populated bucket keys, in no particular order.
    ///
    /// `level` picks the derived key column on a levelled SQLite store and is
    /// ignored everywhere else.
    fn keys(&self, level: Option<Level>) -> StorageResult<Vec<String>>;

    /// Add `value` to the bucket at `key`, creating the bucket if needed.
    /// Appending a value the bucket already holds changes nothing.
    fn append_val(&mut self, key: &str, value: StoredValue) -> StorageResult<()>;

    /// Values in the bucket at `key`; empty when the bucket does not exist.
    fn get_list(&self, key: &str, level: Option<Level>) -> StorageResult<Vec<StoredValue>>;
}

/// Construct the backend named by `config`, bound to hash table `h_index`.
pub fn open_storage(config: &StorageConfig, h_index: u32) -> StorageResult<Box<dyn Storage>> {
    debug!(backend = config.backend_name(), h_index, "opening bucket storage");
    match config {
        StorageConfig::Dict(_) => Ok(Box::new(MemoryStorage::new())),
        StorageConfig::Sqlite(cfg) => Ok(Box::new(SqliteStorage::open(cfg, h_index)?)),
        #[cfg(feature = "redis")]
        StorageConfig::Redis(cfg) => Ok(Box::new(RedisStorage::connect(cfg, h_index)?)),
        #[cfg(not(feature = "redis"))]
        StorageConfig::Redis(_) => Err(ConfigError::BackendUnavailable("redis").into()),
    }
}
