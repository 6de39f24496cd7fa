//! Redis-backed bucket store.
//!
//! One Redis database can hold many hash tables. Every bucket lives in a Redis
//! set under `h{index:02}.{bucket_key}`, so tables never see each other's keys
//! and `SADD` provides deduplication on the encoded bytes. Values travel as
//! JSON text; labeled values are rebuilt from their `[vector, label]` arrays
//! on read.
//!
//! The remote calls go through [`KeyValueClient`]. It is implemented for
//! `redis::Connection` and for [`MemoryKeyValue`], an in-process stand-in
//! whose clones share one keyspace.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info, trace};

use super::serializer::SerializerKind;
use super::{Level, Storage, StorageResult};
use crate::config::RedisConfig;
use crate::model::StoredValue;

/// Key prefix reserved for hash table `h_index`.
pub fn namespace_prefix(h_index: u32) -> String {
    format!("h{h_index:02}.")
}

/// The subset of Redis commands the bucket store needs.
pub trait KeyValueClient: Send {
    /// `SADD key member`; true when the member was new.
    fn sadd(&mut self, key: &str, member: &str) -> StorageResult<bool>;
    /// `SMEMBERS key`; empty for a missing key.
    fn smembers(&mut self, key: &str) -> StorageResult<Vec<String>>;
    /// `KEYS pattern` (glob syntax).
    fn keys(&mut self, pattern: &str) -> StorageResult<Vec<String>>;
}

impl KeyValueClient for ::redis::Connection {
    fn sadd(&mut self, key: &str, member: &str) -> StorageResult<bool> {
        let added: i64 = ::redis::cmd("SADD").arg(key).arg(member).query(self)?;
        Ok(added > 0)
    }

    fn smembers(&mut self, key: &str) -> StorageResult<Vec<String>> {
        Ok(::redis::cmd("SMEMBERS").arg(key).query(self)?)
    }

    fn keys(&mut self, pattern: &str) -> StorageResult<Vec<String>> {
        Ok(::redis::cmd("KEYS").arg(pattern).query(self)?)
    }
}

/// In-process keyspace with Redis set semantics. Clones share state, so two
/// stores built from clones behave like two clients of one server.
#[derive(Debug, Clone, Default)]
pub struct MemoryKeyValue {
    sets: Arc<Mutex<HashMap<String, BTreeSet<String>>>>,
}

impl MemoryKeyValue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw members of `key`, as a server-side `SMEMBERS` would return them.
    pub fn raw_members(&self, key: &str) -> Vec<String> {
        self.sets
            .lock()
            .get(key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }
}

impl KeyValueClient for MemoryKeyValue {
    fn sadd(&mut self, key: &str, member: &str) -> StorageResult<bool> {
        Ok(self
            .sets
            .lock()
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string()))
    }

    fn smembers(&mut self, key: &str) -> StorageResult<Vec<String>> {
        Ok(self.raw_members(key))
    }

    fn keys(&mut self, pattern: &str) -> StorageResult<Vec<String>> {
        // An unparsable pattern matches nothing.
        let Ok(pattern) = glob::Pattern::new(pattern) else {
            return Ok(Vec::new());
        };
        Ok(self
            .sets
            .lock()
            .keys()
            .filter(|k| pattern.matches(k))
            .cloned()
            .collect())
    }
}

/// Bucket store over a Redis connection (or any [`KeyValueClient`]).
pub struct RedisStorage<C: KeyValueClient = ::redis::Connection> {
    client: Mutex<C>,
    prefix: String,
}

impl RedisStorage {
    /// Open a connection described by `config` and bind it to table `h_index`.
    pub fn connect(config: &RedisConfig, h_index: u32) -> StorageResult<Self> {
        let start = Instant::now();
        let client = ::redis::Client::open(config.url().as_str())?;
        let conn = match config.connect_timeout_ms {
            Some(ms) => client.get_connection_with_timeout(Duration::from_millis(ms))?,
            None => client.get_connection()?,
        };
        let store = Self::with_client(conn, h_index);
        info!(
            host = %config.host,
            port = config.port,
            db = config.db,
            namespace = %store.prefix,
            elapsed_ms = start.elapsed().as_millis(),
            "connected to Redis bucket store"
        );
        Ok(store)
    }
}

impl<C: KeyValueClient> RedisStorage<C> {
    pub fn with_client(client: C, h_index: u32) -> Self {
        Self {
            client: Mutex::new(client),
            prefix: namespace_prefix(h_index),
        }
    }

    /// The `h{index:02}.` prefix owned by this table.
    pub fn namespace(&self) -> &str {
        &self.prefix
    }

    fn bucket_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    /// Bucket keys in this table matching a Redis glob `pattern`, prefix stripped.
    pub fn keys_matching(&self, pattern: &str) -> StorageResult<Vec<String>> {
        let full = format!("{}{}", self.prefix, pattern);
        let raw = self.client.lock().keys(&full)?;
        Ok(raw
            .into_iter()
            .filter_map(|k| k.strip_prefix(&self.prefix).map(str::to_string))
            .collect())
    }

    pub fn into_client(self) -> C {
        self.client.into_inner()
    }
}

impl<C: KeyValueClient> Storage for RedisStorage<C> {
    fn name(&self) -> &'static str {
        "redis"
    }

    fn keys(&self, _level: Option<Level>) -> StorageResult<Vec<String>> {
        self.keys_matching("*")
    }

    fn append_val(&mut self, key: &str, value: StoredValue) -> StorageResult<()> {
        let encoded = SerializerKind::Json.encode(&value)?;
        // serde_json only emits UTF-8
        let member = String::from_utf8_lossy(&encoded);
        let bucket = self.bucket_key(key);
        if !self.client.get_mut().sadd(&bucket, &member)? {
            debug!(bucket = %bucket, "value already present in bucket");
        }
        Ok(())
    }

    fn get_list(&self, key: &str, _level: Option<Level>) -> StorageResult<Vec<StoredValue>> {
        let bucket = self.bucket_key(key);
        let members = self.client.lock().smembers(&bucket)?;
        trace!(bucket = %bucket, count = members.len(), "read bucket");
        members
            .iter()
            .map(|m| SerializerKind::Json.decode(m.as_bytes()))
            .collect()
    }
}
