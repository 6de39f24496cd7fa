//! In-process bucket store.

use std::collections::{HashMap, HashSet};

use super::{Level, Storage, StorageResult};
use crate::model::StoredValue;

/// Buckets held in a `HashMap<String, HashSet<StoredValue>>`.
///
/// Nothing survives the process. Writes take `&mut self`, so sharing one
/// store between threads needs an outer lock.
#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    buckets: HashMap<String, HashSet<StoredValue>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of populated buckets.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

impl Storage for MemoryStorage {
    fn name(&self) -> &'static str {
        "dict"
    }

    fn keys(&self, _level: Option<Level>) -> StorageResult<Vec<String>> {
        Ok(self.buckets.keys().cloned().collect())
    }

    fn append_val(&mut self, key: &str, value: StoredValue) -> StorageResult<()> {
        self.buckets.entry(key.to_string()).or_default().insert(value);
        Ok(())
    }

    fn get_list(&self, key: &str, _level: Option<Level>) -> StorageResult<Vec<StoredValue>> {
        Ok(self
            .buckets
            .get(key)
            .map(|bucket| bucket.iter().cloned().collect())
            .unwrap_or_default())
    }
}
