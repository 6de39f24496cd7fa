//! `SQLite` bucket store: schema, pragmas, dedup, and level columns.
//!
//! Each hash table gets its own table, `{table}_{h_index}`, so several tables
//! can share one database file. A row is one (bucket, value) pair:
//!
//! ```text
//! levels off: key | value_hash | value
//! levels on:  key_high | key_medium | key_low | value_hash | value
//! ```
//!
//! `value` is the serialized payload and `value_hash` its SHA-256 hex digest.
//! A unique index on `(key, value_hash)` (`key_high` when levels are on) turns
//! a repeated append into a constraint failure, which is swallowed. The
//! database settles races between writers, not a read-then-write check.
//!
//! With levels on, reads filter `key_{level} LIKE ?` with the caller's key.
//! Callers pass a key already derived for that level
//! ([`Level::derive_key`]); `%` and `_` act as SQL wildcards.

use std::path::Path;
use std::time::{Duration, Instant};

use rusqlite::{Connection, params};
use sha2::{Digest, Sha256};
use tracing::{debug, info, trace};

use super::level::Level;
use super::serializer::SerializerKind;
use super::{Storage, StorageError, StorageResult};
use crate::config::SqliteConfig;
use crate::model::StoredValue;

/// Hex SHA-256 of serialized value bytes (64 lowercase chars).
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Physical table for hash table `h_index`.
pub fn table_name(base: &str, h_index: u32) -> String {
    format!("{base}_{h_index}")
}

fn quote(ident: &str) -> String {
    format!("\"{ident}\"")
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

pub struct SqliteStorage {
    conn: Connection,
    table: String,
    key_column: String,
    value_column: String,
    value_hash_column: String,
    serializer: SerializerKind,
    enabled_levels: bool,
    insert_sql: String,
}

impl SqliteStorage {
    /// Open (or create) the database in `config` and ensure the table for
    /// `h_index` exists.
    pub fn open(config: &SqliteConfig, h_index: u32) -> StorageResult<Self> {
        config.validate()?;
        let start = Instant::now();

        let conn = match config.database.as_deref() {
            Some(path) if !config.is_in_memory() => open_file(path)?,
            _ => Connection::open_in_memory()?,
        };
        apply_common_pragmas(&conn)?;

        let mut storage = Self {
            conn,
            table: table_name(&config.table, h_index),
            key_column: config.key_column.clone(),
            value_column: config.value_column.clone(),
            value_hash_column: config.value_hash_column(),
            serializer: config.serializer,
            enabled_levels: config.enabled_levels,
            insert_sql: String::new(),
        };
        storage.insert_sql = storage.build_insert_sql();
        storage.create_schema()?;

        let location = match config.database.as_deref() {
            Some(path) if !config.is_in_memory() => path.display().to_string(),
            _ => ":memory:".to_string(),
        };
        info!(
            database = %location,
            table = %storage.table,
            levels = storage.enabled_levels,
            serializer = %storage.serializer,
            elapsed_ms = start.elapsed().as_millis(),
            "opened SQLite bucket store"
        );
        Ok(storage)
    }

    pub fn raw(&self) -> &Connection {
        &self.conn
    }

    /// Physical table name, `{table}_{h_index}`.
    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn levels_enabled(&self) -> bool {
        self.enabled_levels
    }

    pub fn serializer(&self) -> SerializerKind {
        self.serializer
    }

    /// Total stored (bucket, value) rows.
    pub fn len(&self) -> StorageResult<usize> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote(&self.table));
        let count: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Close the connection, reporting any error the drop would have hidden.
    pub fn close(self) -> StorageResult<()> {
        self.conn.close().map_err(|(_, e)| StorageError::Database(e))
    }

    fn level_column(&self, level: Level) -> String {
        format!("{}_{}", self.key_column, level.as_str())
    }

    /// Column a read at `level` filters on.
    fn key_column_for(&self, level: Option<Level>) -> String {
        if self.enabled_levels {
            self.level_column(level.unwrap_or_default())
        } else {
            self.key_column.clone()
        }
    }

    fn key_columns(&self) -> Vec<String> {
        if self.enabled_levels {
            Level::ALL.iter().map(|l| self.level_column(*l)).collect()
        } else {
            vec![self.key_column.clone()]
        }
    }

    fn build_insert_sql(&self) -> String {
        let mut columns: Vec<String> = self.key_columns().iter().map(|c| quote(c)).collect();
        columns.push(quote(&self.value_column));
        columns.push(quote(&self.value_hash_column));
        let placeholders = vec!["?"; columns.len()].join(", ");
        format!(
            "INSERT INTO {} ({}) VALUES ({placeholders})",
            quote(&self.table),
            columns.join(", ")
        )
    }

    fn create_schema(&mut self) -> StorageResult<()> {
        let table = quote(&self.table);
        let key_columns = self.key_columns();
        // key_high stands in for the full key when levels are on
        let dedup_key = &key_columns[0];

        let column_defs: Vec<String> = key_columns
            .iter()
            .map(|c| format!("{} TEXT", quote(c)))
            .chain([
                format!("{} TEXT", quote(&self.value_hash_column)),
                format!("{} BLOB", quote(&self.value_column)),
            ])
            .collect();

        let mut statements = vec![format!(
            "CREATE TABLE IF NOT EXISTS {table} ({})",
            column_defs.join(", ")
        )];
        for column in &key_columns {
            statements.push(format!(
                "CREATE INDEX IF NOT EXISTS {} ON {table}({})",
                quote(&format!("{}_{column}", self.table)),
                quote(column)
            ));
        }
        statements.push(format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS {} ON {table}({}, {})",
            quote(&format!("{}_{}", self.table, self.value_hash_column)),
            quote(dedup_key),
            quote(&self.value_hash_column)
        ));

        let tx = self.conn.transaction()?;
        for sql in &statements {
            tx.execute(sql, [])?;
        }
        tx.commit()?;
        Ok(())
    }
}

fn open_file(path: &Path) -> StorageResult<Connection> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|source| StorageError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let conn = Connection::open(path)?;
    conn.execute_batch(
        r"
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        ",
    )?;
    Ok(conn)
}

fn apply_common_pragmas(conn: &Connection) -> StorageResult<()> {
    conn.busy_timeout(Duration::from_secs(5))?;
    conn.execute_batch(
        r"
        PRAGMA temp_store = MEMORY;
        PRAGMA cache_size = -16384; -- 16MB
        ",
    )?;
    Ok(())
}

impl Storage for SqliteStorage {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn keys(&self, level: Option<Level>) -> StorageResult<Vec<String>> {
        let sql = format!(
            "SELECT DISTINCT {col} FROM {table} WHERE {col} IS NOT NULL",
            col = quote(&self.key_column_for(level)),
            table = quote(&self.table)
        );
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn append_val(&mut self, key: &str, value: StoredValue) -> StorageResult<()> {
        let bytes = self.serializer.encode(&value)?;
        let hash = content_hash(&bytes);

        let mut stmt = self.conn.prepare_cached(&self.insert_sql)?;
        let result = if self.enabled_levels {
            let [high, medium, low] = Level::ALL.map(|l| l.derive_key(key));
            stmt.execute(params![high, medium, low, bytes, hash])
        } else {
            stmt.execute(params![key, bytes, hash])
        };

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => {
                debug!(table = %self.table, key, value_hash = %hash, "duplicate value ignored");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn get_list(&self, key: &str, level: Option<Level>) -> StorageResult<Vec<StoredValue>> {
        // Exact match on the plain key column; pattern match on level columns.
        let op = if self.enabled_levels { "LIKE" } else { "=" };
        let sql = format!(
            "SELECT {value} FROM {table} WHERE {col} {op} ?1 GROUP BY {hash}",
            value = quote(&self.value_column),
            table = quote(&self.table),
            col = quote(&self.key_column_for(level)),
            hash = quote(&self.value_hash_column)
        );
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let blobs = stmt
            .query_map([key], |row| row.get::<_, Vec<u8>>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        trace!(table = %self.table, key, count = blobs.len(), "read bucket");

        blobs
            .iter()
            .map(|bytes| self.serializer.decode(bytes))
            .collect()
    }
}
