//! Bucket persistence for locality-sensitive-hashing nearest-neighbor indexes.
//!
//! A hashing stage (not part of this crate) turns each feature vector into one
//! bucket key per hash table. This crate stores `(bucket key, value)` pairs and
//! answers "what is in this bucket", deduplicating repeated inserts.
//!
//! - **[`storage`]**: the [`Storage`] trait, its in-memory, SQLite and Redis
//!   backends, the value serializers, and the level key derivation.
//! - **[`config`]**: backend descriptors (`{"sqlite": {...}}`) and their errors.
//! - **[`model`]**: the stored value type.

pub mod config;
pub mod model;
pub mod storage;

pub use config::{ConfigError, StorageConfig};
pub use model::StoredValue;
pub use storage::{Level, Storage, StorageError, open_storage};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Command-line interface.
#[derive(Parser, Debug)]
#[command(
    name = "lshstore",
    version,
    about = "Inspect and populate LSH bucket stores"
)]
pub struct Cli {
    /// Storage descriptor file (TOML, or JSON with a .json extension).
    /// Without one the transient in-memory store is used.
    #[arg(long, env = "LSHSTORE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Hash table index the store is bound to
    #[arg(long, env = "LSHSTORE_INDEX", default_value_t = 0)]
    pub index: u32,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Add a vector (and optional label) to a bucket
    Append {
        #[arg(long)]
        key: String,

        /// Comma-separated components, e.g. 0.5,-1,2
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true, required = true)]
        vector: Vec<f64>,

        /// Label as JSON; anything that is not valid JSON is stored as a string
        #[arg(long)]
        label: Option<String>,
    },
    /// Print a bucket's values, one JSON document per line
    Get {
        #[arg(long)]
        key: String,

        /// high, medium or low (levelled SQLite stores only)
        #[arg(long)]
        level: Option<Level>,
    },
    /// Print populated bucket keys, one per line
    Keys {
        #[arg(long)]
        level: Option<Level>,
    },
    /// Print the key stored in a level column for a full bucket key
    DeriveKey {
        #[arg(long)]
        key: String,

        #[arg(long)]
        level: Level,
    },
}

pub fn run(cli: Cli) -> Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    run_with_output(cli, &mut out)
}

pub fn run_with_output(cli: Cli, out: &mut dyn Write) -> Result<()> {
    match cli.command {
        Commands::DeriveKey { key, level } => {
            writeln!(out, "{}", level.derive_key(&key))?;
        }
        Commands::Append { key, vector, label } => {
            let mut store = open_configured(cli.config.as_deref(), cli.index)?;
            let value = match label {
                Some(raw) => StoredValue::labeled(vector, parse_label(raw)),
                None => StoredValue::vector(vector),
            };
            store
                .append_val(&key, value)
                .with_context(|| format!("appending to bucket {key}"))?;
        }
        Commands::Get { key, level } => {
            let store = open_configured(cli.config.as_deref(), cli.index)?;
            let values = store
                .get_list(&key, level)
                .with_context(|| format!("reading bucket {key}"))?;
            for value in values {
                writeln!(out, "{}", serde_json::to_string(&value)?)?;
            }
        }
        Commands::Keys { level } => {
            let store = open_configured(cli.config.as_deref(), cli.index)?;
            let mut keys = store.keys(level).context("listing bucket keys")?;
            keys.sort();
            for key in keys {
                writeln!(out, "{key}")?;
            }
        }
    }
    Ok(())
}

fn open_configured(config_path: Option<&Path>, h_index: u32) -> Result<Box<dyn Storage>> {
    let config = match config_path {
        Some(path) => StorageConfig::load(path)
            .with_context(|| format!("loading storage config {}", path.display()))?,
        None => StorageConfig::default(),
    };
    open_storage(&config, h_index)
        .with_context(|| format!("opening {} storage", config.backend_name()))
}

fn parse_label(raw: String) -> model::Label {
    serde_json::from_str(&raw).unwrap_or(serde_json::Value::String(raw))
}
