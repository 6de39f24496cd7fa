//! Data model shared by every storage backend.

pub mod types;

pub use types::{Label, StoredValue};
