//! Byte encodings for stored values.
//!
//! JSON is human-readable and is what the Redis backend always writes.
//! MessagePack is the compact binary default for SQLite blobs.

use serde::{Deserialize, Serialize};

use super::StorageError;
use crate::config::ConfigError;
use crate::model::StoredValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(try_from = "String", into = "String")]
pub enum SerializerKind {
    Json,
    #[default]
    MessagePack,
}

impl SerializerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::MessagePack => "msgpack",
        }
    }

    /// Resolve a serializer by config name. `binary` is accepted as an alias
    /// for MessagePack; anything else is unsupported.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        match s.to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "msgpack" | "messagepack" | "binary" => Ok(Self::MessagePack),
            _ => Err(ConfigError::UnsupportedSerializer(s.to_string())),
        }
    }

    /// Encode `value`. JSON has no NaN or infinity, so non-finite components
    /// are rejected under `Json` before any bytes are produced.
    pub fn encode(&self, value: &StoredValue) -> Result<Vec<u8>, StorageError> {
        match self {
            Self::Json => {
                if let Some(bad) = value.components().iter().find(|c| !c.is_finite()) {
                    return Err(StorageError::Encode {
                        serializer: self.as_str(),
                        message: format!("non-finite component {bad} has no JSON form"),
                    });
                }
                serde_json::to_vec(value).map_err(|e| StorageError::Encode {
                    serializer: self.as_str(),
                    message: e.to_string(),
                })
            }
            Self::MessagePack => rmp_serde::to_vec(value).map_err(|e| StorageError::Encode {
                serializer: self.as_str(),
                message: e.to_string(),
            }),
        }
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<StoredValue, StorageError> {
        match self {
            Self::Json => serde_json::from_slice(bytes).map_err(|e| StorageError::Decode {
                serializer: self.as_str(),
                message: e.to_string(),
            }),
            Self::MessagePack => rmp_serde::from_slice(bytes).map_err(|e| StorageError::Decode {
                serializer: self.as_str(),
                message: e.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for SerializerKind {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SerializerKind> for String {
    fn from(kind: SerializerKind) -> String {
        kind.as_str().to_string()
    }
}

impl std::fmt::Display for SerializerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
