//! Precision levels for coarse bucket lookups.
//!
//! A bucket key is stored three times when levels are enabled: as-is (High),
//! and as two shortened rewrites (Medium, Low). The rewrite interleaves the key
//! (all even positions, then all odd positions) before truncating, so the
//! shortened key still carries bits from the whole hash code instead of only
//! its head. Vectors whose codes agree on most but not all bits are then more
//! likely to share a Medium or Low bucket.
//!
//! ```rust
//! use lshash_store::storage::level::Level;
//!
//! assert_eq!(Level::High.derive_key("10110100"), "10110100");
//! assert_eq!(Level::Medium.derive_key("10110100"), "110001");
//! assert_eq!(Level::Low.derive_key("10110100"), "1100");
//! ```

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    #[default]
    High,
    Medium,
    Low,
}

impl Level {
    pub const ALL: [Level; 3] = [Level::High, Level::Medium, Level::Low];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }

    /// Parse from string (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "high" => Some(Self::High),
            "medium" => Some(Self::Medium),
            "low" => Some(Self::Low),
            _ => None,
        }
    }

    /// Share of the key length kept at this level.
    pub fn coefficient(&self) -> f64 {
        match self {
            Self::High => 1.0,
            Self::Medium => 0.75,
            Self::Low => 0.5,
        }
    }

    /// Derive the key stored in this level's column.
    ///
    /// Works on characters, not bytes. High always returns the full key.
    pub fn derive_key(&self, key: &str) -> String {
        if matches!(self, Self::High) {
            return key.to_string();
        }
        let chars: Vec<char> = key.chars().collect();
        let size = (chars.len() as f64 * self.coefficient()) as usize;
        chars
            .iter()
            .step_by(2)
            .chain(chars.iter().skip(1).step_by(2))
            .take(size)
            .collect()
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("unknown level '{s}' (expected high, medium or low)"))
    }
}
