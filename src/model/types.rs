//! Values stored in hash buckets.

use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

/// Caller-supplied payload attached to a vector (a name, an id, a small record).
pub type Label = serde_json::Value;

/// A value held in a bucket: a bare feature vector, or a vector paired with a label.
///
/// The serialized shape is positional: a vector is an array of numbers and a
/// labeled value is the two-element array `[vector, label]`. Decoding tries the
/// labeled shape first, so any two-element payload whose first element is a
/// sequence comes back as [`StoredValue::Labeled`] and everything else as
/// [`StoredValue::Vector`].
///
/// Equality and hashing compare floats by bit pattern and labels by their
/// canonical JSON text, which keeps `Eq` reflexive (`NaN == NaN`) so values can
/// live in a `HashSet`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoredValue {
    Labeled(Vec<f64>, Label),
    Vector(Vec<f64>),
}

impl StoredValue {
    pub fn vector(components: impl Into<Vec<f64>>) -> Self {
        Self::Vector(components.into())
    }

    pub fn labeled(components: impl Into<Vec<f64>>, label: impl Into<Label>) -> Self {
        Self::Labeled(components.into(), label.into())
    }

    /// The feature vector, regardless of shape.
    pub fn components(&self) -> &[f64] {
        match self {
            Self::Labeled(v, _) | Self::Vector(v) => v,
        }
    }

    pub fn label(&self) -> Option<&Label> {
        match self {
            Self::Labeled(_, label) => Some(label),
            Self::Vector(_) => None,
        }
    }
}

impl From<Vec<f64>> for StoredValue {
    fn from(v: Vec<f64>) -> Self {
        Self::Vector(v)
    }
}

fn same_bits(a: &[f64], b: &[f64]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.to_bits() == y.to_bits())
}

impl PartialEq for StoredValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Vector(a), Self::Vector(b)) => same_bits(a, b),
            (Self::Labeled(a, la), Self::Labeled(b, lb)) => {
                same_bits(a, b) && la.to_string() == lb.to_string()
            }
            _ => false,
        }
    }
}

impl Eq for StoredValue {}

impl Hash for StoredValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        for x in self.components() {
            x.to_bits().hash(state);
        }
        if let Some(label) = self.label() {
            label.to_string().hash(state);
        }
    }
}
