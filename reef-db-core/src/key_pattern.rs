//! Index key patterns and sort patterns
//!
//! A `KeyPattern` describes the ordered components of an index key
//! (`{a: 1, b.c: -1}` style); a `SortPattern` describes the requested output
//! order of a sort. Both are ordered lists of dotted paths with a
//! per-component direction.

use crate::field_path::FieldPath;
use serde::{Deserialize, Serialize};

/// Ordering of one index key component
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyOrder {
    /// Ascending component
    Forward,
    /// Descending component
    Reverse,
    /// Hashed component (hashed sharding only)
    Hashed,
}

/// One component of an index key pattern
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPatternField {
    pub path: FieldPath,
    pub order: KeyOrder,
}

/// Ordered index key pattern
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPattern {
    fields: Vec<KeyPatternField>,
}

impl KeyPattern {
    /// Create a key pattern from its components
    pub fn new(fields: Vec<KeyPatternField>) -> Self {
        Self { fields }
    }

    /// Convenience constructor for an all-ascending pattern
    pub fn ascending(paths: &[&str]) -> Self {
        Self {
            fields: paths
                .iter()
                .map(|p| KeyPatternField {
                    path: FieldPath::new(p),
                    order: KeyOrder::Forward,
                })
                .collect(),
        }
    }

    /// An empty pattern (used when no index metadata applies)
    pub fn empty() -> Self {
        Self { fields: Vec::new() }
    }

    /// All components in key order
    pub fn fields(&self) -> &[KeyPatternField] {
        &self.fields
    }

    /// Component at position `i`
    pub fn field(&self, i: usize) -> &KeyPatternField {
        &self.fields[i]
    }

    /// Number of key components
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the pattern has no components
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Position of the component whose dotted path equals `dotted`, if any
    pub fn position_of(&self, dotted: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.path.dotted() == dotted)
    }
}

/// Direction of one sort pattern part
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

/// One part of a sort pattern
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortPatternPart {
    pub path: FieldPath,
    pub direction: SortDirection,
}

/// Ordered sort pattern
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortPattern {
    parts: Vec<SortPatternPart>,
}

impl SortPattern {
    /// Create a sort pattern from its parts
    pub fn new(parts: Vec<SortPatternPart>) -> Self {
        Self { parts }
    }

    /// Convenience constructor from `(path, ascending)` pairs
    pub fn from_pairs(pairs: &[(&str, bool)]) -> Self {
        Self {
            parts: pairs
                .iter()
                .map(|(p, asc)| SortPatternPart {
                    path: FieldPath::new(p),
                    direction: if *asc {
                        SortDirection::Ascending
                    } else {
                        SortDirection::Descending
                    },
                })
                .collect(),
        }
    }

    /// All parts in order
    pub fn parts(&self) -> &[SortPatternPart] {
        &self.parts
    }

    /// Part at position `i`
    pub fn part(&self, i: usize) -> &SortPatternPart {
        &self.parts[i]
    }

    /// Number of parts
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    /// Whether the pattern has no parts
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_of_dotted_path() {
        let kp = KeyPattern::ascending(&["a.b", "x", "a.c"]);
        assert_eq!(kp.position_of("x"), Some(1));
        assert_eq!(kp.position_of("a.c"), Some(2));
        assert_eq!(kp.position_of("a"), None);
    }

    #[test]
    fn test_sort_pattern_directions() {
        let sp = SortPattern::from_pairs(&[("a", true), ("b", false)]);
        assert_eq!(sp.part(0).direction, SortDirection::Ascending);
        assert_eq!(sp.part(1).direction, SortDirection::Descending);
    }
}
