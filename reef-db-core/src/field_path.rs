//! Dotted field paths
//!
//! A `FieldPath` is a non-empty sequence of field-name components, written
//! `a.b.c` in its dotted form. Key patterns, sort patterns and shard keys
//! all address document fields through this type.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A non-empty dotted path into a document
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldPath {
    components: Vec<String>,
}

impl FieldPath {
    /// Create a field path from its dotted form.
    ///
    /// # Panics
    ///
    /// Panics if `dotted` is empty or contains an empty component; paths
    /// come from a validated plan, so a malformed path is a caller bug.
    pub fn new(dotted: &str) -> Self {
        let components: Vec<String> = dotted.split('.').map(str::to_string).collect();
        assert!(
            !components.is_empty() && components.iter().all(|c| !c.is_empty()),
            "malformed field path: {dotted:?}"
        );
        Self { components }
    }

    /// Create a field path from pre-split components.
    pub fn from_components(components: Vec<String>) -> Self {
        assert!(
            !components.is_empty() && components.iter().all(|c| !c.is_empty()),
            "malformed field path: {components:?}"
        );
        Self { components }
    }

    /// Number of components in the path
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// A path always has at least one component
    pub fn is_empty(&self) -> bool {
        false
    }

    /// All components in order
    pub fn components(&self) -> &[String] {
        &self.components
    }

    /// The component at `level` (0 is the top-level field)
    pub fn component(&self, level: usize) -> &str {
        &self.components[level]
    }

    /// The top-level field name
    pub fn head(&self) -> &str {
        &self.components[0]
    }

    /// Whether `level` addresses the last component
    pub fn is_leaf(&self, level: usize) -> bool {
        level + 1 == self.components.len()
    }

    /// The dotted rendering of the path
    pub fn dotted(&self) -> String {
        self.components.join(".")
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.components.join("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_access() {
        let path = FieldPath::new("a.b.c");
        assert_eq!(path.len(), 3);
        assert_eq!(path.head(), "a");
        assert_eq!(path.component(2), "c");
        assert!(path.is_leaf(2));
        assert!(!path.is_leaf(0));
        assert_eq!(path.dotted(), "a.b.c");
    }

    #[test]
    fn test_single_component() {
        let path = FieldPath::new("x");
        assert_eq!(path.len(), 1);
        assert!(path.is_leaf(0));
    }

    #[test]
    #[should_panic]
    fn test_empty_component_rejected() {
        FieldPath::new("a..b");
    }
}
