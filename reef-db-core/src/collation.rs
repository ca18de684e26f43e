//! Collation and timezone handles
//!
//! Both types are process-lifetime services that compiled plans reference
//! through named global slots; the builder never looks inside them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A string-comparison collation
///
/// Comparison-key derivation happens at execution time; the builder only
/// threads a shared handle through the plan.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collator {
    /// ICU-style locale identifier, e.g. `en_US`
    pub locale: String,
    /// Whether comparisons ignore case
    pub case_insensitive: bool,
}

impl Collator {
    /// Create a case-sensitive collator for `locale`
    pub fn new(locale: impl Into<String>) -> Self {
        Self {
            locale: locale.into(),
            case_insensitive: false,
        }
    }
}

/// Handle to the process-wide timezone database
///
/// Opaque to the query layer; datetime expressions resolve zone rules
/// through it at execution time.
#[derive(Default)]
pub struct TimeZoneDatabase {
    _private: (),
}

impl TimeZoneDatabase {
    /// Create a timezone database handle
    pub fn new() -> Self {
        Self::default()
    }
}

impl fmt::Debug for TimeZoneDatabase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TimeZoneDatabase")
    }
}
