//! Record identifiers
//!
//! A `RecordId` addresses one document within a collection's record store.
//! Ids are assigned by the storage layer and are strictly increasing within
//! a collection, which is what makes seek-style scans and merge
//! intersection on record ids possible.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a single record within a collection
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordId(pub i64);

impl RecordId {
    /// Get the raw id value
    pub fn raw(self) -> i64 {
        self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rid:{}", self.0)
    }
}
