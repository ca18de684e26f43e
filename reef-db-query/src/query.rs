//! Canonical query state the builder consults
//!
//! The canonical query is the validated, normalized form of the client's
//! request. The builder reads only the pieces that shape plan structure:
//! the collation, the tailable flag, and whether sorts may spill to disk.

use reef_db_core::Collator;
use std::sync::Arc;

/// Query-wide state threaded through every translator
#[derive(Clone, Debug, Default)]
pub struct CanonicalQuery {
    /// Collation the query runs under, if any
    pub collator: Option<Arc<Collator>>,
    /// Whether the cursor is tailable (scan resumes as new data arrives)
    pub tailable: bool,
    /// Whether blocking sorts may spill to disk
    pub allow_disk_use: bool,
}

impl CanonicalQuery {
    /// A plain, non-tailable query with no collation
    pub fn new() -> Self {
        Self::default()
    }

    /// With a collation
    pub fn with_collator(mut self, collator: Arc<Collator>) -> Self {
        self.collator = Some(collator);
        self
    }

    /// With the tailable flag set
    pub fn tailable(mut self) -> Self {
        self.tailable = true;
        self
    }
}
