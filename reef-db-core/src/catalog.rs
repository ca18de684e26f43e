//! Catalog interfaces
//!
//! An in-memory view of one collection's index catalog, read by the stage
//! builder under a caller-held lock (or lock-free snapshot). The builder
//! performs no locking of its own.

use crate::fulltext::FtsSpec;
use crate::key_pattern::KeyPattern;

/// Stable identifier of a collection
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CollectionId(pub u64);

/// Index metadata as registered in the catalog
#[derive(Clone, Debug, PartialEq)]
pub struct IndexDescriptor {
    pub name: String,
    pub key_pattern: KeyPattern,
}

/// How an index's entries are produced and searched
#[derive(Clone, Debug, PartialEq)]
pub enum AccessMethod {
    /// Ordinary ordered index
    Btree,
    /// Full-text index with its analysis spec
    FullText(FtsSpec),
}

/// A catalog entry: descriptor plus its (possibly absent) access method.
///
/// The access method is absent while an index build is still registering;
/// consumers that need it must treat absence as a hard error.
#[derive(Clone, Debug, PartialEq)]
pub struct IndexEntry {
    pub descriptor: IndexDescriptor,
    pub access_method: Option<AccessMethod>,
}

/// One collection as seen by the query layer
#[derive(Clone, Debug, PartialEq)]
pub struct CollectionHandle {
    name: String,
    id: CollectionId,
    indexes: Vec<IndexEntry>,
}

impl CollectionHandle {
    /// Create a collection view with no indexes
    pub fn new(name: impl Into<String>, id: CollectionId) -> Self {
        Self {
            name: name.into(),
            id,
            indexes: Vec::new(),
        }
    }

    /// Register an ordinary btree index
    pub fn with_index(mut self, name: impl Into<String>, key_pattern: KeyPattern) -> Self {
        self.indexes.push(IndexEntry {
            descriptor: IndexDescriptor {
                name: name.into(),
                key_pattern,
            },
            access_method: Some(AccessMethod::Btree),
        });
        self
    }

    /// Register a full-text index
    pub fn with_text_index(
        mut self,
        name: impl Into<String>,
        key_pattern: KeyPattern,
        spec: FtsSpec,
    ) -> Self {
        self.indexes.push(IndexEntry {
            descriptor: IndexDescriptor {
                name: name.into(),
                key_pattern,
            },
            access_method: Some(AccessMethod::FullText(spec)),
        });
        self
    }

    /// Register an index entry verbatim (tests use this for half-built entries)
    pub fn with_entry(mut self, entry: IndexEntry) -> Self {
        self.indexes.push(entry);
        self
    }

    /// Collection name (namespace string)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Collection id
    pub fn id(&self) -> CollectionId {
        self.id
    }

    /// Find an index descriptor by name
    pub fn find_index_descriptor(&self, name: &str) -> Option<&IndexDescriptor> {
        self.indexes
            .iter()
            .map(|e| &e.descriptor)
            .find(|d| d.name == name)
    }

    /// Find the catalog entry for a descriptor
    pub fn entry_for(&self, descriptor: &IndexDescriptor) -> Option<&IndexEntry> {
        self.indexes.iter().find(|e| &e.descriptor == descriptor)
    }
}
