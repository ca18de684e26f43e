//! # Reef DB Core
//!
//! Shared primitives for Reef DB's query layer.
//!
//! This crate provides:
//! - Record identifiers and dotted field paths
//! - Index key patterns and sort patterns
//! - Catalog interfaces: collections, index descriptors, access methods
//! - Collation and timezone handles
//! - The shard-filtering seam (key metadata plus the filterer traits)
//! - Operation context and read-availability checks
//!
//! ## Design Principles
//!
//! 1. **No execution logic**: these are metadata and seam types consumed by
//!    the stage builder in `reef-db-query`; nothing here touches storage.
//! 2. **Documents are JSON**: `serde_json::Value` is the document
//!    representation throughout the query layer.

pub mod catalog;
pub mod collation;
pub mod error;
pub mod field_path;
pub mod fulltext;
pub mod key_pattern;
pub mod op_context;
pub mod record_id;
pub mod sharding;

// Re-export main types
pub use catalog::{AccessMethod, CollectionHandle, CollectionId, IndexDescriptor, IndexEntry};
pub use collation::{Collator, TimeZoneDatabase};
pub use error::{Error, Result};
pub use field_path::FieldPath;
pub use fulltext::{FtsMatcher, FtsSpec, TextQuery};
pub use key_pattern::{
    KeyOrder, KeyPattern, KeyPatternField, SortDirection, SortPattern, SortPatternPart,
};
pub use op_context::{OperationContext, ReadAvailabilityCallback, YieldPolicy};
pub use record_id::RecordId;
pub use sharding::{ShardFilterer, ShardFiltererFactory, StaticShardFilterer};
