//! Shard-filtering seam
//!
//! When a collection is sharded, plans must drop rows this shard does not
//! own (pending migrations, orphans from aborted ones). The builder embeds
//! a `ShardFilterer` into the compiled plan as a constant; ownership checks
//! run in the executor.

use crate::key_pattern::KeyPattern;
use crate::op_context::OperationContext;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Execution-time shard ownership predicate
pub trait ShardFilterer: fmt::Debug + Send + Sync {
    /// The shard key pattern this filterer checks against
    fn key_pattern(&self) -> &KeyPattern;

    /// Whether a row with the given (flattened) shard key is owned here.
    ///
    /// A `Null` shard key means the key was indeterminate for the row;
    /// implementations must reject it.
    fn keep(&self, shard_key: &Value) -> bool;
}

/// Factory handed to the stage builder by the caller
pub trait ShardFiltererFactory: Send + Sync {
    /// Make a filterer bound to the current ownership snapshot
    fn make_shard_filterer(&self, op_ctx: &OperationContext) -> Arc<dyn ShardFilterer>;
}

/// Filterer with a fixed key pattern that keeps every determinate key.
///
/// Stands in for the routing-table-backed implementation in tests and
/// single-shard deployments.
#[derive(Clone, Debug)]
pub struct StaticShardFilterer {
    key_pattern: KeyPattern,
}

impl StaticShardFilterer {
    /// Create a filterer over `key_pattern`
    pub fn new(key_pattern: KeyPattern) -> Self {
        Self { key_pattern }
    }
}

impl ShardFilterer for StaticShardFilterer {
    fn key_pattern(&self) -> &KeyPattern {
        &self.key_pattern
    }

    fn keep(&self, shard_key: &Value) -> bool {
        !shard_key.is_null()
    }
}

impl ShardFiltererFactory for StaticShardFilterer {
    fn make_shard_filterer(&self, _op_ctx: &OperationContext) -> Arc<dyn ShardFilterer> {
        Arc::new(self.clone())
    }
}
