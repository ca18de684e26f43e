//! # Reef DB Query
//!
//! Slot-based stage builder for Reef DB.
//!
//! This crate lowers the planner's logical query-solution trees into
//! physical stage trees whose operators exchange values through integer
//! slots. It provides:
//! - The recursive stage builder with one translator per logical node kind
//! - The downward requirements / upward slot-bindings contracts
//! - Index-key rehydration, sort-key traversal with array semantics,
//!   the tailable anchor/resume union, and covered shard filtering
//! - The runtime environment of named global slots
//!
//! ## Quick Start
//!
//! Construct a `QuerySolutionTree` and a `CanonicalQuery`, then run
//! `StageBuilder::new(...)?.build()` to get the stage tree and its
//! `PlanStageData`.

pub mod builder;
pub mod env;
pub mod error;
pub mod explain;
pub mod expr;
pub mod filter;
pub mod index_key;
pub mod projection;
pub mod query;
pub mod reqs;
pub mod slots;
pub mod solution;
pub mod stage;

// Re-exports
pub use builder::{PlanStageData, StageBuilder};
pub use env::{names, RuntimeEnvironment, RuntimeValue};
pub use error::{QueryError, Result};
pub use explain::render_stage_tree;
pub use expr::{BinaryOp, Constant, Expr, ExprFn};
pub use filter::MatchExpr;
pub use index_key::{
    make_index_key_inclusion_set, make_index_key_output_slots_matching_parent_reqs,
    rehydrate_index_key,
};
pub use projection::Projection;
pub use query::CanonicalQuery;
pub use reqs::{IndexKeyBitset, PlanStageReqs, PlanStageSlots, SlotName};
pub use slots::{
    FrameId, FrameIdGenerator, SlotId, SlotIdGenerator, SpoolId, SpoolIdGenerator,
};
pub use solution::{
    IndexScanSpec, QuerySolution, QuerySolutionTree, SolutionKind, SortAlgo,
};
pub use stage::{FieldBehavior, PlanNodeId, Stage};
