//! Physical plan stages
//!
//! A `Stage` is one node of the compiled execution tree. Stages are opaque
//! constructors from the builder's point of view: it wires slots and
//! expressions into them and never looks back inside. Every stage carries
//! the `PlanNodeId` of the logical node it was lowered from, so runtime
//! diagnostics can be traced to the plan.

use crate::expr::Expr;
use crate::reqs::IndexKeyBitset;
use crate::slots::{SlotId, SpoolId};
use reef_db_core::{
    CollectionId, KeyPattern, ReadAvailabilityCallback, SortDirection, YieldPolicy,
};
use serde_json::Value;

/// Provenance id linking a physical stage to its logical node
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PlanNodeId(pub u32);

/// One node of the physical execution tree
#[derive(Clone, Debug, PartialEq)]
pub enum Stage {
    /// Collection scan. With `seek_record_id_slot` set, the scan starts at
    /// the record id held in that slot instead of the beginning.
    Scan {
        collection: CollectionId,
        result_slot: SlotId,
        record_id_slot: SlotId,
        /// Top-level fields extracted into `field_slots` alongside the document
        fields: Vec<String>,
        field_slots: Vec<SlotId>,
        seek_record_id_slot: Option<SlotId>,
        read_check: Option<ReadAvailabilityCallback>,
        yields: Option<YieldPolicy>,
        node_id: PlanNodeId,
    },

    /// Scan over inline documents; `out_slots` receives each row's columns
    VirtualScan {
        docs: Vec<Value>,
        out_slots: Vec<SlotId>,
        node_id: PlanNodeId,
    },

    /// Index scan producing the requested key components as scalar slots
    IndexScan {
        collection: CollectionId,
        index_name: String,
        key_pattern: KeyPattern,
        /// Which key-pattern positions are extracted
        key_bitset: IndexKeyBitset,
        /// One slot per set bit, in ascending position order
        key_slots: Vec<SlotId>,
        record_id_slot: SlotId,
        /// Buffer the scan checkpoints its seek points in
        seek_points_spool: SpoolId,
        read_check: Option<ReadAvailabilityCallback>,
        yields: Option<YieldPolicy>,
        node_id: PlanNodeId,
    },

    /// Single-row, zero-column source
    CoScan { node_id: PlanNodeId },

    /// Bind expressions to fresh slots, row by row
    Project {
        input: Box<Stage>,
        binds: Vec<(SlotId, Expr)>,
        node_id: PlanNodeId,
    },

    /// Drop rows for which `expr` is false. A const filter is evaluated
    /// once per (re)open instead of once per row.
    Filter {
        input: Box<Stage>,
        expr: Expr,
        is_const: bool,
        node_id: PlanNodeId,
    },

    LimitSkip {
        input: Box<Stage>,
        limit: Option<u64>,
        skip: Option<u64>,
        node_id: PlanNodeId,
    },

    /// Blocking sort over `order_by` slots
    Sort {
        input: Box<Stage>,
        order_by: Vec<SlotId>,
        directions: Vec<SortDirection>,
        /// Payload slots carried through the sort
        forwarded: Vec<SlotId>,
        limit: Option<u64>,
        memory_limit_bytes: u64,
        allow_disk_use: bool,
        node_id: PlanNodeId,
    },

    /// Hash equi-join on `outer_cond` = `inner_cond`
    HashJoin {
        outer: Box<Stage>,
        inner: Box<Stage>,
        outer_cond: Vec<SlotId>,
        outer_project: Vec<SlotId>,
        inner_cond: Vec<SlotId>,
        inner_project: Vec<SlotId>,
        collator_slot: Option<SlotId>,
        node_id: PlanNodeId,
    },

    /// Merge join over key slots already sorted in `directions`
    MergeJoin {
        outer: Box<Stage>,
        inner: Box<Stage>,
        outer_keys: Vec<SlotId>,
        outer_project: Vec<SlotId>,
        inner_keys: Vec<SlotId>,
        inner_project: Vec<SlotId>,
        directions: Vec<SortDirection>,
        node_id: PlanNodeId,
    },

    /// Nested-loop join; the inner side is reopened per outer row with
    /// `correlated` slots visible to it
    LoopJoin {
        outer: Box<Stage>,
        inner: Box<Stage>,
        outer_project: Vec<SlotId>,
        correlated: Vec<SlotId>,
        predicate: Option<Expr>,
        node_id: PlanNodeId,
    },

    /// K-way merge of branches pre-sorted on their key slots
    SortedMerge {
        branches: Vec<Stage>,
        branch_keys: Vec<Vec<SlotId>>,
        directions: Vec<SortDirection>,
        branch_vals: Vec<Vec<SlotId>>,
        out_vals: Vec<SlotId>,
        node_id: PlanNodeId,
    },

    /// Concatenation; each branch's `branch_slots` map onto `out_slots`
    Union {
        branches: Vec<Stage>,
        branch_slots: Vec<Vec<SlotId>>,
        out_slots: Vec<SlotId>,
        node_id: PlanNodeId,
    },

    /// Drop rows whose `key_slots` values were already seen
    Unique {
        input: Box<Stage>,
        key_slots: Vec<SlotId>,
        node_id: PlanNodeId,
    },

    /// Object construction into `obj_slot`, either by filtering the fields
    /// of `root_slot` or from explicit `(project_fields, project_slots)` pairs
    MakeObj {
        input: Box<Stage>,
        obj_slot: SlotId,
        root_slot: Option<SlotId>,
        field_behavior: FieldBehavior,
        fields: Vec<String>,
        project_fields: Vec<String>,
        project_slots: Vec<SlotId>,
        node_id: PlanNodeId,
    },

    /// Array traversal: for each outer row, run `inner` over the elements
    /// of `field_slot`, folding per-element `in_slot` values into `out_slot`
    Traverse {
        outer: Box<Stage>,
        inner: Box<Stage>,
        field_slot: SlotId,
        out_slot: SlotId,
        in_slot: SlotId,
        fold: Option<Expr>,
        final_expr: Option<Expr>,
        /// How deep nested arrays are recursed into
        nested_arrays_depth: Option<u32>,
        node_id: PlanNodeId,
    },
}

/// Whether `MakeObj` keeps or drops the listed root fields
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldBehavior {
    Keep,
    Drop,
}

impl Stage {
    /// Provenance id of this stage
    pub fn node_id(&self) -> PlanNodeId {
        match self {
            Stage::Scan { node_id, .. }
            | Stage::VirtualScan { node_id, .. }
            | Stage::IndexScan { node_id, .. }
            | Stage::CoScan { node_id }
            | Stage::Project { node_id, .. }
            | Stage::Filter { node_id, .. }
            | Stage::LimitSkip { node_id, .. }
            | Stage::Sort { node_id, .. }
            | Stage::HashJoin { node_id, .. }
            | Stage::MergeJoin { node_id, .. }
            | Stage::LoopJoin { node_id, .. }
            | Stage::SortedMerge { node_id, .. }
            | Stage::Union { node_id, .. }
            | Stage::Unique { node_id, .. }
            | Stage::MakeObj { node_id, .. }
            | Stage::Traverse { node_id, .. } => *node_id,
        }
    }

    /// Project a single expression into `slot` on top of `input`
    pub fn project_one(input: Stage, node_id: PlanNodeId, slot: SlotId, expr: Expr) -> Stage {
        Stage::Project {
            input: Box::new(input),
            binds: vec![(slot, expr)],
            node_id,
        }
    }

    /// Limit/skip wrapper
    pub fn limit_skip(
        input: Stage,
        limit: Option<u64>,
        skip: Option<u64>,
        node_id: PlanNodeId,
    ) -> Stage {
        Stage::LimitSkip {
            input: Box::new(input),
            limit,
            skip,
            node_id,
        }
    }

    /// Per-row filter wrapper
    pub fn filter(input: Stage, expr: Expr, node_id: PlanNodeId) -> Stage {
        Stage::Filter {
            input: Box::new(input),
            expr,
            is_const: false,
            node_id,
        }
    }

    /// Once-per-open filter wrapper
    pub fn const_filter(input: Stage, expr: Expr, node_id: PlanNodeId) -> Stage {
        Stage::Filter {
            input: Box::new(input),
            expr,
            is_const: true,
            node_id,
        }
    }
}

/// A single-row source: `limit 1` over a co-scan. Used as the `from`
/// branch of expression-only subtrees.
pub fn limit_one_co_scan(node_id: PlanNodeId) -> Stage {
    Stage::limit_skip(Stage::CoScan { node_id }, Some(1), None, node_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{empty_object, variable};

    #[test]
    fn test_node_id_propagation() {
        let id = PlanNodeId(4);
        let stage = Stage::project_one(
            limit_one_co_scan(id),
            id,
            SlotId(1),
            empty_object(),
        );
        assert_eq!(stage.node_id(), id);
    }

    #[test]
    fn test_limit_one_co_scan_shape() {
        match limit_one_co_scan(PlanNodeId(9)) {
            Stage::LimitSkip {
                limit, skip, input, ..
            } => {
                assert_eq!(limit, Some(1));
                assert_eq!(skip, None);
                assert!(matches!(*input, Stage::CoScan { .. }));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_filter_wrappers() {
        let f = Stage::const_filter(
            Stage::CoScan {
                node_id: PlanNodeId(1),
            },
            variable(SlotId(2)),
            PlanNodeId(1),
        );
        assert!(matches!(f, Stage::Filter { is_const: true, .. }));
    }
}
