//! Sort and sort-merge translators
//!
//! Blocking sorts come in two regimes. When no two sort parts share a
//! top-level field, each part gets its own traversal subplan that walks
//! the path with array semantics: ascending parts fold to the minimum
//! element, descending parts to the maximum, an empty array at the leaf
//! sorts as `Undefined`, and a missing or empty value above the leaf
//! sorts as `Null`. When parts do share a prefix, one whole-document
//! `generateSortKey` call captures the full semantics in a single opaque
//! key. Multi-part patterns additionally guard against parallel arrays at
//! runtime.

use crate::builder::StageBuilder;
use crate::error::{ensure, Result};
use crate::expr::{self, BinaryOp, Constant, Expr, ExprFn, FAIL_BAD_VALUE};
use crate::reqs::{IndexKeyBitset, PlanStageReqs, PlanStageSlots, SlotName};
use crate::slots::{FrameIdGenerator, SlotId};
use crate::solution::{QuerySolution, SolutionKind};
use crate::stage::{limit_one_co_scan, PlanNodeId, Stage};
use reef_db_core::{FieldPath, SortDirection, SortPattern};
use std::collections::{HashMap, HashSet};

/// Comparison key for one leaf value, collation-aware when the query
/// collates.
fn make_sort_key(field_slot: SlotId, collator_slot: Option<SlotId>) -> Expr {
    match collator_slot {
        None => expr::variable(field_slot),
        Some(collator) => expr::func(
            ExprFn::CollComparisonKey,
            vec![expr::variable(field_slot), expr::variable(collator)],
        ),
    }
}

/// True when evaluating `path` from the value in `input_slot` meets an
/// array at any level (the leaf included).
fn generate_array_check_for_sort(
    input_slot: SlotId,
    path: &FieldPath,
    frame_gen: &mut FrameIdGenerator,
) -> Expr {
    if path.len() == 1 {
        expr::is_array(expr::variable(input_slot))
    } else {
        expr::binary(
            BinaryOp::Or,
            expr::is_array(expr::variable(input_slot)),
            array_check_helper(expr::variable(input_slot), path, 1, frame_gen),
        )
    }
}

fn array_check_helper(
    input: Expr,
    path: &FieldPath,
    level: usize,
    frame_gen: &mut FrameIdGenerator,
) -> Expr {
    debug_assert!(level < path.len());

    let field_expr = expr::fill_empty_null(expr::get_field(input, path.component(level)));

    if path.is_leaf(level) {
        expr::is_array(field_expr)
    } else {
        let frame = frame_gen.generate();
        let local = Expr::LocalVar(frame, 0);
        Expr::Let {
            frame,
            binds: vec![field_expr],
            body: Box::new(expr::binary(
                BinaryOp::Or,
                expr::is_array(local.clone()),
                array_check_helper(local, path, level + 1, frame_gen),
            )),
        }
    }
}

impl<'a> StageBuilder<'a> {
    /// Build the traversal subplan that descends `path` from the value in
    /// `input_slot` and folds leaf values into a single sort key.
    ///
    /// At level 0 the input slot already holds the top-level field value,
    /// so no `getField` is emitted; deeper levels read their field first.
    fn generate_sort_key_traversal(
        &mut self,
        input_stage: Stage,
        input_slot: SlotId,
        path: &FieldPath,
        direction: SortDirection,
        level: usize,
        node_id: PlanNodeId,
        collator_slot: Option<SlotId>,
    ) -> Result<(SlotId, Stage)> {
        debug_assert!(level < path.len());
        let is_leaf = path.is_leaf(level);

        let (field_slot, from_branch) = if level > 0 {
            let mut get_field_expr =
                expr::get_field(expr::variable(input_slot), path.component(level));

            if is_leaf {
                // A missing leaf sorts as Null. Above the leaf, Nothing
                // propagates through the traverse and the projection below
                // converts it.
                get_field_expr = expr::fill_empty_null(get_field_expr);
            }

            let field_slot = self.slot_gen.generate();
            (
                field_slot,
                Stage::project_one(input_stage, node_id, field_slot, get_field_expr),
            )
        } else {
            (input_slot, input_stage)
        };

        let (inner_slot, inner_branch) = if is_leaf {
            let inner_slot = self.slot_gen.generate();
            (
                inner_slot,
                Stage::project_one(
                    limit_one_co_scan(node_id),
                    node_id,
                    inner_slot,
                    make_sort_key(field_slot, collator_slot),
                ),
            )
        } else {
            self.generate_sort_key_traversal(
                limit_one_co_scan(node_id),
                field_slot,
                path,
                direction,
                level + 1,
                node_id,
                collator_slot,
            )?
        };

        let traverse_slot = self.slot_gen.generate();
        let output_slot = self.slot_gen.generate();

        // Fold with a three-way compare: ascending keeps the minimum
        // element, descending the maximum.
        let op = match direction {
            SortDirection::Ascending => BinaryOp::Lt,
            SortDirection::Descending => BinaryOp::Gt,
        };
        let fold = expr::if_expr(
            expr::binary(
                op,
                expr::binary(
                    BinaryOp::Cmp3w,
                    expr::variable(inner_slot),
                    expr::variable(traverse_slot),
                ),
                expr::constant(Constant::Int64(0)),
            ),
            expr::variable(inner_slot),
            expr::variable(traverse_slot),
        );

        let traverse_stage = Stage::Traverse {
            outer: Box::new(from_branch),
            inner: Box::new(inner_branch),
            field_slot,
            out_slot: traverse_slot,
            in_slot: inner_slot,
            fold: Some(fold),
            final_expr: None,
            nested_arrays_depth: Some(1),
            node_id,
        };

        // An empty array at the leaf sorts as Undefined; above the leaf,
        // empty or missing sorts as Null.
        let final_expr = if is_leaf {
            expr::fill_empty_undefined(expr::variable(traverse_slot))
        } else {
            expr::fill_empty_null(expr::variable(traverse_slot))
        };

        Ok((
            output_slot,
            Stage::project_one(traverse_stage, node_id, output_slot, final_expr),
        ))
    }

    /// The runtime guard that rejects documents where more than one sort
    /// part evaluates through an array.
    fn fail_on_parallel_arrays(
        &mut self,
        order_by: &[SlotId],
        pattern: &SortPattern,
    ) -> Option<Expr> {
        let parallel_arrays_error = Expr::Fail {
            code: FAIL_BAD_VALUE,
            message: "cannot sort with keys that are parallel arrays".to_string(),
        };

        if pattern.len() < 2 {
            // One part cannot produce parallel arrays.
            None
        } else if pattern.len() == 2 {
            // Two parts get the cheap form: either key is a non-array, or fail.
            let mut is_not_array = |i: usize| {
                expr::not(generate_array_check_for_sort(
                    order_by[i],
                    &pattern.part(i).path,
                    &mut self.frame_gen,
                ))
            };
            let first = is_not_array(0);
            let second = is_not_array(1);
            Some(expr::binary(
                BinaryOp::Or,
                first,
                expr::binary(BinaryOp::Or, second, parallel_arrays_error),
            ))
        } else {
            // Three or more parts: count array-valued keys and fail unless
            // at most one.
            let mut is_array_count = |i: usize| {
                expr::binary(
                    BinaryOp::Cmp3w,
                    generate_array_check_for_sort(
                        order_by[i],
                        &pattern.part(i).path,
                        &mut self.frame_gen,
                    ),
                    expr::constant(Constant::Bool(false)),
                )
            };

            let mut num_arrays = is_array_count(0);
            for idx in 1..pattern.len() {
                let next = is_array_count(idx);
                num_arrays = expr::binary(BinaryOp::Add, num_arrays, next);
            }

            Some(expr::binary(
                BinaryOp::Or,
                expr::binary(
                    BinaryOp::Lte,
                    num_arrays,
                    expr::constant(Constant::Int32(1)),
                ),
                parallel_arrays_error,
            ))
        }
    }

    pub(crate) fn build_sort(
        &mut self,
        node_id: PlanNodeId,
        child: &QuerySolution,
        pattern: &SortPattern,
        limit: Option<u64>,
        max_memory_bytes: u64,
        reqs: &PlanStageReqs,
    ) -> Result<(Stage, PlanStageSlots)> {
        ensure(
            reqs.index_key_bitset().is_none(),
            621401,
            "index key components requested from a sort",
        )?;
        ensure(
            !pattern.is_empty(),
            621402,
            "sort plan has an empty sort pattern",
        )?;

        // The sort logic reads the document, so the child always
        // materializes it on top of whatever the parent wants.
        let child_reqs = reqs.clone().set(SlotName::Result);
        let (mut stage, outputs) = self.build_node(child, &child_reqs)?;
        let result_slot = outputs.require(SlotName::Result, 621403)?;

        let collator_slot = self.collator_slot();

        let mut directions = Vec::with_capacity(pattern.len());
        let mut prefixes: HashSet<&str> = HashSet::new();
        let mut has_parts_with_common_prefix = false;
        for part in pattern.parts() {
            if !has_parts_with_common_prefix {
                has_parts_with_common_prefix = !prefixes.insert(part.path.head());
            }
            directions.push(part.direction);
        }

        let mut order_by: Vec<SlotId>;
        if !has_parts_with_common_prefix {
            // Fast regime: one traversal subplan per part.
            order_by = Vec::with_capacity(pattern.len());
            let mut binds = Vec::with_capacity(pattern.len());
            for part in pattern.parts() {
                // Missing top-level field sorts as Null.
                let get_field_expr = expr::fill_empty_null(expr::get_field(
                    expr::variable(result_slot),
                    part.path.head(),
                ));

                let field_slot = self.slot_gen.generate();
                binds.push((field_slot, get_field_expr));
                order_by.push(field_slot);
            }

            stage = Stage::Project {
                input: Box::new(stage),
                binds,
                node_id,
            };

            if let Some(guard) = self.fail_on_parallel_arrays(&order_by, pattern) {
                let guard_slot = self.slot_gen.generate();
                stage = Stage::project_one(stage, node_id, guard_slot, guard);
            }

            for idx in 0..order_by.len() {
                let (sort_key_slot, next_stage) = self.generate_sort_key_traversal(
                    stage,
                    order_by[idx],
                    &pattern.part(idx).path,
                    directions[idx],
                    0,
                    node_id,
                    collator_slot,
                )?;
                stage = next_stage;
                order_by[idx] = sort_key_slot;
            }
        } else {
            // Slow regime: parts share a top-level prefix, so produce one
            // opaque whole-document sort key.
            tracing::debug!(
                pattern = ?pattern,
                "sort parts share a common prefix; using whole-document sort keys"
            );

            order_by = self.slot_gen.generate_multiple(1);
            directions = vec![SortDirection::Ascending];

            let sort_spec = expr::constant(Constant::SortSpec {
                pattern: pattern.clone(),
                collator: self.query.collator.clone(),
            });
            stage = Stage::project_one(
                stage,
                node_id,
                order_by[0],
                expr::func(
                    ExprFn::GenerateSortKey,
                    vec![sort_spec, expr::variable(result_slot)],
                ),
            );
        }

        let forwarded = outputs.collect_slots(&child_reqs);

        let stage = Stage::Sort {
            input: Box::new(stage),
            order_by,
            directions,
            forwarded,
            limit,
            memory_limit_bytes: max_memory_bytes,
            allow_disk_use: self.query.allow_disk_use,
            node_id,
        };

        Ok((stage, outputs))
    }

    pub(crate) fn build_sort_merge(
        &mut self,
        node_id: PlanNodeId,
        children: &[QuerySolution],
        pattern: &SortPattern,
        dedup: bool,
        reqs: &PlanStageReqs,
    ) -> Result<(Stage, PlanStageSlots)> {
        ensure(
            reqs.index_key_bitset().is_none(),
            621404,
            "index key components requested from a sorted merge",
        )?;

        let directions: Vec<_> = pattern.parts().iter().map(|p| p.direction).collect();

        // Children provide everything the parent wants, plus record ids
        // when deduplication is on.
        let mut child_reqs = reqs.clone().set_if(SlotName::RecordId, dedup);

        let mut branches = Vec::with_capacity(children.len());
        let mut branch_keys = Vec::with_capacity(children.len());
        let mut branch_vals = Vec::with_capacity(children.len());

        for child in children {
            // Each branch reads a possibly differently-ordered index; map
            // sort-pattern paths to their position among the extracted key
            // slots so branch keys line up with the merge directions.
            let ixn = child
                .find_first(&|n| matches!(n.kind, SolutionKind::IndexScan { .. }))
                .ok_or_else(|| {
                    crate::error::QueryError::internal(
                        621405,
                        format!(
                            "sorted merge branch '{}' contains no index scan",
                            child.kind_name()
                        ),
                    )
                })?;
            let SolutionKind::IndexScan { index } = &ixn.kind else {
                unreachable!("find_first matched an index scan");
            };

            let mut bitset = IndexKeyBitset::new();
            let mut key_position: HashMap<String, usize> = HashMap::new();
            for (i, elt) in index.key_pattern.fields().iter().enumerate() {
                let dotted = elt.path.dotted();
                if pattern.parts().iter().any(|p| p.path.dotted() == dotted) {
                    bitset.set(i);
                    let next = key_position.len();
                    key_position.insert(dotted, next);
                }
            }
            child_reqs.set_index_key_bitset(Some(bitset));

            let (stage, mut outputs) = self.build_node(child, &child_reqs)?;

            ensure(
                !dedup || outputs.has(SlotName::RecordId),
                621406,
                "sorted merge branch did not bind a record id for deduplication",
            )?;

            child_reqs.set_index_key_bitset(None);

            let index_keys = outputs.extract_index_key_slots().ok_or_else(|| {
                crate::error::QueryError::internal(
                    621407,
                    "sorted merge branch did not bind index key slots",
                )
            })?;

            let mut keys_for_branch = Vec::with_capacity(pattern.len());
            for part in pattern.parts() {
                let dotted = part.path.dotted();
                let pos = *key_position.get(&dotted).ok_or_else(|| {
                    crate::error::QueryError::internal(
                        621408,
                        format!("no index key position for sort part '{dotted}'"),
                    )
                })?;
                ensure(
                    pos < index_keys.len(),
                    621409,
                    format!(
                        "index key position {pos} out of range for {} extracted components",
                        index_keys.len()
                    ),
                )?;
                keys_for_branch.push(index_keys[pos]);
            }

            branch_keys.push(keys_for_branch);
            branch_vals.push(outputs.collect_slots(&child_reqs));
            branches.push(stage);
        }

        let outputs = PlanStageSlots::from_reqs(&child_reqs, &mut self.slot_gen);
        let out_vals = outputs.collect_slots(&child_reqs);

        let mut stage = Stage::SortedMerge {
            branches,
            branch_keys,
            directions,
            branch_vals,
            out_vals,
            node_id,
        };

        if dedup {
            let record_id_slot = outputs.require(SlotName::RecordId, 621410)?;
            stage = Stage::Unique {
                input: Box::new(stage),
                key_slots: vec![record_id_slot],
                node_id,
            };
        }

        Ok((stage, outputs))
    }
}
