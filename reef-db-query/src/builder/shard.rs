//! Shard-filter translator
//!
//! Two shapes: over an index scan (when the parent does not need the
//! document) the shard key is assembled straight from index key slots;
//! otherwise the key is extracted from the fetched document with
//! per-component bindings, replaced by `Nothing` whenever a component is
//! indeterminate so the filterer rejects the row.

use crate::builder::StageBuilder;
use crate::error::{ensure, QueryError, Result};
use crate::expr::{self, BinaryOp, Constant, Expr, ExprFn};
use crate::index_key::{
    make_index_key_inclusion_set, make_index_key_output_slots_matching_parent_reqs,
};
use crate::reqs::{PlanStageReqs, PlanStageSlots, SlotName};
use crate::slots::SlotId;
use crate::solution::{QuerySolution, SolutionKind};
use crate::stage::{FieldBehavior, PlanNodeId, Stage};
use reef_db_core::{FieldPath, KeyOrder, KeyPattern, ShardFilterer};
use std::sync::Arc;

/// Filter `child_stage` on shard ownership of the key in `shard_key_slot`.
fn build_shard_filter_given_shard_key_slot(
    shard_key_slot: SlotId,
    child_stage: Stage,
    shard_filterer: Arc<dyn ShardFilterer>,
    node_id: PlanNodeId,
) -> Stage {
    let shard_filter_fn = expr::func(
        ExprFn::ShardFilter,
        vec![
            expr::constant(Constant::ShardFilterer(shard_filterer)),
            expr::variable(shard_key_slot),
        ],
    );

    Stage::filter(child_stage, shard_filter_fn, node_id)
}

impl<'a> StageBuilder<'a> {
    /// Extract one shard-key component from the document, descending the
    /// dotted path level by level. Arrays anywhere on the path make the
    /// component indeterminate, which surfaces as `Nothing`.
    fn generate_shard_key_binding(&mut self, input: Expr, path: &FieldPath, level: usize) -> Expr {
        let field_expr = expr::get_field(input, path.component(level));

        let frame = self.frame_gen.generate();
        let local = Expr::LocalVar(frame, 0);

        let on_non_array = if path.is_leaf(level) {
            local.clone()
        } else {
            self.generate_shard_key_binding(local.clone(), path, level + 1)
        };

        Expr::Let {
            frame,
            binds: vec![field_expr],
            body: Box::new(expr::if_expr(
                expr::is_array(local),
                expr::constant(Constant::Nothing),
                on_non_array,
            )),
        }
    }

    /// Covered path: the child index scan delivers the union of the key
    /// components the parent wants and the ones the shard key needs; the
    /// shard key object is assembled from slots, and the parent-visible
    /// key slot vector is narrowed back to what the parent asked for.
    fn build_shard_filter_covered(
        &mut self,
        node_id: PlanNodeId,
        child: &QuerySolution,
        shard_filterer: Arc<dyn ShardFilterer>,
        shard_key_pattern: &KeyPattern,
        index_key_pattern: &KeyPattern,
        mut child_reqs: PlanStageReqs,
    ) -> Result<(Stage, PlanStageSlots)> {
        let shard_key_fields: Vec<String> = shard_key_pattern
            .fields()
            .iter()
            .map(|f| f.path.dotted())
            .collect();

        // The parent's bit vector is restored at the end; filtering may
        // need key components the parent never asked for.
        let parent_index_key_reqs = child_reqs.index_key_bitset();

        let (shard_key_bitset, project_fields) =
            make_index_key_inclusion_set(index_key_pattern, &shard_key_fields);
        let union_bitset = parent_index_key_reqs
            .unwrap_or_default()
            .union(shard_key_bitset);
        child_reqs.set_index_key_bitset(Some(union_bitset));

        let (stage, mut outputs) = self.build_node(child, &child_reqs)?;

        let index_key_slots: Vec<SlotId> = outputs
            .index_key_slots()
            .ok_or_else(|| {
                QueryError::internal(622104, "covered shard filter child bound no index key slots")
            })?
            .to_vec();

        // Pick out just the slots holding shard key components.
        let shard_key_slots = make_index_key_output_slots_matching_parent_reqs(
            index_key_pattern,
            shard_key_bitset,
            union_bitset,
            &index_key_slots,
        );

        let shard_key_slot = self.slot_gen.generate();
        let mk_obj_stage = Stage::MakeObj {
            input: Box::new(stage),
            obj_slot: shard_key_slot,
            root_slot: None,
            field_behavior: FieldBehavior::Keep,
            fields: Vec::new(),
            project_fields,
            project_slots: shard_key_slots,
            node_id,
        };

        let filter_stage = build_shard_filter_given_shard_key_slot(
            shard_key_slot,
            mk_obj_stage,
            shard_filterer,
            node_id,
        );

        outputs.set_index_key_slots(parent_index_key_reqs.map(|parent_bitset| {
            make_index_key_output_slots_matching_parent_reqs(
                index_key_pattern,
                parent_bitset,
                union_bitset,
                &index_key_slots,
            )
        }));

        Ok((filter_stage, outputs))
    }

    pub(crate) fn build_shard_filter(
        &mut self,
        node_id: PlanNodeId,
        child: &QuerySolution,
        reqs: &PlanStageReqs,
    ) -> Result<(Stage, PlanStageSlots)> {
        let factory = self.shard_filterer_factory.ok_or_else(|| {
            QueryError::internal(
                622101,
                "no shard filterer factory supplied for a sharding filter plan",
            )
        })?;
        let shard_filterer = factory.make_shard_filterer(self.op_ctx);
        let shard_key_pattern = shard_filterer.key_pattern().clone();

        // The covering optimization only applies when the child reads an
        // index (or mocks one): key components can then be requested by
        // position.
        let index_key_pattern = match &child.kind {
            SolutionKind::IndexScan { index } => index.key_pattern.clone(),
            SolutionKind::VirtualScan {
                index_key_pattern: Some(kp),
                ..
            } => kp.clone(),
            _ => KeyPattern::empty(),
        };

        let child_reqs = reqs
            .clone()
            .set_if(SlotName::Result, index_key_pattern.is_empty());
        if !child_reqs.has(SlotName::Result) {
            return self.build_shard_filter_covered(
                node_id,
                child,
                shard_filterer,
                &shard_key_pattern,
                &index_key_pattern,
                child_reqs,
            );
        }

        // Fallback: extract the shard key from the materialized document.
        let (stage, outputs) = self.build_node(child, &child_reqs)?;
        let result_slot = outputs.require(SlotName::Result, 622102)?;

        ensure(
            !shard_key_pattern.is_empty(),
            622103,
            "shard filterer reported an empty shard key pattern",
        )?;

        let mut projections = Vec::with_capacity(shard_key_pattern.len());
        let mut field_slots = Vec::with_capacity(shard_key_pattern.len());
        let mut project_fields = Vec::with_capacity(shard_key_pattern.len());

        for key_field in shard_key_pattern.fields() {
            let field_slot = self.slot_gen.generate();
            field_slots.push(field_slot);
            project_fields.push(key_field.path.dotted());

            let mut binding =
                self.generate_shard_key_binding(expr::variable(result_slot), &key_field.path, 0);

            if key_field.order == KeyOrder::Hashed {
                binding = expr::func(ExprFn::ShardHash, vec![binding]);
            }

            projections.push((field_slot, binding));
        }

        let shard_key_slot = self.slot_gen.generate();
        let shard_key_obj_stage = Stage::MakeObj {
            input: Box::new(Stage::Project {
                input: Box::new(stage),
                binds: projections,
                node_id,
            }),
            obj_slot: shard_key_slot,
            root_slot: None,
            field_behavior: FieldBehavior::Keep,
            fields: Vec::new(),
            project_fields,
            project_slots: field_slots.clone(),
            node_id,
        };

        // Any missing component makes the whole key indeterminate: replace
        // it with Nothing so the filterer rejects the row.
        let mut any_component_missing =
            expr::not(expr::exists(expr::variable(field_slots[0])));
        for slot in &field_slots[1..] {
            any_component_missing = expr::binary(
                BinaryOp::Or,
                any_component_missing,
                expr::not(expr::exists(expr::variable(*slot))),
            );
        }
        let final_key_expr = expr::if_expr(
            any_component_missing,
            expr::constant(Constant::Nothing),
            expr::variable(shard_key_slot),
        );

        let final_shard_key_slot = self.slot_gen.generate();
        let final_stage =
            Stage::project_one(shard_key_obj_stage, node_id, final_shard_key_slot, final_key_expr);

        Ok((
            build_shard_filter_given_shard_key_slot(
                final_shard_key_slot,
                final_stage,
                shard_filterer,
                node_id,
            ),
            outputs,
        ))
    }
}
