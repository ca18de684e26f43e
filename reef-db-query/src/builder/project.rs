//! Projection and return-key translators

use crate::builder::StageBuilder;
use crate::error::{ensure, Result};
use crate::index_key::make_index_key_inclusion_set;
use crate::projection::{self, Projection};
use crate::reqs::{PlanStageReqs, PlanStageSlots, SlotName};
use crate::solution::QuerySolution;
use crate::stage::{FieldBehavior, PlanNodeId, Stage};
use reef_db_core::KeyPattern;

impl<'a> StageBuilder<'a> {
    /// Keep only the named top-level fields of the child's document.
    pub(crate) fn build_projection_simple(
        &mut self,
        node_id: PlanNodeId,
        child: &QuerySolution,
        fields: &[String],
        reqs: &PlanStageReqs,
    ) -> Result<(Stage, PlanStageSlots)> {
        ensure(
            reqs.index_key_bitset().is_none(),
            621701,
            "index key components requested from a simple projection",
        )?;

        let child_reqs = reqs.clone().set(SlotName::Result);
        let (stage, mut outputs) = self.build_node(child, &child_reqs)?;
        let child_result_slot = outputs.require(SlotName::Result, 621702)?;

        let result_slot = self.slot_gen.generate();
        outputs.set(SlotName::Result, result_slot);

        let stage = Stage::MakeObj {
            input: Box::new(stage),
            obj_slot: result_slot,
            root_slot: Some(child_result_slot),
            field_behavior: FieldBehavior::Keep,
            fields: fields.to_vec(),
            project_fields: Vec::new(),
            project_slots: Vec::new(),
            node_id,
        };

        Ok((stage, outputs))
    }

    /// Build the projected object straight from index key slots, skipping
    /// document materialization entirely.
    pub(crate) fn build_projection_covered(
        &mut self,
        node_id: PlanNodeId,
        child: &QuerySolution,
        fields: &[String],
        covered_key_pattern: &KeyPattern,
        reqs: &PlanStageReqs,
    ) -> Result<(Stage, PlanStageSlots)> {
        ensure(
            reqs.index_key_bitset().is_none(),
            621703,
            "index key components requested from a covered projection",
        )?;
        ensure(
            !child.is_fetched(),
            621704,
            format!(
                "covered projection built over a fetched sub-plan: {}",
                child.kind_name()
            ),
        )?;

        // The index provides every field the projection needs, so the
        // child materializes no document; request exactly the key
        // positions the projected fields live at.
        let mut child_reqs = reqs.clone().clear(SlotName::Result);
        let (bitset, key_field_names) = make_index_key_inclusion_set(covered_key_pattern, fields);
        child_reqs.set_index_key_bitset(Some(bitset));

        let (stage, mut outputs) = self.build_node(child, &child_reqs)?;

        let index_key_slots = outputs.extract_index_key_slots().ok_or_else(|| {
            crate::error::QueryError::internal(
                621705,
                "covered projection child did not bind index key slots",
            )
        })?;

        let result_slot = self.slot_gen.generate();
        outputs.set(SlotName::Result, result_slot);

        let stage = Stage::MakeObj {
            input: Box::new(stage),
            obj_slot: result_slot,
            root_slot: None,
            field_behavior: FieldBehavior::Keep,
            fields: Vec::new(),
            project_fields: key_field_names,
            project_slots: index_key_slots,
            node_id,
        };

        Ok((stage, outputs))
    }

    /// General projections go through the projection expression sub-builder.
    pub(crate) fn build_projection_default(
        &mut self,
        node_id: PlanNodeId,
        child: &QuerySolution,
        proj: &Projection,
        reqs: &PlanStageReqs,
    ) -> Result<(Stage, PlanStageSlots)> {
        ensure(
            reqs.index_key_bitset().is_none(),
            621706,
            "index key components requested from a default projection",
        )?;

        let child_reqs = reqs.clone().set(SlotName::Result);
        let (stage, mut outputs) = self.build_node(child, &child_reqs)?;
        let child_result_slot = outputs.require(SlotName::Result, 621707)?;

        let (result_slot, stage) =
            projection::generate_projection(stage, proj, child_result_slot, &mut self.slot_gen, node_id);
        outputs.set(SlotName::Result, result_slot);

        Ok((stage, outputs))
    }

    /// Rebind the child's raw index key as the parent-visible document.
    pub(crate) fn build_return_key(
        &mut self,
        _node_id: PlanNodeId,
        child: &QuerySolution,
        reqs: &PlanStageReqs,
    ) -> Result<(Stage, PlanStageSlots)> {
        ensure(
            reqs.index_key_bitset().is_none(),
            621708,
            "index key components requested from a return-key plan",
        )?;

        let child_reqs = reqs
            .clone()
            .clear(SlotName::Result)
            .set(SlotName::ReturnKey);
        let (stage, mut outputs) = self.build_node(child, &child_reqs)?;

        let return_key_slot = outputs.require(SlotName::ReturnKey, 621709)?;
        outputs.set(SlotName::Result, return_key_slot);
        outputs.clear(SlotName::ReturnKey);

        Ok((stage, outputs))
    }
}
