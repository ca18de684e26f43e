//! Hash and merge intersection translators
//!
//! Both fold left over the children, intersecting on record id with the
//! document as the carried payload. The first join's inner side keeps its
//! id/result slots as the designated outputs, so later joins stack
//! without renaming.

use crate::builder::StageBuilder;
use crate::error::{ensure, Result};
use crate::reqs::{PlanStageReqs, PlanStageSlots, SlotName};
use crate::solution::QuerySolution;
use crate::stage::{PlanNodeId, Stage};
use reef_db_core::SortDirection;

impl<'a> StageBuilder<'a> {
    pub(crate) fn build_and_hash(
        &mut self,
        node_id: PlanNodeId,
        children: &[QuerySolution],
        reqs: &PlanStageReqs,
    ) -> Result<(Stage, PlanStageSlots)> {
        ensure(
            children.len() >= 2,
            621501,
            "hash intersection needs at least two children",
        )?;

        // Every child must deliver both the document and its record id.
        let child_reqs = reqs.clone().set(SlotName::Result).set(SlotName::RecordId);

        let (outer_stage, outer_outputs) = self.build_node(&children[0], &child_reqs)?;
        let outer_id_slot = outer_outputs.require(SlotName::RecordId, 621502)?;
        let outer_result_slot = outer_outputs.require(SlotName::Result, 621503)?;

        let (inner_stage, inner_outputs) = self.build_node(&children[1], &child_reqs)?;
        let inner_id_slot = inner_outputs.require(SlotName::RecordId, 621504)?;
        let inner_result_slot = inner_outputs.require(SlotName::Result, 621505)?;

        let collator_slot = self.collator_slot();

        let mut outputs = PlanStageSlots::from_reqs(reqs, &mut self.slot_gen);
        if reqs.has(SlotName::RecordId) {
            outputs.set(SlotName::RecordId, inner_id_slot);
        }
        if reqs.has(SlotName::Result) {
            outputs.set(SlotName::Result, inner_result_slot);
        }

        let mut stage = Stage::HashJoin {
            outer: Box::new(outer_stage),
            inner: Box::new(inner_stage),
            outer_cond: vec![outer_id_slot],
            outer_project: vec![outer_result_slot],
            inner_cond: vec![inner_id_slot],
            inner_project: vec![inner_result_slot],
            collator_slot,
            node_id,
        };

        // Remaining children stack as new outer sides over the join built
        // so far, reusing the designated inner slots.
        for child in &children[2..] {
            let (child_stage, child_outputs) = self.build_node(child, &child_reqs)?;
            let id_slot = child_outputs.require(SlotName::RecordId, 621506)?;
            let result_slot = child_outputs.require(SlotName::Result, 621507)?;

            stage = Stage::HashJoin {
                outer: Box::new(child_stage),
                inner: Box::new(stage),
                outer_cond: vec![id_slot],
                outer_project: vec![result_slot],
                inner_cond: vec![inner_id_slot],
                inner_project: vec![inner_result_slot],
                collator_slot,
                node_id,
            };
        }

        Ok((stage, outputs))
    }

    pub(crate) fn build_and_sorted(
        &mut self,
        node_id: PlanNodeId,
        children: &[QuerySolution],
        reqs: &PlanStageReqs,
    ) -> Result<(Stage, PlanStageSlots)> {
        ensure(
            children.len() >= 2,
            621508,
            "merge intersection needs at least two children",
        )?;

        let child_reqs = reqs.clone().set(SlotName::Result).set(SlotName::RecordId);

        let (outer_stage, outer_outputs) = self.build_node(&children[0], &child_reqs)?;
        let outer_id_slot = outer_outputs.require(SlotName::RecordId, 621509)?;
        let outer_result_slot = outer_outputs.require(SlotName::Result, 621510)?;

        let (inner_stage, inner_outputs) = self.build_node(&children[1], &child_reqs)?;
        let inner_id_slot = inner_outputs.require(SlotName::RecordId, 621511)?;
        let inner_result_slot = inner_outputs.require(SlotName::Result, 621512)?;

        let mut outputs = PlanStageSlots::from_reqs(reqs, &mut self.slot_gen);
        if reqs.has(SlotName::RecordId) {
            outputs.set(SlotName::RecordId, inner_id_slot);
        }
        if reqs.has(SlotName::Result) {
            outputs.set(SlotName::Result, inner_result_slot);
        }

        // Record ids arrive in ascending order from every branch.
        let directions = vec![SortDirection::Ascending];

        let mut stage = Stage::MergeJoin {
            outer: Box::new(outer_stage),
            inner: Box::new(inner_stage),
            outer_keys: vec![outer_id_slot],
            outer_project: vec![outer_result_slot],
            inner_keys: vec![inner_id_slot],
            inner_project: vec![inner_result_slot],
            directions: directions.clone(),
            node_id,
        };

        for child in &children[2..] {
            let (child_stage, child_outputs) = self.build_node(child, &child_reqs)?;
            let id_slot = child_outputs.require(SlotName::RecordId, 621513)?;
            let result_slot = child_outputs.require(SlotName::Result, 621514)?;

            stage = Stage::MergeJoin {
                outer: Box::new(child_stage),
                inner: Box::new(stage),
                outer_keys: vec![id_slot],
                outer_project: vec![result_slot],
                inner_keys: vec![inner_id_slot],
                inner_project: vec![inner_result_slot],
                directions: directions.clone(),
                node_id,
            };
        }

        Ok((stage, outputs))
    }
}
