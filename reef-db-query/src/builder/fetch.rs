//! Fetch translator: seek-by-record-id via a nested-loop join

use crate::builder::StageBuilder;
use crate::error::{ensure, Result};
use crate::filter::{self, MatchExpr};
use crate::reqs::{PlanStageReqs, PlanStageSlots, SlotName};
use crate::slots::SlotId;
use crate::solution::QuerySolution;
use crate::stage::{PlanNodeId, Stage};

impl<'a> StageBuilder<'a> {
    /// Join `input` against a one-row collection scan that seeks to the
    /// record id held in `seek_slot`. Returns the inner side's result and
    /// record-id slots plus the join stage.
    pub(crate) fn make_loop_join_for_fetch(
        &mut self,
        input: Stage,
        seek_slot: SlotId,
        node_id: PlanNodeId,
        slots_to_forward: Vec<SlotId>,
    ) -> (SlotId, SlotId, Stage) {
        let result_slot = self.slot_gen.generate();
        let record_id_slot = self.slot_gen.generate();

        // Inner side: scan the collection from the sought record id,
        // limited to one row.
        let seek_stage = Stage::Scan {
            collection: self.collection.id(),
            result_slot,
            record_id_slot,
            fields: Vec::new(),
            field_slots: Vec::new(),
            seek_record_id_slot: Some(seek_slot),
            read_check: self.read_check.clone(),
            yields: self.yield_policy,
            node_id,
        };

        let stage = Stage::LoopJoin {
            outer: Box::new(input),
            inner: Box::new(Stage::limit_skip(seek_stage, Some(1), None, node_id)),
            outer_project: slots_to_forward,
            correlated: vec![seek_slot],
            predicate: None,
            node_id,
        };

        (result_slot, record_id_slot, stage)
    }

    pub(crate) fn build_fetch(
        &mut self,
        node_id: PlanNodeId,
        child: &QuerySolution,
        residual_filter: Option<&MatchExpr>,
        reqs: &PlanStageReqs,
    ) -> Result<(Stage, PlanStageSlots)> {
        // The loop join below has no way to thread an oplog timestamp.
        ensure(
            !reqs.has(SlotName::OplogTs),
            621301,
            "oplog timestamp requested from a fetch",
        )?;

        // The child provides everything the parent wants except the
        // document itself, and must always provide the record id the seek
        // consumes.
        let child_reqs = reqs
            .clone()
            .clear(SlotName::Result)
            .set(SlotName::RecordId);

        let (stage, mut outputs) = self.build_node(child, &child_reqs)?;

        let seek_slot = outputs.require(SlotName::RecordId, 621302)?;
        ensure(
            !reqs.has(SlotName::ReturnKey) || outputs.has(SlotName::ReturnKey),
            621303,
            "returnKey slot is not defined",
        )?;

        let forwarding_reqs = reqs
            .clone()
            .clear(SlotName::Result)
            .clear(SlotName::RecordId);

        let mut relevant_slots = outputs.collect_slots(&forwarding_reqs);
        if let Some(index_key_slots) = outputs.index_key_slots() {
            relevant_slots.extend_from_slice(index_key_slots);
        }

        let (fetch_result_slot, fetch_record_id_slot, mut stage) =
            self.make_loop_join_for_fetch(stage, seek_slot, node_id, relevant_slots);

        outputs.set(SlotName::Result, fetch_result_slot);
        outputs.set(SlotName::RecordId, fetch_record_id_slot);

        if let Some(residual) = residual_filter {
            stage = filter::generate_filter(stage, residual, fetch_result_slot, node_id);
        }

        Ok((stage, outputs))
    }
}
