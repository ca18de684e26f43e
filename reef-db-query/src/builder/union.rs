//! Union translators: `or` plans and the tailable anchor/resume union

use crate::builder::StageBuilder;
use crate::env::{names, RuntimeValue};
use crate::error::{ensure, Result};
use crate::expr;
use crate::filter::{self, MatchExpr};
use crate::reqs::{PlanStageReqs, PlanStageSlots, SlotName};
use crate::solution::QuerySolution;
use crate::stage::{PlanNodeId, Stage};

impl<'a> StageBuilder<'a> {
    pub(crate) fn build_or(
        &mut self,
        node_id: PlanNodeId,
        children: &[QuerySolution],
        dedup: bool,
        residual_filter: Option<&MatchExpr>,
        reqs: &PlanStageReqs,
    ) -> Result<(Stage, PlanStageSlots)> {
        ensure(
            reqs.index_key_bitset().is_none(),
            621601,
            "index key components requested from an or plan",
        )?;

        // Children also deliver the document when a residual filter needs
        // it, and record ids when deduplication is on.
        let child_reqs = reqs
            .clone()
            .set_if(SlotName::Result, residual_filter.is_some())
            .set_if(SlotName::RecordId, dedup);

        let mut branches = Vec::with_capacity(children.len());
        let mut branch_slots = Vec::with_capacity(children.len());
        for child in children {
            let (stage, outputs) = self.build_node(child, &child_reqs)?;
            branch_slots.push(outputs.collect_slots(&child_reqs));
            branches.push(stage);
        }

        let outputs = PlanStageSlots::from_reqs(&child_reqs, &mut self.slot_gen);
        let out_slots = outputs.collect_slots(&child_reqs);

        let mut stage = Stage::Union {
            branches,
            branch_slots,
            out_slots,
            node_id,
        };

        if dedup {
            let record_id_slot = outputs.require(SlotName::RecordId, 621602)?;
            stage = Stage::Unique {
                input: Box::new(stage),
                key_slots: vec![record_id_slot],
                node_id,
            };
        }

        if let Some(residual) = residual_filter {
            let result_slot = outputs.require(SlotName::Result, 621603)?;
            stage = filter::generate_filter(stage, residual, result_slot, node_id);
        }

        Ok((stage, outputs))
    }

    /// Tailable scans resume from the last record id seen. The subtree is
    /// built twice and glued into a union:
    ///
    /// - the anchor branch runs while `resumeRecordId` is absent and keeps
    ///   its limit/skip operators;
    /// - the resume branch runs once `resumeRecordId` is set, seeks to it,
    ///   drops inner limit/skip operators, and is capped at one row so it
    ///   cannot re-trigger itself.
    ///
    /// The executor's driver rebinds `resumeRecordId` between iterations.
    pub(crate) fn build_tailable_union(
        &mut self,
        root: &QuerySolution,
        reqs: &PlanStageReqs,
    ) -> Result<(Stage, PlanStageSlots)> {
        ensure(
            reqs.index_key_bitset().is_none(),
            621604,
            "index key components requested from a tailable union",
        )?;

        let node_id = root.node_id;
        let resume_slot = self.data.env.register_slot(
            names::RESUME_RECORD_ID,
            RuntimeValue::Nothing,
            &mut self.slot_gen,
        )?;

        // Anchor branch: gated on the resume record id being absent.
        let anchor_reqs = reqs.clone();
        let (anchor_stage, anchor_outputs) = self.build_node(root, &anchor_reqs)?;
        let anchor_slots = anchor_outputs.collect_slots(reqs);
        let anchor_stage = Stage::const_filter(
            anchor_stage,
            expr::not(expr::exists(expr::variable(resume_slot))),
            node_id,
        );

        // Resume branch: gated on the resume record id being present,
        // capped at one row.
        let mut resume_reqs = reqs.clone();
        resume_reqs.set_tailable_resume_branch(true);
        let (resume_stage, resume_outputs) = self.build_node(root, &resume_reqs)?;
        let resume_slots = resume_outputs.collect_slots(reqs);
        let resume_stage = Stage::const_filter(
            Stage::limit_skip(resume_stage, Some(1), None, node_id),
            expr::exists(expr::variable(resume_slot)),
            node_id,
        );

        ensure(
            anchor_slots.len() == resume_slots.len(),
            621605,
            "tailable union branches bound different slot sets",
        )?;

        let outputs = PlanStageSlots::from_reqs(reqs, &mut self.slot_gen);
        let out_slots = outputs.collect_slots(reqs);

        let stage = Stage::Union {
            branches: vec![anchor_stage, resume_stage],
            branch_slots: vec![anchor_slots, resume_slots],
            out_slots,
            node_id,
        };

        Ok((stage, outputs))
    }
}
