//! Collection-scan and virtual-scan translators
//!
//! The collection-scan body generator lives here too: it is the one place
//! that knows how a scan binds its result/record-id slots, how the oplog
//! timestamp rides along as an extracted field, and how a tailable resume
//! branch seeks to the `resumeRecordId` environment slot.

use crate::builder::StageBuilder;
use crate::env::names;
use crate::error::{ensure, Result};
use crate::expr;
use crate::filter::{self, MatchExpr};
use crate::reqs::{PlanStageReqs, PlanStageSlots, SlotName};
use crate::stage::{PlanNodeId, Stage};
use reef_db_core::KeyPattern;
use serde_json::Value;

/// Top-level document field the oplog timestamp is read from
const OPLOG_TS_FIELD: &str = "ts";

impl<'a> StageBuilder<'a> {
    /// Collection-scan body generator: emits the scan stage and binds its
    /// result and record-id slots (plus `oplogTs` when tracked).
    pub(crate) fn generate_collection_scan(
        &mut self,
        node_id: PlanNodeId,
        filter: Option<&MatchExpr>,
        track_latest_oplog_timestamp: bool,
        is_resume_branch: bool,
    ) -> Result<(Stage, PlanStageSlots)> {
        let result_slot = self.slot_gen.generate();
        let record_id_slot = self.slot_gen.generate();

        let mut outputs = PlanStageSlots::new();
        let mut fields = Vec::new();
        let mut field_slots = Vec::new();

        if track_latest_oplog_timestamp {
            let ts_slot = self.slot_gen.generate();
            fields.push(OPLOG_TS_FIELD.to_string());
            field_slots.push(ts_slot);
            outputs.set(SlotName::OplogTs, ts_slot);
        }

        // The resume branch of a tailable union restarts the scan at the
        // record id the executor last published into the environment.
        let seek_record_id_slot = if is_resume_branch {
            let slot = self.data.env.get_slot(names::RESUME_RECORD_ID);
            ensure(
                slot.is_some(),
                621101,
                "resume record id slot is not registered in the runtime environment",
            )?;
            slot
        } else {
            None
        };

        let mut stage = Stage::Scan {
            collection: self.collection.id(),
            result_slot,
            record_id_slot,
            fields,
            field_slots,
            seek_record_id_slot,
            read_check: self.read_check.clone(),
            yields: self.yield_policy,
            node_id,
        };

        outputs.set(SlotName::Result, result_slot);
        outputs.set(SlotName::RecordId, record_id_slot);

        if let Some(filter) = filter {
            stage = filter::generate_filter(stage, filter, result_slot, node_id);
        }

        Ok((stage, outputs))
    }

    pub(crate) fn build_coll_scan(
        &mut self,
        node_id: PlanNodeId,
        filter: Option<&MatchExpr>,
        track_latest_oplog_timestamp: bool,
        reqs: &PlanStageReqs,
    ) -> Result<(Stage, PlanStageSlots)> {
        ensure(
            reqs.index_key_bitset().is_none(),
            621102,
            "index key components requested from a collection scan",
        )?;

        let (mut stage, mut outputs) = self.generate_collection_scan(
            node_id,
            filter,
            track_latest_oplog_timestamp,
            reqs.is_tailable_resume_branch(),
        )?;

        if reqs.has(SlotName::ReturnKey) {
            // Collection scans have no index key; returnKey is the empty object.
            let return_key_slot = self.slot_gen.generate();
            outputs.set(SlotName::ReturnKey, return_key_slot);
            stage = Stage::project_one(stage, node_id, return_key_slot, expr::empty_object());
        }

        ensure(
            !reqs.has(SlotName::OplogTs) || outputs.has(SlotName::OplogTs),
            621103,
            "collection scan did not bind the requested oplog timestamp slot",
        )?;

        Ok((stage, outputs))
    }

    pub(crate) fn build_virtual_scan(
        &mut self,
        node_id: PlanNodeId,
        docs: &[Value],
        has_record_id: bool,
        index_key_pattern: Option<&KeyPattern>,
        reqs: &PlanStageReqs,
    ) -> Result<(Stage, PlanStageSlots)> {
        // Key components can only be requested when the node mocks an
        // index scan.
        if index_key_pattern.is_none() {
            ensure(
                reqs.index_key_bitset().is_none(),
                621104,
                "index key components requested from a plain virtual scan",
            )?;
        }
        ensure(
            !reqs.has(SlotName::OplogTs),
            621105,
            "oplog timestamp requested from a virtual scan",
        )?;

        // With record ids, each inline row is a [recordId, doc] pair and
        // the scan is two-output.
        let (out_slots, result_slot) = if has_record_id {
            let slots = self.slot_gen.generate_multiple(2);
            let result = slots[1];
            (slots, result)
        } else {
            let slot = self.slot_gen.generate();
            (vec![slot], slot)
        };

        let mut stage = Stage::VirtualScan {
            docs: docs.to_vec(),
            out_slots: out_slots.clone(),
            node_id,
        };

        let mut outputs = PlanStageSlots::new();

        if reqs.has(SlotName::Result) {
            outputs.set(SlotName::Result, result_slot);
        } else if let (Some(bitset), Some(key_pattern)) =
            (reqs.index_key_bitset(), index_key_pattern)
        {
            ensure(
                !key_pattern.is_empty(),
                621106,
                "virtual scan mocking an index scan has an empty key pattern",
            )?;

            // Mock index keys are plain documents; pull the requested
            // components out with getField.
            let mut index_key_slots = Vec::new();
            let mut binds = Vec::new();
            for (pos, field) in key_pattern.fields().iter().enumerate() {
                if bitset.test(pos) {
                    let slot = self.slot_gen.generate();
                    binds.push((
                        slot,
                        expr::get_field(expr::variable(result_slot), &field.path.dotted()),
                    ));
                    index_key_slots.push(slot);
                }
            }

            stage = Stage::Project {
                input: Box::new(stage),
                binds,
                node_id,
            };
            outputs.set_index_key_slots(Some(index_key_slots));
        }

        if reqs.has(SlotName::RecordId) {
            ensure(
                has_record_id,
                621107,
                "record id requested from a virtual scan without record ids",
            )?;
            outputs.set(SlotName::RecordId, out_slots[0]);
        }

        Ok((stage, outputs))
    }
}
