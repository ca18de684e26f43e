//! Index-scan translator and body generator

use crate::builder::StageBuilder;
use crate::error::{ensure, Result};
use crate::expr::{self, ExprFn};
use crate::index_key::{make_index_key_output_slots_matching_parent_reqs, rehydrate_index_key};
use crate::reqs::{IndexKeyBitset, PlanStageReqs, PlanStageSlots, SlotName};
use crate::solution::IndexScanSpec;
use crate::stage::{PlanNodeId, Stage};

impl<'a> StageBuilder<'a> {
    /// Index-scan body generator: looks the index up in the catalog and
    /// emits the scan with one slot per requested key-pattern position.
    fn generate_index_scan(
        &mut self,
        node_id: PlanNodeId,
        spec: &IndexScanSpec,
        bitset: IndexKeyBitset,
    ) -> Result<(Stage, PlanStageSlots)> {
        self.op_ctx.check_for_interrupt().map_err(crate::error::QueryError::from)?;

        let descriptor = self
            .collection
            .find_index_descriptor(&spec.name)
            .ok_or_else(|| {
                crate::error::QueryError::internal(
                    621201,
                    format!(
                        "index descriptor not found for index '{}' in collection '{}'",
                        spec.name,
                        self.collection.name()
                    ),
                )
            })?;
        ensure(
            descriptor.key_pattern == spec.key_pattern,
            621202,
            format!(
                "plan-time key pattern for index '{}' does not match the catalog",
                spec.name
            ),
        )?;

        let key_slots = self.slot_gen.generate_multiple(bitset.count());
        let record_id_slot = self.slot_gen.generate();

        let stage = Stage::IndexScan {
            collection: self.collection.id(),
            index_name: spec.name.clone(),
            key_pattern: spec.key_pattern.clone(),
            key_bitset: bitset,
            key_slots: key_slots.clone(),
            record_id_slot,
            seek_points_spool: self.spool_gen.generate(),
            read_check: self.read_check.clone(),
            yields: self.yield_policy,
            node_id,
        };

        let mut outputs = PlanStageSlots::new();
        outputs.set(SlotName::RecordId, record_id_slot);
        outputs.set_index_key_slots(Some(key_slots));

        Ok((stage, outputs))
    }

    pub(crate) fn build_index_scan(
        &mut self,
        node_id: PlanNodeId,
        spec: &IndexScanSpec,
        reqs: &PlanStageReqs,
    ) -> Result<(Stage, PlanStageSlots)> {
        ensure(
            reqs.has(SlotName::ReturnKey) || !spec.add_key_metadata,
            621203,
            "index scan carries key metadata but no returnKey was requested",
        )?;
        // Index scans cannot produce an oplog timestamp.
        ensure(
            !reqs.has(SlotName::OplogTs),
            621204,
            "oplog timestamp requested from an index scan",
        )?;

        // Rebuilding the document or the raw key object needs every key
        // component, regardless of which positions the parent asked for.
        let bitset = if reqs.has(SlotName::ReturnKey) || reqs.has(SlotName::Result) {
            IndexKeyBitset::all(spec.key_pattern.len())
        } else {
            reqs.index_key_bitset().unwrap_or_default()
        };

        let (mut stage, mut outputs) = self.generate_index_scan(node_id, spec, bitset)?;

        let key_slots: Vec<_> = outputs
            .index_key_slots()
            .expect("index scan body binds key slots")
            .to_vec();

        if reqs.has(SlotName::ReturnKey) {
            let mut obj_args = Vec::with_capacity(spec.key_pattern.len() * 2);
            for (i, field) in spec.key_pattern.fields().iter().enumerate() {
                obj_args.push(expr::string(field.path.dotted()));
                obj_args.push(expr::variable(key_slots[i]));
            }

            let return_key_slot = self.slot_gen.generate();
            outputs.set(SlotName::ReturnKey, return_key_slot);
            stage = Stage::project_one(
                stage,
                node_id,
                return_key_slot,
                expr::func(ExprFn::NewObj, obj_args),
            );
        }

        if reqs.has(SlotName::Result) {
            let result_slot = self.slot_gen.generate();
            outputs.set(SlotName::Result, result_slot);
            stage = rehydrate_index_key(stage, &spec.key_pattern, node_id, &key_slots, result_slot);
        }

        // Hand back only the positions the parent originally asked for.
        if let Some(parent_bitset) = reqs.index_key_bitset() {
            outputs.set_index_key_slots(Some(make_index_key_output_slots_matching_parent_reqs(
                &spec.key_pattern,
                parent_bitset,
                bitset,
                &key_slots,
            )));
        } else {
            outputs.set_index_key_slots(None);
        }

        Ok((stage, outputs))
    }
}
