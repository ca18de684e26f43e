//! Projection expression sub-builder
//!
//! Lowers a field-list projection into an object-construction stage over
//! the slot holding the document. This is the seam the full projection
//! compiler plugs into; inclusion and exclusion lists cover the
//! projection-default plans the upstream planner emits here.

use crate::slots::{SlotId, SlotIdGenerator};
use crate::stage::{FieldBehavior, PlanNodeId, Stage};

/// A field-list projection
#[derive(Clone, Debug, PartialEq)]
pub enum Projection {
    /// Keep only the listed top-level fields
    Include(Vec<String>),
    /// Keep everything but the listed top-level fields
    Exclude(Vec<String>),
}

impl Projection {
    /// The fields the projection names
    pub fn fields(&self) -> &[String] {
        match self {
            Projection::Include(f) | Projection::Exclude(f) => f,
        }
    }
}

/// Build the object described by `projection` from the document in
/// `result_slot`, binding it to a fresh slot.
pub fn generate_projection(
    stage: Stage,
    projection: &Projection,
    result_slot: SlotId,
    slot_gen: &mut SlotIdGenerator,
    node_id: PlanNodeId,
) -> (SlotId, Stage) {
    let out_slot = slot_gen.generate();
    let (behavior, fields) = match projection {
        Projection::Include(f) => (FieldBehavior::Keep, f.clone()),
        Projection::Exclude(f) => (FieldBehavior::Drop, f.clone()),
    };

    let stage = Stage::MakeObj {
        input: Box::new(stage),
        obj_slot: out_slot,
        root_slot: Some(result_slot),
        field_behavior: behavior,
        fields,
        project_fields: Vec::new(),
        project_slots: Vec::new(),
        node_id,
    };

    (out_slot, stage)
}
