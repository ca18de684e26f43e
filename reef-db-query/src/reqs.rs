//! Downward requirements and upward slot bindings
//!
//! Translators communicate through two value objects: `PlanStageReqs`
//! flows parent-to-child and names the slots the parent wants;
//! `PlanStageSlots` flows child-to-parent and names the slots the child
//! actually bound. Index-key components ride alongside as a positional
//! bitset (down) and an aligned slot vector (up).

use crate::slots::{SlotId, SlotIdGenerator};

/// The closed set of named slots translators exchange
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SlotName {
    /// The materialized document
    Result,
    /// The document's record id
    RecordId,
    /// The raw index key object (`returnKey` queries)
    ReturnKey,
    /// Latest oplog timestamp seen by a scan
    OplogTs,
}

impl SlotName {
    /// All names, in the fixed order used for slot-vector construction
    pub const ALL: [SlotName; 4] = [
        SlotName::Result,
        SlotName::RecordId,
        SlotName::ReturnKey,
        SlotName::OplogTs,
    ];

    fn index(self) -> usize {
        match self {
            SlotName::Result => 0,
            SlotName::RecordId => 1,
            SlotName::ReturnKey => 2,
            SlotName::OplogTs => 3,
        }
    }

    /// Display name used in debug output
    pub fn as_str(self) -> &'static str {
        match self {
            SlotName::Result => "result",
            SlotName::RecordId => "recordId",
            SlotName::ReturnKey => "returnKey",
            SlotName::OplogTs => "oplogTs",
        }
    }
}

/// Which positions of an index key pattern are wanted as scalar slots
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IndexKeyBitset(u64);

impl IndexKeyBitset {
    /// Empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Set covering positions `0..n`
    pub fn all(n: usize) -> Self {
        debug_assert!(n <= 64);
        if n == 0 {
            Self(0)
        } else {
            Self(u64::MAX >> (64 - n as u32))
        }
    }

    /// Set position `i`
    pub fn set(&mut self, i: usize) {
        debug_assert!(i < 64);
        self.0 |= 1 << i;
    }

    /// Whether position `i` is set
    pub fn test(&self, i: usize) -> bool {
        self.0 & (1 << i) != 0
    }

    /// Number of set positions
    pub fn count(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// Whether no position is set
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Union with another set
    pub fn union(self, other: IndexKeyBitset) -> IndexKeyBitset {
        IndexKeyBitset(self.0 | other.0)
    }

    /// Set positions in ascending order
    pub fn positions(&self) -> impl Iterator<Item = usize> + '_ {
        let bits = self.0;
        (0..64).filter(move |i| bits & (1 << i) != 0)
    }
}

/// Parent-to-child contract: which named slots and key components a
/// translator's caller wants, plus the tailable-union steering flags.
///
/// Composes by copy-then-modify: `reqs.clone().set(X).clear(Y)`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PlanStageReqs {
    wanted: [bool; 4],
    index_key_bitset: Option<IndexKeyBitset>,
    is_building_tailable_union: bool,
    is_tailable_resume_branch: bool,
}

impl PlanStageReqs {
    /// Requirements asking for nothing
    pub fn new() -> Self {
        Self::default()
    }

    /// Request `name`
    pub fn set(mut self, name: SlotName) -> Self {
        self.wanted[name.index()] = true;
        self
    }

    /// Request `name` iff `cond`
    pub fn set_if(mut self, name: SlotName, cond: bool) -> Self {
        if cond {
            self.wanted[name.index()] = true;
        }
        self
    }

    /// Withdraw a request for `name`
    pub fn clear(mut self, name: SlotName) -> Self {
        self.wanted[name.index()] = false;
        self
    }

    /// Whether `name` is requested
    pub fn has(&self, name: SlotName) -> bool {
        self.wanted[name.index()]
    }

    /// The requested index-key positions, if any
    pub fn index_key_bitset(&self) -> Option<IndexKeyBitset> {
        self.index_key_bitset
    }

    /// Replace the index-key request
    pub fn set_index_key_bitset(&mut self, bitset: Option<IndexKeyBitset>) {
        self.index_key_bitset = bitset;
    }

    /// Builder-style variant of [`set_index_key_bitset`](Self::set_index_key_bitset)
    pub fn with_index_key_bitset(mut self, bitset: Option<IndexKeyBitset>) -> Self {
        self.index_key_bitset = bitset;
        self
    }

    /// Whether a tailable union is currently being constructed
    pub fn is_building_tailable_union(&self) -> bool {
        self.is_building_tailable_union
    }

    /// Mark that a tailable union is being constructed
    pub fn set_building_tailable_union(&mut self, v: bool) {
        self.is_building_tailable_union = v;
    }

    /// Whether this subtree is the resume branch of a tailable union
    pub fn is_tailable_resume_branch(&self) -> bool {
        self.is_tailable_resume_branch
    }

    /// Mark this subtree as the resume branch of a tailable union
    pub fn set_tailable_resume_branch(&mut self, v: bool) {
        self.is_tailable_resume_branch = v;
    }
}

/// Child-to-parent result: the slots a subtree actually bound.
///
/// A name appears here only when the returned subtree materializes its
/// value; the optional index-key slot vector is aligned 1:1 with the
/// bitset that was passed downward.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PlanStageSlots {
    slots: [Option<SlotId>; 4],
    index_key_slots: Option<Vec<SlotId>>,
}

impl PlanStageSlots {
    /// Bindings with nothing bound
    pub fn new() -> Self {
        Self::default()
    }

    /// Bindings with a fresh slot for every name `reqs` asks for
    pub fn from_reqs(reqs: &PlanStageReqs, slot_gen: &mut SlotIdGenerator) -> Self {
        let mut out = Self::new();
        for name in SlotName::ALL {
            if reqs.has(name) {
                out.set(name, slot_gen.generate());
            }
        }
        out
    }

    /// Whether `name` is bound
    pub fn has(&self, name: SlotName) -> bool {
        self.slots[name.index()].is_some()
    }

    /// The slot bound to `name`, if any
    pub fn get(&self, name: SlotName) -> Option<SlotId> {
        self.slots[name.index()]
    }

    /// The slot bound to `name`, or a coded contract failure
    pub fn require(&self, name: SlotName, code: u32) -> crate::error::Result<SlotId> {
        self.slots[name.index()].ok_or_else(|| {
            crate::error::QueryError::internal(
                code,
                format!("{} slot is not defined", name.as_str()),
            )
        })
    }

    /// Bind `name` to `slot`
    pub fn set(&mut self, name: SlotName, slot: SlotId) {
        self.slots[name.index()] = Some(slot);
    }

    /// Remove the binding for `name`
    pub fn clear(&mut self, name: SlotName) {
        self.slots[name.index()] = None;
    }

    /// Visit the slots bound for the names `reqs` requests, in the fixed
    /// `SlotName` order. Names requested but not bound are skipped; the
    /// dispatcher separately enforces that this never happens.
    pub fn for_each_slot(&self, reqs: &PlanStageReqs, mut f: impl FnMut(SlotId)) {
        for name in SlotName::ALL {
            if reqs.has(name) {
                if let Some(slot) = self.get(name) {
                    f(slot);
                }
            }
        }
    }

    /// The slots for the names `reqs` requests, in the fixed order
    pub fn collect_slots(&self, reqs: &PlanStageReqs) -> Vec<SlotId> {
        let mut out = Vec::new();
        self.for_each_slot(reqs, |s| out.push(s));
        out
    }

    /// The index-key slot vector, if bound
    pub fn index_key_slots(&self) -> Option<&[SlotId]> {
        self.index_key_slots.as_deref()
    }

    /// Replace the index-key slot vector
    pub fn set_index_key_slots(&mut self, slots: Option<Vec<SlotId>>) {
        self.index_key_slots = slots;
    }

    /// Take the index-key slot vector, leaving none
    pub fn extract_index_key_slots(&mut self) -> Option<Vec<SlotId>> {
        self.index_key_slots.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reqs_copy_then_modify() {
        let reqs = PlanStageReqs::new().set(SlotName::Result);
        let child = reqs.clone().clear(SlotName::Result).set(SlotName::RecordId);

        assert!(reqs.has(SlotName::Result));
        assert!(!child.has(SlotName::Result));
        assert!(child.has(SlotName::RecordId));
    }

    #[test]
    fn test_bitset_all_and_positions() {
        let b = IndexKeyBitset::all(3);
        assert_eq!(b.count(), 3);
        assert!(b.test(0) && b.test(2));
        assert!(!b.test(3));
        assert_eq!(b.positions().collect::<Vec<_>>(), vec![0, 1, 2]);

        let mut c = IndexKeyBitset::new();
        c.set(5);
        let u = b.union(c);
        assert_eq!(u.positions().collect::<Vec<_>>(), vec![0, 1, 2, 5]);
    }

    #[test]
    fn test_from_reqs_binds_exactly_requested() {
        let mut slot_gen = SlotIdGenerator::new();
        let reqs = PlanStageReqs::new()
            .set(SlotName::Result)
            .set(SlotName::OplogTs);
        let outputs = PlanStageSlots::from_reqs(&reqs, &mut slot_gen);

        assert!(outputs.has(SlotName::Result));
        assert!(outputs.has(SlotName::OplogTs));
        assert!(!outputs.has(SlotName::RecordId));
        assert!(!outputs.has(SlotName::ReturnKey));
    }

    #[test]
    fn test_for_each_slot_fixed_order() {
        let mut outputs = PlanStageSlots::new();
        outputs.set(SlotName::OplogTs, SlotId(9));
        outputs.set(SlotName::Result, SlotId(3));
        outputs.set(SlotName::RecordId, SlotId(5));

        let reqs = PlanStageReqs::new()
            .set(SlotName::Result)
            .set(SlotName::RecordId)
            .set(SlotName::OplogTs);
        assert_eq!(
            outputs.collect_slots(&reqs),
            vec![SlotId(3), SlotId(5), SlotId(9)]
        );
    }

    #[test]
    fn test_require_reports_code() {
        let outputs = PlanStageSlots::new();
        match outputs.require(SlotName::RecordId, 624999) {
            Err(crate::error::QueryError::Internal { code, .. }) => assert_eq!(code, 624999),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
