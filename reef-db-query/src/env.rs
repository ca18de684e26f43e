//! Runtime environment: named global slots
//!
//! The environment is a per-build registry of slots addressed by name
//! rather than by position in the stage tree. Three names are contractual:
//! `timeZoneDB` (always installed), `collator` (iff the query collates),
//! and `resumeRecordId` (installed only while a tailable union is built;
//! the executor's driver rebinds it between iterations).

use crate::error::{ensure, Result};
use crate::slots::{SlotId, SlotIdGenerator};
use reef_db_core::{Collator, TimeZoneDatabase};
use std::fmt::Write as _;
use std::sync::Arc;

/// Contractual slot names
pub mod names {
    pub const TIME_ZONE_DB: &str = "timeZoneDB";
    pub const COLLATOR: &str = "collator";
    pub const RESUME_RECORD_ID: &str = "resumeRecordId";
}

/// Initial value of a named global slot
#[derive(Clone, Debug)]
pub enum RuntimeValue {
    /// Absent value; the executor may rebind the slot later
    Nothing,
    /// Unowned timezone database handle
    TimeZoneDb(Arc<TimeZoneDatabase>),
    /// Unowned collator handle
    Collator(Arc<Collator>),
}

/// Per-build registry of named global slots
#[derive(Debug, Default)]
pub struct RuntimeEnvironment {
    // Insertion-ordered; the registry never holds more than a handful of
    // entries, so linear lookup beats a map here.
    slots: Vec<(String, SlotId, RuntimeValue)>,
}

impl RuntimeEnvironment {
    /// Create an empty environment
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a named slot with its initial value.
    ///
    /// Registering the same name twice is a contract violation.
    pub fn register_slot(
        &mut self,
        name: &str,
        value: RuntimeValue,
        slot_gen: &mut SlotIdGenerator,
    ) -> Result<SlotId> {
        ensure(
            self.get_slot(name).is_none(),
            623101,
            format!("runtime environment slot '{name}' registered twice"),
        )?;
        let slot = slot_gen.generate();
        self.slots.push((name.to_string(), slot, value));
        Ok(slot)
    }

    /// Look up a named slot, if registered
    pub fn get_slot(&self, name: &str) -> Option<SlotId> {
        self.slots
            .iter()
            .find(|(n, _, _)| n == name)
            .map(|(_, s, _)| *s)
    }

    /// Initial value of a named slot, if registered
    pub fn get_value(&self, name: &str) -> Option<&RuntimeValue> {
        self.slots
            .iter()
            .find(|(n, _, _)| n == name)
            .map(|(_, _, v)| v)
    }

    /// Registered names in insertion order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.slots.iter().map(|(n, _, _)| n.as_str())
    }

    /// One-line rendering of the registry for plan debug output
    pub fn debug_string(&self) -> String {
        let mut out = String::from("env: [");
        for (name, slot, _) in &self.slots {
            let _ = write!(out, " {name}={slot}");
        }
        out.push_str(" ]");
        out
    }
}
