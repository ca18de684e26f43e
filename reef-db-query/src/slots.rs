//! Slot, frame and spool identifiers
//!
//! Compiled plans address runtime values through compact integer ids:
//! slots for operator outputs, frames for expression-local bindings, and
//! spools for buffered sub-results. All three are minted by monotonic
//! generators owned by a single build; ids are never reused within a plan.

use std::fmt;

/// Addressable location for one runtime value
///
/// Ids start at 1, so a bound slot id is always non-zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(pub u32);

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// Scope id for expression-local bindings
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FrameId(pub u32);

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "f{}", self.0)
    }
}

/// Id of a buffered sub-result shared between plan stages
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SpoolId(pub u32);

impl fmt::Display for SpoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sp{}", self.0)
    }
}

macro_rules! generator {
    ($name:ident, $id:ident) => {
        /// Monotonic id factory, owned by one build
        #[derive(Debug, Default)]
        pub struct $name {
            next: u32,
        }

        impl $name {
            /// Create a generator starting at id 1
            pub fn new() -> Self {
                Self::default()
            }

            /// Mint the next id
            pub fn generate(&mut self) -> $id {
                self.next += 1;
                $id(self.next)
            }

            /// Mint `n` consecutive ids
            pub fn generate_multiple(&mut self, n: usize) -> Vec<$id> {
                (0..n).map(|_| self.generate()).collect()
            }
        }
    };
}

generator!(SlotIdGenerator, SlotId);
generator!(FrameIdGenerator, FrameId);
generator!(SpoolIdGenerator, SpoolId);
