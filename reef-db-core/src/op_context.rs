//! Operation context and execution-time read checks
//!
//! An `OperationContext` represents one running client operation. The stage
//! builder runs cooperatively inside it: no internal concurrency, and
//! interruption is only observed where the builder touches the catalog.

use crate::catalog::CollectionHandle;
use crate::collation::TimeZoneDatabase;
use crate::error::Result;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Context of a single running operation
pub struct OperationContext {
    time_zone_db: Arc<TimeZoneDatabase>,
    interrupted: AtomicBool,
}

impl OperationContext {
    /// Create a context with a fresh timezone database handle
    pub fn new() -> Self {
        Self {
            time_zone_db: Arc::new(TimeZoneDatabase::new()),
            interrupted: AtomicBool::new(false),
        }
    }

    /// The process-wide timezone database
    pub fn time_zone_database(&self) -> &Arc<TimeZoneDatabase> {
        &self.time_zone_db
    }

    /// Mark the operation as interrupted (killed, timed out)
    pub fn mark_interrupted(&self) {
        self.interrupted.store(true, Ordering::Relaxed);
    }

    /// Fail if the operation has been interrupted
    pub fn check_for_interrupt(&self) -> Result<()> {
        if self.interrupted.load(Ordering::Relaxed) {
            Err(crate::error::Error::Interrupted)
        } else {
            Ok(())
        }
    }
}

impl Default for OperationContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for OperationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationContext")
            .field("interrupted", &self.interrupted.load(Ordering::Relaxed))
            .finish()
    }
}

/// Yield policy handed to scan operators
///
/// Controls how often an executing scan surrenders its storage snapshot.
/// The builder forwards it verbatim; only the executor interprets it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct YieldPolicy {
    /// Number of works between yield points
    pub yield_interval: u32,
}

impl YieldPolicy {
    /// Policy yielding every `yield_interval` works
    pub fn every(yield_interval: u32) -> Self {
        Self { yield_interval }
    }
}

/// Execution-time read-availability check injected into scan operators.
///
/// Invoked on every execution-time path that opens the collection; must
/// fail the operation when the node cannot serve reads for it.
#[derive(Clone)]
pub struct ReadAvailabilityCallback(
    Arc<dyn Fn(&OperationContext, &CollectionHandle) -> Result<()> + Send + Sync>,
);

impl ReadAvailabilityCallback {
    /// Wrap a check function
    pub fn new(
        f: impl Fn(&OperationContext, &CollectionHandle) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        Self(Arc::new(f))
    }

    /// Run the check
    pub fn check(&self, op_ctx: &OperationContext, collection: &CollectionHandle) -> Result<()> {
        (self.0)(op_ctx, collection)
    }
}

impl fmt::Debug for ReadAvailabilityCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ReadAvailabilityCallback")
    }
}

impl PartialEq for ReadAvailabilityCallback {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interrupt_flag() {
        let ctx = OperationContext::new();
        assert!(ctx.check_for_interrupt().is_ok());
        ctx.mark_interrupted();
        assert!(ctx.check_for_interrupt().is_err());
    }
}
