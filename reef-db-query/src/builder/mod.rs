//! The slot-based stage builder
//!
//! A single-pass, post-order lowering from logical `QuerySolution` trees
//! to physical `Stage` trees. Each translator receives the parent's
//! requirements, recurses into children with possibly-augmented
//! requirements, composes physical operators, and returns the slots it
//! bound. One builder instance constructs exactly one tree.

mod fetch;
mod index_scan;
mod intersect;
mod project;
mod scan;
mod shard;
mod sort;
mod text;
mod union;


use crate::env::{names, RuntimeEnvironment, RuntimeValue};
use crate::error::{ensure, QueryError, Result};
use crate::expr::{self, Constant};
use crate::reqs::{PlanStageReqs, PlanStageSlots, SlotName};
use crate::slots::{FrameIdGenerator, SlotId, SlotIdGenerator, SpoolIdGenerator};
use crate::solution::{QuerySolution, QuerySolutionTree, SolutionKind};
use crate::stage::{PlanNodeId, Stage};
use crate::query::CanonicalQuery;
use reef_db_core::{
    CollectionHandle, OperationContext, ReadAvailabilityCallback, ShardFiltererFactory,
    YieldPolicy,
};
use std::fmt::Write as _;

/// Everything the executor needs alongside the stage tree: the runtime
/// environment, the top-level slot bindings, and the plan-wide flags
/// precomputed from the solution tree.
#[derive(Debug)]
pub struct PlanStageData {
    pub env: RuntimeEnvironment,
    pub outputs: PlanStageSlots,
    pub should_track_latest_oplog_timestamp: bool,
    pub should_track_resume_token: bool,
    pub should_use_tailable_scan: bool,
}

impl PlanStageData {
    fn new(env: RuntimeEnvironment) -> Self {
        Self {
            env,
            outputs: PlanStageSlots::new(),
            should_track_latest_oplog_timestamp: false,
            should_track_resume_token: false,
            should_use_tailable_scan: false,
        }
    }

    /// One-line description of the top-level slots and the environment
    pub fn debug_string(&self) -> String {
        let mut out = String::new();
        if let Some(slot) = self.outputs.get(SlotName::Result) {
            let _ = write!(out, "$$RESULT={slot} ");
        }
        if let Some(slot) = self.outputs.get(SlotName::RecordId) {
            let _ = write!(out, "$$RID={slot} ");
        }
        if let Some(slot) = self.outputs.get(SlotName::OplogTs) {
            let _ = write!(out, "$$OPLOGTS={slot} ");
        }
        out.push_str(&self.env.debug_string());
        out
    }
}

fn make_read_availability_callback(check: bool) -> Option<ReadAvailabilityCallback> {
    if !check {
        return None;
    }

    Some(ReadAvailabilityCallback::new(|op_ctx, _collection| {
        // A standalone node always serves reads; replicated deployments
        // swap in a coordinator-aware check here.
        op_ctx.check_for_interrupt()
    }))
}

/// The builder. Owns the id generators and runtime environment for one
/// build; consumed by [`build`](StageBuilder::build), so a second build
/// on the same instance cannot compile.
pub struct StageBuilder<'a> {
    op_ctx: &'a OperationContext,
    collection: &'a CollectionHandle,
    query: &'a CanonicalQuery,
    solution: &'a QuerySolutionTree,
    yield_policy: Option<YieldPolicy>,
    shard_filterer_factory: Option<&'a dyn ShardFiltererFactory>,
    slot_gen: SlotIdGenerator,
    frame_gen: FrameIdGenerator,
    spool_gen: SpoolIdGenerator,
    data: PlanStageData,
    should_produce_record_id_slot: bool,
    read_check: Option<ReadAvailabilityCallback>,
}

impl<'a> StageBuilder<'a> {
    /// Set up a builder for one solution tree.
    ///
    /// Installs the runtime environment (`timeZoneDB` always, `collator`
    /// iff the query collates) and runs the prelude scan that derives the
    /// plan-wide flags from the first collection-scan / virtual-scan node.
    pub fn new(
        op_ctx: &'a OperationContext,
        collection: &'a CollectionHandle,
        query: &'a CanonicalQuery,
        solution: &'a QuerySolutionTree,
        yield_policy: Option<YieldPolicy>,
        shard_filterer_factory: Option<&'a dyn ShardFiltererFactory>,
    ) -> Result<Self> {
        let mut slot_gen = SlotIdGenerator::new();
        let mut env = RuntimeEnvironment::new();

        env.register_slot(
            names::TIME_ZONE_DB,
            RuntimeValue::TimeZoneDb(op_ctx.time_zone_database().clone()),
            &mut slot_gen,
        )?;
        if let Some(collator) = &query.collator {
            env.register_slot(
                names::COLLATOR,
                RuntimeValue::Collator(collator.clone()),
                &mut slot_gen,
            )?;
        }

        let mut data = PlanStageData::new(env);
        let mut should_produce_record_id_slot = false;

        if let Some(node) = solution
            .root
            .find_first(&|n| matches!(n.kind, SolutionKind::CollScan { .. }))
        {
            if let SolutionKind::CollScan {
                tailable,
                track_latest_oplog_timestamp,
                request_resume_token,
                ..
            } = &node.kind
            {
                data.should_track_latest_oplog_timestamp = *track_latest_oplog_timestamp;
                data.should_track_resume_token = *request_resume_token;
                data.should_use_tailable_scan = *tailable;
            }
        }

        if let Some(node) = solution
            .root
            .find_first(&|n| matches!(n.kind, SolutionKind::VirtualScan { .. }))
        {
            if let SolutionKind::VirtualScan { has_record_id, .. } = &node.kind {
                should_produce_record_id_slot = *has_record_id;
            }
        }

        Ok(Self {
            op_ctx,
            collection,
            query,
            solution,
            yield_policy,
            shard_filterer_factory,
            slot_gen,
            frame_gen: FrameIdGenerator::new(),
            spool_gen: SpoolIdGenerator::new(),
            data,
            should_produce_record_id_slot,
            read_check: make_read_availability_callback(solution.check_can_serve_reads),
        })
    }

    /// Lower the whole solution tree.
    ///
    /// The top-level contract: a `result` slot always, a `recordId` slot
    /// when a virtual scan supplies record ids, an `oplogTs` slot when the
    /// plan tracks the latest oplog timestamp.
    pub fn build(mut self) -> Result<(Stage, PlanStageData)> {
        let reqs = PlanStageReqs::new()
            .set(SlotName::Result)
            .set_if(SlotName::RecordId, self.should_produce_record_id_slot)
            .set_if(
                SlotName::OplogTs,
                self.data.should_track_latest_oplog_timestamp,
            );

        let solution = self.solution;
        let (stage, outputs) = self.build_node(&solution.root, &reqs)?;

        ensure(
            outputs.has(SlotName::Result),
            621001,
            "plan did not bind a result slot",
        )?;
        ensure(
            !self.should_produce_record_id_slot || outputs.has(SlotName::RecordId),
            621002,
            "plan did not bind a record id slot",
        )?;
        ensure(
            !self.data.should_track_latest_oplog_timestamp || outputs.has(SlotName::OplogTs),
            621003,
            "plan did not bind an oplog timestamp slot",
        )?;

        self.data.outputs = outputs;
        tracing::debug!(plan = %self.data.debug_string(), "stage tree built");
        Ok((stage, self.data))
    }

    /// Dispatch one logical node to its translator.
    ///
    /// Tailable queries divert here: the outermost of collscan/limit/skip
    /// becomes the root of an anchor/resume union (limit and skip split
    /// into the branches, so they divert along with the scan).
    pub(crate) fn build_node(
        &mut self,
        node: &QuerySolution,
        reqs: &PlanStageReqs,
    ) -> Result<(Stage, PlanStageSlots)> {
        if matches!(
            node.kind,
            SolutionKind::CollScan { .. } | SolutionKind::Limit { .. } | SolutionKind::Skip { .. }
        ) && self.query.tailable
            && !reqs.is_building_tailable_union()
        {
            let mut child_reqs = reqs.clone();
            child_reqs.set_building_tailable_union(true);
            return self.build_tailable_union(node, &child_reqs);
        }

        let node_id = node.node_id;
        let (stage, outputs) = match &node.kind {
            SolutionKind::CollScan {
                filter,
                track_latest_oplog_timestamp,
                ..
            } => self.build_coll_scan(
                node_id,
                filter.as_ref(),
                *track_latest_oplog_timestamp,
                reqs,
            ),
            SolutionKind::VirtualScan {
                docs,
                has_record_id,
                index_key_pattern,
            } => self.build_virtual_scan(
                node_id,
                docs,
                *has_record_id,
                index_key_pattern.as_ref(),
                reqs,
            ),
            SolutionKind::IndexScan { index } => self.build_index_scan(node_id, index, reqs),
            SolutionKind::Fetch { child, filter } => {
                self.build_fetch(node_id, child, filter.as_ref(), reqs)
            }
            SolutionKind::Limit { child, limit } => self.build_limit(node_id, child, *limit, reqs),
            SolutionKind::Skip { child, skip } => self.build_skip(node_id, child, *skip, reqs),
            SolutionKind::Sort {
                child,
                algo: _,
                pattern,
                limit,
                max_memory_bytes,
            } => self.build_sort(node_id, child, pattern, *limit, *max_memory_bytes, reqs),
            SolutionKind::SortKeyGenerator { .. } => Err(QueryError::unsupported(
                621004,
                "sort key generator plans are not supported by the slot-based engine",
            )),
            SolutionKind::SortMerge {
                children,
                pattern,
                dedup,
            } => self.build_sort_merge(node_id, children, pattern, *dedup, reqs),
            SolutionKind::Or {
                children,
                dedup,
                filter,
            }
            | SolutionKind::TextOr {
                children,
                dedup,
                filter,
            } => self.build_or(node_id, children, *dedup, filter.as_ref(), reqs),
            SolutionKind::TextMatch {
                child,
                index_name,
                query,
            } => self.build_text_match(node_id, child, index_name, query, reqs),
            SolutionKind::ReturnKey { child } => self.build_return_key(node_id, child, reqs),
            SolutionKind::Eof => self.generate_eof_plan(node_id, reqs),
            SolutionKind::AndHash { children } => self.build_and_hash(node_id, children, reqs),
            SolutionKind::AndSorted { children } => self.build_and_sorted(node_id, children, reqs),
            SolutionKind::ProjectionSimple { child, fields } => {
                self.build_projection_simple(node_id, child, fields, reqs)
            }
            SolutionKind::ProjectionCovered {
                child,
                fields,
                covered_key_pattern,
            } => self.build_projection_covered(node_id, child, fields, covered_key_pattern, reqs),
            SolutionKind::ProjectionDefault { child, projection } => {
                self.build_projection_default(node_id, child, projection, reqs)
            }
            SolutionKind::ShardingFilter { child } => self.build_shard_filter(node_id, child, reqs),
        }?;

        for name in SlotName::ALL {
            ensure(
                !reqs.has(name) || outputs.has(name),
                621005,
                format!(
                    "{} translator did not bind the requested {} slot",
                    node.kind_name(),
                    name.as_str()
                ),
            )?;
        }

        Ok((stage, outputs))
    }

    /// Zero-row plan that still defines every requested slot (bound to
    /// `Nothing`), so downstream slot-accessor lookups don't fail.
    fn generate_eof_plan(
        &mut self,
        node_id: PlanNodeId,
        reqs: &PlanStageReqs,
    ) -> Result<(Stage, PlanStageSlots)> {
        let outputs = PlanStageSlots::from_reqs(reqs, &mut self.slot_gen);

        let mut binds = Vec::new();
        outputs.for_each_slot(reqs, |slot| {
            binds.push((slot, expr::constant(Constant::Nothing)));
        });

        let mut stage = Stage::limit_skip(Stage::CoScan { node_id }, Some(0), None, node_id);
        if !binds.is_empty() {
            stage = Stage::Project {
                input: Box::new(stage),
                binds,
                node_id,
            };
        }

        Ok((stage, outputs))
    }

    /// Limit translator; fuses with a directly-nested skip so the pair
    /// costs one pass instead of two.
    fn build_limit(
        &mut self,
        node_id: PlanNodeId,
        child: &QuerySolution,
        limit: u64,
        reqs: &PlanStageReqs,
    ) -> Result<(Stage, PlanStageSlots)> {
        let (skip, (stage, outputs)) = match &child.kind {
            SolutionKind::Skip {
                child: grandchild,
                skip,
            } => (Some(*skip), self.build_node(grandchild, reqs)?),
            _ => (None, self.build_node(child, reqs)?),
        };

        // Limits apply only to the initial scan of a tailable cursor; the
        // resume branch re-runs without them.
        let stage = if reqs.is_tailable_resume_branch() {
            stage
        } else {
            Stage::limit_skip(stage, Some(limit), skip, node_id)
        };

        Ok((stage, outputs))
    }

    fn build_skip(
        &mut self,
        node_id: PlanNodeId,
        child: &QuerySolution,
        skip: u64,
        reqs: &PlanStageReqs,
    ) -> Result<(Stage, PlanStageSlots)> {
        let (stage, outputs) = self.build_node(child, reqs)?;

        let stage = if reqs.is_tailable_resume_branch() {
            stage
        } else {
            Stage::limit_skip(stage, None, Some(skip), node_id)
        };

        Ok((stage, outputs))
    }

    /// The collator's environment slot, when the query collates
    pub(crate) fn collator_slot(&self) -> Option<SlotId> {
        self.data.env.get_slot(names::COLLATOR)
    }
}
