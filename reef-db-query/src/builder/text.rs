//! Text-match translator
//!
//! The matcher is materialized from the index catalog at build time and
//! embedded into the plan as a constant; at runtime the match is a filter
//! over the fetched document.

use crate::builder::StageBuilder;
use crate::error::{ensure, Result};
use crate::expr::{self, Constant, Expr, ExprFn};
use crate::reqs::{PlanStageReqs, PlanStageSlots, SlotName};
use crate::solution::QuerySolution;
use crate::stage::{PlanNodeId, Stage};
use reef_db_core::{AccessMethod, FtsMatcher, TextQuery};
use std::sync::Arc;

/// Runtime error raised when the text-match subject is not an object
pub const FAIL_TEXT_MATCH_NON_OBJECT: u32 = 622010;

impl<'a> StageBuilder<'a> {
    fn make_fts_matcher(&self, index_name: &str, query: &TextQuery) -> Result<Arc<FtsMatcher>> {
        self.op_ctx
            .check_for_interrupt()
            .map_err(crate::error::QueryError::from)?;

        let descriptor = self
            .collection
            .find_index_descriptor(index_name)
            .ok_or_else(|| {
                crate::error::QueryError::internal(
                    622001,
                    format!(
                        "index descriptor not found for index '{}' in collection '{}'",
                        index_name,
                        self.collection.name()
                    ),
                )
            })?;

        let entry = self.collection.entry_for(descriptor).ok_or_else(|| {
            crate::error::QueryError::internal(
                622002,
                format!(
                    "index entry not found for index '{}' in collection '{}'",
                    index_name,
                    self.collection.name()
                ),
            )
        })?;

        let access_method = entry.access_method.as_ref().ok_or_else(|| {
            crate::error::QueryError::internal(
                622003,
                format!(
                    "access method is not defined for index '{}' in collection '{}'",
                    index_name,
                    self.collection.name()
                ),
            )
        })?;

        let AccessMethod::FullText(spec) = access_method else {
            return Err(crate::error::QueryError::internal(
                622004,
                format!("index '{index_name}' is not a text index"),
            ));
        };

        // A placeholder predicate can only come from planning a query the
        // builder was never meant to see.
        let TextQuery::Parsed {
            terms,
            language,
            case_sensitive,
        } = query
        else {
            return Err(crate::error::QueryError::internal(
                622005,
                "expected a parsed text query",
            ));
        };

        Ok(Arc::new(FtsMatcher::new(
            terms.clone(),
            language.clone(),
            *case_sensitive,
            spec.clone(),
        )))
    }

    pub(crate) fn build_text_match(
        &mut self,
        node_id: PlanNodeId,
        child: &QuerySolution,
        index_name: &str,
        query: &TextQuery,
        reqs: &PlanStageReqs,
    ) -> Result<(Stage, PlanStageSlots)> {
        ensure(
            reqs.index_key_bitset().is_none(),
            622006,
            "index key components requested from a text match",
        )?;
        ensure(
            !reqs.has(SlotName::OplogTs),
            622007,
            "oplog timestamp requested from a text match",
        )?;
        // The match runs over whole documents; the sub-plan must deliver
        // them fetched even though the text match itself does not fetch.
        ensure(
            child.is_fetched(),
            622008,
            "text match input must be fetched",
        )?;

        let child_reqs = reqs.clone().set(SlotName::Result);
        let (stage, mut outputs) = self.build_node(child, &child_reqs)?;
        let result_slot = outputs.require(SlotName::Result, 622009)?;

        let matcher = self.make_fts_matcher(index_name, query)?;

        let fts_match = expr::func(
            ExprFn::FtsMatch,
            vec![
                expr::constant(Constant::FtsMatcher(matcher)),
                expr::variable(result_slot),
            ],
        );

        // Guard the match so it only ever sees objects.
        let match_expr = expr::if_expr(
            expr::func(ExprFn::IsObject, vec![expr::variable(result_slot)]),
            fts_match,
            Expr::Fail {
                code: FAIL_TEXT_MATCH_NON_OBJECT,
                message: "text match requires the input to be an object".to_string(),
            },
        );

        let mut stage = Stage::filter(stage, match_expr, node_id);

        if reqs.has(SlotName::ReturnKey) {
            // Text plans have no single index key to return; returnKey is
            // the empty object.
            let return_key_slot = self.slot_gen.generate();
            outputs.set(SlotName::ReturnKey, return_key_slot);
            stage = Stage::project_one(stage, node_id, return_key_slot, expr::empty_object());
        }

        Ok((stage, outputs))
    }
}
