//! Filter expression sub-builder
//!
//! Lowers a residual match predicate into an expression over the slot
//! holding the document, and wraps the input stage in a per-row filter.
//! This is the seam the full match-expression compiler plugs into; the
//! shapes supported here are the ones residual predicates on scan, fetch
//! and or nodes actually use.

use crate::expr::{self, BinaryOp, Constant, Expr};
use crate::slots::SlotId;
use crate::stage::{PlanNodeId, Stage};
use reef_db_core::FieldPath;
use serde_json::Value;

/// A residual match predicate over document fields
#[derive(Clone, Debug, PartialEq)]
pub enum MatchExpr {
    Eq(FieldPath, Value),
    Lt(FieldPath, Value),
    Lte(FieldPath, Value),
    Gt(FieldPath, Value),
    Gte(FieldPath, Value),
    Exists(FieldPath),
    And(Vec<MatchExpr>),
    Or(Vec<MatchExpr>),
}

/// Chain `getField` calls down `path`, starting from the document in `input`.
fn path_expr(input: Expr, path: &FieldPath) -> Expr {
    path.components()
        .iter()
        .fold(input, |acc, comp| expr::get_field(acc, comp))
}

fn comparison(op: BinaryOp, input: Expr, path: &FieldPath, value: &Value) -> Expr {
    expr::binary(
        op,
        path_expr(input, path),
        expr::constant(Constant::Json(value.clone())),
    )
}

/// Lower a match predicate into an expression over the document held in
/// `result_slot`.
pub fn generate_match_expr(filter: &MatchExpr, result_slot: SlotId) -> Expr {
    let doc = expr::variable(result_slot);
    match filter {
        MatchExpr::Eq(path, v) => comparison(BinaryOp::Eq, doc, path, v),
        MatchExpr::Lt(path, v) => comparison(BinaryOp::Lt, doc, path, v),
        MatchExpr::Lte(path, v) => comparison(BinaryOp::Lte, doc, path, v),
        MatchExpr::Gt(path, v) => comparison(BinaryOp::Gt, doc, path, v),
        MatchExpr::Gte(path, v) => comparison(BinaryOp::Gte, doc, path, v),
        MatchExpr::Exists(path) => expr::exists(path_expr(doc, path)),
        MatchExpr::And(children) => fold_logical(BinaryOp::And, children, result_slot, true),
        MatchExpr::Or(children) => fold_logical(BinaryOp::Or, children, result_slot, false),
    }
}

fn fold_logical(op: BinaryOp, children: &[MatchExpr], result_slot: SlotId, empty: bool) -> Expr {
    let mut iter = children.iter().map(|c| generate_match_expr(c, result_slot));
    match iter.next() {
        None => expr::constant(Constant::Bool(empty)),
        Some(first) => iter.fold(first, |acc, e| expr::binary(op, acc, e)),
    }
}

/// Wrap `stage` in a filter applying `filter` to the document in
/// `result_slot`.
pub fn generate_filter(
    stage: Stage,
    filter: &MatchExpr,
    result_slot: SlotId,
    node_id: PlanNodeId,
) -> Stage {
    Stage::filter(stage, generate_match_expr(filter, result_slot), node_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{binary, constant, get_field, variable};
    use serde_json::json;

    #[test]
    fn test_eq_on_dotted_path() {
        let e = generate_match_expr(&MatchExpr::Eq(FieldPath::new("a.b"), json!(5)), SlotId(1));
        assert_eq!(
            e,
            binary(
                BinaryOp::Eq,
                get_field(get_field(variable(SlotId(1)), "a"), "b"),
                constant(Constant::Json(json!(5))),
            )
        );
    }

    #[test]
    fn test_and_folds_left() {
        let e = generate_match_expr(
            &MatchExpr::And(vec![
                MatchExpr::Exists(FieldPath::new("a")),
                MatchExpr::Exists(FieldPath::new("b")),
            ]),
            SlotId(1),
        );
        assert!(matches!(
            e,
            Expr::Binary {
                op: BinaryOp::And,
                ..
            }
        ));
    }

    #[test]
    fn test_filter_stage_is_per_row() {
        let stage = generate_filter(
            crate::stage::limit_one_co_scan(PlanNodeId(1)),
            &MatchExpr::Exists(FieldPath::new("a")),
            SlotId(1),
            PlanNodeId(1),
        );
        assert!(matches!(stage, Stage::Filter { is_const: false, .. }));
    }
}
