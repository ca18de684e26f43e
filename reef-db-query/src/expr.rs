//! Expression tree emitted by the stage builder
//!
//! Expressions are compiled data, not evaluated here: the builder wires
//! them into filter/project/traverse stages and the executor interprets
//! them. Shapes mirror the executor's expression VM: constants, slot and
//! frame variables, named function applications, primitive binary
//! operators, `if`, local binds, and a coded `fail`.

use crate::slots::{FrameId, SlotId};
use reef_db_core::{Collator, FtsMatcher, ShardFilterer, SortPattern};
use serde_json::Value;
use std::sync::Arc;

/// User-visible error code raised by a runtime `fail` expression when a
/// value has the wrong shape for the operation (mirrors the classic
/// BadValue status).
pub const FAIL_BAD_VALUE: u32 = 2;

/// Compile-time constant embedded in an expression
#[derive(Clone, Debug)]
pub enum Constant {
    /// Absent value
    Nothing,
    Null,
    Undefined,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    String(String),
    /// A JSON document or fragment
    Json(Value),
    /// Sort specification for whole-document sort-key generation
    SortSpec {
        pattern: SortPattern,
        collator: Option<Arc<Collator>>,
    },
    /// Build-time-materialized full-text matcher
    FtsMatcher(Arc<FtsMatcher>),
    /// Build-time-materialized shard ownership predicate
    ShardFilterer(Arc<dyn ShardFilterer>),
}

impl PartialEq for Constant {
    fn eq(&self, other: &Self) -> bool {
        use Constant::*;
        match (self, other) {
            (Nothing, Nothing) | (Null, Null) | (Undefined, Undefined) => true,
            (Bool(a), Bool(b)) => a == b,
            (Int32(a), Int32(b)) => a == b,
            (Int64(a), Int64(b)) => a == b,
            (String(a), String(b)) => a == b,
            (Json(a), Json(b)) => a == b,
            (
                SortSpec {
                    pattern: pa,
                    collator: ca,
                },
                SortSpec {
                    pattern: pb,
                    collator: cb,
                },
            ) => {
                pa == pb
                    && match (ca, cb) {
                        (None, None) => true,
                        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
                        _ => false,
                    }
            }
            // Matchers and filterers are identity-compared: they are
            // build-time singletons, not values.
            (FtsMatcher(a), FtsMatcher(b)) => Arc::ptr_eq(a, b),
            (ShardFilterer(a), ShardFilterer(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Named functions the executor's expression VM provides
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExprFn {
    /// `getField(doc, name)`; yields `Nothing` when absent or not an object
    GetField,
    /// `newObj(name1, val1, ...)`; object construction in argument order
    NewObj,
    /// `exists(v)`; whether `v` is not `Nothing`
    Exists,
    IsArray,
    IsObject,
    /// `fillEmpty(v, alt)`; yields `alt` when `v` is `Nothing`
    FillEmpty,
    /// `collComparisonKey(v, collator)`; collation-aware comparison key
    CollComparisonKey,
    /// `generateSortKey(sortSpec, doc)`; whole-document sort key
    GenerateSortKey,
    /// `shardHash(v)`; hashed-shard-key hash of a value
    ShardHash,
    /// `ftsMatch(matcher, doc)`; full-text predicate
    FtsMatch,
    /// `shardFilter(filterer, shardKey)`; shard ownership predicate
    ShardFilter,
}

/// Primitive binary operators
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    And,
    Or,
    Add,
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    /// Three-way comparison: -1, 0, or 1
    Cmp3w,
}

/// An expression node
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Constant(Constant),
    /// Read a plan slot
    Var(SlotId),
    /// Read a local binding: `(frame, position)`
    LocalVar(FrameId, u16),
    /// Apply a named function
    Func { name: ExprFn, args: Vec<Expr> },
    /// Apply a primitive binary operator
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Logical negation
    Not(Box<Expr>),
    If {
        cond: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
    },
    /// Bind `binds` into `frame`, evaluate `body`
    Let {
        frame: FrameId,
        binds: Vec<Expr>,
        body: Box<Expr>,
    },
    /// Fail the operation with a user-visible coded error
    Fail { code: u32, message: String },
}

/// Read a plan slot
pub fn variable(slot: SlotId) -> Expr {
    Expr::Var(slot)
}

/// Embed a constant
pub fn constant(c: Constant) -> Expr {
    Expr::Constant(c)
}

/// Embed a string constant
pub fn string(s: impl Into<String>) -> Expr {
    Expr::Constant(Constant::String(s.into()))
}

/// Apply a named function
pub fn func(name: ExprFn, args: Vec<Expr>) -> Expr {
    Expr::Func { name, args }
}

/// Apply a primitive binary operator
pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

/// `getField(input, field)`
pub fn get_field(input: Expr, field: &str) -> Expr {
    func(ExprFn::GetField, vec![input, string(field)])
}

/// `exists(input)`
pub fn exists(input: Expr) -> Expr {
    func(ExprFn::Exists, vec![input])
}

/// `isArray(input)`
pub fn is_array(input: Expr) -> Expr {
    func(ExprFn::IsArray, vec![input])
}

/// Logical negation
pub fn not(input: Expr) -> Expr {
    Expr::Not(Box::new(input))
}

/// `Null` when `input` is `Nothing`
pub fn fill_empty_null(input: Expr) -> Expr {
    func(ExprFn::FillEmpty, vec![input, constant(Constant::Null)])
}

/// `Undefined` when `input` is `Nothing`
pub fn fill_empty_undefined(input: Expr) -> Expr {
    func(ExprFn::FillEmpty, vec![input, constant(Constant::Undefined)])
}

/// `if cond then a else b`
pub fn if_expr(cond: Expr, then_branch: Expr, else_branch: Expr) -> Expr {
    Expr::If {
        cond: Box::new(cond),
        then_branch: Box::new(then_branch),
        else_branch: Box::new(else_branch),
    }
}

/// `newObj()`, the empty object
pub fn empty_object() -> Expr {
    func(ExprFn::NewObj, Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_field_shape() {
        let e = get_field(variable(SlotId(3)), "a");
        match e {
            Expr::Func {
                name: ExprFn::GetField,
                args,
            } => {
                assert_eq!(args[0], Expr::Var(SlotId(3)));
                assert_eq!(args[1], string("a"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_fill_empty_variants() {
        assert_eq!(
            fill_empty_null(variable(SlotId(1))),
            func(
                ExprFn::FillEmpty,
                vec![variable(SlotId(1)), constant(Constant::Null)]
            )
        );
        assert_eq!(
            fill_empty_undefined(variable(SlotId(1))),
            func(
                ExprFn::FillEmpty,
                vec![variable(SlotId(1)), constant(Constant::Undefined)]
            )
        );
    }

    #[test]
    fn test_constant_identity_compare() {
        use reef_db_core::{FtsSpec, KeyPattern, StaticShardFilterer};

        let m = Arc::new(FtsMatcher::new(
            vec!["reef".into()],
            "english".into(),
            false,
            FtsSpec::simple("english", &["body"]),
        ));
        assert_eq!(
            Constant::FtsMatcher(m.clone()),
            Constant::FtsMatcher(m.clone())
        );

        let f: Arc<dyn ShardFilterer> =
            Arc::new(StaticShardFilterer::new(KeyPattern::ascending(&["a"])));
        assert_eq!(
            Constant::ShardFilterer(f.clone()),
            Constant::ShardFilterer(f)
        );
    }
}
