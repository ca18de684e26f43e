//! Index-key bookkeeping: inclusion sets, parent narrowing, rehydration
//!
//! Rehydration rebuilds the original (partial) document shape from the
//! scalar components of an index key. For the key pattern
//! `{a.b: 1, x: 1, a.c: 1}` the component paths form the tree
//!
//! ```text
//!         <root>
//!         /   |
//!        a    x
//!       / \
//!      b   c
//! ```
//!
//! and emission walks it in insertion order, producing
//! `newObj("a", newObj("b", s0, "c", s2), "x", s1)`.

use crate::expr::{self, Expr, ExprFn};
use crate::reqs::IndexKeyBitset;
use crate::slots::SlotId;
use crate::stage::{PlanNodeId, Stage};
use reef_db_core::KeyPattern;

/// Compute the bitset of key-pattern positions whose dotted path is in
/// `required_fields`, along with the matching field names in key order.
pub fn make_index_key_inclusion_set(
    key_pattern: &KeyPattern,
    required_fields: &[String],
) -> (IndexKeyBitset, Vec<String>) {
    let mut bitset = IndexKeyBitset::new();
    let mut fields = Vec::new();

    for (i, field) in key_pattern.fields().iter().enumerate() {
        let dotted = field.path.dotted();
        if required_fields.iter().any(|f| *f == dotted) {
            bitset.set(i);
            fields.push(dotted);
        }
    }

    (bitset, fields)
}

/// Narrow a child's index-key slot vector back to the positions the parent
/// originally asked for.
///
/// `child_slots` is aligned with `child_bitset` (one slot per set bit, in
/// ascending position order); `parent_bitset` must be a subset of
/// `child_bitset`. The returned vector is aligned with `parent_bitset`.
pub fn make_index_key_output_slots_matching_parent_reqs(
    key_pattern: &KeyPattern,
    parent_bitset: IndexKeyBitset,
    child_bitset: IndexKeyBitset,
    child_slots: &[SlotId],
) -> Vec<SlotId> {
    debug_assert_eq!(child_bitset.count(), child_slots.len());
    debug_assert_eq!(parent_bitset.union(child_bitset), child_bitset);

    let mut out = Vec::with_capacity(parent_bitset.count());
    let mut slot_idx = 0;
    for pos in 0..key_pattern.len() {
        if child_bitset.test(pos) {
            if parent_bitset.test(pos) {
                out.push(child_slots[slot_idx]);
            }
            slot_idx += 1;
        }
    }
    out
}

/// Tree representation of an index key pattern, mapping each component
/// path to the slot that holds its value.
#[derive(Debug, Default)]
struct KeyPatternTreeNode {
    // Insertion-ordered so emission is deterministic
    children: Vec<(String, KeyPatternTreeNode)>,
    slot: Option<SlotId>,
}

impl KeyPatternTreeNode {
    fn child_index(&self, part: &str) -> Option<usize> {
        self.children.iter().position(|(name, _)| name == part)
    }
}

/// Build the key-pattern tree for `key_pattern` with `slots` attached at
/// the leaves.
///
/// When one component path is a prefix of another (`{a: 1, a.b: 1}`), the
/// shorter path wins: the whole value stored for `a` already contains
/// whatever `a.b` would describe, so the longer path is dropped from the
/// tree. The upstream planner is not expected to produce such patterns;
/// when it does we log and keep the shorter binding.
fn build_key_pattern_tree(key_pattern: &KeyPattern, slots: &[SlotId]) -> KeyPatternTreeNode {
    debug_assert_eq!(key_pattern.len(), slots.len());

    let mut root = KeyPatternTreeNode::default();
    for (i, field) in key_pattern.fields().iter().enumerate() {
        let mut node = &mut root;
        let mut skip = false;

        for part in field.path.components() {
            let idx = match node.child_index(part) {
                Some(idx) => idx,
                None => {
                    node.children
                        .push((part.to_string(), KeyPatternTreeNode::default()));
                    node.children.len() - 1
                }
            };
            node = &mut node.children[idx].1;

            // A slot on an ancestor means a shorter prefix of this path is
            // already bound as a whole value; the whole value subsumes
            // this component.
            if node.slot.is_some() {
                tracing::debug!(
                    path = %field.path,
                    "dropping key component shadowed by a shorter prefix"
                );
                skip = true;
                break;
            }
        }

        if !skip {
            node.slot = Some(slots[i]);
        }
    }

    root
}

/// Emit the object-construction expression for a key-pattern tree.
fn build_new_obj_expr(node: &KeyPatternTreeNode) -> Expr {
    let mut args = Vec::with_capacity(node.children.len() * 2);
    for (name, child) in &node.children {
        args.push(expr::string(name));
        if let Some(slot) = child.slot {
            args.push(expr::variable(slot));
        } else {
            args.push(build_new_obj_expr(child));
        }
    }
    expr::func(ExprFn::NewObj, args)
}

/// Wrap `stage` in a project that rebuilds the indexed document shape from
/// `key_slots` into `result_slot`.
pub fn rehydrate_index_key(
    stage: Stage,
    key_pattern: &KeyPattern,
    node_id: PlanNodeId,
    key_slots: &[SlotId],
    result_slot: SlotId,
) -> Stage {
    let tree = build_key_pattern_tree(key_pattern, key_slots);
    let key_expr = build_new_obj_expr(&tree);
    Stage::project_one(stage, node_id, result_slot, key_expr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{func, string, variable};

    fn slots(ids: &[u32]) -> Vec<SlotId> {
        ids.iter().map(|&i| SlotId(i)).collect()
    }

    #[test]
    fn test_inclusion_set_preserves_key_order() {
        let kp = KeyPattern::ascending(&["a", "b", "c"]);
        let (bitset, fields) =
            make_index_key_inclusion_set(&kp, &["c".to_string(), "a".to_string()]);

        assert!(bitset.test(0) && bitset.test(2));
        assert!(!bitset.test(1));
        assert_eq!(fields, vec!["a".to_string(), "c".to_string()]);
    }

    #[test]
    fn test_parent_narrowing() {
        let kp = KeyPattern::ascending(&["a", "b", "c", "d"]);
        // Child extracted {a, b, d}; parent only wanted {b, d}.
        let mut child = IndexKeyBitset::new();
        child.set(0);
        child.set(1);
        child.set(3);
        let mut parent = IndexKeyBitset::new();
        parent.set(1);
        parent.set(3);

        let narrowed = make_index_key_output_slots_matching_parent_reqs(
            &kp,
            parent,
            child,
            &slots(&[10, 11, 12]),
        );
        assert_eq!(narrowed, slots(&[11, 12]));
    }

    #[test]
    fn test_rehydrate_nested_paths() {
        // {a.b: 1, x: 1, a.c: 1} -> newObj("a", newObj("b", s0, "c", s2), "x", s1)
        let kp = KeyPattern::ascending(&["a.b", "x", "a.c"]);
        let tree = build_key_pattern_tree(&kp, &slots(&[10, 11, 12]));
        let obj = build_new_obj_expr(&tree);

        let expected = func(
            ExprFn::NewObj,
            vec![
                string("a"),
                func(
                    ExprFn::NewObj,
                    vec![
                        string("b"),
                        variable(SlotId(10)),
                        string("c"),
                        variable(SlotId(12)),
                    ],
                ),
                string("x"),
                variable(SlotId(11)),
            ],
        );
        assert_eq!(obj, expected);
    }

    #[test]
    fn test_shorter_prefix_wins() {
        // {a: 1, a.b: 1}: the binding for "a" dominates, "a.b" is dropped.
        let kp = KeyPattern::ascending(&["a", "a.b"]);
        let tree = build_key_pattern_tree(&kp, &slots(&[10, 11]));
        let obj = build_new_obj_expr(&tree);

        assert_eq!(
            obj,
            func(ExprFn::NewObj, vec![string("a"), variable(SlotId(10))])
        );
    }

    #[test]
    fn test_flat_pattern() {
        let kp = KeyPattern::ascending(&["a", "b"]);
        let tree = build_key_pattern_tree(&kp, &slots(&[10, 11]));
        let obj = build_new_obj_expr(&tree);

        assert_eq!(
            obj,
            func(
                ExprFn::NewObj,
                vec![
                    string("a"),
                    variable(SlotId(10)),
                    string("b"),
                    variable(SlotId(11)),
                ],
            )
        );
    }
}
