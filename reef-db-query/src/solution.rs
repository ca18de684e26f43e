//! Logical query-solution trees
//!
//! The upstream planner hands the builder one immutable tree of
//! `QuerySolution` nodes, one per logical operation. Node kinds form a
//! closed set; each carries its kind-specific payload and a stable
//! `PlanNodeId` for provenance.

use crate::filter::MatchExpr;
use crate::projection::Projection;
use crate::stage::PlanNodeId;
use reef_db_core::{KeyPattern, SortPattern, TextQuery};
use serde_json::Value;

/// Index metadata attached to an index-scan node by the planner
#[derive(Clone, Debug, PartialEq)]
pub struct IndexScanSpec {
    /// Catalog name of the index
    pub name: String,
    /// The index's key pattern, as seen at plan time
    pub key_pattern: KeyPattern,
    /// Whether the raw index key must accompany each row
    pub add_key_metadata: bool,
}

/// Which sort implementation the planner selected
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortAlgo {
    /// Keys are known simple values
    Simple,
    /// Keys need full traversal semantics
    Default,
}

/// One logical node
#[derive(Clone, Debug, PartialEq)]
pub struct QuerySolution {
    pub node_id: PlanNodeId,
    pub kind: SolutionKind,
}

/// The closed set of logical node kinds
#[derive(Clone, Debug, PartialEq)]
pub enum SolutionKind {
    CollScan {
        filter: Option<MatchExpr>,
        tailable: bool,
        track_latest_oplog_timestamp: bool,
        request_resume_token: bool,
    },
    VirtualScan {
        docs: Vec<Value>,
        has_record_id: bool,
        /// Set when the node mocks an index scan
        index_key_pattern: Option<KeyPattern>,
    },
    IndexScan {
        index: IndexScanSpec,
    },
    Fetch {
        child: Box<QuerySolution>,
        filter: Option<MatchExpr>,
    },
    Limit {
        child: Box<QuerySolution>,
        limit: u64,
    },
    Skip {
        child: Box<QuerySolution>,
        skip: u64,
    },
    Sort {
        child: Box<QuerySolution>,
        algo: SortAlgo,
        pattern: SortPattern,
        limit: Option<u64>,
        max_memory_bytes: u64,
    },
    SortKeyGenerator {
        child: Box<QuerySolution>,
    },
    SortMerge {
        children: Vec<QuerySolution>,
        pattern: SortPattern,
        dedup: bool,
    },
    Or {
        children: Vec<QuerySolution>,
        dedup: bool,
        filter: Option<MatchExpr>,
    },
    /// Union of text-index scans; lowered exactly like `Or`
    TextOr {
        children: Vec<QuerySolution>,
        dedup: bool,
        filter: Option<MatchExpr>,
    },
    TextMatch {
        child: Box<QuerySolution>,
        index_name: String,
        query: TextQuery,
    },
    ReturnKey {
        child: Box<QuerySolution>,
    },
    Eof,
    AndHash {
        children: Vec<QuerySolution>,
    },
    AndSorted {
        children: Vec<QuerySolution>,
    },
    ProjectionSimple {
        child: Box<QuerySolution>,
        fields: Vec<String>,
    },
    ProjectionCovered {
        child: Box<QuerySolution>,
        fields: Vec<String>,
        /// Key pattern of the index the projection is covered by
        covered_key_pattern: KeyPattern,
    },
    ProjectionDefault {
        child: Box<QuerySolution>,
        projection: Projection,
    },
    ShardingFilter {
        child: Box<QuerySolution>,
    },
}

impl QuerySolution {
    /// Create a node
    pub fn new(node_id: PlanNodeId, kind: SolutionKind) -> Self {
        Self { node_id, kind }
    }

    /// Short name of the node's kind, for diagnostics
    pub fn kind_name(&self) -> &'static str {
        use SolutionKind::*;
        match &self.kind {
            CollScan { .. } => "COLLSCAN",
            VirtualScan { .. } => "VIRTUAL_SCAN",
            IndexScan { .. } => "IXSCAN",
            Fetch { .. } => "FETCH",
            Limit { .. } => "LIMIT",
            Skip { .. } => "SKIP",
            Sort { .. } => "SORT",
            SortKeyGenerator { .. } => "SORT_KEY_GENERATOR",
            SortMerge { .. } => "SORT_MERGE",
            Or { .. } => "OR",
            TextOr { .. } => "TEXT_OR",
            TextMatch { .. } => "TEXT_MATCH",
            ReturnKey { .. } => "RETURN_KEY",
            Eof => "EOF",
            AndHash { .. } => "AND_HASH",
            AndSorted { .. } => "AND_SORTED",
            ProjectionSimple { .. } => "PROJECTION_SIMPLE",
            ProjectionCovered { .. } => "PROJECTION_COVERED",
            ProjectionDefault { .. } => "PROJECTION_DEFAULT",
            ShardingFilter { .. } => "SHARDING_FILTER",
        }
    }

    /// Direct children in plan order
    pub fn children(&self) -> Vec<&QuerySolution> {
        use SolutionKind::*;
        match &self.kind {
            CollScan { .. } | VirtualScan { .. } | IndexScan { .. } | Eof => Vec::new(),
            Fetch { child, .. }
            | Limit { child, .. }
            | Skip { child, .. }
            | Sort { child, .. }
            | SortKeyGenerator { child }
            | TextMatch { child, .. }
            | ReturnKey { child }
            | ProjectionSimple { child, .. }
            | ProjectionCovered { child, .. }
            | ProjectionDefault { child, .. }
            | ShardingFilter { child } => vec![child],
            SortMerge { children, .. }
            | Or { children, .. }
            | TextOr { children, .. }
            | AndHash { children }
            | AndSorted { children } => children.iter().collect(),
        }
    }

    /// Pre-order search for the first node satisfying `pred`
    pub fn find_first(&self, pred: &dyn Fn(&QuerySolution) -> bool) -> Option<&QuerySolution> {
        if pred(self) {
            return Some(self);
        }
        for child in self.children() {
            if let Some(found) = child.find_first(pred) {
                return Some(found);
            }
        }
        None
    }

    /// Whether this subtree delivers fully materialized documents.
    ///
    /// Index scans deliver keys only; a fetch (or a document-producing
    /// scan) above them restores full documents. Multi-child nodes are
    /// fetched when every branch is.
    pub fn is_fetched(&self) -> bool {
        use SolutionKind::*;
        match &self.kind {
            CollScan { .. } | Fetch { .. } | Eof => true,
            VirtualScan {
                index_key_pattern, ..
            } => index_key_pattern.is_none(),
            IndexScan { .. } => false,
            Limit { child, .. }
            | Skip { child, .. }
            | Sort { child, .. }
            | SortKeyGenerator { child }
            | TextMatch { child, .. }
            | ReturnKey { child }
            | ProjectionSimple { child, .. }
            | ProjectionCovered { child, .. }
            | ProjectionDefault { child, .. }
            | ShardingFilter { child } => child.is_fetched(),
            SortMerge { children, .. }
            | Or { children, .. }
            | TextOr { children, .. }
            | AndHash { children }
            | AndSorted { children } => children.iter().all(QuerySolution::is_fetched),
        }
    }
}

/// A solution tree plus the plan-wide execution requirements that ride
/// along with it.
#[derive(Clone, Debug, PartialEq)]
pub struct QuerySolutionTree {
    pub root: QuerySolution,
    /// Whether scans must verify read availability when they open
    pub check_can_serve_reads: bool,
}

impl QuerySolutionTree {
    /// Tree with no read-availability checking
    pub fn new(root: QuerySolution) -> Self {
        Self {
            root,
            check_can_serve_reads: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coll_scan(id: u32) -> QuerySolution {
        QuerySolution::new(
            PlanNodeId(id),
            SolutionKind::CollScan {
                filter: None,
                tailable: false,
                track_latest_oplog_timestamp: false,
                request_resume_token: false,
            },
        )
    }

    fn ix_scan(id: u32, paths: &[&str]) -> QuerySolution {
        QuerySolution::new(
            PlanNodeId(id),
            SolutionKind::IndexScan {
                index: IndexScanSpec {
                    name: "test_idx".into(),
                    key_pattern: KeyPattern::ascending(paths),
                    add_key_metadata: false,
                },
            },
        )
    }

    #[test]
    fn test_find_first_is_preorder() {
        let tree = QuerySolution::new(
            PlanNodeId(3),
            SolutionKind::Fetch {
                child: Box::new(ix_scan(2, &["a"])),
                filter: None,
            },
        );

        let found = tree
            .find_first(&|n| matches!(n.kind, SolutionKind::IndexScan { .. }))
            .unwrap();
        assert_eq!(found.node_id, PlanNodeId(2));
        assert!(tree
            .find_first(&|n| matches!(n.kind, SolutionKind::Eof))
            .is_none());
    }

    #[test]
    fn test_fetched_propagation() {
        assert!(coll_scan(1).is_fetched());
        assert!(!ix_scan(1, &["a"]).is_fetched());

        let fetch = QuerySolution::new(
            PlanNodeId(2),
            SolutionKind::Fetch {
                child: Box::new(ix_scan(1, &["a"])),
                filter: None,
            },
        );
        assert!(fetch.is_fetched());

        let or = QuerySolution::new(
            PlanNodeId(3),
            SolutionKind::Or {
                children: vec![coll_scan(1), ix_scan(2, &["a"])],
                dedup: false,
                filter: None,
            },
        );
        assert!(!or.is_fetched());
    }
}
