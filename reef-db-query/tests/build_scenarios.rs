//! End-to-end stage building through the public API
//!
//! These tests run the whole `StageBuilder::build` pipeline against an
//! in-memory catalog and check the structure of the compiled plans plus
//! the top-level binding contract.

use reef_db_core::{
    CollectionHandle, CollectionId, Collator, KeyPattern, OperationContext, SortPattern,
};
use reef_db_query::solution::{IndexScanSpec, QuerySolution, QuerySolutionTree, SolutionKind, SortAlgo};
use reef_db_query::{
    names, CanonicalQuery, PlanNodeId, SlotName, Stage, StageBuilder,
};
use serde_json::json;
use std::sync::Arc;

fn test_collection() -> CollectionHandle {
    CollectionHandle::new("db.orders", CollectionId(7))
        .with_index("a_1", KeyPattern::ascending(&["a"]))
}

fn coll_scan(id: u32, tailable: bool, track_oplog: bool) -> QuerySolution {
    QuerySolution::new(
        PlanNodeId(id),
        SolutionKind::CollScan {
            filter: None,
            tailable,
            track_latest_oplog_timestamp: track_oplog,
            request_resume_token: tailable,
        },
    )
}

fn ix_scan(id: u32) -> QuerySolution {
    QuerySolution::new(
        PlanNodeId(id),
        SolutionKind::IndexScan {
            index: IndexScanSpec {
                name: "a_1".to_string(),
                key_pattern: KeyPattern::ascending(&["a"]),
                add_key_metadata: false,
            },
        },
    )
}

#[test]
fn test_fetch_over_index_scan_builds_loop_join() {
    let op_ctx = OperationContext::new();
    let coll = test_collection();
    let query = CanonicalQuery::new();
    let tree = QuerySolutionTree::new(QuerySolution::new(
        PlanNodeId(2),
        SolutionKind::Fetch {
            child: Box::new(ix_scan(1)),
            filter: None,
        },
    ));

    let builder = StageBuilder::new(&op_ctx, &coll, &query, &tree, None, None).unwrap();
    let (stage, data) = builder.build().unwrap();

    assert!(data.outputs.has(SlotName::Result));
    assert!(data.outputs.has(SlotName::RecordId));

    let Stage::LoopJoin { outer, inner, .. } = stage else {
        panic!("expected a loop join at the root");
    };
    assert!(matches!(*outer, Stage::IndexScan { .. }));
    let Stage::LimitSkip { limit, input, .. } = *inner else {
        panic!("expected a limit over the seek scan");
    };
    assert_eq!(limit, Some(1));
    assert!(matches!(
        *input,
        Stage::Scan {
            seek_record_id_slot: Some(_),
            ..
        }
    ));
}

#[test]
fn test_sort_over_collection_scan() {
    let op_ctx = OperationContext::new();
    let coll = test_collection();
    let query = CanonicalQuery::new();
    let tree = QuerySolutionTree::new(QuerySolution::new(
        PlanNodeId(2),
        SolutionKind::Sort {
            child: Box::new(coll_scan(1, false, false)),
            algo: SortAlgo::Default,
            pattern: SortPattern::from_pairs(&[("a", true), ("b", false)]),
            limit: None,
            max_memory_bytes: 64 * 1024 * 1024,
        },
    ));

    let builder = StageBuilder::new(&op_ctx, &coll, &query, &tree, None, None).unwrap();
    let (stage, data) = builder.build().unwrap();

    assert!(data.outputs.has(SlotName::Result));

    let Stage::Sort {
        order_by,
        directions,
        limit,
        memory_limit_bytes,
        ..
    } = stage
    else {
        panic!("expected a sort at the root");
    };
    assert_eq!(order_by.len(), 2);
    assert_eq!(
        directions,
        vec![
            reef_db_core::SortDirection::Ascending,
            reef_db_core::SortDirection::Descending
        ]
    );
    assert_eq!(limit, None);
    assert_eq!(memory_limit_bytes, 64 * 1024 * 1024);
}

#[test]
fn test_oplog_tracking_flows_to_plan_data() {
    let op_ctx = OperationContext::new();
    let coll = test_collection();
    let query = CanonicalQuery::new();
    let tree = QuerySolutionTree::new(coll_scan(1, false, true));

    let builder = StageBuilder::new(&op_ctx, &coll, &query, &tree, None, None).unwrap();
    let (stage, data) = builder.build().unwrap();

    assert!(data.should_track_latest_oplog_timestamp);
    assert!(data.outputs.has(SlotName::OplogTs));

    // The timestamp is extracted by the scan itself.
    assert!(matches!(
        stage,
        Stage::Scan { ref fields, .. } if fields == &["ts".to_string()]
    ));

    let debug = data.debug_string();
    assert!(debug.contains("$$RESULT=s"));
    assert!(debug.contains("$$OPLOGTS=s"));
    assert!(debug.contains("timeZoneDB=s"));
}

#[test]
fn test_virtual_scan_record_ids_reach_top_level_bindings() {
    let op_ctx = OperationContext::new();
    let coll = test_collection();
    let query = CanonicalQuery::new();
    let tree = QuerySolutionTree::new(QuerySolution::new(
        PlanNodeId(1),
        SolutionKind::VirtualScan {
            docs: vec![json!([1, {"a": 1}]), json!([2, {"a": 2}])],
            has_record_id: true,
            index_key_pattern: None,
        },
    ));

    let builder = StageBuilder::new(&op_ctx, &coll, &query, &tree, None, None).unwrap();
    let (stage, data) = builder.build().unwrap();

    assert!(data.outputs.has(SlotName::Result));
    assert!(data.outputs.has(SlotName::RecordId));
    assert!(matches!(stage, Stage::VirtualScan { ref out_slots, .. } if out_slots.len() == 2));
}

#[test]
fn test_tailable_scan_builds_union_through_public_api() {
    let op_ctx = OperationContext::new();
    let coll = test_collection();
    let query = CanonicalQuery {
        collator: None,
        tailable: true,
        allow_disk_use: false,
    };
    let tree = QuerySolutionTree::new(QuerySolution::new(
        PlanNodeId(2),
        SolutionKind::Limit {
            child: Box::new(coll_scan(1, true, false)),
            limit: 10,
        },
    ));

    let builder = StageBuilder::new(&op_ctx, &coll, &query, &tree, None, None).unwrap();
    let (stage, data) = builder.build().unwrap();

    assert!(data.should_use_tailable_scan);
    assert!(data.should_track_resume_token);
    assert!(data.env.get_slot(names::RESUME_RECORD_ID).is_some());
    assert!(matches!(stage, Stage::Union { ref branches, .. } if branches.len() == 2));
}

#[test]
fn test_eof_plan_still_binds_result() {
    let op_ctx = OperationContext::new();
    let coll = test_collection();
    let query = CanonicalQuery::new();
    let tree = QuerySolutionTree::new(QuerySolution::new(PlanNodeId(1), SolutionKind::Eof));

    let builder = StageBuilder::new(&op_ctx, &coll, &query, &tree, None, None).unwrap();
    let (_stage, data) = builder.build().unwrap();

    assert!(data.outputs.has(SlotName::Result));
}

#[test]
fn test_top_level_slots_are_distinct_and_nonzero() {
    let op_ctx = OperationContext::new();
    let coll = test_collection();
    let query = CanonicalQuery::new();
    let tree = QuerySolutionTree::new(QuerySolution::new(
        PlanNodeId(2),
        SolutionKind::Fetch {
            child: Box::new(ix_scan(1)),
            filter: None,
        },
    ));

    let builder = StageBuilder::new(&op_ctx, &coll, &query, &tree, None, None).unwrap();
    let (_stage, data) = builder.build().unwrap();

    let mut seen = Vec::new();
    for name in SlotName::ALL {
        if let Some(slot) = data.outputs.get(name) {
            assert!(slot.0 > 0);
            assert!(!seen.contains(&slot), "slot {slot} bound twice");
            seen.push(slot);
        }
    }
}

#[test]
fn test_collator_registered_only_when_query_collates() {
    let op_ctx = OperationContext::new();
    let coll = test_collection();
    let tree = QuerySolutionTree::new(coll_scan(1, false, false));

    let plain = CanonicalQuery::new();
    let builder = StageBuilder::new(&op_ctx, &coll, &plain, &tree, None, None).unwrap();
    let (_stage, data) = builder.build().unwrap();
    assert!(data.env.get_slot(names::COLLATOR).is_none());
    assert!(data.env.get_slot(names::TIME_ZONE_DB).is_some());

    let collated = CanonicalQuery::new().with_collator(Arc::new(Collator::new("fr_FR")));
    let builder = StageBuilder::new(&op_ctx, &coll, &collated, &tree, None, None).unwrap();
    let (_stage, data) = builder.build().unwrap();
    assert!(data.env.get_slot(names::COLLATOR).is_some());
}

#[test]
fn test_read_availability_check_rides_on_scans() {
    let op_ctx = OperationContext::new();
    let coll = test_collection();
    let query = CanonicalQuery::new();

    let mut tree = QuerySolutionTree::new(coll_scan(1, false, false));
    tree.check_can_serve_reads = true;

    let builder = StageBuilder::new(&op_ctx, &coll, &query, &tree, None, None).unwrap();
    let (stage, _data) = builder.build().unwrap();

    let Stage::Scan { read_check, .. } = stage else {
        panic!("expected a collection scan");
    };
    let check = read_check.expect("scan must carry the read check");
    assert!(check.check(&op_ctx, &coll).is_ok());
    op_ctx.mark_interrupted();
    assert!(check.check(&op_ctx, &coll).is_err());
}

#[test]
fn test_explain_renders_compiled_plan() {
    let op_ctx = OperationContext::new();
    let coll = test_collection();
    let query = CanonicalQuery::new();
    let tree = QuerySolutionTree::new(QuerySolution::new(
        PlanNodeId(2),
        SolutionKind::Fetch {
            child: Box::new(ix_scan(1)),
            filter: None,
        },
    ));

    let builder = StageBuilder::new(&op_ctx, &coll, &query, &tree, None, None).unwrap();
    let (stage, _data) = builder.build().unwrap();

    let rendered = reef_db_query::render_stage_tree(&stage);
    assert!(rendered.starts_with("loopjoin [2]"));
    assert!(rendered.contains("ixscan [1] index=a_1"));
}
