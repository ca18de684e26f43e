//! Plan tree rendering for logs and diagnostics
//!
//! One stage per line, indented by depth, naming the operator and its
//! principal slots. The format carries no stability guarantee.

use crate::stage::Stage;
use std::fmt::Write as _;

/// Render a stage tree as an indented multi-line string.
pub fn render_stage_tree(stage: &Stage) -> String {
    let mut out = String::new();
    render(stage, 0, &mut out);
    out
}

fn line(out: &mut String, depth: usize, text: &str) {
    for _ in 0..depth {
        out.push_str("  ");
    }
    out.push_str(text);
    out.push('\n');
}

fn render(stage: &Stage, depth: usize, out: &mut String) {
    match stage {
        Stage::Scan {
            result_slot,
            record_id_slot,
            seek_record_id_slot,
            node_id,
            ..
        } => {
            let mut text = format!("scan [{}] result={result_slot} rid={record_id_slot}", node_id.0);
            if let Some(seek) = seek_record_id_slot {
                let _ = write!(text, " seek={seek}");
            }
            line(out, depth, &text);
        }
        Stage::VirtualScan { docs, out_slots, node_id } => {
            let slots: Vec<String> = out_slots.iter().map(|s| s.to_string()).collect();
            line(
                out,
                depth,
                &format!(
                    "vscan [{}] rows={} out=[{}]",
                    node_id.0,
                    docs.len(),
                    slots.join(",")
                ),
            );
        }
        Stage::IndexScan {
            index_name,
            key_slots,
            record_id_slot,
            node_id,
            ..
        } => {
            let slots: Vec<String> = key_slots.iter().map(|s| s.to_string()).collect();
            line(
                out,
                depth,
                &format!(
                    "ixscan [{}] index={index_name} keys=[{}] rid={record_id_slot}",
                    node_id.0,
                    slots.join(",")
                ),
            );
        }
        Stage::CoScan { node_id } => line(out, depth, &format!("coscan [{}]", node_id.0)),
        Stage::Project { input, binds, node_id } => {
            let slots: Vec<String> = binds.iter().map(|(s, _)| s.to_string()).collect();
            line(
                out,
                depth,
                &format!("project [{}] binds=[{}]", node_id.0, slots.join(",")),
            );
            render(input, depth + 1, out);
        }
        Stage::Filter {
            input,
            is_const,
            node_id,
            ..
        } => {
            let kind = if *is_const { "cfilter" } else { "filter" };
            line(out, depth, &format!("{kind} [{}]", node_id.0));
            render(input, depth + 1, out);
        }
        Stage::LimitSkip {
            input,
            limit,
            skip,
            node_id,
        } => {
            let mut text = format!("limitskip [{}]", node_id.0);
            if let Some(l) = limit {
                let _ = write!(text, " limit={l}");
            }
            if let Some(s) = skip {
                let _ = write!(text, " skip={s}");
            }
            line(out, depth, &text);
            render(input, depth + 1, out);
        }
        Stage::Sort {
            input,
            order_by,
            node_id,
            ..
        } => {
            let slots: Vec<String> = order_by.iter().map(|s| s.to_string()).collect();
            line(
                out,
                depth,
                &format!("sort [{}] by=[{}]", node_id.0, slots.join(",")),
            );
            render(input, depth + 1, out);
        }
        Stage::HashJoin {
            outer,
            inner,
            node_id,
            ..
        } => {
            line(out, depth, &format!("hashjoin [{}]", node_id.0));
            render(outer, depth + 1, out);
            render(inner, depth + 1, out);
        }
        Stage::MergeJoin {
            outer,
            inner,
            node_id,
            ..
        } => {
            line(out, depth, &format!("mergejoin [{}]", node_id.0));
            render(outer, depth + 1, out);
            render(inner, depth + 1, out);
        }
        Stage::LoopJoin {
            outer,
            inner,
            node_id,
            ..
        } => {
            line(out, depth, &format!("loopjoin [{}]", node_id.0));
            render(outer, depth + 1, out);
            render(inner, depth + 1, out);
        }
        Stage::SortedMerge {
            branches, node_id, ..
        } => {
            line(out, depth, &format!("smerge [{}]", node_id.0));
            for branch in branches {
                render(branch, depth + 1, out);
            }
        }
        Stage::Union {
            branches, node_id, ..
        } => {
            line(out, depth, &format!("union [{}]", node_id.0));
            for branch in branches {
                render(branch, depth + 1, out);
            }
        }
        Stage::Unique {
            input,
            key_slots,
            node_id,
        } => {
            let slots: Vec<String> = key_slots.iter().map(|s| s.to_string()).collect();
            line(
                out,
                depth,
                &format!("unique [{}] keys=[{}]", node_id.0, slots.join(",")),
            );
            render(input, depth + 1, out);
        }
        Stage::MakeObj {
            input,
            obj_slot,
            node_id,
            ..
        } => {
            line(out, depth, &format!("mkobj [{}] obj={obj_slot}", node_id.0));
            render(input, depth + 1, out);
        }
        Stage::Traverse {
            outer,
            inner,
            out_slot,
            node_id,
            ..
        } => {
            line(out, depth, &format!("traverse [{}] out={out_slot}", node_id.0));
            render(outer, depth + 1, out);
            render(inner, depth + 1, out);
        }
    }
}
