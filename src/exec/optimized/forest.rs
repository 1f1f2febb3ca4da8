//! # Join-Tree Forest
//!
//! Pair tables are not independent: two pairs sharing a source table
//! constrain each other through that table's provenance markers. This stage
//! connects such pairs into trees and folds each tree to a single table.
//!
//! The pair graph has one node per pair table and an edge wherever two pair
//! keys share a source table. A depth-first sweep over the canonically
//! ordered keys consumes each node once: the first visit roots a tree,
//! later reachable nodes attach as children, so the forest shape is
//! deterministic.
//!
//! Each tree folds bottom-up. A parent row survives only if every child
//! holds a row with the same `_id<t>` for the shared table `t`; survivors
//! take the Cartesian product of their matches across children, merge in
//! the children's columns, and are projected back to the parent's markers
//! plus the term's output columns. The parent table is overwritten in place
//! and re-hashed on its markers, becoming either a child for its own parent
//! or the tree's representative.

use eyre::{eyre, Result};
use tracing::trace;

use crate::records::provenance_column;
use crate::records::stream::RecordStream;
use crate::records::Record;
use crate::types::Comparator;

use super::TermCtx;

struct TreeNode {
    pair: usize,
    children: Vec<(String, TreeNode)>,
}

/// Folds every join tree and returns one representative table per tree.
pub(crate) fn intersect_forest(ctx: &mut TermCtx) -> Result<Vec<String>> {
    let count = ctx.pairs.len();
    if count == 0 {
        return Ok(Vec::new());
    }

    // adjacency by shared source table; pair order is canonical key order
    let mut adjacency: Vec<Vec<(usize, String)>> = vec![Vec::new(); count];
    for i in 0..count {
        for j in (i + 1)..count {
            if let Some(shared) = shared_table(ctx, i, j) {
                adjacency[i].push((j, shared.clone()));
                adjacency[j].push((i, shared));
            }
        }
    }

    let mut visited = vec![false; count];
    let mut representatives = Vec::new();
    for root in 0..count {
        if visited[root] {
            continue;
        }
        let tree = build_tree(root, &adjacency, &mut visited);
        trace!(root = %ctx.pairs[root].key, "folding join tree");
        representatives.push(fold(ctx, &tree)?);
    }
    Ok(representatives)
}

fn shared_table(ctx: &TermCtx, i: usize, j: usize) -> Option<String> {
    let (a0, a1) = &ctx.pairs[i].tables;
    let (b0, b1) = &ctx.pairs[j].tables;
    [a0, a1]
        .into_iter()
        .find(|t| *t == b0 || *t == b1)
        .cloned()
}

fn build_tree(
    pair: usize,
    adjacency: &[Vec<(usize, String)>],
    visited: &mut [bool],
) -> TreeNode {
    visited[pair] = true;
    let mut children = Vec::new();
    for (neighbor, shared) in &adjacency[pair] {
        if !visited[*neighbor] {
            children.push((shared.clone(), build_tree(*neighbor, adjacency, visited)));
        }
    }
    TreeNode { pair, children }
}

/// Post-order fold: children first, then intersect-and-merge into the
/// parent's table. Returns the physical table representing the subtree.
fn fold(ctx: &TermCtx, node: &TreeNode) -> Result<String> {
    for (_, child) in &node.children {
        fold(ctx, child)?;
    }
    let engine = ctx.engine;
    let parent = &ctx.pairs[node.pair];
    if node.children.is_empty() {
        return Ok(parent.physical.clone());
    }

    let marker_0 = provenance_column(&parent.tables.0);
    let marker_1 = provenance_column(&parent.tables.1);
    let parent_rows = engine.get_all_records(&parent.physical)?.collect_records()?;

    let mut folded = Vec::new();
    'rows: for row in parent_rows {
        let mut composed = vec![row.clone()];
        for (shared, child) in &node.children {
            let marker = provenance_column(shared);
            let provenance = row
                .get(&marker)
                .ok_or_else(|| eyre!("marker '{marker}' missing from pair table row"))?
                .clone();
            let child_table = ctx.pairs[child.pair].physical.as_str();
            if !engine.has_value(child_table, &marker, &provenance)? {
                continue 'rows;
            }
            let matches = engine
                .get_recs_from_hash(child_table, &marker, Comparator::Eq, &provenance)?
                .collect_records()?;
            let mut expanded = Vec::with_capacity(composed.len() * matches.len());
            for partial in &composed {
                for extension in &matches {
                    expanded.push(partial.merged(extension));
                }
            }
            composed = expanded;
        }
        for partial in composed {
            folded.push(project_folded(ctx, &partial, &marker_0, &marker_1)?);
        }
    }

    engine.clear_table(&parent.physical)?;
    engine.insert_records(&parent.physical, folded)?;
    engine.hash_table(&parent.physical, &marker_0, true)?;
    engine.hash_table(&parent.physical, &marker_1, true)?;
    Ok(parent.physical.clone())
}

/// Keeps the parent's markers and whichever term columns the composed row
/// carries (children contribute their subtrees' columns).
fn project_folded(
    ctx: &TermCtx,
    composed: &Record,
    marker_0: &str,
    marker_1: &str,
) -> Result<Record> {
    let mut out = Record::new();
    for col in &ctx.term.cols {
        let qualified = col.qualified()?;
        if let Some(value) = composed.get(&qualified) {
            out.set(qualified, value.clone());
        }
    }
    for marker in [marker_0, marker_1] {
        let value = composed
            .get(marker)
            .ok_or_else(|| eyre!("marker '{marker}' lost during tree fold"))?;
        out.set(marker.to_string(), value.clone());
    }
    Ok(out)
}
