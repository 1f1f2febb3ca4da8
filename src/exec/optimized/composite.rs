//! # Composite Pair Tables
//!
//! For every unordered table pair with cross-table predicates, hash-join the
//! pair's simplified tables once per predicate and condense the results into
//! a single *pair table*.
//!
//! Each join projects only the term's output columns drawn from the pair
//! (under their qualified names) and tags every row with provenance markers
//! `_id<t_a>` / `_id<t_b>` plus the composite id `"{left}|{right}"`. The
//! markers carry the *logical* table names even though the join runs over
//! renamed simplification tables - downstream intersection keys on them.
//!
//! A pair with several predicates intersects its per-predicate temps by
//! composite id, so a row survives only if every predicate derived it.
//! The finished pair table is hashed on both markers, ready for the
//! join-forest stage.

use eyre::{eyre, Result};
use tracing::trace;

use crate::exec::intersect_by_id;
use crate::join::{HashJoin, PairIds, ProjectedColumn};
use crate::records::stream::RecordStream;
use crate::records::provenance_column;

use super::classify::Classified;
use super::{PairTable, TermCtx};

pub(crate) fn build_pair_tables(ctx: &mut TermCtx, classified: &Classified) -> Result<()> {
    for (key, group) in &classified.pairs {
        let (table_a, table_b) = &group.tables;
        let marker_a = provenance_column(table_a);
        let marker_b = provenance_column(table_b);

        let projection = pair_projection(ctx, table_a, table_b)?;
        let mut columns: Vec<String> =
            projection.iter().map(|p| p.dst.clone()).collect();
        columns.push(marker_a.clone());
        columns.push(marker_b.clone());

        let mut per_pred = Vec::with_capacity(group.preds.len());
        for pred in &group.preds {
            let lhs_table = pred
                .lhs
                .table()
                .ok_or_else(|| eyre!("pair predicate without a named left side"))?;
            let lhs_col = pred
                .lhs
                .column()
                .ok_or_else(|| eyre!("pair predicate without a named left side"))?;
            let rhs = match &pred.rhs {
                crate::sql::ast::Operand::Column(col) => col,
                crate::sql::ast::Operand::Literal(_) => {
                    return Err(eyre!("constant predicate classified as a pair predicate"))
                }
            };
            let rhs_table = rhs
                .table()
                .ok_or_else(|| eyre!("pair predicate without a named right side"))?;
            let rhs_col = rhs
                .column()
                .ok_or_else(|| eyre!("pair predicate without a named right side"))?;

            let join = HashJoin::new(
                ctx.engine,
                ctx.physical(lhs_table)?,
                lhs_col,
                ctx.physical(rhs_table)?,
                rhs_col,
                projection.clone(),
                pred.cmp,
                Some(PairIds::new(lhs_table, rhs_table)),
            )?;
            let rows = join.collect_records()?;
            let temp = ctx.alloc_temp(&columns)?;
            ctx.engine.insert_unique_records_by_id(&temp, rows)?;
            per_pred.push(temp);
        }

        let physical = if per_pred.len() == 1 {
            per_pred
                .pop()
                .ok_or_else(|| eyre!("pair '{key}' produced no join table"))?
        } else {
            let dest = ctx.alloc_temp(&columns)?;
            intersect_by_id(ctx.engine, &per_pred, &dest)?;
            for temp in per_pred {
                ctx.engine.drop_table(&temp)?;
            }
            dest
        };

        ctx.engine.hash_table(&physical, &marker_a, true)?;
        ctx.engine.hash_table(&physical, &marker_b, true)?;
        let rows = ctx.engine.get_number_of_entries(&physical)?;
        trace!(pair = %key, rows, "pair table built");
        ctx.pairs.push(PairTable {
            key: key.clone(),
            tables: group.tables.clone(),
            physical,
        });
    }
    Ok(())
}

/// The output columns a pair table keeps: every term column whose table is
/// one of the pair, renamed to its qualified form and sourced from the
/// simplified physical table.
fn pair_projection(
    ctx: &TermCtx,
    table_a: &str,
    table_b: &str,
) -> Result<Vec<ProjectedColumn>> {
    let mut projection = Vec::new();
    for col in &ctx.term.cols {
        let (Some(table), Some(column)) = (col.table(), col.column()) else {
            return Err(eyre!("'*' cannot appear in a join term"));
        };
        if table == table_a || table == table_b {
            let entry = ProjectedColumn::new(col.qualified()?, ctx.physical(table)?, column);
            if !projection.contains(&entry) {
                projection.push(entry);
            }
        }
    }
    Ok(projection)
}
