//! # Per-Table Simplification
//!
//! For every table with row-local predicates, build a fresh table holding
//! only the records that satisfy all of them, and point the name map at it.
//! Downstream stages then join and scan the simplified tables instead of
//! the originals.
//!
//! Each predicate materializes its own temp table first: constant
//! right-hand sides go through a hash index lookup, column right-hand sides
//! through a compiled-filter scan (an index cannot answer a column probe).
//! With several predicates the temps intersect by `_id`; with one, it is
//! copied across. The per-predicate temps are dropped eagerly - only the
//! simplified table itself survives the stage.

use eyre::Result;
use tracing::trace;

use crate::exec::{construct_filter, intersect_by_id};
use crate::records::stream::RecordStream;
use crate::records::Record;
use crate::sql::ast::Operand;

use super::classify::Classified;
use super::TermCtx;

pub(crate) fn build_simplified(ctx: &mut TermCtx, classified: &Classified) -> Result<()> {
    let tables: Vec<String> = ctx.term.tables.clone();
    for table in &tables {
        let Some(preds) = classified.simple.get(table) else {
            continue;
        };
        if ctx.name_map.get(table).map(String::as_str) != Some(table.as_str()) {
            continue; // duplicate FROM entry already simplified
        }

        let engine = ctx.engine;
        let columns = engine.get_table_keys(table)?;
        let simplified = ctx.alloc_temp(&columns)?;

        let mut per_pred = Vec::with_capacity(preds.len());
        for pred in preds {
            let matching: Vec<Record> = match &pred.rhs {
                Operand::Literal(value) => {
                    let column = pred
                        .lhs
                        .column()
                        .ok_or_else(|| eyre::eyre!("predicate without a named column"))?;
                    if !engine.is_table_hashed(table, column)? {
                        engine.hash_table(table, column, true)?;
                    }
                    engine
                        .get_recs_from_hash(table, column, pred.cmp, value)?
                        .collect_records()?
                }
                Operand::Column(_) => {
                    let filter =
                        construct_filter(std::slice::from_ref(pred), table, &columns);
                    engine.filter_records(table, filter)?.collect_records()?
                }
            };
            let temp = ctx.alloc_temp(&columns)?;
            engine.insert_unique_records_by_id(&temp, matching)?;
            per_pred.push(temp);
        }

        let kept = if per_pred.len() >= 2 {
            intersect_by_id(engine, &per_pred, &simplified)?
        } else {
            let records = engine
                .get_all_records(&per_pred[0])?
                .collect_records()?;
            engine.insert_unique_records_by_id(&simplified, records)?
        };
        trace!(table = %table, kept, predicates = preds.len(), "table simplified");

        for temp in per_pred {
            engine.drop_table(&temp)?;
        }
        ctx.name_map.insert(table.clone(), simplified);
    }
    Ok(())
}
