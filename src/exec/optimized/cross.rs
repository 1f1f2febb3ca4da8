//! # Independent Cross Product
//!
//! After simplification and tree folding, what remains is a set of tables
//! with no predicates relating them: tree representatives, untouched
//! tables, and simplified tables outside any pair. Their rows combine by
//! plain Cartesian product, realized as a left-to-right chain of block
//! nested-loop joins.
//!
//! Two naming regimes meet here: intermediate tables already carry
//! qualified column names (`"a.c1"`), while raw and simplified tables still
//! use their plain columns. Each input's projection qualifies plain columns
//! under the logical table it stands for, so the merged rows never collide.
//! The data columns for every step come from the table's current key list
//! with synthetic columns filtered out.
//!
//! Every step content-addresses its rows and inserts them uniquely, so
//! duplicates collapse between steps rather than fanning out; each
//! intermediate fold table is dropped as soon as the next one exists.

use eyre::{ensure, eyre, Result};

use crate::exec::content_addressed;
use crate::join::{BlockJoin, ProjectedColumn};
use crate::records::is_synthetic;
use crate::records::stream::RecordStream;
use crate::records::Record;

use super::TermCtx;

/// One cross-product input: the physical table, and the logical table to
/// qualify its plain columns under (`None` when columns are already
/// qualified).
pub(crate) struct CrossInput {
    pub physical: String,
    pub qualify: Option<String>,
}

/// Folds the inputs into a single deduplicated table of qualified rows and
/// returns its name.
pub(crate) fn cross_product(ctx: &mut TermCtx, inputs: &[CrossInput]) -> Result<String> {
    ensure!(!inputs.is_empty(), "term produced no cross-product inputs");
    if inputs.len() == 1 {
        return copy_qualified(ctx, &inputs[0]);
    }

    let mut current = join_step(ctx, &inputs[0], &inputs[1])?;
    for input in &inputs[2..] {
        let folded = CrossInput {
            physical: current.clone(),
            qualify: None,
        };
        let next = join_step(ctx, &folded, input)?;
        ctx.engine.drop_table(&current)?;
        current = next;
    }
    Ok(current)
}

/// The projection qualifying one input's data columns.
fn projection_for(ctx: &TermCtx, input: &CrossInput) -> Result<Vec<ProjectedColumn>> {
    let keys = ctx.engine.get_table_keys(&input.physical)?;
    Ok(keys
        .iter()
        .filter(|key| !is_synthetic(key))
        .map(|key| {
            let dst = match &input.qualify {
                Some(logical) => format!("{logical}.{key}"),
                None => key.clone(),
            };
            ProjectedColumn::new(dst, input.physical.clone(), key.clone())
        })
        .collect())
}

fn join_step(ctx: &mut TermCtx, left: &CrossInput, right: &CrossInput) -> Result<String> {
    let mut projection = projection_for(ctx, left)?;
    projection.extend(projection_for(ctx, right)?);
    let columns: Vec<String> = projection.iter().map(|p| p.dst.clone()).collect();
    let dest = ctx.alloc_temp(&columns)?;

    let mut join = BlockJoin::new(
        ctx.engine,
        &left.physical,
        &right.physical,
        projection,
        None,
    )?;
    let mut rows = Vec::new();
    while let Some(row) = join.next_record()? {
        rows.push(content_addressed(&row)?);
    }
    ctx.engine.insert_unique_records_by_id(&dest, rows)?;
    Ok(dest)
}

/// The single-input case: copy into a fresh table, qualifying and
/// deduplicating by content id.
fn copy_qualified(ctx: &mut TermCtx, input: &CrossInput) -> Result<String> {
    let mappings: Vec<(String, String)> = ctx
        .engine
        .get_table_keys(&input.physical)?
        .into_iter()
        .filter(|key| !is_synthetic(key))
        .map(|key| {
            let dst = match &input.qualify {
                Some(logical) => format!("{logical}.{key}"),
                None => key.clone(),
            };
            (dst, key)
        })
        .collect();
    let columns: Vec<String> = mappings.iter().map(|(dst, _)| dst.clone()).collect();
    let dest = ctx.alloc_temp(&columns)?;

    let mut scan = ctx.engine.get_all_records(&input.physical)?;
    let mut rows = Vec::new();
    while let Some(record) = scan.next_record()? {
        let mut out = Record::new();
        for (dst, src) in &mappings {
            let value = record
                .get(src)
                .ok_or_else(|| eyre!("column '{src}' missing from '{}'", input.physical))?;
            out.set(dst.clone(), value.clone());
        }
        rows.push(content_addressed(&out)?);
    }
    ctx.engine.insert_unique_records_by_id(&dest, rows)?;
    Ok(dest)
}
