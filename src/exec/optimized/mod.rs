//! # Optimized Evaluator
//!
//! The index-driven strategy. Each non-`SELECT *` term runs through five
//! stages, every one of which narrows the data before the next touches it:
//!
//! 1. **Classify** ([`classify`]): partition predicates into per-table
//!    row-local predicates, per-pair cross-table predicates (keyed by the
//!    unordered table pair), and the leftover tables with no predicates.
//! 2. **Simplify** ([`simplify`]): reduce each table with row-local
//!    predicates to a fresh table holding only the satisfying records,
//!    intersecting by `_id` when a table has several predicates.
//! 3. **Composite join** ([`composite`]): hash-join each predicate of each
//!    table pair over the simplified tables, tagging output with provenance
//!    markers and composite ids, and intersect multi-predicate pairs down to
//!    one pair table hashed on both markers.
//! 4. **Join forest** ([`forest`]): connect pair tables that share a source
//!    table into trees, then fold each tree bottom-up: a parent keeps a row
//!    only if every child has a matching provenance id, merging in the
//!    children's columns as it goes. Each tree collapses to one table.
//! 5. **Cross product** ([`cross`]): block-join the independent survivors -
//!    tree representatives, untouched tables, and simplified tables outside
//!    any pair - deduplicating by content id between steps.
//!
//! The final table's rows map positionally onto the declared columns, get
//! content-addressed ids, and replace the working set while accumulating
//! into the result. Every intermediate table allocated along the way is
//! dropped before the pass returns, success or not.

mod classify;
mod composite;
mod cross;
mod forest;
mod simplify;

use eyre::{eyre, Result};
use hashbrown::HashSet;
use indexmap::IndexMap;
use tracing::trace;

use crate::engine::Engine;
use crate::records::stream::RecordStream;
use crate::records::Record;
use crate::sql::ast::{Term, WithDecl};

use super::{content_addressed, select_all_pass, TermExecutor};
use classify::Classified;
use cross::CrossInput;

pub struct OptimizedEvaluator;

impl TermExecutor for OptimizedEvaluator {
    fn execute_term(
        &mut self,
        engine: &Engine,
        term: &Term,
        decl: &WithDecl,
        working: &str,
        result: &str,
    ) -> Result<usize> {
        if term.is_select_all() {
            return select_all_pass(engine, term, decl, working, result);
        }
        let mut ctx = TermCtx::new(engine, term, decl);
        let outcome = run_phases(&mut ctx, working, result);
        ctx.cleanup();
        outcome
    }
}

/// One pair table: the canonical pair key, the two logical source tables
/// (sorted), and the physical table holding the composite rows.
pub(crate) struct PairTable {
    pub key: String,
    pub tables: (String, String),
    pub physical: String,
}

/// Per-term execution state: the logical-to-physical name map, the pair
/// tables in canonical key order, and every ephemeral table to drop when
/// the pass ends.
pub(crate) struct TermCtx<'a> {
    pub engine: &'a Engine,
    pub term: &'a Term,
    pub decl: &'a WithDecl,
    pub name_map: IndexMap<String, String>,
    pub pairs: Vec<PairTable>,
    temps: Vec<String>,
}

impl<'a> TermCtx<'a> {
    fn new(engine: &'a Engine, term: &'a Term, decl: &'a WithDecl) -> TermCtx<'a> {
        let mut name_map = IndexMap::new();
        for table in &term.tables {
            name_map.insert(table.clone(), table.clone());
        }
        TermCtx {
            engine,
            term,
            decl,
            name_map,
            pairs: Vec::new(),
            temps: Vec::new(),
        }
    }

    /// Allocates an ephemeral table registered for end-of-pass cleanup.
    pub(crate) fn alloc_temp(&mut self, columns: &[String]) -> Result<String> {
        let name = super::alloc_temp(self.engine, columns)?;
        self.temps.push(name.clone());
        Ok(name)
    }

    /// The physical table standing in for a logical source table.
    pub(crate) fn physical(&self, table: &str) -> Result<&str> {
        self.name_map
            .get(table)
            .map(String::as_str)
            .ok_or_else(|| eyre!("table '{table}' absent from FROM clause"))
    }

    /// Drops every registered temp, tolerating the ones already dropped
    /// eagerly mid-pass.
    fn cleanup(&self) {
        for temp in &self.temps {
            let _ = self.engine.drop_table(temp);
        }
    }
}

fn run_phases(ctx: &mut TermCtx, working: &str, result: &str) -> Result<usize> {
    let classified = classify::classify(ctx.term)?;
    trace!(
        simple = classified.simple.len(),
        pairs = classified.pairs.len(),
        no_ops = classified.no_ops.len(),
        "predicates classified"
    );
    simplify::build_simplified(ctx, &classified)?;
    composite::build_pair_tables(ctx, &classified)?;
    let representatives = forest::intersect_forest(ctx)?;
    let inputs = gather_cross_inputs(ctx, &classified, representatives);
    let final_temp = cross::cross_product(ctx, &inputs)?;
    emit(ctx, &final_temp, working, result)
}

/// Collects the independent tables feeding the cross product: one
/// representative per join tree, every table without predicates, and the
/// simplified tables whose source joined no pair.
fn gather_cross_inputs(
    ctx: &TermCtx,
    classified: &Classified,
    representatives: Vec<String>,
) -> Vec<CrossInput> {
    let in_pairs: HashSet<&str> = classified
        .pairs
        .values()
        .flat_map(|group| [group.tables.0.as_str(), group.tables.1.as_str()])
        .collect();

    let mut inputs: Vec<CrossInput> = representatives
        .into_iter()
        .map(|physical| CrossInput {
            physical,
            qualify: None,
        })
        .collect();
    for table in &classified.no_ops {
        inputs.push(CrossInput {
            physical: table.clone(),
            qualify: Some(table.clone()),
        });
    }
    for (table, simplified) in classified
        .simple
        .keys()
        .filter_map(|t| ctx.name_map.get_key_value(t))
    {
        if !in_pairs.contains(table.as_str()) {
            inputs.push(CrossInput {
                physical: simplified.clone(),
                qualify: Some(table.clone()),
            });
        }
    }
    inputs
}

/// The emit stage: map the final rows onto the declared columns, address
/// them by content, and replace the working set while growing the result.
fn emit(ctx: &TermCtx, final_temp: &str, working: &str, result: &str) -> Result<usize> {
    let rows = ctx
        .engine
        .get_all_records(final_temp)?
        .collect_records()?;
    let mut outputs = Vec::with_capacity(rows.len());
    for row in rows {
        let mut out = Record::new();
        for (pos, col) in ctx.term.cols.iter().enumerate() {
            let qualified = col.qualified()?;
            let value = row
                .get(&qualified)
                .ok_or_else(|| eyre!("column '{qualified}' missing from cross-product output"))?;
            let dst = ctx
                .decl
                .cols
                .get(pos)
                .ok_or_else(|| eyre!("no declared column at position {pos}"))?;
            out.set(dst.clone(), value.clone());
        }
        outputs.push(content_addressed(&out)?);
    }
    ctx.engine.clear_table(working)?;
    ctx.engine
        .insert_unique_records_by_id(working, outputs.clone())?;
    ctx.engine.insert_unique_records_by_id(result, outputs)
}
