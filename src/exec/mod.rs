//! # Query Execution
//!
//! Both evaluation strategies share the same outer protocol, so their
//! results are directly comparable:
//!
//! 1. The *working* table `W` is created under the WITH-declared name and
//!    the *result* table `R` under the `INTO` destination, both with the
//!    declared columns.
//! 2. The non-recursive term executes once, then the recursive term executes
//!    in a loop. Each pass clears `W`, fills it with the pass output, and
//!    accumulates the same rows into `R` deduplicated by content-addressed
//!    id. The loop terminates when a pass inserts zero new rows into `R`.
//! 3. `W` is dropped on every exit path; `R` is left behind as the query
//!    result (populated on success, partial on abort).
//!
//! Derived rows are content-addressed: a row's `_id` is the JSON text of its
//! non-synthetic columns, mapped positionally onto the declared column
//! names. Base rows (from `SELECT *`) and joined rows therefore dedupe
//! against each other, which is what gives the fixpoint set semantics.
//!
//! The strategies differ only inside a pass: [`standard`] evaluates each
//! term by brute-force nested loops, [`optimized`] classifies predicates and
//! works through hash indexes, composite pair tables, and join-tree
//! intersection.

pub mod optimized;
pub mod standard;

use std::str::FromStr;

use eyre::{bail, ensure, eyre, Result};
use tracing::debug;

use crate::engine::Engine;
use crate::records::stream::RecordStream;
use crate::records::{is_synthetic, Record, ID_COLUMN};
use crate::sql::ast::{Operand, Operation, Query, Term, WithDecl};
use crate::types::Value;

/// Which evaluator drives the fixpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Standard,
    Optimized,
}

impl FromStr for Strategy {
    type Err = eyre::Report;

    fn from_str(text: &str) -> Result<Strategy> {
        match text.to_ascii_lowercase().as_str() {
            "standard" => Ok(Strategy::Standard),
            "optimized" => Ok(Strategy::Optimized),
            other => bail!("unknown strategy '{other}' (expected 'standard' or 'optimized')"),
        }
    }
}

/// What a query run produced: the destination table, the per-pass row deltas
/// (base pass first), and the final result cardinality.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvalOutcome {
    pub result_table: String,
    pub passes: Vec<usize>,
    pub total_rows: usize,
}

impl EvalOutcome {
    /// Recursive passes beyond the base term (the last one adds nothing).
    pub fn recursive_iterations(&self) -> usize {
        self.passes.len().saturating_sub(1)
    }
}

/// Runs one query to its fixpoint under the chosen strategy.
pub fn run_query(engine: &Engine, query: &Query, strategy: Strategy) -> Result<EvalOutcome> {
    match strategy {
        Strategy::Standard => drive_fixpoint(engine, query, &mut standard::StandardEvaluator),
        Strategy::Optimized => drive_fixpoint(engine, query, &mut optimized::OptimizedEvaluator),
    }
}

/// One strategy's term evaluation: derive the term's rows, clear and refill
/// `working`, accumulate into `result`, and report how many rows `result`
/// gained.
pub(crate) trait TermExecutor {
    fn execute_term(
        &mut self,
        engine: &Engine,
        term: &Term,
        decl: &WithDecl,
        working: &str,
        result: &str,
    ) -> Result<usize>;
}

fn validate_query(query: &Query) -> Result<()> {
    for term in [&query.base, &query.recursive] {
        if !term.is_select_all() {
            ensure!(
                term.cols.len() == query.decl.cols.len(),
                "term selects {} columns but '{}' declares {}",
                term.cols.len(),
                query.decl.name,
                query.decl.cols.len()
            );
        }
    }
    Ok(())
}

fn drive_fixpoint(
    engine: &Engine,
    query: &Query,
    executor: &mut dyn TermExecutor,
) -> Result<EvalOutcome> {
    validate_query(query)?;
    let working = query.decl.name.as_str();
    let result = query.destination.as_str();
    engine.add_table(working, &query.decl.cols)?;

    let run = |executor: &mut dyn TermExecutor| -> Result<Vec<usize>> {
        engine.add_table(result, &query.decl.cols)?;
        let mut passes =
            vec![executor.execute_term(engine, &query.base, &query.decl, working, result)?];
        debug!(delta = passes[0], "base pass complete");
        loop {
            let delta =
                executor.execute_term(engine, &query.recursive, &query.decl, working, result)?;
            passes.push(delta);
            debug!(pass = passes.len() - 1, delta, "recursive pass complete");
            if delta == 0 {
                break;
            }
        }
        Ok(passes)
    };

    match run(executor) {
        Ok(passes) => {
            engine.drop_table(working)?;
            let total_rows = engine.get_number_of_entries(result)?;
            Ok(EvalOutcome {
                result_table: result.to_string(),
                passes,
                total_rows,
            })
        }
        Err(err) => {
            let _ = engine.drop_table(working);
            Err(err)
        }
    }
}

// ----------------------------------------------------------------------
// Helpers shared by both strategies
// ----------------------------------------------------------------------

/// Compiles the predicates that apply row-locally to `table` into one
/// closure. A predicate applies when its left-hand side names `table` and a
/// column `table` actually has; the right-hand side is a literal or a column
/// resolved from the same record. With nothing applicable the filter is
/// vacuously true.
pub(crate) fn construct_filter(
    ops: &[Operation],
    table: &str,
    columns: &[String],
) -> impl Fn(&Record) -> Result<bool> + 'static {
    let applicable: Vec<Operation> = ops
        .iter()
        .filter(|op| {
            op.lhs.table() == Some(table)
                && op
                    .lhs
                    .column()
                    .map(|c| columns.iter().any(|k| k == c))
                    .unwrap_or(false)
        })
        .cloned()
        .collect();
    move |record: &Record| {
        for op in &applicable {
            let column = op
                .lhs
                .column()
                .ok_or_else(|| eyre!("predicate left-hand side is not a named column"))?;
            let lhs = record
                .get(column)
                .ok_or_else(|| eyre!("column '{column}' missing from record under filter"))?;
            let rhs: &Value = match &op.rhs {
                Operand::Literal(value) => value,
                Operand::Column(col) => {
                    let rhs_col = col
                        .column()
                        .ok_or_else(|| eyre!("predicate right-hand side is not a named column"))?;
                    record.get(rhs_col).ok_or_else(|| {
                        eyre!("column '{rhs_col}' missing from record under filter")
                    })?
                }
            };
            if !op.cmp.eval(lhs, rhs) {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Strips synthetic columns and stamps the content-addressed identity.
pub(crate) fn content_addressed(record: &Record) -> Result<Record> {
    let mut out = record.without_synthetic();
    let id = out.content_id()?;
    out.set_id(id);
    Ok(out)
}

/// Maps a record's non-synthetic values positionally onto `dst_cols`.
pub(crate) fn rename_positional(record: &Record, dst_cols: &[String]) -> Result<Record> {
    let values: Vec<Value> = record
        .iter()
        .filter(|(col, _)| !is_synthetic(col))
        .map(|(_, value)| value.clone())
        .collect();
    ensure!(
        values.len() == dst_cols.len(),
        "record has {} data columns but {} were declared",
        values.len(),
        dst_cols.len()
    );
    Ok(Record::from_pairs(
        dst_cols.iter().cloned().zip(values),
    ))
}

/// Allocates an ephemeral table with an opaque name.
pub(crate) fn alloc_temp(engine: &Engine, columns: &[String]) -> Result<String> {
    let name = format!(
        "tmp_{}",
        crate::engine::random_suffix(crate::config::TEMP_NAME_SUFFIX_LEN)
    );
    engine.add_table(&name, columns)?;
    Ok(name)
}

/// Inserts into `dest` the records of `sources[0]` whose `_id` every other
/// source also holds. Every source must carry an `_id` index.
pub(crate) fn intersect_by_id(engine: &Engine, sources: &[String], dest: &str) -> Result<usize> {
    let first = sources
        .first()
        .ok_or_else(|| eyre!("intersection needs at least one source"))?;
    let mut scan = engine.get_all_records(first)?;
    let mut survivors = Vec::new();
    'records: while let Some(record) = scan.next_record()? {
        let id = record
            .id()
            .cloned()
            .ok_or_else(|| eyre!("record without '_id' during intersection"))?;
        for other in &sources[1..] {
            if !engine.has_value(other, ID_COLUMN, &id)? {
                continue 'records;
            }
        }
        survivors.push(record);
    }
    engine.insert_unique_records_by_id(dest, survivors)
}

/// The `SELECT *` pass both strategies share: scan the sole source table,
/// apply the row-local filter, reassign content-addressed identities, and
/// replace the working set.
pub(crate) fn select_all_pass(
    engine: &Engine,
    term: &Term,
    decl: &WithDecl,
    working: &str,
    result: &str,
) -> Result<usize> {
    ensure!(
        term.tables.len() == 1,
        "SELECT * reads exactly one table, found {}",
        term.tables.len()
    );
    let source = term.tables[0].as_str();
    let columns = engine.get_table_keys(source)?;
    let filter = construct_filter(&term.ops, source, &columns);
    let records = engine.filter_records(source, filter)?.collect_records()?;

    let mut outputs = Vec::with_capacity(records.len());
    for record in &records {
        let renamed = rename_positional(record, &decl.cols)?;
        outputs.push(content_addressed(&renamed)?);
    }
    engine.clear_table(working)?;
    engine.insert_unique_records_by_id(working, outputs.clone())?;
    engine.insert_unique_records_by_id(result, outputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::ast::Column;
    use crate::types::Comparator;

    fn rec(c1: i64, c2: i64) -> Record {
        Record::from_pairs([("c1", Value::Int(c1)), ("c2", Value::Int(c2))])
    }

    fn op(lhs: Column, cmp: Comparator, rhs: Operand) -> Operation {
        Operation::new(lhs, cmp, rhs).unwrap()
    }

    #[test]
    fn test_filter_with_constant_rhs() {
        let ops = vec![op(
            Column::named("a", "c1"),
            Comparator::Gt,
            Operand::Literal(Value::Int(2)),
        )];
        let cols = vec!["c1".to_string(), "c2".to_string()];
        let filter = construct_filter(&ops, "a", &cols);
        assert!(filter(&rec(3, 0)).unwrap());
        assert!(!filter(&rec(2, 0)).unwrap());
    }

    #[test]
    fn test_filter_with_column_rhs_reads_same_record() {
        let ops = vec![op(
            Column::named("a", "c2"),
            Comparator::Gt,
            Operand::Column(Column::named("a", "c1")),
        )];
        let cols = vec!["c1".to_string(), "c2".to_string()];
        let filter = construct_filter(&ops, "a", &cols);
        assert!(filter(&rec(1, 2)).unwrap());
        assert!(!filter(&rec(2, 1)).unwrap());
    }

    #[test]
    fn test_filter_ignores_other_tables_and_defaults_true() {
        let ops = vec![op(
            Column::named("b", "c1"),
            Comparator::Eq,
            Operand::Literal(Value::Int(1)),
        )];
        let cols = vec!["c1".to_string(), "c2".to_string()];
        let filter = construct_filter(&ops, "a", &cols);
        assert!(filter(&rec(9, 9)).unwrap());
    }

    #[test]
    fn test_content_addressing_round_trips() {
        let mut record = rec(1, 2);
        record.set_id("a:opaque");
        record.set("_ida", Value::Str("x".to_string()));
        let addressed = content_addressed(&record).unwrap();
        assert_eq!(
            addressed.id_key().unwrap(),
            addressed.without_synthetic().content_id().unwrap()
        );
        assert_eq!(addressed.id_key().unwrap(), r#"{"c1":1,"c2":2}"#);
    }

    #[test]
    fn test_rename_positional_maps_in_order() {
        let mut record = Record::from_pairs([
            ("a.c1", Value::Int(7)),
            ("t.c2", Value::Int(8)),
        ]);
        record.set_id("x");
        let renamed =
            rename_positional(&record, &["c1".to_string(), "c2".to_string()]).unwrap();
        assert_eq!(renamed.get("c1"), Some(&Value::Int(7)));
        assert_eq!(renamed.get("c2"), Some(&Value::Int(8)));
        assert!(rename_positional(&record, &["c1".to_string()]).is_err());
    }

    #[test]
    fn test_strategy_parse() {
        assert_eq!("standard".parse::<Strategy>().unwrap(), Strategy::Standard);
        assert_eq!("Optimized".parse::<Strategy>().unwrap(), Strategy::Optimized);
        assert!("fast".parse::<Strategy>().is_err());
    }
}
