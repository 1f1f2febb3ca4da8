//! # Standard Evaluator
//!
//! The naive baseline: each term is evaluated by materializing every source
//! table and walking the full Cartesian product with an odometer, testing
//! every predicate per combination. No hash index is ever consulted, so the
//! buffer sees the access pattern of repeated full scans - exactly the cost
//! profile the optimized strategy exists to beat.

use eyre::{eyre, Result};

use crate::engine::Engine;
use crate::records::stream::RecordStream;
use crate::records::Record;
use crate::sql::ast::{Operand, Term, WithDecl};
use crate::types::Value;

use super::{content_addressed, select_all_pass, TermExecutor};

pub struct StandardEvaluator;

impl TermExecutor for StandardEvaluator {
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

        // one record vector per distinct source table
        let mut per_table: Vec<(String, Vec<Record>)> = Vec::new();
        for table in &term.tables {
            if per_table.iter().any(|(name, _)| name == table) {
                continue;
            }
            let records = engine.get_all_records(table)?.collect_records()?;
            per_table.push((table.clone(), records));
        }

        let mut outputs = Vec::new();
        let sizes: Vec<usize> = per_table.iter().map(|(_, recs)| recs.len()).collect();
        if sizes.iter().all(|&n| n > 0) {
            let mut cursor = vec![0usize; per_table.len()];
            'combos: loop {
                let assignment: Vec<(&str, &Record)> = per_table
                    .iter()
                    .zip(cursor.iter())
                    .map(|((name, recs), &i)| (name.as_str(), &recs[i]))
                    .collect();

                if satisfies_all(term, &assignment)? {
                    let mut out = Record::new();
                    for (pos, col) in term.cols.iter().enumerate() {
                        let value = resolve(&assignment, col.table(), col.column())?;
                        out.set(decl.cols[pos].clone(), value);
                    }
                    outputs.push(content_addressed(&out)?);
                }

                let mut level = cursor.len();
                loop {
                    if level == 0 {
                        break 'combos;
                    }
                    level -= 1;
                    cursor[level] += 1;
                    if cursor[level] < sizes[level] {
                        break;
                    }
                    cursor[level] = 0;
                }
            }
        }

        engine.clear_table(working)?;
        engine.insert_unique_records_by_id(working, outputs.clone())?;
        engine.insert_unique_records_by_id(result, outputs)
    }
}

fn resolve(
    assignment: &[(&str, &Record)],
    table: Option<&str>,
    column: Option<&str>,
) -> Result<Value> {
    let table = table.ok_or_else(|| eyre!("expected a named column reference"))?;
    let column = column.ok_or_else(|| eyre!("expected a named column reference"))?;
    let record = assignment
        .iter()
        .find(|(name, _)| *name == table)
        .map(|(_, rec)| *rec)
        .ok_or_else(|| eyre!("reference to table '{table}' absent from FROM clause"))?;
    record
        .get(column)
        .cloned()
        .ok_or_else(|| eyre!("column '{column}' missing from table '{table}'"))
}

fn satisfies_all(term: &Term, assignment: &[(&str, &Record)]) -> Result<bool> {
    for op in &term.ops {
        let lhs = resolve(assignment, op.lhs.table(), op.lhs.column())?;
        let rhs = match &op.rhs {
            Operand::Literal(value) => value.clone(),
            Operand::Column(col) => resolve(assignment, col.table(), col.column())?,
        };
        if !op.cmp.eval(&lhs, &rhs) {
            return Ok(false);
        }
    }
    Ok(true)
}
