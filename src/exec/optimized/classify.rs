//! # Predicate Classification
//!
//! Splits a term's predicates by the shape of work they imply:
//!
//! - *simple*: predicates one table can answer on its own - a column against
//!   a constant, or two columns of the same record. These feed the
//!   per-table simplification stage.
//! - *pair*: predicates relating two different tables, grouped under the
//!   unordered pair canonicalized as the JSON text of the sorted 2-tuple.
//!   These feed the composite-join stage.
//! - *no_ops*: tables named in `FROM` that no predicate mentions at all.
//!
//! A predicate naming a table outside the `FROM` clause is a structural
//! error.

use eyre::{ensure, eyre, Result, WrapErr};
use indexmap::IndexMap;

use crate::sql::ast::{Operand, Operation, Term};

/// Predicates of one unordered table pair.
pub(crate) struct PairGroup {
    pub tables: (String, String),
    pub preds: Vec<Operation>,
}

/// The classified predicate sets of one term.
pub(crate) struct Classified {
    pub simple: IndexMap<String, Vec<Operation>>,
    /// Keyed by canonical pair key, sorted by key.
    pub pairs: IndexMap<String, PairGroup>,
    pub no_ops: Vec<String>,
}

/// The canonical key of an unordered table pair: JSON of the sorted tuple.
pub(crate) fn pair_key(a: &str, b: &str) -> Result<(String, (String, String))> {
    let (first, second) = if a <= b { (a, b) } else { (b, a) };
    let key = serde_json::to_string(&[first, second]).wrap_err("encoding pair key")?;
    Ok((key, (first.to_string(), second.to_string())))
}

pub(crate) fn classify(term: &Term) -> Result<Classified> {
    let mut simple: IndexMap<String, Vec<Operation>> = IndexMap::new();
    let mut pairs: IndexMap<String, PairGroup> = IndexMap::new();

    for op in &term.ops {
        let lhs_table = op
            .lhs
            .table()
            .ok_or_else(|| eyre!("predicate left-hand side is not a named column"))?;
        ensure!(
            term.tables.iter().any(|t| t == lhs_table),
            "predicate references table '{lhs_table}' absent from FROM clause"
        );
        match &op.rhs {
            Operand::Literal(_) => {
                simple
                    .entry(lhs_table.to_string())
                    .or_default()
                    .push(op.clone());
            }
            Operand::Column(col) => {
                let rhs_table = col
                    .table()
                    .ok_or_else(|| eyre!("predicate right-hand side is not a named column"))?;
                ensure!(
                    term.tables.iter().any(|t| t == rhs_table),
                    "predicate references table '{rhs_table}' absent from FROM clause"
                );
                if rhs_table == lhs_table {
                    // both sides read the same record: a row-local predicate
                    simple
                        .entry(lhs_table.to_string())
                        .or_default()
                        .push(op.clone());
                } else {
                    let (key, tables) = pair_key(lhs_table, rhs_table)?;
                    pairs
                        .entry(key)
                        .or_insert_with(|| PairGroup {
                            tables,
                            preds: Vec::new(),
                        })
                        .preds
                        .push(op.clone());
                }
            }
        }
    }
    pairs.sort_keys();

    let mut no_ops = Vec::new();
    for table in &term.tables {
        if no_ops.iter().any(|t| t == table) {
            continue;
        }
        let mentioned = simple.contains_key(table)
            || pairs
                .values()
                .any(|g| g.tables.0 == *table || g.tables.1 == *table);
        if !mentioned {
            no_ops.push(table.clone());
        }
    }

    Ok(Classified {
        simple,
        pairs,
        no_ops,
    })
}
