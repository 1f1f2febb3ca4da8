//! # Query IR
//!
//! The immutable values the evaluators consume. Construction is where
//! validation happens: unsupported operators, malformed column references,
//! and shape errors are rejected here so the evaluators can assume
//! well-formed input.
//!
//! Right-hand sides follow literal detection: anything that parses as an
//! integer is an integer, everything else is a string, and `t.c` shapes are
//! column references.

use eyre::{bail, ensure, Result};

use crate::types::{Comparator, Value};

/// A column reference: `*` or `table.column`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Column {
    All,
    Named { table: String, column: String },
}

impl Column {
    /// Parses `"*"` or `"t.c"`.
    pub fn parse(text: &str) -> Result<Column> {
        let text = text.trim();
        if text == "*" {
            return Ok(Column::All);
        }
        match text.split_once('.') {
            Some((table, column)) if !table.is_empty() && !column.is_empty() => {
                Ok(Column::Named {
                    table: table.to_string(),
                    column: column.to_string(),
                })
            }
            _ => bail!("malformed column reference '{text}' (expected '*' or 't.c')"),
        }
    }

    pub fn named(table: impl Into<String>, column: impl Into<String>) -> Column {
        Column::Named {
            table: table.into(),
            column: column.into(),
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Column::All)
    }

    pub fn table(&self) -> Option<&str> {
        match self {
            Column::All => None,
            Column::Named { table, .. } => Some(table),
        }
    }

    pub fn column(&self) -> Option<&str> {
        match self {
            Column::All => None,
            Column::Named { column, .. } => Some(column),
        }
    }

    /// The `table.column` text of a named reference; intermediate tables use
    /// this as their column naming scheme.
    pub fn qualified(&self) -> Result<String> {
        match self {
            Column::All => bail!("'*' has no qualified name"),
            Column::Named { table, column } => Ok(format!("{table}.{column}")),
        }
    }
}

/// An operation's right-hand side: a column reference or a literal.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Column(Column),
    Literal(Value),
}

impl Operand {
    pub fn literal(text: &str) -> Operand {
        Operand::Literal(Value::from_literal(text))
    }
}

/// One predicate: `lhs <op> rhs`.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub lhs: Column,
    pub cmp: Comparator,
    pub rhs: Operand,
}

impl Operation {
    pub fn new(lhs: Column, cmp: Comparator, rhs: Operand) -> Result<Operation> {
        ensure!(
            !lhs.is_all(),
            "predicate left-hand side must be a named column"
        );
        if let Operand::Column(col) = &rhs {
            ensure!(
                !col.is_all(),
                "predicate right-hand side must be a named column or literal"
            );
        }
        Ok(Operation { lhs, cmp, rhs })
    }
}

/// One `SELECT cols FROM tables [WHERE ops]` term.
#[derive(Debug, Clone, PartialEq)]
pub struct Term {
    pub cols: Vec<Column>,
    pub tables: Vec<String>,
    pub ops: Vec<Operation>,
}

impl Term {
    pub fn new(cols: Vec<Column>, tables: Vec<String>, ops: Vec<Operation>) -> Result<Term> {
        ensure!(!cols.is_empty(), "a term must select at least one column");
        ensure!(!tables.is_empty(), "a term must read at least one table");
        if cols.iter().any(Column::is_all) {
            ensure!(
                cols.len() == 1,
                "'*' cannot be combined with other select columns"
            );
        }
        Ok(Term { cols, tables, ops })
    }

    pub fn is_select_all(&self) -> bool {
        matches!(self.cols.as_slice(), [Column::All])
    }
}

/// The `WITH RECURSIVE <name>(<cols>)` declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithDecl {
    pub name: String,
    pub cols: Vec<String>,
}

/// One full recursive query.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub decl: WithDecl,
    pub base: Term,
    pub recursive: Term,
    pub destination: String,
}
