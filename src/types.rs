//! # Scalar Values and Loose Comparison
//!
//! rexdb records hold exactly two scalar shapes: 64-bit signed integers and
//! strings. Comparison between them is deliberately *loose*: the integer `3`
//! and the string `"3"` are the same value as far as predicates and hash
//! indexes are concerned. To make that mechanical rather than special-cased,
//! every value normalizes to an index key string (`Value::index_key`);
//! numeric-looking strings canonicalize to their decimal form, so `"03"`,
//! `" 3"` and `3` all share the key `"3"`.
//!
//! Ordering follows the underlying scalar: if both operands are numeric the
//! comparison is numeric, otherwise it is lexicographic on the key form.
//!
//! Values serialize untagged (`3` as a JSON number, `"x"` as a JSON string),
//! which is load-bearing: content-addressed record ids are the JSON text of
//! the record, and CSV ingestion promises exactly that shape.

use std::cmp::Ordering;
use std::fmt;

use eyre::{bail, Result};
use serde::Serialize;

/// A scalar stored in a record: integer or string.
///
/// Derived equality is strict (`Int(3) != Str("3")`); use [`Value::loose_eq`]
/// or key comparison for predicate semantics.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum Value {
    Int(i64),
    Str(String),
}

impl Value {
    /// Parses a literal the way the query grammar and CSV loader do:
    /// anything that parses as an `i64` is an integer, everything else is a
    /// string.
    pub fn from_literal(text: &str) -> Value {
        match text.trim().parse::<i64>() {
            Ok(n) => Value::Int(n),
            Err(_) => Value::Str(text.to_string()),
        }
    }

    /// The normalized key this value hashes and compares under.
    pub fn index_key(&self) -> String {
        match self {
            Value::Int(n) => n.to_string(),
            Value::Str(s) => match s.trim().parse::<i64>() {
                Ok(n) => n.to_string(),
                Err(_) => s.clone(),
            },
        }
    }

    /// The numeric reading of this value, if it has one.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::Str(s) => s.trim().parse::<i64>().ok(),
        }
    }

    /// Loose equality: `3` and `"3"` collide.
    pub fn loose_eq(&self, other: &Value) -> bool {
        self.loose_cmp(other) == Ordering::Equal
    }

    /// Loose ordering: numeric when both sides are numeric, lexicographic on
    /// the normalized key otherwise.
    pub fn loose_cmp(&self, other: &Value) -> Ordering {
        match (self.as_int(), other.as_int()) {
            (Some(a), Some(b)) => a.cmp(&b),
            _ => self.index_key().cmp(&other.index_key()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{n}"),
            Value::Str(s) => write!(f, "{s}"),
        }
    }
}

/// Compares two normalized index keys with the same loose semantics values
/// use: numeric when both keys parse, lexicographic otherwise.
pub fn compare_keys(a: &str, b: &str) -> Ordering {
    match (a.parse::<i64>(), b.parse::<i64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        _ => a.cmp(b),
    }
}

/// The two comparison operators the engine supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Comparator {
    Eq,
    Gt,
}

impl Comparator {
    /// Parses the textual operator; anything but `=` and `>` is rejected at
    /// construction time.
    pub fn parse(text: &str) -> Result<Comparator> {
        match text {
            "=" => Ok(Comparator::Eq),
            ">" => Ok(Comparator::Gt),
            other => bail!("unsupported operator '{other}' (only = and > are supported)"),
        }
    }

    /// Evaluates `lhs <op> rhs` under loose comparison.
    pub fn eval(&self, lhs: &Value, rhs: &Value) -> bool {
        match self {
            Comparator::Eq => lhs.loose_eq(rhs),
            Comparator::Gt => lhs.loose_cmp(rhs) == Ordering::Greater,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Comparator::Eq => "=",
            Comparator::Gt => ">",
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
