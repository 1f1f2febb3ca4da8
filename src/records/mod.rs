//! # Records and Synthetic Columns
//!
//! A record is an ordered mapping from column name to scalar. Column order is
//! declaration order and is preserved through every copy, because the JSON
//! text of a record is its content-addressed identity: two derived rows with
//! equal non-synthetic content must serialize byte-identically.
//!
//! ## Synthetic Columns
//!
//! Column names beginning with `_id` are reserved:
//!
//! - `_id` is the record's identity within a table
//! - `_id<TABLE>` columns are provenance markers injected by joins, naming
//!   the source record a composite row was built from
//!
//! [`Record::without_synthetic`] strips all of them, and
//! [`Record::content_id`] derives the identity of a row from what remains.
//!
//! Records are passed by value everywhere: a caller may mutate a yielded
//! record freely without affecting storage.

pub mod stream;

use eyre::{Result, WrapErr};
use indexmap::IndexMap;
use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::types::Value;

/// The identity column present on every stored record.
pub const ID_COLUMN: &str = "_id";

/// Prefix shared by all synthetic columns.
pub const SYNTHETIC_PREFIX: &str = "_id";

/// True for `_id` and every `_id<TABLE>` provenance marker.
pub fn is_synthetic(column: &str) -> bool {
    column.starts_with(SYNTHETIC_PREFIX)
}

/// The provenance marker column joins emit for records drawn from `table`.
pub fn provenance_column(table: &str) -> String {
    format!("{SYNTHETIC_PREFIX}{table}")
}

/// An ordered column-to-value mapping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: IndexMap<String, Value>,
}

impl Record {
    pub fn new() -> Record {
        Record::default()
    }

    pub fn from_pairs<I, S>(pairs: I) -> Record
    where
        I: IntoIterator<Item = (S, Value)>,
        S: Into<String>,
    {
        Record {
            fields: pairs.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields.get(column)
    }

    /// Sets a column, appending it to the column order if new.
    pub fn set(&mut self, column: impl Into<String>, value: Value) {
        self.fields.insert(column.into(), value);
    }

    pub fn id(&self) -> Option<&Value> {
        self.fields.get(ID_COLUMN)
    }

    /// The record's identity in normalized key form.
    pub fn id_key(&self) -> Option<String> {
        self.id().map(Value::index_key)
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        self.fields.insert(ID_COLUMN.to_string(), Value::Str(id.into()));
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// A copy with `_id` and every provenance marker removed, preserving the
    /// order of the remaining columns.
    pub fn without_synthetic(&self) -> Record {
        Record {
            fields: self
                .fields
                .iter()
                .filter(|(k, _)| !is_synthetic(k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }

    /// The content-addressed identity of this record: the JSON text of its
    /// non-synthetic columns in column order.
    pub fn content_id(&self) -> Result<String> {
        serde_json::to_string(&self.without_synthetic())
            .wrap_err("serializing record for content addressing")
    }

    /// A copy with `other`'s fields merged in; `other` wins on collisions.
    pub fn merged(&self, other: &Record) -> Record {
        let mut out = self.clone();
        for (k, v) in &other.fields {
            out.fields.insert(k.clone(), v.clone());
        }
        out
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (k, v) in &self.fields {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(c1: i64, c2: i64) -> Record {
        Record::from_pairs([("c1", Value::Int(c1)), ("c2", Value::Int(c2))])
    }

    #[test]
    fn test_synthetic_column_detection() {
        assert!(is_synthetic("_id"));
        assert!(is_synthetic("_idedges"));
        assert!(!is_synthetic("c1"));
        assert_eq!(provenance_column("edges"), "_idedges");
    }

    #[test]
    fn test_column_order_is_preserved() {
        let mut rec = Record::new();
        rec.set("b", Value::Int(2));
        rec.set("a", Value::Int(1));
        let cols: Vec<&str> = rec.columns().collect();
        assert_eq!(cols, vec!["b", "a"]);
    }

    #[test]
    fn test_content_id_ignores_synthetic_columns() {
        let mut rec = edge(1, 2);
        let bare = rec.content_id().unwrap();
        rec.set_id("edges:xyz");
        rec.set(provenance_column("edges"), Value::Str("other".to_string()));
        assert_eq!(rec.content_id().unwrap(), bare);
        assert_eq!(bare, r#"{"c1":1,"c2":2}"#);
    }

    #[test]
    fn test_merged_overwrites_left_with_right() {
        let left = edge(1, 2);
        let mut right = Record::new();
        right.set("c2", Value::Int(9));
        right.set("c3", Value::Int(3));
        let out = left.merged(&right);
        assert_eq!(out.get("c1"), Some(&Value::Int(1)));
        assert_eq!(out.get("c2"), Some(&Value::Int(9)));
        assert_eq!(out.get("c3"), Some(&Value::Int(3)));
    }

    #[test]
    fn test_id_key_normalizes() {
        let mut rec = edge(1, 2);
        rec.set(ID_COLUMN, Value::Int(7));
        assert_eq!(rec.id_key().as_deref(), Some("7"));
    }
}
