//! # Datasets - CSV Ingestion and Synthetic Generators
//!
//! The input side of the benchmark workflow: CSV files loaded as tables,
//! plus seedable generators for the two synthetic workloads (random edge
//! graphs and random permutations).
//!
//! ## CSV Shape
//!
//! UTF-8, LF or CRLF line endings, comma-separated, no quoting, no header.
//! Columns are named `c1..cN` after the first row's width; every field that
//! parses as an integer loads as one. Each row's `_id` is the JSON text of
//! the row - assigned *before* any scale cut, so a row keeps the same
//! identity at every scale. A scale of `s` percent keeps the first
//! `round(n * s / 100)` rows.
//!
//! That `_id` is exactly the content-addressed identity derived rows get,
//! which is what lets base rows and joined rows deduplicate against each
//! other in the result table.

use std::path::Path;

use eyre::{ensure, Result, WrapErr};
use hashbrown::HashSet;
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::debug;

use crate::engine::Engine;
use crate::records::Record;
use crate::types::Value;

/// Parses CSV text into column names and records with content `_id`s.
pub fn parse_csv(text: &str) -> Result<(Vec<String>, Vec<Record>)> {
    let mut columns: Vec<String> = Vec::new();
    let mut records = Vec::new();
    for (line_no, raw_line) in text.split('\n').enumerate() {
        let line = raw_line.strip_suffix('\r').unwrap_or(raw_line);
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(',').collect();
        if columns.is_empty() {
            columns = (1..=fields.len()).map(|i| format!("c{i}")).collect();
        }
        ensure!(
            fields.len() == columns.len(),
            "line {} has {} fields, expected {}",
            line_no + 1,
            fields.len(),
            columns.len()
        );
        let mut record = Record::from_pairs(
            columns
                .iter()
                .cloned()
                .zip(fields.iter().map(|f| Value::from_literal(f))),
        );
        let id = record.content_id()?;
        record.set_id(id);
        records.push(record);
    }
    Ok((columns, records))
}

/// The number of rows a scale percentage keeps.
pub fn scale_cut(rows: usize, scale_percent: f64) -> usize {
    ((rows as f64 * scale_percent) / 100.0).round() as usize
}

/// Loads a CSV file as table `name`, keeping the first `scale_percent` of
/// its rows. Returns the number of rows loaded.
pub fn load_csv_table(
    engine: &Engine,
    name: &str,
    path: impl AsRef<Path>,
    scale_percent: f64,
) -> Result<usize> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("reading CSV file {}", path.display()))?;
    let (columns, mut records) = parse_csv(&text)?;
    records.truncate(scale_cut(records.len(), scale_percent));
    let loaded = records.len();

    engine.add_table(name, &columns)?;
    engine.insert_unique_records_by_id(name, records)?;
    debug!(table = name, rows = loaded, scale = scale_percent, "CSV loaded");
    Ok(loaded)
}

/// Loads integer pairs as a two-column table with CSV-convention ids.
pub fn load_pairs(engine: &Engine, name: &str, pairs: &[(i64, i64)]) -> Result<()> {
    let columns = vec!["c1".to_string(), "c2".to_string()];
    let mut records = Vec::with_capacity(pairs.len());
    for &(a, b) in pairs {
        let mut record =
            Record::from_pairs([("c1", Value::Int(a)), ("c2", Value::Int(b))]);
        let id = record.content_id()?;
        record.set_id(id);
        records.push(record);
    }
    engine.add_table(name, &columns)?;
    engine.insert_unique_records_by_id(name, records)?;
    Ok(())
}

/// Renders integer pairs in the CSV shape `parse_csv` accepts.
pub fn pairs_to_csv(pairs: &[(i64, i64)]) -> String {
    let mut out = String::new();
    for &(a, b) in pairs {
        out.push_str(&format!("{a},{b}\n"));
    }
    out
}

/// `edge_count` distinct random edges over nodes `1..=nodes`, no
/// self-loops.
pub fn random_edge_graph(
    rng: &mut impl Rng,
    nodes: usize,
    edge_count: usize,
) -> Vec<(i64, i64)> {
    let nodes = nodes.max(2) as i64;
    let max_edges = (nodes * (nodes - 1)) as usize;
    let target = edge_count.min(max_edges);
    let mut seen = HashSet::new();
    let mut edges = Vec::with_capacity(target);
    while edges.len() < target {
        let from = rng.gen_range(1..=nodes);
        let to = rng.gen_range(1..=nodes);
        if from != to && seen.insert((from, to)) {
            edges.push((from, to));
        }
    }
    edges
}

/// A random permutation of `1..=n` as `(i, p(i))` rows.
pub fn random_permutation(rng: &mut impl Rng, n: usize) -> Vec<(i64, i64)> {
    let mut image: Vec<i64> = (1..=n as i64).collect();
    image.shuffle(rng);
    (1..=n as i64).zip(image).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_parse_csv_types_and_ids() {
        let (columns, records) = parse_csv("1,2\n2,abc\r\n").unwrap();
        assert_eq!(columns, vec!["c1", "c2"]);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("c1"), Some(&Value::Int(1)));
        assert_eq!(records[0].id_key().unwrap(), r#"{"c1":1,"c2":2}"#);
        assert_eq!(records[1].get("c2"), Some(&Value::Str("abc".to_string())));
        assert_eq!(records[1].id_key().unwrap(), r#"{"c1":2,"c2":"abc"}"#);
    }

    #[test]
    fn test_parse_csv_rejects_ragged_rows() {
        assert!(parse_csv("1,2\n3\n").is_err());
    }

    #[test]
    fn test_scale_cut_rounds() {
        assert_eq!(scale_cut(10, 100.0), 10);
        assert_eq!(scale_cut(10, 25.0), 3); // 2.5 rounds up
        assert_eq!(scale_cut(10, 24.0), 2);
        assert_eq!(scale_cut(0, 50.0), 0);
    }

    #[test]
    fn test_load_csv_applies_scale_after_ids() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("edges.csv");
        std::fs::write(&path, "1,2\n2,3\n3,4\n4,5\n").unwrap();

        let engine = Engine::builder().page_fetch_micros(0).build();
        let loaded = load_csv_table(&engine, "a", &path, 50.0).unwrap();
        assert_eq!(loaded, 2);
        assert_eq!(engine.get_number_of_entries("a").unwrap(), 2);
    }

    #[test]
    fn test_random_permutation_is_a_bijection() {
        let mut rng = StdRng::seed_from_u64(7);
        let rows = random_permutation(&mut rng, 12);
        assert_eq!(rows.len(), 12);
        let mut targets: Vec<i64> = rows.iter().map(|&(_, p)| p).collect();
        targets.sort();
        assert_eq!(targets, (1..=12).collect::<Vec<i64>>());
    }

    #[test]
    fn test_random_graph_has_distinct_loopless_edges() {
        let mut rng = StdRng::seed_from_u64(7);
        let edges = random_edge_graph(&mut rng, 10, 30);
        assert_eq!(edges.len(), 30);
        let unique: HashSet<(i64, i64)> = edges.iter().copied().collect();
        assert_eq!(unique.len(), 30);
        assert!(edges.iter().all(|&(a, b)| a != b));
    }

    #[test]
    fn test_pairs_round_trip_through_csv() {
        let pairs = vec![(1, 2), (3, 4)];
        let (_, records) = parse_csv(&pairs_to_csv(&pairs)).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].get("c2"), Some(&Value::Int(4)));
    }
}
