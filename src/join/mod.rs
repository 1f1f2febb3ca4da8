//! # Join Engine - Block Nested-Loop and Hash Join Streams
//!
//! Both joins are lazy pull streams over catalog tables, so the buffer's
//! fetch latency lands exactly where the access pattern puts it: the block
//! join pays for one fresh inner rescan per outer block, the hash join pays
//! for the locator lists it actually materializes.
//!
//! ## Projections
//!
//! A projection entry is `{dst_col <- (src_table, src_col)}` with an explicit
//! source selector, so the same column name may appear in both operands
//! without ambiguity. A source table that names neither operand is a
//! structural error.
//!
//! ## Provenance
//!
//! With `pair_ids` enabled a join also emits `_id<label>` markers carrying
//! each source record's identity. The labels default to the operand table
//! names but may be overridden: the recursive evaluator joins renamed
//! simplification tables while downstream intersection keys provenance on
//! the logical source-table names. The hash join additionally emits the
//! composite identity `_id = "{left_id}|{right_id}"`; the block join never
//! produces a composite row id.
//!
//! When both operands are the same physical table, pair-id output drops the
//! degenerate rows that pair a record with itself.
//!
//! ## Ordering
//!
//! Block join output is grouped by outer block, then by inner scan order
//! within a block. Hash join output is grouped by left key (ascending key
//! order), then right key. No total order is promised to callers.

use eyre::{bail, ensure, eyre, Result};
use tracing::trace;

use crate::engine::{Engine, TableScan};
use crate::records::stream::RecordStream;
use crate::records::{provenance_column, Record, ID_COLUMN};
use crate::types::{compare_keys, Comparator, Value};

/// One projection entry: `dst <- src_table.src_col`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectedColumn {
    pub dst: String,
    pub src_table: String,
    pub src_col: String,
}

impl ProjectedColumn {
    pub fn new(
        dst: impl Into<String>,
        src_table: impl Into<String>,
        src_col: impl Into<String>,
    ) -> ProjectedColumn {
        ProjectedColumn {
            dst: dst.into(),
            src_table: src_table.into(),
            src_col: src_col.into(),
        }
    }
}

/// Provenance labels for pair-id output; `left`/`right` name the logical
/// source of each operand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairIds {
    pub left: String,
    pub right: String,
}

impl PairIds {
    pub fn new(left: impl Into<String>, right: impl Into<String>) -> PairIds {
        PairIds {
            left: left.into(),
            right: right.into(),
        }
    }
}

fn apply_projection(
    proj: &[ProjectedColumn],
    left_table: &str,
    left: &Record,
    right_table: &str,
    right: &Record,
) -> Result<Record> {
    let mut out = Record::new();
    for entry in proj {
        let source = if entry.src_table == left_table {
            left
        } else if entry.src_table == right_table {
            right
        } else {
            bail!(
                "projection source '{}' is neither join operand ('{}', '{}')",
                entry.src_table,
                left_table,
                right_table
            );
        };
        let value = source.get(&entry.src_col).ok_or_else(|| {
            eyre!(
                "column '{}' missing from table '{}'",
                entry.src_col,
                entry.src_table
            )
        })?;
        out.set(entry.dst.clone(), value.clone());
    }
    Ok(out)
}

fn record_id(rec: &Record, side: &str) -> Result<Value> {
    rec.id()
        .cloned()
        .ok_or_else(|| eyre!("{side} join operand record has no '_id'"))
}

/// Block nested-loop join: drives the outer table in contiguous blocks and
/// rescans the inner table once per block.
pub struct BlockJoin {
    engine: Engine,
    left_name: String,
    right_name: String,
    proj: Vec<ProjectedColumn>,
    pair_ids: Option<PairIds>,
    block_size: usize,
    outer: TableScan,
    block: Vec<Record>,
    block_pos: usize,
    inner: Option<TableScan>,
    inner_rec: Option<Record>,
    exhausted: bool,
}

impl BlockJoin {
    pub fn new(
        engine: &Engine,
        left: &str,
        right: &str,
        proj: Vec<ProjectedColumn>,
        pair_ids: Option<PairIds>,
    ) -> Result<BlockJoin> {
        let outer = engine.get_all_records(left)?;
        engine.table_handle(right)?; // fail fast on a missing inner
        let block_size = engine.config().block_join_size;
        ensure!(block_size > 0, "block join size must be positive");
        Ok(BlockJoin {
            engine: engine.clone(),
            left_name: left.to_string(),
            right_name: right.to_string(),
            proj,
            pair_ids,
            block_size,
            outer,
            block: Vec::new(),
            block_pos: 0,
            inner: None,
            inner_rec: None,
            exhausted: false,
        })
    }

    fn emit(&self, left: &Record, right: &Record) -> Result<Record> {
        let mut out = apply_projection(
            &self.proj,
            &self.left_name,
            left,
            &self.right_name,
            right,
        )?;
        if let Some(pair) = &self.pair_ids {
            out.set(provenance_column(&pair.left), record_id(left, "left")?);
            out.set(provenance_column(&pair.right), record_id(right, "right")?);
        }
        Ok(out)
    }
}

impl RecordStream for BlockJoin {
    fn next_record(&mut self) -> Result<Option<Record>> {
        loop {
            if self.exhausted {
                return Ok(None);
            }
            if self.block.is_empty() {
                while self.block.len() < self.block_size {
                    match self.outer.next_record()? {
                        Some(rec) => self.block.push(rec),
                        None => break,
                    }
                }
                if self.block.is_empty() {
                    self.exhausted = true;
                    return Ok(None);
                }
                trace!(
                    left = %self.left_name,
                    block = self.block.len(),
                    "block join: fresh inner scan"
                );
                self.inner = Some(self.engine.get_all_records(&self.right_name)?);
                self.inner_rec = None;
            }
            if self.inner_rec.is_none() {
                let scan = self
                    .inner
                    .as_mut()
                    .ok_or_else(|| eyre!("block join inner scan missing"))?;
                match scan.next_record()? {
                    Some(rec) => {
                        self.inner_rec = Some(rec);
                        self.block_pos = 0;
                    }
                    None => {
                        self.block.clear();
                        self.inner = None;
                        continue;
                    }
                }
            }
            if self.block_pos < self.block.len() {
                let left = self.block[self.block_pos].clone();
                self.block_pos += 1;
                let right = self
                    .inner_rec
                    .clone()
                    .ok_or_else(|| eyre!("block join inner record missing"))?;
                if self.pair_ids.is_some()
                    && self.left_name == self.right_name
                    && left.id_key() == right.id_key()
                {
                    continue;
                }
                return Ok(Some(self.emit(&left, &right)?));
            }
            self.inner_rec = None;
        }
    }
}

/// Hash join: drives the distinct left keys and enumerates matching right
/// keys under `=` or `>`, emitting the per-key-pair Cartesian product.
pub struct HashJoin {
    engine: Engine,
    left_name: String,
    right_name: String,
    left_col: String,
    right_col: String,
    proj: Vec<ProjectedColumn>,
    cmp: Comparator,
    pair_ids: Option<PairIds>,
    left_keys: Vec<String>,
    key_pos: usize,
    right_keys_all: Vec<String>,
    left_recs: Vec<Record>,
    group_keys: Vec<String>,
    group_pos: usize,
    right_recs: Vec<Record>,
    i: usize,
    j: usize,
}

impl HashJoin {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        engine: &Engine,
        left: &str,
        left_col: &str,
        right: &str,
        right_col: &str,
        proj: Vec<ProjectedColumn>,
        cmp: Comparator,
        pair_ids: Option<PairIds>,
    ) -> Result<HashJoin> {
        if !engine.is_table_hashed(left, left_col)? {
            engine.hash_table(left, left_col, true)?;
        }
        if !engine.is_table_hashed(right, right_col)? {
            engine.hash_table(right, right_col, true)?;
        }
        let mut left_keys = engine.index_keys(left, left_col)?;
        left_keys.sort_by(|a, b| compare_keys(a, b));
        let mut right_keys_all = engine.index_keys(right, right_col)?;
        right_keys_all.sort_by(|a, b| compare_keys(a, b));
        Ok(HashJoin {
            engine: engine.clone(),
            left_name: left.to_string(),
            right_name: right.to_string(),
            left_col: left_col.to_string(),
            right_col: right_col.to_string(),
            proj,
            cmp,
            pair_ids,
            left_keys,
            key_pos: 0,
            right_keys_all,
            left_recs: Vec::new(),
            group_keys: Vec::new(),
            group_pos: 0,
            right_recs: Vec::new(),
            i: 0,
            j: 0,
        })
    }

    fn emit(&self, left: &Record, right: &Record) -> Result<Record> {
        let mut out = apply_projection(
            &self.proj,
            &self.left_name,
            left,
            &self.right_name,
            right,
        )?;
        if let Some(pair) = &self.pair_ids {
            let left_id = record_id(left, "left")?;
            let right_id = record_id(right, "right")?;
            out.set(
                ID_COLUMN,
                Value::Str(format!("{}|{}", left_id.index_key(), right_id.index_key())),
            );
            out.set(provenance_column(&pair.left), left_id);
            out.set(provenance_column(&pair.right), right_id);
        }
        Ok(out)
    }

    fn skip_self_pair(&self, left: &Record, right: &Record) -> bool {
        self.pair_ids.is_some()
            && self.left_name == self.right_name
            && left.id_key() == right.id_key()
    }
}

impl RecordStream for HashJoin {
    fn next_record(&mut self) -> Result<Option<Record>> {
        loop {
            // emit from the current (left key, right key) group
            if self.i < self.left_recs.len() {
                if self.j < self.right_recs.len() {
                    let left = self.left_recs[self.i].clone();
                    let right = self.right_recs[self.j].clone();
                    self.j += 1;
                    if self.j == self.right_recs.len() {
                        self.j = 0;
                        self.i += 1;
                    }
                    if self.skip_self_pair(&left, &right) {
                        continue;
                    }
                    return Ok(Some(self.emit(&left, &right)?));
                }
                self.i = self.left_recs.len();
            }

            // next matching right key for the current left key
            if self.group_pos < self.group_keys.len() {
                let key = self.group_keys[self.group_pos].clone();
                self.group_pos += 1;
                self.right_recs = self
                    .engine
                    .get_recs_from_hash(
                        &self.right_name,
                        &self.right_col,
                        Comparator::Eq,
                        &Value::from_literal(&key),
                    )?
                    .collect_records()?;
                self.i = 0;
                self.j = 0;
                continue;
            }

            // next left key
            if self.key_pos >= self.left_keys.len() {
                return Ok(None);
            }
            let left_key = self.left_keys[self.key_pos].clone();
            self.key_pos += 1;
            self.group_keys = match self.cmp {
                Comparator::Eq => {
                    if self
                        .engine
                        .has_value(
                            &self.right_name,
                            &self.right_col,
                            &Value::from_literal(&left_key),
                        )?
                    {
                        vec![left_key.clone()]
                    } else {
                        Vec::new()
                    }
                }
                Comparator::Gt => self
                    .right_keys_all
                    .iter()
                    .filter(|k| {
                        compare_keys(&left_key, k) == std::cmp::Ordering::Greater
                    })
                    .cloned()
                    .collect(),
            };
            self.group_pos = 0;
            if self.group_keys.is_empty() {
                continue;
            }
            self.left_recs = self
                .engine
                .get_recs_from_hash(
                    &self.left_name,
                    &self.left_col,
                    Comparator::Eq,
                    &Value::from_literal(&left_key),
                )?
                .collect_records()?;
            self.i = 0;
            self.j = 0;
            self.right_recs.clear();
        }
    }
}
