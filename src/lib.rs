//! # rexdb - Recursive Query Engine over Simulated Paged Storage
//!
//! rexdb evaluates a restricted class of linear recursive SQL queries
//! (`WITH RECURSIVE ... UNION ... SELECT * INTO ...`) over in-memory,
//! paginated tables while charging a simulated I/O cost for every page the
//! buffer has to admit. Its purpose is to compare two evaluation strategies
//! on the same storage substrate:
//!
//! - **Standard**: naive nested-loop evaluation of each term
//! - **Optimized**: per-table simplification, per-pair composite hash joins,
//!   join-tree intersection, and a block-join cross product, driven to a
//!   semi-naive fixpoint
//!
//! ## Quick Start
//!
//! ```ignore
//! use rexdb::engine::Engine;
//! use rexdb::exec::{run_query, Strategy};
//! use rexdb::sql::parser::parse_queries;
//!
//! let engine = Engine::builder().buffer_capacity(50).build();
//! rexdb::datasets::load_csv_table(&engine, "a", "edges.csv", 100.0)?;
//!
//! let queries = parse_queries(
//!     "WITH RECURSIVE t(c1, c2) AS ( \
//!        SELECT * FROM a UNION \
//!        SELECT a.c1, t.c2 FROM a, t WHERE t.c1 = a.c2 \
//!      ) SELECT * INTO n FROM t;",
//! )?;
//! let outcome = run_query(&engine, &queries[0], Strategy::Optimized)?;
//! println!("{} rows in {} passes", outcome.total_rows, outcome.passes.len());
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │      SQL Layer (Lexer/Parser/IR)      │
//! ├──────────────────────────────────────┤
//! │  Evaluators (Standard │ Optimized)    │
//! ├──────────────────────────────────────┤
//! │   Join Engine (Block NL / Hash Join)  │
//! ├──────────────────────────────────────┤
//! │  Engine / Catalog (tables, indexes)   │
//! ├──────────────────────────────────────┤
//! │  Page Buffer (LRU + simulated fetch)  │
//! ├──────────────────────────────────────┤
//! │        Pages (in-memory records)      │
//! └──────────────────────────────────────┘
//! ```
//!
//! Tables own their pages outright; the buffer only tracks residency and
//! charges the configured fetch latency on a miss, so correctness never
//! depends on what happens to be cached. Every scan, index lookup, and join
//! is a lazy pull-stream, which keeps the latency signal honest for
//! benchmarks.
//!
//! ## Module Overview
//!
//! - [`storage`]: pages, the LRU page buffer, the free-space queue
//! - [`catalog`]: table state and per-column hash indexes
//! - [`engine`]: the engine handle and all catalog operations
//! - [`join`]: block nested-loop and hash join streams
//! - [`sql`]: query IR, lexer, and parser for the recursive grammar
//! - [`exec`]: filter compilation, fixpoint driver, both evaluators
//! - [`datasets`]: CSV ingestion and synthetic dataset generators

pub mod catalog;
pub mod config;
pub mod datasets;
pub mod engine;
pub mod exec;
pub mod join;
pub mod records;
pub mod sql;
pub mod storage;
pub mod types;

pub use engine::Engine;
pub use exec::{run_query, EvalOutcome, Strategy};
pub use records::Record;
pub use types::Value;
