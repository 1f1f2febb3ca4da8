//! # rexdb Configuration Constants
//!
//! All numeric defaults live here, grouped by functional area. The storage
//! constants define the simulated I/O cost model and are deliberately small:
//! the engine's job is to make access-pattern differences between evaluation
//! strategies visible as wall-clock time, not to hold large data.
//!
//! ## Dependency Notes
//!
//! ```text
//! DEFAULT_PAGE_CAPACITY (100 records)
//!       │
//!       └─> get_number_of_entries derives table cardinality as
//!           PAGE_CAPACITY * pages - total free space, so the free-space
//!           queue must stay consistent with the pages it describes.
//!
//! DEFAULT_BUFFER_CAPACITY (50 pages)
//!       │
//!       └─> Every admission beyond capacity evicts the LRU page; the
//!           evicted page stays owned by its table and is re-admitted
//!           (charging DEFAULT_PAGE_FETCH_MICROS) on next access.
//!
//! DEFAULT_BLOCK_JOIN_SIZE (100 records)
//!       │
//!       └─> Outer block width of the block nested-loop join. Each block
//!           triggers one fresh rescan of the inner table.
//! ```

// ============================================================================
// STORAGE CONFIGURATION
// ============================================================================

/// Simulated latency per buffer admission miss, in microseconds (0.1 ms).
pub const DEFAULT_PAGE_FETCH_MICROS: u64 = 100;

/// Maximum records per page.
pub const DEFAULT_PAGE_CAPACITY: usize = 100;

/// Maximum resident pages in the buffer.
pub const DEFAULT_BUFFER_CAPACITY: usize = 50;

// ============================================================================
// JOIN CONFIGURATION
// ============================================================================

/// Outer block width for block nested-loop joins.
pub const DEFAULT_BLOCK_JOIN_SIZE: usize = 100;

// ============================================================================
// IDENTIFIERS
// ============================================================================

/// Length of the random suffix in generated record ids (`"{table}:{suffix}"`).
pub const RECORD_ID_SUFFIX_LEN: usize = 21;

/// Length of the random suffix in ephemeral table names.
pub const TEMP_NAME_SUFFIX_LEN: usize = 12;

// ============================================================================
// BENCHMARK DRIVER DEFAULTS
// ============================================================================

/// Per-benchmark dataset scale percentages.
pub const DEFAULT_BENCH_SCALES: [f64; 4] = [10.0, 25.0, 50.0, 100.0];

/// Runs per scale; the first run is discarded as warmup.
pub const DEFAULT_BENCH_RUNS: usize = 5;

const _: () = assert!(DEFAULT_PAGE_CAPACITY > 0, "pages must hold records");
const _: () = assert!(DEFAULT_BUFFER_CAPACITY > 0, "buffer must hold pages");
const _: () = assert!(DEFAULT_BLOCK_JOIN_SIZE > 0, "block join needs a block");
const _: () = assert!(DEFAULT_BENCH_RUNS > 1, "first bench run is discarded");
