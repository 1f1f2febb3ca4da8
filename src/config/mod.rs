//! # rexdb Configuration Module
//!
//! This module centralizes all configuration for rexdb: compile-time defaults
//! in [`constants`], and the runtime [`EngineConfig`] value that every engine
//! carries. Constants that depend on each other are co-located and documented
//! so the simulated-I/O benchmark numbers stay interpretable.
//!
//! ## Module Organization
//!
//! - [`constants`]: all numeric defaults with dependency documentation
//! - [`EngineConfig`]: the resolved per-engine configuration value

pub mod constants;
pub use constants::*;

use std::time::Duration;

/// Resolved per-engine configuration, read once at engine construction.
///
/// All four knobs shape the simulated I/O cost model: smaller pages and a
/// smaller buffer mean more admissions, and every admission miss charges
/// `page_fetch` of wall-clock latency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Simulated latency charged per buffer admission miss.
    pub page_fetch: Duration,
    /// Maximum records per page.
    pub page_capacity: usize,
    /// Maximum resident pages in the buffer.
    pub buffer_capacity: usize,
    /// Outer block width for block nested-loop joins.
    pub block_join_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            page_fetch: Duration::from_micros(DEFAULT_PAGE_FETCH_MICROS),
            page_capacity: DEFAULT_PAGE_CAPACITY,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            block_join_size: DEFAULT_BLOCK_JOIN_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_matches_constants() {
        let config = EngineConfig::default();
        assert_eq!(config.page_capacity, DEFAULT_PAGE_CAPACITY);
        assert_eq!(config.buffer_capacity, DEFAULT_BUFFER_CAPACITY);
        assert_eq!(config.block_join_size, DEFAULT_BLOCK_JOIN_SIZE);
        assert_eq!(
            config.page_fetch,
            Duration::from_micros(DEFAULT_PAGE_FETCH_MICROS)
        );
    }
}
