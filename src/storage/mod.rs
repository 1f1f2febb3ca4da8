//! # Storage Layer
//!
//! The storage substrate under the catalog: fixed-capacity pages of records,
//! the LRU page buffer that simulates fetch latency, and the free-space queue
//! that steers inserts toward the emptiest page.
//!
//! There is no file I/O here at all. Pages live in memory and are owned by
//! their tables; the buffer is purely a residency model whose job is to make
//! page-access patterns observable as wall-clock time.
//!
//! - [`page`]: append-only record pages with stable slot addresses
//! - [`buffer`]: the LRU residency set and its admission latency
//! - [`free_space`]: the per-table max-heap of page free space

pub mod buffer;
pub mod free_space;
pub mod page;

pub use buffer::PageBuffer;
pub use free_space::FreeSpaceQueue;
pub use page::{Locator, Page, PageId};
