//! # Table Catalog State
//!
//! The passive state behind every engine operation: a table's column list,
//! its pages in insertion order, the free-space queue steering inserts, and
//! the per-column hash indexes.
//!
//! ## Hash Indexes
//!
//! An index maps a column's *normalized key* (see [`crate::types`]) to the
//! non-empty list of locators holding that value, so lookups are loose by
//! construction: indexing `3` and probing with `"3"` meet at the key `"3"`.
//! Locator lists use a small-vector since most keys address a handful of
//! records.
//!
//! Only the `_id` index is ever maintained incrementally (by unique
//! insertion); every other index is a point-in-time artifact that covers
//! exactly the records present when it was built and must be rebuilt before
//! the next read that depends on it. Clearing a table discards all of its
//! indexes.
//!
//! All mutation goes through the engine, which owns locking and the buffer
//! charge discipline; this module is the data it protects.

use eyre::{eyre, Result};
use hashbrown::HashMap;
use smallvec::SmallVec;

use crate::storage::{FreeSpaceQueue, Locator, Page, PageId};

/// Value key -> locators for one `(table, column)` pair.
#[derive(Debug, Default)]
pub struct HashIndex {
    buckets: HashMap<String, SmallVec<[Locator; 4]>>,
}

impl HashIndex {
    pub fn new() -> HashIndex {
        HashIndex::default()
    }

    pub fn insert(&mut self, key: String, locator: Locator) {
        self.buckets.entry(key).or_default().push(locator);
    }

    /// Inserts unless the bucket already holds this exact locator; used when
    /// extending an index over records it may have seen before.
    pub fn insert_unique(&mut self, key: String, locator: Locator) {
        let bucket = self.buckets.entry(key).or_default();
        if !bucket.contains(&locator) {
            bucket.push(locator);
        }
    }

    pub fn get(&self, key: &str) -> Option<&[Locator]> {
        self.buckets.get(key).map(|v| v.as_slice())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.buckets.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.buckets.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

/// One table: columns, pages, free-space queue, and indexes.
#[derive(Debug)]
pub struct Table {
    name: String,
    columns: Vec<String>,
    pages: Vec<Page>,
    page_positions: HashMap<PageId, usize>,
    free_space: FreeSpaceQueue,
    indexes: HashMap<String, HashIndex>,
}

impl Table {
    /// Creates the table around its first (empty) page; every table holds at
    /// least one page from birth.
    pub fn new(name: impl Into<String>, columns: Vec<String>, first_page: Page) -> Table {
        let mut table = Table {
            name: name.into(),
            columns,
            pages: Vec::new(),
            page_positions: HashMap::new(),
            free_space: FreeSpaceQueue::new(),
            indexes: HashMap::new(),
        };
        table.adopt_page(first_page);
        table
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Registers a page and queues its free space.
    pub fn adopt_page(&mut self, page: Page) {
        self.free_space.push(page.id(), page.spaces_left());
        self.page_positions.insert(page.id(), self.pages.len());
        self.pages.push(page);
    }

    pub fn page(&self, id: PageId) -> Result<&Page> {
        let pos = self
            .page_positions
            .get(&id)
            .ok_or_else(|| eyre!("page {id} does not belong to table '{}'", self.name))?;
        Ok(&self.pages[*pos])
    }

    pub fn page_mut(&mut self, id: PageId) -> Result<&mut Page> {
        let pos = self
            .page_positions
            .get(&id)
            .ok_or_else(|| eyre!("page {id} does not belong to table '{}'", self.name))?;
        Ok(&mut self.pages[*pos])
    }

    /// Page ids in insertion order; scans follow this order.
    pub fn page_ids(&self) -> Vec<PageId> {
        self.pages.iter().map(Page::id).collect()
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn free_space(&self) -> &FreeSpaceQueue {
        &self.free_space
    }

    pub fn free_space_mut(&mut self) -> &mut FreeSpaceQueue {
        &mut self.free_space
    }

    pub fn index(&self, column: &str) -> Option<&HashIndex> {
        self.indexes.get(column)
    }

    pub fn index_mut(&mut self, column: &str) -> Option<&mut HashIndex> {
        self.indexes.get_mut(column)
    }

    pub fn is_indexed(&self, column: &str) -> bool {
        self.indexes.contains_key(column)
    }

    pub fn set_index(&mut self, column: impl Into<String>, index: HashIndex) {
        self.indexes.insert(column.into(), index);
    }

    /// Removes and returns an index so it can be extended and reinstated.
    pub fn take_index(&mut self, column: &str) -> Option<HashIndex> {
        self.indexes.remove(column)
    }

    /// Empties every page in place, rebuilds the free-space queue, and
    /// discards all indexes. Pages keep their identities.
    pub fn clear(&mut self) {
        for page in &mut self.pages {
            page.clear();
        }
        let entries: Vec<(PageId, usize)> = self
            .pages
            .iter()
            .map(|p| (p.id(), p.spaces_left()))
            .collect();
        self.free_space.rebuild(entries);
        self.indexes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::Record;
    use crate::types::Value;

    fn table() -> Table {
        Table::new(
            "edges",
            vec!["c1".to_string(), "c2".to_string()],
            Page::new(1, 4),
        )
    }

    #[test]
    fn test_new_table_has_one_page() {
        let t = table();
        assert_eq!(t.page_count(), 1);
        assert_eq!(t.free_space().total_free(), 4);
        assert_eq!(t.page_ids(), vec![1]);
    }

    #[test]
    fn test_unknown_page_is_an_error() {
        let t = table();
        assert!(t.page(99).is_err());
    }

    #[test]
    fn test_hash_index_groups_locators_by_key() {
        let mut index = HashIndex::new();
        index.insert("3".to_string(), Locator::new(1, 0));
        index.insert("3".to_string(), Locator::new(1, 2));
        index.insert("5".to_string(), Locator::new(2, 0));
        assert_eq!(index.get("3").unwrap().len(), 2);
        assert_eq!(index.get("5").unwrap().len(), 1);
        assert!(index.get("7").is_none());
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_clear_resets_pages_queue_and_indexes() {
        let mut t = table();
        t.page_mut(1)
            .unwrap()
            .append(Record::from_pairs([("c1", Value::Int(1))]))
            .unwrap();
        t.set_index("c1", HashIndex::new());
        t.clear();
        assert_eq!(t.page_count(), 1);
        assert!(t.page(1).unwrap().is_empty());
        assert_eq!(t.free_space().total_free(), 4);
        assert!(!t.is_indexed("c1"));
    }
}
