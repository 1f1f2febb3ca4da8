//! # Record Pages
//!
//! A page is a fixed-capacity, append-only sequence of records. Slots are
//! assigned in insertion order and never move: a `(page, slot)` locator
//! remains a valid address for a record until the whole table is cleared,
//! which is what lets hash indexes address records without owning them.
//!
//! ## Capacity Discipline
//!
//! Appending to a full page is a structural error, not a recoverable
//! condition - the table layer must consult `spaces_left` (via the
//! free-space queue) before placing a record. At every moment
//! `len() + spaces_left() == capacity`.
//!
//! ## Snapshot Iteration
//!
//! `snapshot` clones the page's current records so a caller can keep
//! consuming them while the same table grows elsewhere. `clear` empties the
//! page in place; the page object and its id survive for reuse.

use eyre::{ensure, Result};

use crate::records::Record;

/// Opaque page identity, unique per engine for its whole lifetime.
pub type PageId = u64;

/// A durable record address: page plus slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Locator {
    pub page: PageId,
    pub slot: usize,
}

impl Locator {
    pub fn new(page: PageId, slot: usize) -> Locator {
        Locator { page, slot }
    }
}

/// A fixed-capacity insertion log of records.
#[derive(Debug)]
pub struct Page {
    id: PageId,
    capacity: usize,
    records: Vec<Record>,
}

impl Page {
    pub fn new(id: PageId, capacity: usize) -> Page {
        Page {
            id,
            capacity,
            records: Vec::new(),
        }
    }

    pub fn id(&self) -> PageId {
        self.id
    }

    /// Appends a record, returning its slot.
    pub fn append(&mut self, record: Record) -> Result<usize> {
        ensure!(
            self.records.len() < self.capacity,
            "page {} is full ({} records); caller must check spaces_left before inserting",
            self.id,
            self.capacity
        );
        self.records.push(record);
        Ok(self.records.len() - 1)
    }

    /// Fetches the record at `slot` by value.
    pub fn record(&self, slot: usize) -> Result<Record> {
        ensure!(
            slot < self.records.len(),
            "slot {} out of bounds for page {} ({} records)",
            slot,
            self.id,
            self.records.len()
        );
        Ok(self.records[slot].clone())
    }

    /// A stable copy of the page's current contents.
    pub fn snapshot(&self) -> Vec<Record> {
        self.records.clone()
    }

    /// Empties the page in place, keeping its allocation and identity.
    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn spaces_left(&self) -> usize {
        self.capacity - self.records.len()
    }

    pub fn is_full(&self) -> bool {
        self.spaces_left() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Value;

    fn rec(n: i64) -> Record {
        Record::from_pairs([("c1", Value::Int(n))])
    }

    #[test]
    fn test_append_assigns_sequential_slots() {
        let mut page = Page::new(1, 3);
        assert_eq!(page.append(rec(10)).unwrap(), 0);
        assert_eq!(page.append(rec(11)).unwrap(), 1);
        assert_eq!(page.record(1).unwrap().get("c1"), Some(&Value::Int(11)));
    }

    #[test]
    fn test_capacity_accounting_holds_everywhere() {
        let mut page = Page::new(1, 3);
        for i in 0..3 {
            assert_eq!(page.len() + page.spaces_left(), 3);
            page.append(rec(i)).unwrap();
        }
        assert_eq!(page.len() + page.spaces_left(), 3);
        assert!(page.is_full());
    }

    #[test]
    fn test_append_to_full_page_is_an_error() {
        let mut page = Page::new(7, 1);
        page.append(rec(1)).unwrap();
        assert!(page.append(rec(2)).is_err());
    }

    #[test]
    fn test_out_of_bounds_slot_is_an_error() {
        let mut page = Page::new(1, 4);
        page.append(rec(1)).unwrap();
        assert!(page.record(1).is_err());
    }

    #[test]
    fn test_snapshot_is_stable_under_later_appends() {
        let mut page = Page::new(1, 4);
        page.append(rec(1)).unwrap();
        let snap = page.snapshot();
        page.append(rec(2)).unwrap();
        assert_eq!(snap.len(), 1);
    }

    #[test]
    fn test_clear_keeps_identity_and_capacity() {
        let mut page = Page::new(9, 2);
        page.append(rec(1)).unwrap();
        page.append(rec(2)).unwrap();
        page.clear();
        assert_eq!(page.id(), 9);
        assert_eq!(page.spaces_left(), 2);
        assert!(page.is_empty());
    }
}
